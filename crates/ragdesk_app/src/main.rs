mod app;
mod effects;
mod persistence;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::LevelFilter;
use ragdesk_engine::ClientSettings;
use ragdesk_logging::{desk_info, LogDestination};

use app::Mode;

const LOG_FILE: &str = "./ragdesk.log";

const USAGE: &str = "usage: ragdesk <command>

commands:
  chat                 interactive chat over the ingested documents
  upload <file>...     ingest documents and wait for processing
  sync <id>...         sync integrations and wait for their runs to finish
  watch                resume tracking jobs from a previous run

settings are read from RAGDESK_* environment variables or a .env file";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    ragdesk_logging::initialize(LogDestination::File, LevelFilter::Info, Path::new(LOG_FILE));

    let Some(mode) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };
    let settings = ClientSettings::from_env().context("reading RAGDESK_* settings")?;
    desk_info!(
        "Starting mode={:?} api={} state_dir={:?}",
        mode,
        settings.base_url,
        settings.state_dir
    );
    app::run(settings, mode)
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Mode>> {
    let Some(command) = args.next() else {
        return Ok(None);
    };
    let mode = match command.as_str() {
        "chat" => Mode::Chat,
        "watch" => Mode::Watch,
        "upload" => {
            let paths: Vec<PathBuf> = args.by_ref().map(PathBuf::from).collect();
            if paths.is_empty() {
                bail!("upload needs at least one file\n\n{USAGE}");
            }
            Mode::Upload(paths)
        }
        "sync" => {
            let integration_ids: Vec<String> = args.by_ref().collect();
            if integration_ids.is_empty() {
                bail!("sync needs at least one integration id\n\n{USAGE}");
            }
            Mode::Sync(integration_ids)
        }
        "help" | "-h" | "--help" => return Ok(None),
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    };
    if let Some(extra) = args.next() {
        bail!("unexpected argument {extra:?}\n\n{USAGE}");
    }
    Ok(Some(mode))
}
