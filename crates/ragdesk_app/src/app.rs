use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use ragdesk_core::{
    update, AppState, AppViewModel, JobId, JobRowView, JobState, MessageId, Msg, Notice,
    NoticeKind, PrincipalSet, Role, Stage, TrackedJob,
};
use ragdesk_engine::{ChannelEventSink, ClientSettings, EngineEvent, EngineHandle, ReqwestBackend};
use ragdesk_logging::{desk_debug, desk_info, desk_warn};

use crate::effects::{
    event_to_msg, identity_from_settings, notification_line, EffectRunner, Presentation,
};
use crate::persistence::{load_jobs, save_jobs};

const CLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// What the run should do before exiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Upload the files and wait until every job settles.
    Upload(Vec<PathBuf>),
    /// Sync the integrations and wait until every run settles.
    Sync(Vec<String>),
    /// Resume jobs from a previous run and wait until they settle.
    Watch,
    /// Interactive chat; uploads and job tracking stay available.
    Chat,
}

enum AppEvent {
    Engine(EngineEvent),
    Line(String),
    InputClosed,
    Clock,
}

impl From<EngineEvent> for AppEvent {
    fn from(event: EngineEvent) -> Self {
        AppEvent::Engine(event)
    }
}

/// Chat-mode input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Say(String),
    New,
    List,
    Open(String),
    Rename(String),
    Rate { rating: u8, comment: Option<String> },
    Upload(PathBuf),
    Sync(String),
    Jobs,
    Dismiss(JobId),
    Help,
    Quit,
    Unknown(String),
}

pub fn run(settings: ClientSettings, mode: Mode) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();
    let backend = ReqwestBackend::new(&settings).context("building http client")?;
    let engine = EngineHandle::new(
        Arc::new(backend),
        Arc::new(ChannelEventSink::new(event_tx.clone())),
    )
    .context("starting engine")?;

    spawn_clock(event_tx.clone());
    if mode == Mode::Chat {
        spawn_stdin_reader(event_tx.clone());
    }
    drop(event_tx);

    let mut app = App::new(EffectRunner::new(engine, &settings), settings, mode);
    app.start();
    app.event_loop(&event_rx);
    app.shutdown();
    Ok(())
}

/// Work that needs the caller's identity before it can be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Submission {
    Upload(PathBuf),
    Sync(String),
}

struct App {
    state: AppState,
    runner: EffectRunner,
    settings: ClientSettings,
    mode: Mode,
    console: Console,
    /// Set while the access token is being resolved to a user.
    awaiting_identity: bool,
    queued: VecDeque<Submission>,
    submissions_in_flight: usize,
    saved_jobs: Vec<TrackedJob>,
    quit: bool,
}

impl App {
    fn new(runner: EffectRunner, settings: ClientSettings, mode: Mode) -> Self {
        Self {
            state: AppState::new(),
            runner,
            settings,
            mode,
            console: Console::default(),
            awaiting_identity: false,
            queued: VecDeque::new(),
            submissions_in_flight: 0,
            saved_jobs: Vec::new(),
            quit: false,
        }
    }

    fn start(&mut self) {
        let restored = load_jobs(&self.settings.state_dir);
        self.saved_jobs = restored.clone();
        self.dispatch(Msg::RestoreJobs(restored));

        match &self.mode {
            Mode::Upload(paths) => {
                let uploads = paths.iter().cloned().map(Submission::Upload);
                self.queued.extend(uploads);
            }
            Mode::Sync(integration_ids) => {
                let syncs = integration_ids.iter().cloned().map(Submission::Sync);
                self.queued.extend(syncs);
            }
            Mode::Watch | Mode::Chat => {}
        }

        if self.settings.access_token.is_some() {
            self.awaiting_identity = true;
            self.runner.resolve_identity();
        } else {
            self.dispatch(Msg::AuthChanged(identity_from_settings(&self.settings)));
            self.submit_queued();
        }
        if self.mode == Mode::Chat {
            println!("Type a message, or /help for commands.");
        }
    }

    fn event_loop(&mut self, event_rx: &mpsc::Receiver<AppEvent>) {
        while !self.finished() {
            match event_rx.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }
    }

    fn finished(&self) -> bool {
        match self.mode {
            Mode::Chat => self.quit,
            Mode::Upload(_) | Mode::Sync(_) | Mode::Watch => {
                self.quit
                    || (!self.awaiting_identity
                        && self.queued.is_empty()
                        && self.submissions_in_flight == 0
                        && self.state.jobs().pending_count() == 0)
            }
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Engine(event) => {
                let identity_resolved = matches!(event, EngineEvent::IdentityResolved(_));
                match &event {
                    EngineEvent::UploadFinished { .. } | EngineEvent::SyncStarted { .. } => {
                        self.submissions_in_flight = self.submissions_in_flight.saturating_sub(1);
                    }
                    EngineEvent::StatusesFetched {
                        generation,
                        results,
                    } => {
                        if self.state.polling().accepts(*generation) {
                            desk_debug!(
                                "Status batch generation={} size={}",
                                generation,
                                results.len()
                            );
                        } else {
                            desk_debug!(
                                "Dropping {} status results from generation {}",
                                results.len(),
                                generation
                            );
                        }
                    }
                    EngineEvent::HistoryFetched {
                        seq,
                        conversation_id,
                        ..
                    } if *seq != self.state.session().selection_seq() => {
                        desk_debug!(
                            "Dropping stale history for {} seq={}",
                            conversation_id,
                            seq
                        );
                    }
                    _ => {}
                }
                self.dispatch(event_to_msg(event, Utc::now(), &self.settings));
                if identity_resolved {
                    self.awaiting_identity = false;
                    self.submit_queued();
                }
            }
            AppEvent::Line(line) => self.handle_line(&line),
            AppEvent::InputClosed => self.quit = true,
            AppEvent::Clock => self.dispatch(Msg::Tick { now: Utc::now() }),
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_command(line) {
            Command::Say(text) => self.dispatch(Msg::MessageSubmitted {
                text,
                sent_at: Utc::now(),
            }),
            Command::New => self.dispatch(Msg::NewConversationClicked),
            Command::List => self.console.print_conversations(&self.state.view()),
            Command::Open(target) => {
                let view = self.state.view();
                match resolve_conversation(&view, &target) {
                    Some(conversation_id) => {
                        self.dispatch(Msg::ConversationSelected { conversation_id })
                    }
                    None => println!("No conversation matches {target:?}; try /list."),
                }
            }
            Command::Rename(title) => {
                let active = self.state.session().active_id().map(ToOwned::to_owned);
                match active {
                    Some(conversation_id) => self.dispatch(Msg::RenameRequested {
                        conversation_id,
                        title,
                    }),
                    None => println!("Open a conversation first."),
                }
            }
            Command::Rate { rating, comment } => match last_rateable(&self.state.view()) {
                Some(message_id) => self.dispatch(Msg::FeedbackGiven {
                    message_id,
                    rating,
                    comment,
                }),
                None => println!("There is no answer to rate yet."),
            },
            Command::Upload(path) => self.submit(Submission::Upload(path)),
            Command::Sync(integration_id) => self.submit(Submission::Sync(integration_id)),
            Command::Jobs => self.console.print_jobs(&self.state.view()),
            Command::Dismiss(job_id) => self.dispatch(Msg::JobDismissed { job_id }),
            Command::Help => print_help(),
            Command::Quit => self.quit = true,
            Command::Unknown(text) => println!("Unknown command {text:?}; try /help."),
        }
    }

    fn submit(&mut self, submission: Submission) {
        self.queued.push_back(submission);
        if !self.awaiting_identity {
            self.submit_queued();
        }
    }

    /// Sends everything queued. Uploads carry the principals of the identity
    /// known at this point.
    fn submit_queued(&mut self) {
        while let Some(submission) = self.queued.pop_front() {
            match submission {
                Submission::Upload(path) => {
                    if let Err(err) = self.start_upload(&path) {
                        desk_warn!("Upload of {:?} not started: {:#}", path, err);
                        println!("{err:#}");
                    }
                }
                Submission::Sync(integration_id) => {
                    println!("Syncing integration {integration_id}...");
                    self.runner.start_sync(integration_id);
                    self.submissions_in_flight += 1;
                }
            }
        }
    }

    fn start_upload(&mut self, path: &Path) -> Result<()> {
        let principals = PrincipalSet::for_identity(self.state.session().identity());
        self.runner
            .upload(path, &principals)
            .with_context(|| format!("reading {}", path.display()))?;
        self.submissions_in_flight += 1;
        println!("Uploading {}...", path.display());
        Ok(())
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for presentation in self.runner.enqueue(effects) {
            match presentation {
                Presentation::Notify(notification) => {
                    desk_info!(
                        "Notify job_id={} kind={:?}",
                        notification.job_id,
                        notification.kind
                    );
                    println!("{}", notification_line(&notification));
                }
                Presentation::SignInRequired => {
                    desk_warn!("Action needs a signed-in user");
                    println!("Sign in required: set RAGDESK_ACCESS_TOKEN or RAGDESK_USER_ID.");
                }
            }
        }

        if self.state.consume_dirty() {
            self.console.render(&self.state.view());
        }
        self.persist_jobs();
    }

    fn persist_jobs(&mut self) {
        let jobs = self.state.jobs_snapshot();
        if jobs != self.saved_jobs {
            save_jobs(&self.settings.state_dir, &jobs);
            self.saved_jobs = jobs;
        }
    }

    fn shutdown(&mut self) {
        self.dispatch(Msg::Teardown);
        desk_info!(
            "Shutting down with {} pending jobs",
            self.state.jobs().pending_count()
        );
    }
}

fn spawn_clock(event_tx: mpsc::Sender<AppEvent>) {
    thread::spawn(move || {
        while event_tx.send(AppEvent::Clock).is_ok() {
            thread::sleep(CLOCK_INTERVAL);
        }
    });
}

fn spawn_stdin_reader(event_tx: mpsc::Sender<AppEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if event_tx.send(AppEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = event_tx.send(AppEvent::InputClosed);
    });
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    match name {
        "new" => Command::New,
        "list" => Command::List,
        "open" if !argument.is_empty() => Command::Open(argument.to_string()),
        "rename" if !argument.is_empty() => Command::Rename(argument.to_string()),
        "rate" => {
            let (rating, comment) = match argument.split_once(char::is_whitespace) {
                Some((rating, comment)) => (rating, Some(comment.trim().to_string())),
                None => (argument, None),
            };
            match rating.parse::<u8>() {
                Ok(rating) => Command::Rate { rating, comment },
                Err(_) => Command::Unknown(line.to_string()),
            }
        }
        "upload" if !argument.is_empty() => Command::Upload(PathBuf::from(argument)),
        "sync" if !argument.is_empty() => Command::Sync(argument.to_string()),
        "jobs" => Command::Jobs,
        "dismiss" if !argument.is_empty() => Command::Dismiss(argument.to_string()),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Accepts a 1-based position in the listing or a conversation id.
fn resolve_conversation(view: &AppViewModel, target: &str) -> Option<String> {
    if let Ok(position) = target.parse::<usize>() {
        if let Some(conversation) = position
            .checked_sub(1)
            .and_then(|index| view.conversations.get(index))
        {
            return Some(conversation.id.clone());
        }
    }
    view.conversations
        .iter()
        .find(|conversation| conversation.id == target)
        .map(|conversation| conversation.id.clone())
}

fn last_rateable(view: &AppViewModel) -> Option<String> {
    view.messages.iter().rev().find_map(|message| match (&message.role, &message.id) {
        (Role::Assistant, MessageId::Server(id)) => Some(id.clone()),
        _ => None,
    })
}

fn print_help() {
    println!("/new                start a conversation");
    println!("/list               show conversations");
    println!("/open <n|id>        switch conversation");
    println!("/rename <title>     rename the open conversation");
    println!("/rate <1-5> [text]  rate the last answer");
    println!("/upload <path>      ingest a document");
    println!("/sync <integration> sync an integration's source");
    println!("/jobs               show tracked jobs");
    println!("/dismiss <job id>   stop tracking a job");
    println!("/quit");
}

/// Prints only what changed since the previous render.
#[derive(Default)]
struct Console {
    job_rows: HashMap<JobId, (JobState, Option<Stage>)>,
    printed_messages: Vec<MessageId>,
    conversation: Option<String>,
    notice: Option<Notice>,
}

impl Console {
    fn render(&mut self, view: &AppViewModel) {
        self.render_jobs(view);
        self.render_messages(view);
        self.render_notice(view);
    }

    fn render_jobs(&mut self, view: &AppViewModel) {
        for row in view.jobs.iter().rev() {
            let key = (row.state, row.stage);
            if self.job_rows.get(&row.job_id) != Some(&key) {
                println!("{}", job_line(row));
                self.job_rows.insert(row.job_id.clone(), key);
            }
        }
        self.job_rows
            .retain(|job_id, _| view.jobs.iter().any(|row| &row.job_id == job_id));
    }

    fn render_messages(&mut self, view: &AppViewModel) {
        let ids: Vec<MessageId> = view.messages.iter().map(|m| m.id.clone()).collect();
        let continues = view.active_conversation == self.conversation
            && ids.len() >= self.printed_messages.len()
            && ids[..self.printed_messages.len()] == self.printed_messages[..];
        let start = if continues {
            self.printed_messages.len()
        } else {
            if let Some(id) = &view.active_conversation {
                println!("--- conversation {id} ---");
            }
            0
        };

        for message in &view.messages[start..] {
            let speaker = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            println!("{speaker}> {}", message.content);
            for (index, source) in message.cited_sources.iter().enumerate() {
                match source.score {
                    Some(score) => println!("    [{}] {} ({score:.2})", index + 1, source.source),
                    None => println!("    [{}] {}", index + 1, source.source),
                }
            }
        }
        self.printed_messages = ids;
        self.conversation = view.active_conversation.clone();
    }

    fn render_notice(&mut self, view: &AppViewModel) {
        let same_text = |a: &Notice, b: &Notice| a.kind == b.kind && a.text == b.text;
        let unchanged = match (&view.notice, &self.notice) {
            (Some(current), Some(printed)) => same_text(current, printed),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        if let Some(notice) = &view.notice {
            match notice.kind {
                NoticeKind::Info => println!("(i) {}", notice.text),
                NoticeKind::Error => println!("(!) {}", notice.text),
            }
        }
        self.notice = view.notice.clone();
    }

    fn print_jobs(&self, view: &AppViewModel) {
        if view.jobs.is_empty() {
            println!("No tracked jobs.");
        }
        for row in &view.jobs {
            println!("{}  {}", job_line(row), row.job_id);
        }
    }

    fn print_conversations(&self, view: &AppViewModel) {
        if view.conversations.is_empty() {
            println!("No conversations.");
        }
        for (index, conversation) in view.conversations.iter().enumerate() {
            let marker = if view.active_conversation.as_deref() == Some(conversation.id.as_str()) {
                "*"
            } else {
                " "
            };
            let title = conversation.title.as_deref().unwrap_or("(untitled)");
            println!(
                "{marker}{:>3}. {title}  [{}]  updated {}",
                index + 1,
                conversation.id,
                conversation.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
}

fn job_line(row: &JobRowView) -> String {
    let percent = (row.progress * 100.0).round() as u32;
    let mut line = format!("[job] {}: {}", row.label, row.state.as_str());
    if let Some(stage) = row.stage {
        if !row.state.is_terminal() {
            line.push_str(&format!(" ({})", stage.as_str()));
        }
    }
    line.push_str(&format!(" {percent}%"));
    if let (JobState::Failed, Some(detail)) = (row.state, &row.detail) {
        line.push_str(&format!(" - {detail}"));
    }
    line
}
