use std::path::Path;

use chrono::{DateTime, Utc};
use ragdesk_core::{JobKind, JobState, Stage, TrackedJob};
use ragdesk_engine::StateStore;
use ragdesk_logging::{desk_error, desk_info, desk_warn};
use serde::{Deserialize, Serialize};

const JOBS_FILENAME: &str = "jobs.ron";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    id: String,
    label: String,
    state: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    related_entity_id: Option<String>,
    /// Set for integration sync jobs.
    #[serde(default)]
    integration_id: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    acknowledged: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedJobs {
    jobs: Vec<PersistedJob>,
}

/// Jobs tracked by a previous run, newest first. Unreadable files and
/// entries with unknown states are skipped.
pub(crate) fn load_jobs(state_dir: &Path) -> Vec<TrackedJob> {
    let store = StateStore::new(state_dir.to_path_buf());
    let content = match store.read(JOBS_FILENAME) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(err) => {
            desk_warn!("Failed to read tracked jobs from {:?}: {}", state_dir, err);
            return Vec::new();
        }
    };

    let persisted: PersistedJobs = match ron::from_str(&content) {
        Ok(persisted) => persisted,
        Err(err) => {
            desk_warn!("Failed to parse tracked jobs in {:?}: {}", state_dir, err);
            return Vec::new();
        }
    };

    let jobs: Vec<TrackedJob> = persisted
        .jobs
        .into_iter()
        .filter_map(|job| {
            let Some(state) = JobState::parse(&job.state) else {
                desk_warn!("Dropping persisted job {} with state {:?}", job.id, job.state);
                return None;
            };
            let mut tracked = TrackedJob::new(job.id, job.label, state, job.created_at);
            tracked.stage = job.stage.as_deref().and_then(Stage::parse);
            tracked.related_entity_id = job.related_entity_id;
            tracked.detail = job.detail;
            tracked.acknowledged = job.acknowledged;
            if let Some(integration_id) = job.integration_id {
                tracked.kind = JobKind::IntegrationSync { integration_id };
            }
            Some(tracked)
        })
        .collect();

    desk_info!("Loaded {} tracked jobs from {:?}", jobs.len(), state_dir);
    jobs
}

pub(crate) fn save_jobs(state_dir: &Path, jobs: &[TrackedJob]) {
    let persisted = PersistedJobs {
        jobs: jobs
            .iter()
            .map(|job| PersistedJob {
                id: job.id.clone(),
                label: job.label.clone(),
                state: job.state.as_str().to_string(),
                stage: job.stage.map(|stage| stage.as_str().to_string()),
                related_entity_id: job.related_entity_id.clone(),
                integration_id: match &job.kind {
                    JobKind::Ingestion => None,
                    JobKind::IntegrationSync { integration_id } => Some(integration_id.clone()),
                },
                detail: job.detail.clone(),
                acknowledged: job.acknowledged,
                created_at: job.created_at,
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&persisted, pretty) {
        Ok(text) => text,
        Err(err) => {
            desk_error!("Failed to serialize tracked jobs: {}", err);
            return;
        }
    };

    let store = StateStore::new(state_dir.to_path_buf());
    if let Err(err) = store.write(JOBS_FILENAME, &content) {
        desk_error!("Failed to write tracked jobs to {:?}: {}", state_dir, err);
    }
}
