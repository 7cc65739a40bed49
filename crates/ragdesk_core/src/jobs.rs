use chrono::{DateTime, Utc};

/// Server-assigned task identifier of a background job.
pub type JobId = String;

/// What a background job does, which also decides where its status is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum JobKind {
    /// Document ingestion, polled through the task status endpoint.
    #[default]
    Ingestion,
    /// Integration sync, polled through the integration's sync history.
    IntegrationSync { integration_id: String },
}

/// One job a poll tick should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub job_id: JobId,
    pub kind: JobKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Uploading,
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Maps the status endpoint's state vocabulary onto [`JobState`].
    ///
    /// Returns `None` for labels outside the known vocabulary.
    pub fn from_server(label: &str) -> Option<Self> {
        let state = match label.trim().to_ascii_uppercase().as_str() {
            "UPLOADING" => JobState::Uploading,
            "PENDING" | "QUEUED" => JobState::Queued,
            "STARTED" | "PROCESSING" | "RETRY" => JobState::Processing,
            "SUCCESS" => JobState::Succeeded,
            "FAILURE" | "REVOKED" => JobState::Failed,
            _ => return None,
        };
        Some(state)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Uploading => "uploading",
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    /// Inverse of [`JobState::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploading" => Some(JobState::Uploading),
            "queued" => Some(JobState::Queued),
            "processing" => Some(JobState::Processing),
            "succeeded" => Some(JobState::Succeeded),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

/// Sub-phase reported by a job while it is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Uploading,
    Chunking,
    Embedding,
    Indexing,
    Finalizing,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Uploading,
        Stage::Chunking,
        Stage::Embedding,
        Stage::Indexing,
        Stage::Finalizing,
        Stage::Completed,
    ];

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "uploading" => Some(Stage::Uploading),
            "chunking" => Some(Stage::Chunking),
            "embedding" => Some(Stage::Embedding),
            "indexing" => Some(Stage::Indexing),
            "finalizing" => Some(Stage::Finalizing),
            "completed" => Some(Stage::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Uploading => "uploading",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Indexing => "indexing",
            Stage::Finalizing => "finalizing",
            Stage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    pub id: JobId,
    /// Entity the job produces, e.g. the ingested document id.
    pub related_entity_id: Option<String>,
    pub label: String,
    pub kind: JobKind,
    pub state: JobState,
    pub stage: Option<Stage>,
    pub detail: Option<String>,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

impl TrackedJob {
    pub fn new(
        id: impl Into<JobId>,
        label: impl Into<String>,
        state: JobState,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            related_entity_id: None,
            label: label.into(),
            kind: JobKind::Ingestion,
            state,
            stage: None,
            detail: None,
            acknowledged: false,
            created_at,
        }
    }

    pub fn with_related_entity(mut self, related_entity_id: impl Into<String>) -> Self {
        self.related_entity_id = Some(related_entity_id.into());
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn progress(&self) -> f32 {
        crate::progress::estimate(self.stage, self.state)
    }

    fn merge(&mut self, update: JobUpdate) {
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(stage) = update.stage {
            self.stage = Some(stage);
        }
        if let Some(related) = update.related_entity_id {
            self.related_entity_id = Some(related);
        }
        if let Some(detail) = update.detail {
            self.detail = Some(detail);
        }
    }
}

/// Partial job record produced by a status poll. Absent fields keep the
/// stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub stage: Option<Stage>,
    pub related_entity_id: Option<String>,
    pub detail: Option<String>,
}

impl JobUpdate {
    /// Update recorded when a status fetch itself fails.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failed),
            detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

/// Ordered set of tracked jobs, newest registration first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobRegistry {
    jobs: Vec<TrackedJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `job` at the front, replacing any entry with the same id.
    pub fn register(&mut self, job: TrackedJob) {
        self.jobs.retain(|existing| existing.id != job.id);
        self.jobs.insert(0, job);
    }

    /// Merges `update` into the job with `id`.
    ///
    /// Returns `false` without touching anything when the job is unknown
    /// (dismissed before the result arrived) or already terminal.
    pub fn reconcile(&mut self, id: &str, update: JobUpdate) -> bool {
        let Some(job) = self.jobs.iter_mut().find(|job| job.id == id) else {
            return false;
        };
        if job.state.is_terminal() {
            return false;
        }
        job.merge(update);
        true
    }

    /// Removes the job with `id` in any state. Returns whether it existed.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.id != id);
        self.jobs.len() != before
    }

    pub fn snapshot(&self) -> Vec<TrackedJob> {
        self.jobs.clone()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pending_targets(&self) -> Vec<PollTarget> {
        self.jobs
            .iter()
            .filter(|job| job.is_pending())
            .map(|job| PollTarget {
                job_id: job.id.clone(),
                kind: job.kind.clone(),
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_pending()).count()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &TrackedJob> {
        self.jobs.iter()
    }

    /// Flips `acknowledged` for every listed terminal job. Never flips back.
    pub(crate) fn mark_acknowledged(&mut self, ids: &[JobId]) {
        for job in self.jobs.iter_mut() {
            if job.state.is_terminal() && ids.contains(&job.id) {
                job.acknowledged = true;
            }
        }
    }
}
