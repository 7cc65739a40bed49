use crate::{ConversationSummary, JobId, JobState, Message, Notice, PollPhase, Stage, TrackedJob};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub jobs: Vec<JobRowView>,
    pub pending_jobs: usize,
    pub poll_phase: PollPhase,
    pub signed_in: bool,
    pub active_conversation: Option<String>,
    pub messages: Vec<Message>,
    pub conversations: Vec<ConversationSummary>,
    pub draft: String,
    pub busy: bool,
    pub notice: Option<Notice>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub label: String,
    pub state: JobState,
    pub stage: Option<Stage>,
    pub progress: f32,
    pub detail: Option<String>,
    pub acknowledged: bool,
}

impl From<&TrackedJob> for JobRowView {
    fn from(job: &TrackedJob) -> Self {
        Self {
            job_id: job.id.clone(),
            label: job.label.clone(),
            state: job.state,
            stage: job.stage,
            progress: job.progress(),
            detail: job.detail.clone(),
            acknowledged: job.acknowledged,
        }
    }
}
