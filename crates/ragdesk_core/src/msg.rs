use chrono::{DateTime, Utc};

use crate::{ChatReply, ConversationSummary, Identity, JobId, JobUpdate, Message, TrackedJob};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Backend accepted an upload and assigned it a job id.
    JobSubmitted(TrackedJob),
    /// Upload was rejected before any job existed.
    UploadFailed { label: String, message: String },
    /// Backend refused to queue an integration sync.
    SyncFailed {
        integration_id: String,
        message: String,
    },
    /// Restore jobs tracked by a previous run, newest first.
    RestoreJobs(Vec<TrackedJob>),
    /// Poll timer fired.
    PollTick { generation: u64 },
    /// Status fetches that resolved together in one reconciliation tick.
    /// Acknowledgment runs once over the whole batch.
    JobStatusesFetched {
        generation: u64,
        results: Vec<(JobId, Result<JobUpdate, String>)>,
    },
    /// User dismissed a job row.
    JobDismissed { job_id: JobId },
    /// Consuming context is going away; stop polling and drop late results.
    Teardown,
    /// User edited the message input.
    InputChanged(String),
    /// User sent a chat message.
    MessageSubmitted {
        text: String,
        sent_at: DateTime<Utc>,
    },
    /// User picked a conversation from the list.
    ConversationSelected { conversation_id: String },
    HistoryLoaded {
        seq: u64,
        conversation_id: String,
        result: Result<Vec<Message>, String>,
    },
    ChatReplied(Result<ChatReply, String>),
    /// User asked for a fresh conversation.
    NewConversationClicked,
    ConversationCreated {
        epoch: u64,
        result: Result<ConversationSummary, String>,
    },
    ConversationsLoaded {
        epoch: u64,
        result: Result<Vec<ConversationSummary>, String>,
    },
    RenameRequested { conversation_id: String, title: String },
    ConversationRenamed(Result<ConversationSummary, String>),
    FeedbackGiven {
        message_id: String,
        rating: u8,
        comment: Option<String>,
    },
    FeedbackRecorded(Result<(), String>),
    /// Caller identity changed (sign-in, sign-out, account switch).
    AuthChanged(Option<Identity>),
    /// Wall-clock tick used to expire notices.
    Tick { now: DateTime<Utc> },
    NoOp,
}
