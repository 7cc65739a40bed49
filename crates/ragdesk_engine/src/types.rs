use std::fmt;

use crate::upload::UploadOutcome;
use crate::wire::{
    ChatAnswer, Conversation, FeedbackReceipt, StatusReport, StoredMessage, SyncRun, UserProfile,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    /// The backend answered but the requested record was absent.
    Missing,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "unexpected response body"),
            FailureKind::Missing => write!(f, "not found"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Results the engine reports back to the application, one per finished
/// command or timer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PollTick {
        generation: u64,
    },
    /// Status results that settled together, keyed by task id.
    StatusesFetched {
        generation: u64,
        results: Vec<(String, Result<StatusReport, ApiError>)>,
    },
    HistoryFetched {
        seq: u64,
        conversation_id: String,
        result: Result<Vec<StoredMessage>, ApiError>,
    },
    ChatAnswered(Result<ChatAnswer, ApiError>),
    ConversationsListed {
        epoch: u64,
        result: Result<Vec<Conversation>, ApiError>,
    },
    ConversationCreated {
        epoch: u64,
        result: Result<Conversation, ApiError>,
    },
    ConversationRenamed(Result<Conversation, ApiError>),
    FeedbackRecorded(Result<FeedbackReceipt, ApiError>),
    UploadFinished {
        label: String,
        outcome: UploadOutcome,
    },
    SyncStarted {
        integration_id: String,
        result: Result<SyncRun, ApiError>,
    },
    IdentityResolved(Result<UserProfile, ApiError>),
}
