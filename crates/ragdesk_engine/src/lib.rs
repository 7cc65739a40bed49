//! Ragdesk engine: backend HTTP client, status polling and effect execution.
mod api;
mod engine;
mod persist;
mod poll;
mod settings;
mod types;
mod upload;
mod wire;

pub use api::{BackendApi, ReqwestBackend};
pub use engine::{ChannelEventSink, EngineCommand, EngineHandle, EventSink};
pub use persist::{ensure_state_dir, PersistError, StateStore};
pub use poll::{fetch_status, poll_statuses, PollTimer, StatusTarget};
pub use settings::{
    parse_base_url, ClientSettings, SettingsError, DEFAULT_BASE_URL, MAX_TOP_K, MIN_TOP_K,
};
pub use types::{ApiError, EngineError, EngineEvent, FailureKind};
pub use upload::{upload, UploadOutcome, UploadRequest};
pub use wire::{
    ChatAnswer, ChatQuery, Conversation, FeedbackReceipt, FeedbackRequest, IngestReceipt,
    SourceDocument, StatusReport, StoredMessage, SyncRun, UserProfile,
};
