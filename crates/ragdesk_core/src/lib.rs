//! Ragdesk core: pure coordination state machine for background jobs and
//! chat sessions. No I/O happens here; callers execute the returned effects.
mod ack;
mod effect;
mod identity;
mod jobs;
mod msg;
mod poller;
mod progress;
mod session;
mod state;
mod update;
mod view_model;

pub use ack::{acknowledge, Notification, NotificationKind};
pub use effect::Effect;
pub use identity::{Identity, PrincipalSet, PUBLIC_PRINCIPAL};
pub use jobs::{JobId, JobKind, JobRegistry, JobState, JobUpdate, PollTarget, Stage, TrackedJob};
pub use msg::Msg;
pub use poller::{PollPhase, PollState};
pub use progress::{estimate, PROGRESS_FLOOR};
pub use session::{
    ChatReply, ChatRequest, CitedSource, ConversationSummary, Message, MessageId, Notice,
    NoticeKind, Role, SessionState, NOTICE_TTL_SECS,
};
pub use state::AppState;
pub use update::update;
pub use view_model::{AppViewModel, JobRowView};
