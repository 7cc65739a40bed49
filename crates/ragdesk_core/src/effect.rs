use crate::{ChatRequest, Notification, PollTarget};

/// Work requested by [`crate::update`]; executed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start the poll timer; its ticks must carry `generation`.
    StartPolling { generation: u64 },
    StopPolling,
    /// One status fetch per listed job, issued concurrently.
    PollJobs {
        generation: u64,
        targets: Vec<PollTarget>,
    },
    Notify(Notification),
    FetchHistory { seq: u64, conversation_id: String },
    SendChat(ChatRequest),
    /// `epoch` is echoed back on the response; see
    /// [`crate::SessionState::identity_epoch`].
    RefreshConversations { epoch: u64 },
    CreateConversation { epoch: u64 },
    RenameConversation { conversation_id: String, title: String },
    SendFeedback {
        message_id: String,
        rating: u8,
        comment: Option<String>,
    },
    /// Hand over to the external sign-in flow.
    RequestSignIn,
}
