use chrono::{DateTime, Duration, Utc};

use crate::{Effect, Identity, PrincipalSet};

/// How long a transient notice stays visible.
pub const NOTICE_TTL_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Local ids belong to optimistic messages the server has not confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Local(u64),
    Server(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CitedSource {
    pub id: String,
    pub source: String,
    pub text: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub conversation_id: Option<String>,
    pub cited_sources: Vec<CitedSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub query: String,
    pub principals: PrincipalSet,
    pub caller_id: Option<String>,
    /// `None` asks the server to create a conversation implicitly.
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message_id: String,
    pub answer: String,
    pub sources: Vec<CitedSource>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Transient, auto-clearing message shown for session actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    /// Set by the first clock tick after the notice was raised.
    pub shown_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlightSend {
    log_epoch: u64,
}

/// Active conversation, its message log and the conversation list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    identity: Option<Identity>,
    active_id: Option<String>,
    messages: Vec<Message>,
    conversations: Vec<ConversationSummary>,
    draft: String,
    in_flight: Option<InFlightSend>,
    selection_seq: u64,
    pending_selection: Option<String>,
    /// Bumped whenever the visible log is replaced wholesale.
    log_epoch: u64,
    /// Bumped when the caller changes. List and create responses carry the
    /// epoch they were requested under.
    identity_epoch: u64,
    next_local_id: u64,
    notice: Option<Notice>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Sequence number of the latest history request.
    pub fn selection_seq(&self) -> u64 {
        self.selection_seq
    }

    pub fn identity_epoch(&self) -> u64 {
        self.identity_epoch
    }

    pub(crate) fn set_draft(&mut self, text: String) -> bool {
        if self.draft == text {
            return false;
        }
        self.draft = text;
        true
    }

    pub(crate) fn select_conversation(&mut self, conversation_id: String) -> Vec<Effect> {
        let requested = self
            .pending_selection
            .as_deref()
            .or(self.active_id.as_deref());
        if requested == Some(conversation_id.as_str()) {
            return Vec::new();
        }
        self.selection_seq += 1;
        self.pending_selection = Some(conversation_id.clone());
        vec![Effect::FetchHistory {
            seq: self.selection_seq,
            conversation_id,
        }]
    }

    /// Applies a history response if it answers the latest selection.
    /// Returns whether anything changed.
    pub(crate) fn history_loaded(
        &mut self,
        seq: u64,
        conversation_id: String,
        result: Result<Vec<Message>, String>,
    ) -> bool {
        if seq != self.selection_seq {
            return false;
        }
        self.pending_selection = None;
        match result {
            Ok(messages) => {
                self.log_epoch += 1;
                self.messages = messages;
                self.active_id = Some(conversation_id);
            }
            Err(err) => self.raise(NoticeKind::Error, err),
        }
        true
    }

    pub(crate) fn submit_message(&mut self, text: &str, sent_at: DateTime<Utc>) -> Vec<Effect> {
        let query = text.trim();
        if query.is_empty() || self.in_flight.is_some() {
            return Vec::new();
        }

        self.next_local_id += 1;
        self.messages.push(Message {
            id: MessageId::Local(self.next_local_id),
            role: Role::User,
            content: query.to_string(),
            created_at: sent_at,
            conversation_id: self.active_id.clone(),
            cited_sources: Vec::new(),
        });
        self.draft.clear();
        self.in_flight = Some(InFlightSend {
            log_epoch: self.log_epoch,
        });

        vec![Effect::SendChat(ChatRequest {
            query: query.to_string(),
            principals: PrincipalSet::for_identity(self.identity.as_ref()),
            caller_id: self.identity.as_ref().map(|identity| identity.user_id.clone()),
            conversation_id: self.active_id.clone(),
        })]
    }

    pub(crate) fn chat_replied(&mut self, result: Result<ChatReply, String>) -> Vec<Effect> {
        let Some(sent) = self.in_flight.take() else {
            return Vec::new();
        };
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.raise(NoticeKind::Error, err);
                return Vec::new();
            }
        };

        // The user moved to another conversation while the send was in
        // flight; the reply belongs to a log that is no longer shown.
        if sent.log_epoch != self.log_epoch {
            return vec![self.refresh_conversations()];
        }

        self.messages.push(Message {
            id: MessageId::Server(reply.message_id),
            role: Role::Assistant,
            content: reply.answer,
            created_at: reply.created_at,
            conversation_id: Some(reply.conversation_id.clone()),
            cited_sources: reply.sources,
        });
        if self.active_id.as_deref() != Some(reply.conversation_id.as_str()) {
            self.active_id = Some(reply.conversation_id);
            return vec![self.refresh_conversations()];
        }
        Vec::new()
    }

    pub(crate) fn new_conversation(&self) -> Vec<Effect> {
        if self.identity.is_none() {
            return vec![Effect::RequestSignIn];
        }
        vec![Effect::CreateConversation {
            epoch: self.identity_epoch,
        }]
    }

    fn refresh_conversations(&self) -> Effect {
        Effect::RefreshConversations {
            epoch: self.identity_epoch,
        }
    }

    /// Opens a freshly created conversation. Responses requested by a
    /// previous caller are dropped. Returns whether anything changed.
    pub(crate) fn conversation_created(
        &mut self,
        epoch: u64,
        result: Result<ConversationSummary, String>,
    ) -> bool {
        if epoch != self.identity_epoch {
            return false;
        }
        match result {
            Ok(summary) => {
                // Fences any selection still waiting on its history.
                self.selection_seq += 1;
                self.pending_selection = None;
                self.log_epoch += 1;
                self.messages.clear();
                self.active_id = Some(summary.id.clone());
                self.conversations.retain(|known| known.id != summary.id);
                self.conversations.insert(0, summary);
            }
            Err(err) => self.raise(NoticeKind::Error, err),
        }
        true
    }

    /// Replaces the list. A failed refresh leaves the previous list intact,
    /// and a list fetched for a previous caller is dropped.
    pub(crate) fn conversations_loaded(
        &mut self,
        epoch: u64,
        result: Result<Vec<ConversationSummary>, String>,
    ) -> bool {
        if epoch != self.identity_epoch {
            return false;
        }
        match result {
            Ok(conversations) => {
                self.conversations = conversations;
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn rename_conversation(
        &mut self,
        conversation_id: String,
        title: String,
    ) -> Vec<Effect> {
        let title = title.trim();
        if title.is_empty() {
            self.raise(NoticeKind::Error, "Conversation title cannot be empty.");
            return Vec::new();
        }
        if self.identity.is_none() {
            return vec![Effect::RequestSignIn];
        }
        vec![Effect::RenameConversation {
            conversation_id,
            title: title.to_string(),
        }]
    }

    pub(crate) fn conversation_renamed(&mut self, result: Result<ConversationSummary, String>) {
        match result {
            Ok(summary) => {
                if let Some(known) = self
                    .conversations
                    .iter_mut()
                    .find(|known| known.id == summary.id)
                {
                    *known = summary;
                }
            }
            Err(err) => self.raise(NoticeKind::Error, err),
        }
    }

    pub(crate) fn give_feedback(
        &mut self,
        message_id: String,
        rating: u8,
        comment: Option<String>,
    ) -> Vec<Effect> {
        if !(1..=5).contains(&rating) {
            self.raise(NoticeKind::Error, "Rating must be between 1 and 5.");
            return Vec::new();
        }
        let rateable = self.messages.iter().any(|message| {
            message.role == Role::Assistant && message.id == MessageId::Server(message_id.clone())
        });
        if !rateable {
            self.raise(NoticeKind::Error, "Only answers saved by the server can be rated.");
            return Vec::new();
        }
        let comment = comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        vec![Effect::SendFeedback {
            message_id,
            rating,
            comment,
        }]
    }

    pub(crate) fn feedback_recorded(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => self.raise(NoticeKind::Info, "Thanks for the feedback."),
            Err(err) => self.raise(NoticeKind::Error, err),
        }
    }

    /// Replaces the caller identity. Switching users drops everything that
    /// belonged to the previous one.
    pub(crate) fn auth_changed(&mut self, identity: Option<Identity>) -> Vec<Effect> {
        if self.identity == identity {
            return Vec::new();
        }
        let same_user = matches!(
            (&self.identity, &identity),
            (Some(old), Some(new)) if old.user_id == new.user_id
        );
        self.identity = identity;
        if !same_user {
            self.identity_epoch += 1;
            self.selection_seq += 1;
            self.pending_selection = None;
            self.log_epoch += 1;
            self.active_id = None;
            self.messages.clear();
            self.conversations.clear();
        }
        if self.identity.is_some() {
            vec![self.refresh_conversations()]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn raise(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            text: text.into(),
            shown_since: None,
        });
    }

    /// Starts the clock on a fresh notice, then clears it once it has been
    /// visible for [`NOTICE_TTL_SECS`]. Returns whether the notice went away.
    pub(crate) fn expire_notice(&mut self, now: DateTime<Utc>) -> bool {
        let Some(notice) = self.notice.as_mut() else {
            return false;
        };
        let Some(shown_since) = notice.shown_since else {
            notice.shown_since = Some(now);
            return false;
        };
        if now - shown_since < Duration::seconds(NOTICE_TTL_SECS) {
            return false;
        }
        self.notice = None;
        true
    }
}
