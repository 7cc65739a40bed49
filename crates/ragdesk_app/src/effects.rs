use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ragdesk_core::{
    ChatReply, ChatRequest, CitedSource, ConversationSummary, Effect, Identity, JobId, JobKind,
    JobState, JobUpdate, Message, MessageId, Msg, Notification, NotificationKind, PollTarget,
    PrincipalSet, Role, Stage, TrackedJob,
};
use ragdesk_engine::{
    ApiError, ChatAnswer, ChatQuery, ClientSettings, Conversation, EngineCommand, EngineEvent,
    EngineHandle, FailureKind, FeedbackRequest, IngestReceipt, SourceDocument, StatusReport,
    StatusTarget, StoredMessage, SyncRun, UploadOutcome, UploadRequest, UserProfile,
};
use ragdesk_logging::{desk_info, desk_warn};

/// Turns core effects into engine commands.
///
/// Effects that only concern the terminal are handed back from
/// [`EffectRunner::enqueue`] for the caller to present.
pub struct EffectRunner {
    engine: EngineHandle,
    poll_interval: Duration,
    /// Status results settling within this window form one batch.
    settle_within: Duration,
    top_k: u8,
}

/// Effect the caller must present to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    Notify(Notification),
    SignInRequired,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, settings: &ClientSettings) -> Self {
        Self {
            engine,
            poll_interval: settings.poll_interval,
            settle_within: settings.poll_interval / 2,
            top_k: settings.clamped_top_k(),
        }
    }

    pub fn enqueue(&self, effects: Vec<Effect>) -> Vec<Presentation> {
        let mut presentations = Vec::new();
        for effect in effects {
            match effect {
                Effect::StartPolling { generation } => {
                    desk_info!("StartPolling generation={}", generation);
                    self.engine.send(EngineCommand::StartPolling {
                        generation,
                        every: self.poll_interval,
                    });
                }
                Effect::StopPolling => {
                    desk_info!("StopPolling");
                    self.engine.send(EngineCommand::StopPolling);
                }
                Effect::PollJobs {
                    generation,
                    targets,
                } => {
                    self.engine.send(EngineCommand::PollJobs {
                        generation,
                        targets: targets.into_iter().map(status_target).collect(),
                        settle_within: self.settle_within,
                    });
                }
                Effect::FetchHistory {
                    seq,
                    conversation_id,
                } => {
                    self.engine.send(EngineCommand::FetchHistory {
                        seq,
                        conversation_id,
                    });
                }
                Effect::SendChat(request) => {
                    self.engine
                        .send(EngineCommand::SendChat(chat_query(request, self.top_k)));
                }
                Effect::RefreshConversations { epoch } => {
                    self.engine.send(EngineCommand::ListConversations { epoch });
                }
                Effect::CreateConversation { epoch } => {
                    self.engine.send(EngineCommand::CreateConversation { epoch });
                }
                Effect::RenameConversation {
                    conversation_id,
                    title,
                } => {
                    self.engine.send(EngineCommand::RenameConversation {
                        conversation_id,
                        title,
                    });
                }
                Effect::SendFeedback {
                    message_id,
                    rating,
                    comment,
                } => {
                    self.engine
                        .send(EngineCommand::SubmitFeedback(FeedbackRequest {
                            message_id,
                            rating,
                            comment,
                        }));
                }
                Effect::Notify(notification) => {
                    presentations.push(Presentation::Notify(notification));
                }
                Effect::RequestSignIn => presentations.push(Presentation::SignInRequired),
            }
        }
        presentations
    }

    /// Starts an upload; its outcome arrives later as an engine event.
    pub fn upload(&self, path: &Path, principals: &PrincipalSet) -> std::io::Result<()> {
        let request = UploadRequest::from_path(path)?
            .with_principals(principals.to_vec())
            .with_source(path.display().to_string());
        desk_info!(
            "Upload file={} bytes={} principals={:?}",
            request.filename,
            request.contents.len(),
            request.allowed_principals
        );
        self.engine.send(EngineCommand::Upload(request));
        Ok(())
    }

    /// Queues a sync of the integration; the run arrives as `SyncStarted`.
    pub fn start_sync(&self, integration_id: String) {
        desk_info!("Sync integration_id={}", integration_id);
        self.engine.send(EngineCommand::StartSync { integration_id });
    }

    /// Asks the backend who the access token belongs to.
    pub fn resolve_identity(&self) {
        self.engine.send(EngineCommand::ResolveIdentity);
    }
}

/// Identity configured for this run, if a user id is set.
pub fn identity_from_settings(settings: &ClientSettings) -> Option<Identity> {
    settings
        .user_id
        .as_ref()
        .map(|user_id| Identity::new(user_id.clone(), settings.principals.iter().cloned()))
}

/// The backend's view of the caller wins; when it cannot be reached the
/// configured identity is used instead.
pub fn resolved_identity(
    result: Result<UserProfile, ApiError>,
    settings: &ClientSettings,
) -> Option<Identity> {
    match result {
        Ok(profile) => {
            desk_info!("Signed in as user_id={} email={}", profile.id, profile.email);
            Some(Identity::new(profile.id, settings.principals.iter().cloned()))
        }
        Err(err) => {
            desk_warn!("Could not resolve the signed-in user: {}", err);
            identity_from_settings(settings)
        }
    }
}

pub fn event_to_msg(event: EngineEvent, now: DateTime<Utc>, settings: &ClientSettings) -> Msg {
    match event {
        EngineEvent::PollTick { generation } => Msg::PollTick { generation },
        EngineEvent::StatusesFetched {
            generation,
            results,
        } => Msg::JobStatusesFetched {
            generation,
            results: results
                .into_iter()
                .map(|(task_id, result)| status_result(task_id, result))
                .collect(),
        },
        EngineEvent::HistoryFetched {
            seq,
            conversation_id,
            result,
        } => {
            let result = result
                .map(|stored| history_messages(&conversation_id, stored))
                .map_err(|err| describe(&err));
            Msg::HistoryLoaded {
                seq,
                conversation_id,
                result,
            }
        }
        EngineEvent::ChatAnswered(result) => {
            Msg::ChatReplied(result.map(chat_reply).map_err(|err| describe(&err)))
        }
        EngineEvent::ConversationsListed { epoch, result } => Msg::ConversationsLoaded {
            epoch,
            result: result
                .map(|list| list.into_iter().map(conversation_summary).collect())
                .map_err(|err| describe(&err)),
        },
        EngineEvent::ConversationCreated { epoch, result } => Msg::ConversationCreated {
            epoch,
            result: result
                .map(conversation_summary)
                .map_err(|err| describe(&err)),
        },
        EngineEvent::ConversationRenamed(result) => Msg::ConversationRenamed(
            result
                .map(conversation_summary)
                .map_err(|err| describe(&err)),
        ),
        EngineEvent::FeedbackRecorded(result) => {
            Msg::FeedbackRecorded(result.map(|_| ()).map_err(|err| describe(&err)))
        }
        EngineEvent::UploadFinished { label, outcome } => match outcome {
            UploadOutcome::Uploaded(receipt) => {
                Msg::JobSubmitted(submitted_job(label, receipt, now))
            }
            UploadOutcome::Failed { message } => Msg::UploadFailed { label, message },
        },
        EngineEvent::SyncStarted {
            integration_id,
            result,
        } => match result.and_then(|run| sync_job(&integration_id, run, now)) {
            Ok(job) => Msg::JobSubmitted(job),
            Err(err) => Msg::SyncFailed {
                integration_id,
                message: describe(&err),
            },
        },
        EngineEvent::IdentityResolved(result) => {
            Msg::AuthChanged(resolved_identity(result, settings))
        }
    }
}

pub fn status_result(
    task_id: String,
    result: Result<StatusReport, ApiError>,
) -> (JobId, Result<JobUpdate, String>) {
    (task_id, result.map(job_update).map_err(|err| describe(&err)))
}

/// Unknown state or stage labels leave the stored values untouched.
pub fn job_update(report: StatusReport) -> JobUpdate {
    let state = JobState::from_server(&report.state);
    if state.is_none() {
        desk_warn!(
            "Unknown job state {:?} for task_id={}",
            report.state,
            report.task_id
        );
    }
    JobUpdate {
        state,
        stage: report.stage.as_deref().and_then(Stage::parse),
        related_entity_id: report.document_id,
        detail: report.detail,
    }
}

pub fn submitted_job(label: String, receipt: IngestReceipt, now: DateTime<Utc>) -> TrackedJob {
    let state = JobState::from_server(&receipt.status).unwrap_or(JobState::Queued);
    TrackedJob::new(receipt.task_id, label, state, now).with_related_entity(receipt.document_id)
}

/// A queued sync run becomes a tracked job polled through the run history.
pub fn sync_job(
    integration_id: &str,
    run: SyncRun,
    now: DateTime<Utc>,
) -> Result<TrackedJob, ApiError> {
    let Some(task_id) = run.task_id else {
        return Err(ApiError::new(
            FailureKind::Missing,
            format!("sync run {} has no task to follow", run.id),
        ));
    };
    let state = JobState::from_server(&run.status).unwrap_or(JobState::Queued);
    let kind = JobKind::IntegrationSync {
        integration_id: integration_id.to_string(),
    };
    Ok(TrackedJob::new(task_id, format!("sync {integration_id}"), state, now).with_kind(kind))
}

fn status_target(target: PollTarget) -> StatusTarget {
    match target.kind {
        JobKind::Ingestion => StatusTarget::Document {
            task_id: target.job_id,
        },
        JobKind::IntegrationSync { integration_id } => StatusTarget::IntegrationSync {
            integration_id,
            task_id: target.job_id,
        },
    }
}

fn chat_query(request: ChatRequest, top_k: u8) -> ChatQuery {
    ChatQuery {
        query: request.query,
        principals: request.principals.to_vec(),
        caller_id: request.caller_id,
        conversation_id: request.conversation_id,
        top_k,
    }
}

fn chat_reply(answer: ChatAnswer) -> ChatReply {
    ChatReply {
        conversation_id: answer.conversation_id,
        message_id: answer.message_id,
        answer: answer.answer,
        sources: answer.sources.into_iter().map(cited_source).collect(),
        created_at: answer.created_at,
    }
}

fn cited_source(document: SourceDocument) -> CitedSource {
    CitedSource {
        id: document.id,
        source: document.source,
        text: document.text,
        score: document.score,
    }
}

fn conversation_summary(conversation: Conversation) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id,
        title: conversation.title,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    }
}

fn history_messages(conversation_id: &str, stored: Vec<StoredMessage>) -> Vec<Message> {
    stored
        .into_iter()
        .filter_map(|message| {
            let Some(role) = Role::parse(&message.role) else {
                desk_warn!("Skipping message {} with role {:?}", message.id, message.role);
                return None;
            };
            Some(Message {
                id: MessageId::Server(message.id),
                role,
                content: message.content,
                created_at: message.created_at,
                conversation_id: Some(conversation_id.to_string()),
                cited_sources: Vec::new(),
            })
        })
        .collect()
}

/// Backend error text as shown to the user.
fn describe(err: &ApiError) -> String {
    match err.kind {
        FailureKind::HttpStatus(_) => err.message.clone(),
        _ => err.to_string(),
    }
}

pub fn notification_line(notification: &Notification) -> String {
    match notification.kind {
        NotificationKind::Success => format!("[done] {}", notification.message),
        NotificationKind::Error => format!("[failed] {}", notification.message),
    }
}
