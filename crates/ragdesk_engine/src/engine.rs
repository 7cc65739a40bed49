use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use ragdesk_logging::{desk_debug, desk_warn};

use crate::api::BackendApi;
use crate::poll::{poll_statuses, PollTimer, StatusTarget};
use crate::upload::{upload, UploadRequest};
use crate::wire::{ChatQuery, FeedbackRequest};
use crate::{EngineError, EngineEvent};

/// Receives engine events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forwards engine events into an `mpsc` channel, converting them into the
/// receiver's own event type.
pub struct ChannelEventSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> ChannelEventSink<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }
}

impl<T> EventSink for ChannelEventSink<T>
where
    T: From<EngineEvent> + Send,
{
    fn emit(&self, event: EngineEvent) {
        // The receiver is gone during shutdown; nothing left to deliver to.
        let _ = self.tx.send(T::from(event));
    }
}

/// Work the engine performs on behalf of the application.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    StartPolling {
        generation: u64,
        every: Duration,
    },
    StopPolling,
    /// Statuses settling within `settle_within` are reported as one batch.
    PollJobs {
        generation: u64,
        targets: Vec<StatusTarget>,
        settle_within: Duration,
    },
    FetchHistory {
        seq: u64,
        conversation_id: String,
    },
    SendChat(ChatQuery),
    /// `epoch` is echoed on the resulting event.
    ListConversations {
        epoch: u64,
    },
    CreateConversation {
        epoch: u64,
    },
    RenameConversation {
        conversation_id: String,
        title: String,
    },
    SubmitFeedback(FeedbackRequest),
    Upload(UploadRequest),
    StartSync {
        integration_id: String,
    },
    /// Looks up the caller behind the configured access token.
    ResolveIdentity,
}

/// Owns the background thread that runs all network work.
///
/// Commands are accepted from any thread; each one runs as its own task, so
/// a slow request never delays another. Dropping the handle stops the poll
/// timer and shuts the runtime down.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("ragdesk-engine")
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();

        thread::Builder::new()
            .name("ragdesk-dispatch".to_string())
            .spawn(move || {
                let mut timer = PollTimer::new();
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::StartPolling { generation, every } => {
                            timer.start(runtime.handle(), generation, every, sink.clone());
                        }
                        EngineCommand::StopPolling => timer.stop(),
                        command => {
                            let backend = backend.clone();
                            let sink = sink.clone();
                            runtime.spawn(async move {
                                handle_command(backend.as_ref(), command, sink.as_ref()).await;
                            });
                        }
                    }
                }
                timer.stop();
                runtime.shutdown_background();
                desk_debug!("Engine dispatch loop finished");
            })?;

        Ok(Self { cmd_tx })
    }

    pub fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            desk_warn!("Engine is no longer running; command dropped");
        }
    }
}

async fn handle_command(backend: &dyn BackendApi, command: EngineCommand, sink: &dyn EventSink) {
    match command {
        EngineCommand::PollJobs {
            generation,
            targets,
            settle_within,
        } => poll_statuses(backend, generation, targets, settle_within, sink).await,
        EngineCommand::FetchHistory {
            seq,
            conversation_id,
        } => {
            let result = backend.conversation_messages(&conversation_id).await;
            sink.emit(EngineEvent::HistoryFetched {
                seq,
                conversation_id,
                result,
            });
        }
        EngineCommand::SendChat(query) => {
            let result = backend.chat(&query).await;
            if let Err(err) = &result {
                desk_warn!("Chat request failed: {}", err);
            }
            sink.emit(EngineEvent::ChatAnswered(result));
        }
        EngineCommand::ListConversations { epoch } => {
            let result = backend.list_conversations().await;
            sink.emit(EngineEvent::ConversationsListed { epoch, result });
        }
        EngineCommand::CreateConversation { epoch } => {
            let result = backend.create_conversation().await;
            sink.emit(EngineEvent::ConversationCreated { epoch, result });
        }
        EngineCommand::RenameConversation {
            conversation_id,
            title,
        } => {
            sink.emit(EngineEvent::ConversationRenamed(
                backend.rename_conversation(&conversation_id, &title).await,
            ));
        }
        EngineCommand::SubmitFeedback(feedback) => {
            sink.emit(EngineEvent::FeedbackRecorded(
                backend.submit_feedback(&feedback).await,
            ));
        }
        EngineCommand::Upload(request) => {
            let outcome = upload(backend, &request).await;
            sink.emit(EngineEvent::UploadFinished {
                label: request.label().to_string(),
                outcome,
            });
        }
        EngineCommand::StartSync { integration_id } => {
            let result = backend.start_integration_sync(&integration_id).await;
            match &result {
                Ok(run) => desk_debug!(
                    "Sync queued integration_id={} task_id={:?}",
                    integration_id,
                    run.task_id
                ),
                Err(err) => desk_warn!("Sync of {} refused: {}", integration_id, err),
            }
            sink.emit(EngineEvent::SyncStarted {
                integration_id,
                result,
            });
        }
        EngineCommand::ResolveIdentity => {
            sink.emit(EngineEvent::IdentityResolved(backend.current_user().await));
        }
        EngineCommand::StartPolling { .. } | EngineCommand::StopPolling => {}
    }
}
