use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use ragdesk_logging::{desk_debug, desk_warn};
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::BackendApi;
use crate::engine::EventSink;
use crate::wire::StatusReport;
use crate::{ApiError, EngineEvent, FailureKind};

/// Periodic tick source for status polling.
///
/// At most one timer runs per instance. Starting again replaces the running
/// timer, and dropping the instance stops it.
#[derive(Debug, Default)]
pub struct PollTimer {
    running: Option<(u64, CancellationToken)>,
}

impl PollTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the running timer, if any.
    pub fn generation(&self) -> Option<u64> {
        self.running.as_ref().map(|(generation, _)| *generation)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Emits `PollTick { generation }` every `every` until stopped. The first
    /// tick fires one full interval after the call.
    pub fn start(
        &mut self,
        runtime: &Handle,
        generation: u64,
        every: Duration,
        sink: Arc<dyn EventSink>,
    ) {
        if self.generation() == Some(generation) {
            return;
        }
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let every = every.max(Duration::from_millis(1));
        runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => sink.emit(EngineEvent::PollTick { generation }),
                }
            }
            desk_debug!("Poll timer stopped generation={}", generation);
        });
        desk_debug!("Poll timer started generation={} every={:?}", generation, every);
        self.running = Some((generation, token));
    }

    pub fn stop(&mut self) {
        if let Some((_, token)) = self.running.take() {
            token.cancel();
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Where the status of one polled task is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTarget {
    Document {
        task_id: String,
    },
    IntegrationSync {
        integration_id: String,
        task_id: String,
    },
}

impl StatusTarget {
    pub fn task_id(&self) -> &str {
        match self {
            StatusTarget::Document { task_id } => task_id,
            StatusTarget::IntegrationSync { task_id, .. } => task_id,
        }
    }
}

/// Status of one task. A sync task is looked up in its integration's run
/// history; a run that is no longer listed is a `Missing` failure.
pub async fn fetch_status(
    api: &dyn BackendApi,
    target: &StatusTarget,
) -> Result<StatusReport, ApiError> {
    match target {
        StatusTarget::Document { task_id } => api.document_status(task_id).await,
        StatusTarget::IntegrationSync {
            integration_id,
            task_id,
        } => api
            .integration_sync_runs(integration_id)
            .await?
            .into_iter()
            .find(|run| run.task_id.as_deref() == Some(task_id.as_str()))
            .map(|run| run.status_report(task_id))
            .ok_or_else(|| {
                ApiError::new(
                    FailureKind::Missing,
                    format!("no sync run for task {task_id} on integration {integration_id}"),
                )
            }),
    }
}

/// Fetches every status concurrently and reports them as one
/// `StatusesFetched` batch: whatever settled within `settle_within`. Requests
/// still running after that are reported one by one as they settle, so a
/// hung request never holds up the others.
pub async fn poll_statuses(
    api: &dyn BackendApi,
    generation: u64,
    targets: Vec<StatusTarget>,
    settle_within: Duration,
    sink: &dyn EventSink,
) {
    let mut in_flight: FuturesUnordered<_> = targets
        .into_iter()
        .map(|target| async move {
            let result = fetch_status(api, &target).await;
            if let Err(err) = &result {
                desk_warn!("Status check failed task_id={}: {}", target.task_id(), err);
            }
            (target.task_id().to_string(), result)
        })
        .collect();

    let deadline = tokio::time::sleep(settle_within);
    tokio::pin!(deadline);
    let mut batch = Vec::new();
    loop {
        tokio::select! {
            settled = in_flight.next() => match settled {
                Some(settled) => batch.push(settled),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
    if !batch.is_empty() {
        sink.emit(EngineEvent::StatusesFetched {
            generation,
            results: batch,
        });
    }

    while let Some(settled) = in_flight.next().await {
        desk_debug!("Status of task_id={} settled after the batch", settled.0);
        sink.emit(EngineEvent::StatusesFetched {
            generation,
            results: vec![settled],
        });
    }
}
