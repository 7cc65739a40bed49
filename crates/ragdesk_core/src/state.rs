use crate::ack::acknowledge;
use crate::poller::PollState;
use crate::session::NoticeKind;
use crate::view_model::{AppViewModel, JobRowView};
use crate::{Effect, JobId, JobRegistry, JobUpdate, SessionState, TrackedJob};

/// Everything the coordination layer owns. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    jobs: JobRegistry,
    polling: PollState,
    session: SessionState,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            jobs: self.jobs.snapshot().iter().map(JobRowView::from).collect(),
            pending_jobs: self.jobs.pending_count(),
            poll_phase: self.polling.phase(),
            signed_in: self.session.identity().is_some(),
            active_conversation: self.session.active_id().map(ToOwned::to_owned),
            messages: self.session.messages().to_vec(),
            conversations: self.session.conversations().to_vec(),
            draft: self.session.draft().to_string(),
            busy: self.session.is_busy(),
            notice: self.session.notice().cloned(),
            dirty: self.dirty,
        }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn polling(&self) -> &PollState {
        &self.polling
    }

    /// Jobs worth keeping across restarts, newest first.
    pub fn jobs_snapshot(&self) -> Vec<TrackedJob> {
        self.jobs.snapshot()
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub(crate) fn register_job(&mut self, job: TrackedJob) -> Vec<Effect> {
        self.jobs.register(job);
        self.after_jobs_changed()
    }

    pub(crate) fn restore_jobs(&mut self, jobs: Vec<TrackedJob>) -> Vec<Effect> {
        if jobs.is_empty() {
            return Vec::new();
        }
        // Registering oldest first leaves the newest at the front.
        for job in jobs.into_iter().rev() {
            self.jobs.register(job);
        }
        self.after_jobs_changed()
    }

    pub(crate) fn poll_tick(&self, generation: u64) -> Vec<Effect> {
        self.polling
            .tick(generation, &self.jobs)
            .into_iter()
            .collect()
    }

    pub(crate) fn apply_job_statuses(
        &mut self,
        generation: u64,
        results: Vec<(JobId, Result<JobUpdate, String>)>,
    ) -> Vec<Effect> {
        if !self.polling.accepts(generation) {
            return Vec::new();
        }
        let mut changed = false;
        for (job_id, result) in results {
            // A failed fetch fails only its own job.
            let update = result.unwrap_or_else(JobUpdate::failed);
            changed |= self.jobs.reconcile(&job_id, update);
        }
        if !changed {
            return Vec::new();
        }
        self.after_jobs_changed()
    }

    pub(crate) fn dismiss_job(&mut self, job_id: &str) -> Vec<Effect> {
        if !self.jobs.dismiss(job_id) {
            return Vec::new();
        }
        self.after_jobs_changed()
    }

    pub(crate) fn teardown(&mut self) -> Vec<Effect> {
        self.polling.teardown().into_iter().collect()
    }

    pub(crate) fn upload_failed(&mut self, label: &str, message: &str) {
        self.session
            .raise(NoticeKind::Error, format!("Upload of \"{label}\" failed: {message}"));
        self.mark_dirty();
    }

    pub(crate) fn sync_failed(&mut self, integration_id: &str, message: &str) {
        self.session.raise(
            NoticeKind::Error,
            format!("Sync of integration {integration_id} failed: {message}"),
        );
        self.mark_dirty();
    }

    /// Runs after every registry mutation: acknowledge newly terminal jobs,
    /// then let the poll loop follow the pending count.
    fn after_jobs_changed(&mut self) -> Vec<Effect> {
        self.mark_dirty();
        let mut effects = Vec::new();
        if let Some(notification) = acknowledge(&mut self.jobs) {
            effects.push(Effect::Notify(notification));
        }
        if let Some(effect) = self.polling.sync(self.jobs.pending_count()) {
            effects.push(effect);
        }
        effects
    }
}
