use crate::{Effect, JobRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
}

/// Start/stop bookkeeping for the status poll loop.
///
/// The loop runs only while at least one job is pending. Every poll result
/// carries the generation it was issued under; teardown bumps the generation
/// so results from before it are dropped instead of reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    phase: PollPhase,
    generation: u64,
}

impl PollState {
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn accepts(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Moves between `Idle` and `Polling` to follow the pending count.
    pub(crate) fn sync(&mut self, pending: usize) -> Option<Effect> {
        match (self.phase, pending) {
            (PollPhase::Idle, n) if n > 0 => {
                self.phase = PollPhase::Polling;
                Some(Effect::StartPolling {
                    generation: self.generation,
                })
            }
            (PollPhase::Polling, 0) => {
                self.phase = PollPhase::Idle;
                Some(Effect::StopPolling)
            }
            _ => None,
        }
    }

    /// One timer tick: a single status fetch per pending job.
    pub(crate) fn tick(&self, generation: u64, registry: &JobRegistry) -> Option<Effect> {
        if self.phase != PollPhase::Polling || !self.accepts(generation) {
            return None;
        }
        let targets = registry.pending_targets();
        if targets.is_empty() {
            return None;
        }
        Some(Effect::PollJobs {
            generation,
            targets,
        })
    }

    pub(crate) fn teardown(&mut self) -> Option<Effect> {
        self.generation += 1;
        let was_polling = self.phase == PollPhase::Polling;
        self.phase = PollPhase::Idle;
        was_polling.then_some(Effect::StopPolling)
    }
}
