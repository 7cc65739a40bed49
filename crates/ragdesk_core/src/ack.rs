use crate::{JobId, JobRegistry, JobState, TrackedJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// User-visible message produced when a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub job_id: JobId,
    pub message: String,
}

/// Consumes every terminal, unacknowledged job in one batch.
///
/// Only the most recently created job of the batch is reported; the rest are
/// acknowledged silently. Returns `None` when there is nothing to report.
pub fn acknowledge(registry: &mut JobRegistry) -> Option<Notification> {
    let mut batch: Vec<JobId> = Vec::new();
    let mut reported: Option<&TrackedJob> = None;
    for job in registry.iter() {
        if !job.state.is_terminal() || job.acknowledged {
            continue;
        }
        batch.push(job.id.clone());
        // Strictly newer wins, so ties keep the entry nearest the front.
        match reported {
            Some(current) if current.created_at >= job.created_at => {}
            _ => reported = Some(job),
        }
    }

    let notification = reported.map(|job| match job.state {
        JobState::Succeeded => Notification {
            kind: NotificationKind::Success,
            job_id: job.id.clone(),
            message: format!("\"{}\" finished processing.", job.label),
        },
        _ => Notification {
            kind: NotificationKind::Error,
            job_id: job.id.clone(),
            message: job
                .detail
                .clone()
                .unwrap_or_else(|| format!("Processing failed for \"{}\".", job.label)),
        },
    })?;

    registry.mark_acknowledged(&batch);
    Some(notification)
}
