use crate::{JobState, Stage};

/// Progress shown for a non-terminal job that has not reported a stage yet.
pub const PROGRESS_FLOOR: f32 = 0.1;

/// Maps a job's reported stage to a progress fraction in `[0, 1]`.
///
/// Terminal states always report `1.0`. Fractions are non-decreasing along
/// [`Stage`] order and never drop below [`PROGRESS_FLOOR`] so a freshly
/// registered job shows visible progress.
pub fn estimate(stage: Option<Stage>, state: JobState) -> f32 {
    if state.is_terminal() {
        return 1.0;
    }
    match stage {
        Some(Stage::Uploading) => 0.15,
        Some(Stage::Chunking) => 0.35,
        Some(Stage::Embedding) => 0.65,
        Some(Stage::Indexing) => 0.85,
        Some(Stage::Finalizing) => 0.95,
        Some(Stage::Completed) => 1.0,
        None => PROGRESS_FLOOR,
    }
}
