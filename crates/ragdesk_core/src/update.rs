use crate::{AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::JobSubmitted(job) => state.register_job(job),
        Msg::UploadFailed { label, message } => {
            state.upload_failed(&label, &message);
            Vec::new()
        }
        Msg::SyncFailed {
            integration_id,
            message,
        } => {
            state.sync_failed(&integration_id, &message);
            Vec::new()
        }
        Msg::RestoreJobs(jobs) => state.restore_jobs(jobs),
        Msg::PollTick { generation } => state.poll_tick(generation),
        Msg::JobStatusesFetched {
            generation,
            results,
        } => state.apply_job_statuses(generation, results),
        Msg::JobDismissed { job_id } => state.dismiss_job(&job_id),
        Msg::Teardown => state.teardown(),
        Msg::InputChanged(text) => {
            if state.session_mut().set_draft(text) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::MessageSubmitted { text, sent_at } => {
            let effects = state.session_mut().submit_message(&text, sent_at);
            if !effects.is_empty() {
                state.mark_dirty();
            }
            effects
        }
        Msg::ConversationSelected { conversation_id } => {
            state.session_mut().select_conversation(conversation_id)
        }
        Msg::HistoryLoaded {
            seq,
            conversation_id,
            result,
        } => {
            if state
                .session_mut()
                .history_loaded(seq, conversation_id, result)
            {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ChatReplied(result) => {
            state.mark_dirty();
            state.session_mut().chat_replied(result)
        }
        Msg::NewConversationClicked => state.session().new_conversation(),
        Msg::ConversationCreated { epoch, result } => {
            if state.session_mut().conversation_created(epoch, result) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ConversationsLoaded { epoch, result } => {
            if state.session_mut().conversations_loaded(epoch, result) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::RenameRequested {
            conversation_id,
            title,
        } => {
            state.mark_dirty();
            state
                .session_mut()
                .rename_conversation(conversation_id, title)
        }
        Msg::ConversationRenamed(result) => {
            state.session_mut().conversation_renamed(result);
            state.mark_dirty();
            Vec::new()
        }
        Msg::FeedbackGiven {
            message_id,
            rating,
            comment,
        } => {
            state.mark_dirty();
            state
                .session_mut()
                .give_feedback(message_id, rating, comment)
        }
        Msg::FeedbackRecorded(result) => {
            state.session_mut().feedback_recorded(result);
            state.mark_dirty();
            Vec::new()
        }
        Msg::AuthChanged(identity) => {
            state.mark_dirty();
            state.session_mut().auth_changed(identity)
        }
        Msg::Tick { now } => {
            if state.session_mut().expire_notice(now) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
