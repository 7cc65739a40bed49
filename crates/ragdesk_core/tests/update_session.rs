use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use ragdesk_core::{
    update, AppState, ChatReply, ChatRequest, CitedSource, ConversationSummary, Effect, Identity,
    Message, MessageId, Msg, NoticeKind, PrincipalSet, Role,
};

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn history(conversation_id: &str, contents: &[&str]) -> Vec<Message> {
    contents
        .iter()
        .enumerate()
        .map(|(idx, content)| Message {
            id: MessageId::Server(format!("{conversation_id}-m{idx}")),
            role: if idx % 2 == 0 { Role::User } else { Role::Assistant },
            content: content.to_string(),
            created_at: at(0),
            conversation_id: Some(conversation_id.to_string()),
            cited_sources: Vec::new(),
        })
        .collect()
}

fn summary(id: &str, title: Option<&str>) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: title.map(ToOwned::to_owned),
        created_at: at(0),
        updated_at: at(0),
    }
}

fn reply(conversation_id: &str, answer: &str) -> ChatReply {
    ChatReply {
        conversation_id: conversation_id.to_string(),
        message_id: format!("{conversation_id}-reply"),
        answer: answer.to_string(),
        sources: vec![CitedSource {
            id: "chunk-1".to_string(),
            source: "handbook.pdf".to_string(),
            text: "Leave requests go to HR.".to_string(),
            score: Some(0.82),
        }],
        created_at: at(1),
    }
}

fn say(state: AppState, text: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::MessageSubmitted {
            text: text.to_string(),
            sent_at: at(0),
        },
    )
}

fn loaded(state: AppState, conversations: Vec<ConversationSummary>) -> AppState {
    let epoch = state.session().identity_epoch();
    update(
        state,
        Msg::ConversationsLoaded {
            epoch,
            result: Ok(conversations),
        },
    )
    .0
}

fn select(state: AppState, id: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::ConversationSelected {
            conversation_id: id.to_string(),
        },
    )
}

fn history_seq(effects: &[Effect]) -> u64 {
    match effects {
        [Effect::FetchHistory { seq, .. }] => *seq,
        other => panic!("expected a single history fetch, got {other:?}"),
    }
}

fn signed_in() -> AppState {
    let (state, _) = update(
        AppState::new(),
        Msg::AuthChanged(Some(Identity::new("user-1", ["team:support"]))),
    );
    state
}

#[test]
fn submit_sends_optimistic_message_and_request() {
    let state = signed_in();
    let (state, _) = update(state, Msg::InputChanged("  hello  ".to_string()));
    let (state, effects) = say(state, "  hello  ");

    assert_eq!(
        effects,
        vec![Effect::SendChat(ChatRequest {
            query: "hello".to_string(),
            principals: PrincipalSet::new(["team:support"]),
            caller_id: Some("user-1".to_string()),
            conversation_id: None,
        })]
    );
    let view = state.view();
    assert!(view.busy);
    assert_eq!(view.draft, "");
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].role, Role::User);
    assert_eq!(view.messages[0].content, "hello");
    assert!(matches!(view.messages[0].id, MessageId::Local(_)));
    assert_eq!(view.messages[0].created_at, at(0));
}

#[test]
fn anonymous_submit_uses_public_scope() {
    let (_state, effects) = say(AppState::new(), "hi");
    match effects.as_slice() {
        [Effect::SendChat(request)] => {
            assert_eq!(request.principals, PrincipalSet::public());
            assert_eq!(request.caller_id, None);
        }
        other => panic!("unexpected effects {other:?}"),
    }
}

#[test]
fn blank_or_concurrent_submissions_are_rejected() {
    let (state, effects) = say(AppState::new(), "   \n");
    assert!(effects.is_empty());
    assert!(state.view().messages.is_empty());

    let (state, effects) = say(state, "first");
    assert_eq!(effects.len(), 1);
    let (state, effects) = say(state, "second");
    assert!(effects.is_empty());
    assert_eq!(state.view().messages.len(), 1);
}

#[test]
fn successful_reply_appends_answer_and_adopts_conversation() {
    let (state, _) = say(AppState::new(), "hello");
    let (state, effects) = update(state, Msg::ChatReplied(Ok(reply("c-new", "Hi there"))));

    assert_eq!(effects, vec![Effect::RefreshConversations { epoch: 0 }]);
    let view = state.view();
    assert!(!view.busy);
    assert_eq!(view.active_conversation.as_deref(), Some("c-new"));
    assert_eq!(view.messages.len(), 2);
    let answer = &view.messages[1];
    assert_eq!(answer.role, Role::Assistant);
    assert_eq!(answer.content, "Hi there");
    assert_eq!(answer.id, MessageId::Server("c-new-reply".to_string()));
    assert_eq!(answer.cited_sources.len(), 1);

    // Same conversation: no list refresh.
    let (state, _) = say(state, "again");
    let (_state, effects) = update(state, Msg::ChatReplied(Ok(reply("c-new", "Sure"))));
    assert!(effects.is_empty());
}

#[test]
fn failed_send_keeps_optimistic_message() {
    let (state, _) = say(AppState::new(), "hello");
    let (state, effects) = update(
        state,
        Msg::ChatReplied(Err("chat request failed: http status 500".to_string())),
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert!(!view.busy);
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].content, "hello");
    assert!(view.messages.iter().all(|message| message.role == Role::User));
    let notice = view.notice.expect("error surfaced");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.text.contains("500"));
}

#[test]
fn notice_clears_after_its_ttl() {
    let (state, _) = say(AppState::new(), "hello");
    let (state, _) = update(state, Msg::ChatReplied(Err("offline".to_string())));

    let (state, _) = update(state, Msg::Tick { now: at(100) });
    assert!(state.view().notice.is_some());
    let (mut state, _) = update(state, Msg::Tick { now: at(104) });
    assert!(state.view().notice.is_some());
    state.consume_dirty();

    let (mut state, _) = update(state, Msg::Tick { now: at(105) });
    assert!(state.view().notice.is_none());
    assert!(state.consume_dirty());
}

#[test]
fn selecting_same_conversation_twice_fetches_once() {
    let (state, effects) = select(AppState::new(), "A");
    assert_eq!(effects.len(), 1);
    let (state, effects) = select(state, "A");
    assert!(effects.is_empty());

    let seq = state.session().selection_seq();
    let (state, _) = update(
        state,
        Msg::HistoryLoaded {
            seq,
            conversation_id: "A".to_string(),
            result: Ok(history("A", &["q", "a"])),
        },
    );
    let (_state, effects) = select(state, "A");
    assert!(effects.is_empty());
}

#[test]
fn stale_history_never_overwrites_newer_selection() {
    for a_resolves_first in [true, false] {
        let (state, effects) = select(AppState::new(), "A");
        let seq_a = history_seq(&effects);
        let (state, effects) = select(state, "B");
        let seq_b = history_seq(&effects);
        assert!(seq_b > seq_a);

        let loaded_a = Msg::HistoryLoaded {
            seq: seq_a,
            conversation_id: "A".to_string(),
            result: Ok(history("A", &["from A"])),
        };
        let loaded_b = Msg::HistoryLoaded {
            seq: seq_b,
            conversation_id: "B".to_string(),
            result: Ok(history("B", &["from B", "answer B"])),
        };
        let order = if a_resolves_first {
            [loaded_a, loaded_b]
        } else {
            [loaded_b, loaded_a]
        };
        let state = order
            .into_iter()
            .fold(state, |state, msg| update(state, msg).0);

        let view = state.view();
        assert_eq!(view.active_conversation.as_deref(), Some("B"));
        let contents: Vec<_> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["from B", "answer B"]);
    }
}

#[test]
fn failed_history_keeps_previous_log() {
    let (state, effects) = select(AppState::new(), "A");
    let (state, _) = update(
        state,
        Msg::HistoryLoaded {
            seq: history_seq(&effects),
            conversation_id: "A".to_string(),
            result: Ok(history("A", &["kept"])),
        },
    );
    let (state, effects) = select(state, "B");
    let (state, _) = update(
        state,
        Msg::HistoryLoaded {
            seq: history_seq(&effects),
            conversation_id: "B".to_string(),
            result: Err("conversation not found".to_string()),
        },
    );

    let view = state.view();
    assert_eq!(view.active_conversation.as_deref(), Some("A"));
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].content, "kept");
    assert_eq!(view.notice.unwrap().kind, NoticeKind::Error);

    // The failed selection no longer counts as pending.
    let (_state, effects) = select(state, "B");
    assert_eq!(effects.len(), 1);
}

#[test]
fn reply_after_switching_conversation_is_not_shown() {
    let (state, _) = say(AppState::new(), "hello");
    let (state, effects) = select(state, "B");
    let (state, _) = update(
        state,
        Msg::HistoryLoaded {
            seq: history_seq(&effects),
            conversation_id: "B".to_string(),
            result: Ok(history("B", &["b question"])),
        },
    );

    let (state, effects) = update(state, Msg::ChatReplied(Ok(reply("c-old", "late answer"))));
    assert_eq!(effects, vec![Effect::RefreshConversations { epoch: 0 }]);
    let view = state.view();
    assert!(!view.busy);
    assert_eq!(view.active_conversation.as_deref(), Some("B"));
    assert!(view.messages.iter().all(|m| m.content != "late answer"));
}

#[test]
fn new_conversation_requires_identity() {
    let (_state, effects) = update(AppState::new(), Msg::NewConversationClicked);
    assert_eq!(effects, vec![Effect::RequestSignIn]);

    let (_state, effects) = update(signed_in(), Msg::NewConversationClicked);
    assert_eq!(effects, vec![Effect::CreateConversation { epoch: 1 }]);
}

#[test]
fn created_conversation_becomes_active_and_is_deduped() {
    let state = loaded(
        signed_in(),
        vec![summary("c1", Some("Old")), summary("c2", None)],
    );
    let (state, _) = say(state, "hello");

    let epoch = state.session().identity_epoch();
    let (state, _) = update(
        state,
        Msg::ConversationCreated {
            epoch,
            result: Ok(summary("c2", Some("Fresh"))),
        },
    );

    let view = state.view();
    assert_eq!(view.active_conversation.as_deref(), Some("c2"));
    assert!(view.messages.is_empty());
    let ids: Vec<_> = view.conversations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);
    assert_eq!(view.conversations[0].title.as_deref(), Some("Fresh"));
}

#[test]
fn failed_list_refresh_keeps_previous_list() {
    let state = loaded(signed_in(), vec![summary("c1", None)]);
    let epoch = state.session().identity_epoch();
    let (state, _) = update(
        state,
        Msg::ConversationsLoaded {
            epoch,
            result: Err("timeout".to_string()),
        },
    );

    assert_eq!(state.view().conversations.len(), 1);
    assert!(state.view().notice.is_none());
}

#[test]
fn rename_replaces_summary_in_place() {
    let state = loaded(signed_in(), vec![summary("c1", None), summary("c2", None)]);
    let (state, effects) = update(
        state,
        Msg::RenameRequested {
            conversation_id: "c2".to_string(),
            title: " Travel policy ".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::RenameConversation {
            conversation_id: "c2".to_string(),
            title: "Travel policy".to_string(),
        }]
    );

    let (state, _) = update(
        state,
        Msg::ConversationRenamed(Ok(summary("c2", Some("Travel policy")))),
    );
    let view = state.view();
    assert_eq!(view.conversations[1].title.as_deref(), Some("Travel policy"));
    assert_eq!(view.conversations[0].id, "c1");
}

#[test]
fn feedback_is_validated_before_sending() {
    let (state, _) = say(AppState::new(), "hello");
    let (state, _) = update(state, Msg::ChatReplied(Ok(reply("c1", "Hi"))));

    let (state, effects) = update(
        state,
        Msg::FeedbackGiven {
            message_id: "c1-reply".to_string(),
            rating: 9,
            comment: None,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().notice.unwrap().kind, NoticeKind::Error);

    let (state, effects) = update(
        state,
        Msg::FeedbackGiven {
            message_id: "unknown".to_string(),
            rating: 4,
            comment: None,
        },
    );
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::FeedbackGiven {
            message_id: "c1-reply".to_string(),
            rating: 4,
            comment: Some("  helpful ".to_string()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::SendFeedback {
            message_id: "c1-reply".to_string(),
            rating: 4,
            comment: Some("helpful".to_string()),
        }]
    );

    let (state, _) = update(state, Msg::FeedbackRecorded(Ok(())));
    assert_eq!(state.view().notice.unwrap().kind, NoticeKind::Info);
}

#[test]
fn switching_users_clears_session() {
    let state = signed_in();
    let (state, effects) = select(state, "A");
    let (state, _) = update(
        state,
        Msg::HistoryLoaded {
            seq: history_seq(&effects),
            conversation_id: "A".to_string(),
            result: Ok(history("A", &["private"])),
        },
    );

    let (state, effects) = update(
        state,
        Msg::AuthChanged(Some(Identity::new("user-2", Vec::<String>::new()))),
    );
    assert_eq!(effects, vec![Effect::RefreshConversations { epoch: 2 }]);
    let view = state.view();
    assert!(view.signed_in);
    assert_eq!(view.active_conversation, None);
    assert!(view.messages.is_empty());

    let (state, effects) = update(state, Msg::AuthChanged(None));
    assert!(effects.is_empty());
    assert!(!state.view().signed_in);
}

#[test]
fn same_user_with_new_principals_keeps_session() {
    let state = loaded(signed_in(), vec![summary("c1", None)]);
    let (state, effects) = update(
        state,
        Msg::AuthChanged(Some(Identity::new("user-1", ["team:legal"]))),
    );
    assert_eq!(effects, vec![Effect::RefreshConversations { epoch: 1 }]);
    assert_eq!(state.view().conversations.len(), 1);
}

#[test]
fn conversation_list_requested_by_previous_user_is_dropped() {
    let (state, effects) = update(
        AppState::new(),
        Msg::AuthChanged(Some(Identity::new("alice", Vec::<String>::new()))),
    );
    let alice_epoch = match effects.as_slice() {
        [Effect::RefreshConversations { epoch }] => *epoch,
        other => panic!("expected a list refresh, got {other:?}"),
    };
    let (state, _) = update(
        state,
        Msg::AuthChanged(Some(Identity::new("bob", Vec::<String>::new()))),
    );
    assert_ne!(state.session().identity_epoch(), alice_epoch);

    let (mut state, _) = update(
        state,
        Msg::ConversationsLoaded {
            epoch: alice_epoch,
            result: Ok(vec![summary("alice-private", Some("Salary review"))]),
        },
    );
    assert!(state.view().conversations.is_empty());
    state.consume_dirty();

    let state = loaded(state, vec![summary("bob-1", None)]);
    let ids: Vec<_> = state
        .view()
        .conversations
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(ids, vec!["bob-1".to_string()]);
}

#[test]
fn conversation_created_for_previous_user_is_not_adopted() {
    let (state, _) = update(
        AppState::new(),
        Msg::AuthChanged(Some(Identity::new("alice", Vec::<String>::new()))),
    );
    let (state, effects) = update(state, Msg::NewConversationClicked);
    let alice_epoch = match effects.as_slice() {
        [Effect::CreateConversation { epoch }] => *epoch,
        other => panic!("expected a create request, got {other:?}"),
    };
    let (state, _) = update(state, Msg::AuthChanged(None));

    let (state, _) = update(
        state,
        Msg::ConversationCreated {
            epoch: alice_epoch,
            result: Ok(summary("alice-new", None)),
        },
    );
    let view = state.view();
    assert_eq!(view.active_conversation, None);
    assert!(view.conversations.is_empty());

    let (_state, effects) = say(state, "hi");
    match effects.as_slice() {
        [Effect::SendChat(request)] => {
            assert_eq!(request.conversation_id, None);
            assert_eq!(request.caller_id, None);
        }
        other => panic!("unexpected effects {other:?}"),
    }
}
