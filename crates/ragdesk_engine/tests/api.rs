use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use ragdesk_engine::{
    parse_base_url, upload, BackendApi, ChatQuery, ClientSettings, FailureKind, FeedbackRequest,
    ReqwestBackend, UploadOutcome, UploadRequest,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer, token: Option<&str>) -> ReqwestBackend {
    let base_url = parse_base_url(&format!("{}/v1", server.uri())).unwrap();
    let mut settings = ClientSettings::new(base_url);
    settings.access_token = token.map(ToOwned::to_owned);
    ReqwestBackend::new(&settings).unwrap()
}

#[tokio::test]
async fn chat_posts_query_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "query": "What is RAG?",
            "principals": ["public"],
            "conversation_id": "c1",
            "top_k": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Retrieval augmented generation.",
            "sources": [
                {"id": "d1_0", "text": "RAG combines...", "source": "intro.pdf", "score": 0.91,
                 "metadata": {"page": 2}}
            ],
            "conversation_id": "c1",
            "message_id": "m9",
            "created_at": "2024-05-01T12:00:00.123456"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("secret"));
    let answer = backend
        .chat(&ChatQuery {
            query: "What is RAG?".to_string(),
            principals: vec!["public".to_string()],
            caller_id: None,
            conversation_id: Some("c1".to_string()),
            top_k: 5,
        })
        .await
        .expect("chat ok");

    assert_eq!(answer.message_id, "m9");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source, "intro.pdf");
    assert_eq!(answer.sources[0].score, Some(0.91));
}

#[tokio::test]
async fn error_detail_becomes_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/conversations/nope/messages"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Conversation not found"})),
        )
        .mount(&server)
        .await;

    let err = backend_for(&server, None)
        .conversation_messages("nope")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert_eq!(err.message, "Conversation not found");
}

#[tokio::test]
async fn plain_error_body_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/conversations"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = backend_for(&server, None)
        .list_conversations()
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(502));
    assert_eq!(err.message, "bad gateway");
}

#[tokio::test]
async fn malformed_body_is_a_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/documents/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend_for(&server, None)
        .document_status("t1")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn status_report_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/documents/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1",
            "state": "STARTED",
            "stage": "embedding",
            "document_id": "doc-1"
        })))
        .mount(&server)
        .await;

    let report = backend_for(&server, None).document_status("t1").await.unwrap();
    assert_eq!(report.state, "STARTED");
    assert_eq!(report.stage.as_deref(), Some("embedding"));
    assert_eq!(report.document_id.as_deref(), Some("doc-1"));
}

#[tokio::test]
async fn conversations_round_trip_through_endpoints() {
    let server = MockServer::start().await;
    let conversation = json!({
        "id": "c1",
        "title": null,
        "created_at": "2024-05-01T12:00:00",
        "updated_at": "2024-05-01T12:00:00"
    });
    Mock::given(method("POST"))
        .and(path("/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conversation.clone()))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/conversations/c1"))
        .and(body_partial_json(json!({"title": "Budget"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "title": "Budget",
            "created_at": "2024-05-01T12:00:00",
            "updated_at": "2024-05-01T12:05:00"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/conversations/c1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "role": "user", "content": "hi", "created_at": "2024-05-01T12:01:00"},
            {"id": "m2", "role": "assistant", "content": "hello",
             "created_at": "2024-05-01T12:01:02"}
        ])))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let created = backend.create_conversation().await.unwrap();
    assert_eq!(created.id, "c1");
    assert_eq!(created.title, None);

    let renamed = backend.rename_conversation("c1", "Budget").await.unwrap();
    assert_eq!(renamed.title.as_deref(), Some("Budget"));
    assert!(renamed.updated_at > renamed.created_at);

    let messages = backend.conversation_messages("c1").await.unwrap();
    let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}

#[tokio::test]
async fn integration_sync_is_queued_and_listed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/integrations/int-7/sync"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "id": "run-2",
            "status": "queued",
            "message": null,
            "task_id": "t-sync",
            "created_at": "2024-05-01T12:00:00",
            "updated_at": "2024-05-01T12:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/integrations/int-7/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "run-2", "status": "failure", "message": "token expired", "task_id": "t-sync",
             "created_at": "2024-05-01T12:00:00", "updated_at": "2024-05-01T12:00:09"},
            {"id": "run-1", "status": "success", "message": "Sync completed", "task_id": null,
             "created_at": "2024-04-30T12:00:00", "updated_at": "2024-04-30T12:01:00"}
        ])))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("secret"));
    let run = backend.start_integration_sync("int-7").await.unwrap();
    assert_eq!(run.status, "queued");
    assert_eq!(run.task_id.as_deref(), Some("t-sync"));

    let runs = backend.integration_sync_runs("int-7").await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].message.as_deref(), Some("token expired"));
    assert_eq!(runs[1].task_id, None);
}

#[tokio::test]
async fn unsupported_sync_reports_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/integrations/int-9/sync"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": "Sync not supported for this integration type"
        })))
        .mount(&server)
        .await;

    let err = backend_for(&server, None)
        .start_integration_sync("int-9")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(400));
    assert_eq!(err.message, "Sync not supported for this integration type");
}

#[tokio::test]
async fn current_user_is_read_with_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/auth/me"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-42",
            "email": "ada@example.com",
            "display_name": "Ada",
            "created_at": "2024-01-01T00:00:00"
        })))
        .mount(&server)
        .await;

    let profile = backend_for(&server, Some("secret"))
        .current_user()
        .await
        .unwrap();
    assert_eq!(profile.id, "user-42");
    assert_eq!(profile.display_name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn feedback_is_submitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/feedback"))
        .and(body_partial_json(json!({"message_id": "m2", "rating": 4})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "feedback_id": "f1",
            "message_id": "m2",
            "status": "recorded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = backend_for(&server, None)
        .submit_feedback(&FeedbackRequest {
            message_id: "m2".to_string(),
            rating: 4,
            comment: None,
        })
        .await
        .unwrap();
    assert_eq!(receipt.feedback_id, "f1");
}

#[tokio::test]
async fn upload_sends_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/documents/upload"))
        .and(body_string_contains("filename=\"notes.txt\""))
        .and(body_string_contains("[\"group:eng\"]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document_id": "doc-7",
            "task_id": "t7",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let mut request = UploadRequest::new("notes.txt", b"some notes".to_vec())
        .with_principals(vec!["group:eng".to_string()]);
    request.metadata = BTreeMap::from([("team".to_string(), "eng".to_string())]);

    match upload(&backend, &request).await {
        UploadOutcome::Uploaded(receipt) => {
            assert_eq!(receipt.task_id, "t7");
            assert_eq!(receipt.document_id, "doc-7");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn empty_upload_is_rejected_locally() {
    let server = MockServer::start().await;
    let backend = backend_for(&server, None);

    let outcome = upload(&backend, &UploadRequest::new("empty.txt", Vec::new())).await;
    assert!(matches!(outcome, UploadOutcome::Failed { .. }));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn rejected_upload_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/documents/upload"))
        .respond_with(
            ResponseTemplate::new(413).set_body_json(json!({"detail": "File too large"})),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let outcome = upload(&backend, &UploadRequest::new("big.pdf", vec![1u8; 16])).await;
    match outcome {
        UploadOutcome::Failed { message } => assert!(message.contains("File too large")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
