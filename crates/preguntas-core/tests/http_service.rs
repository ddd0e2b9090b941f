//! Drives the real HTTP client and orchestrator against an in-process fake
//! answer service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use preguntas_core::error::GENERIC_FAILURE;
use preguntas_core::{
    AnswerService, ConversationStore, FileStorage, HttpAnswerClient, QueryOrchestrator,
    QueryState, ServiceError, Settled,
};
use serde_json::{json, Value};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

async fn answer(State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let query = body["query"].as_str().unwrap_or_default().to_string();
    let response = if query == "What is 2+2?" {
        "4".to_string()
    } else {
        format!("You asked: {}", query)
    };
    Json(json!({
        "query": query,
        "response": response,
        "timestamp": "2024-03-01T09:30:00.000000",
    }))
}

async fn healthy() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": "2024-03-01T09:30:00" }))
}

fn answering_service(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route("/api/qa/query", post(answer))
        .route("/api/health", get(healthy))
        .with_state(hits)
}

#[tokio::test]
async fn test_ask_returns_response_text() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(answering_service(hits.clone())).await;
    let client = HttpAnswerClient::new(&url);

    let answer = client.ask("What is 2+2?").await.unwrap();

    assert_eq!(answer, "4");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_returns_payload() {
    let url = serve(answering_service(Arc::new(AtomicUsize::new(0)))).await;
    let client = HttpAnswerClient::new(&url);

    let status = client.health().await.unwrap();

    assert_eq!(status["status"], "healthy");
}

#[tokio::test]
async fn test_error_detail_is_surfaced() {
    let router = Router::new().route(
        "/api/qa/query",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "overloaded" })),
            )
        }),
    );
    let url = serve(router).await;
    let client = HttpAnswerClient::new(&url);

    let err = client.ask("anything").await.unwrap_err();

    match &err {
        ServiceError::Status { status, detail } => {
            assert_eq!(*status, 500);
            assert_eq!(detail.as_deref(), Some("overloaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message(), "overloaded");
}

#[tokio::test]
async fn test_error_without_json_body_falls_back() {
    let router = Router::new().route(
        "/api/qa/query",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream went away") }),
    );
    let url = serve(router).await;
    let client = HttpAnswerClient::new(&url);

    let err = client.ask("anything").await.unwrap_err();

    assert!(matches!(err, ServiceError::Status { status: 502, detail: None }));
    assert_eq!(err.user_message(), GENERIC_FAILURE);
}

#[tokio::test]
async fn test_validation_detail_list_is_surfaced() {
    let router = Router::new().route(
        "/api/qa/query",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": [{ "msg": "field required" }] })),
            )
        }),
    );
    let url = serve(router).await;
    let client = HttpAnswerClient::new(&url);

    let err = client.ask("anything").await.unwrap_err();

    assert!(matches!(err, ServiceError::Status { status: 422, .. }));
    assert_eq!(err.user_message(), r#"[{"msg":"field required"}]"#);
}

#[tokio::test]
async fn test_success_without_response_field_is_malformed() {
    let router = Router::new().route(
        "/api/qa/query",
        post(|| async { Json(json!({ "answer": "wrong field" })) }),
    );
    let url = serve(router).await;
    let client = HttpAnswerClient::new(&url);

    let err = client.ask("anything").await.unwrap_err();

    assert!(matches!(err, ServiceError::MalformedPayload(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = HttpAnswerClient::new(&format!("http://{}/api", addr));

    let err = client.ask("anything").await.unwrap_err();

    assert!(matches!(err, ServiceError::Transport(_)));
    assert_eq!(err.user_message(), GENERIC_FAILURE);
}

#[tokio::test]
async fn test_conversation_survives_restart() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(answering_service(hits.clone())).await;
    let dir = tempfile::tempdir().unwrap();

    {
        let store = ConversationStore::open(FileStorage::new(dir.path()));
        let mut orch = QueryOrchestrator::new(store, Arc::new(HttpAnswerClient::new(&url)));
        orch.submit("What is 2+2?").await.unwrap();
        orch.submit("And 3+3?").await.unwrap();
        assert_eq!(orch.state(), &QueryState::Idle);
    }

    let store = ConversationStore::open(FileStorage::new(dir.path()));
    let exchanges = store.exchanges();
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges[0].query, "What is 2+2?");
    assert_eq!(exchanges[0].response, "4");
    assert_eq!(exchanges[1].response, "You asked: And 3+3?");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_query_leaves_history_on_disk_untouched() {
    let router = Router::new().route(
        "/api/qa/query",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "overloaded" })),
            )
        }),
    );
    let url = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let path = FileStorage::new(dir.path()).path_for(preguntas_core::CONVERSATIONS_KEY);

    let store = ConversationStore::open(FileStorage::new(dir.path()));
    let mut orch = QueryOrchestrator::new(store, Arc::new(HttpAnswerClient::new(&url)));
    let settled = orch.submit("What is 2+2?").await.unwrap();

    assert!(matches!(settled, Settled::Failed(ref m) if m == "overloaded"));
    assert_eq!(orch.state().error(), Some("overloaded"));
    assert!(orch.exchanges().is_empty());
    assert!(!path.exists());
}
