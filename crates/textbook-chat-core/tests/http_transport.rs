//! `RagClient` against a local axum backend serving canned replies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use textbook_chat_core::{
    Confidence, ModeSelector, Persona, PointerEvents, QueryDispatcher, QueryError, QueryRequest,
    QueryScope, RagClient,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Scripted reply for every route. `None` accepts the request and never
/// answers.
type Reply = Option<(StatusCode, &'static str)>;

#[derive(Clone)]
struct Backend {
    reply: Reply,
    hits: Arc<AtomicUsize>,
    bodies: mpsc::UnboundedSender<serde_json::Value>,
}

impl Backend {
    async fn respond(&self) -> Response {
        self.hits.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some((status, body)) => {
                (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        }
    }
}

async fn query_handler(
    State(backend): State<Backend>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let _ = backend.bodies.send(body);
    backend.respond().await
}

async fn health_handler(State(backend): State<Backend>) -> Response {
    backend.respond().await
}

struct CannedServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    bodies: mpsc::UnboundedReceiver<serde_json::Value>,
}

async fn serve(reply: Reply) -> CannedServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let (tx, bodies) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .with_state(Backend {
            reply,
            hits: hits.clone(),
            bodies: tx,
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    CannedServer {
        base_url,
        hits,
        bodies,
    }
}

fn ros2_request() -> QueryRequest {
    QueryRequest::new("What is ROS 2?", &QueryScope::global(), Persona::Beginner)
}

const ROS2_REPLY: &str = r#"{
    "answer": "ROS 2 is...",
    "sources": [{
        "chapter_title": "Chapter 1: Introduction to ROS 2",
        "section_title": "What is ROS 2?",
        "module": "module-1-ros2",
        "url": "/module-1-ros2/chapter-1#what-is-ros2",
        "relevance_score": 0.92
    }],
    "confidence": "high",
    "mode_used": "global",
    "chunks_retrieved": 4
}"#;

#[tokio::test]
async fn test_successful_query() {
    let mut server = serve(Some((StatusCode::OK, ROS2_REPLY))).await;
    let client = RagClient::new(&format!("{}/", server.base_url));

    let response = client.query(&ros2_request()).await.unwrap();

    assert_eq!(response.answer, "ROS 2 is...");
    assert_eq!(response.confidence, Confidence::High);
    assert_eq!(response.chunks_retrieved, 4);
    assert_eq!(response.sources[0].relevance_percent(), 92);

    assert_eq!(
        server.bodies.recv().await.unwrap(),
        serde_json::json!({"question": "What is ROS 2?", "mode": "global", "persona": "beginner"})
    );
}

#[tokio::test]
async fn test_selected_text_goes_on_the_wire() {
    let mut server = serve(Some((StatusCode::OK, ROS2_REPLY))).await;
    let client = RagClient::new(&server.base_url);
    let events = PointerEvents::new();
    let selector = ModeSelector::attach(&events);
    events.pointer_released("A digital twin mirrors the physical robot.");

    let request = QueryRequest::new("Summarize", &selector.current(), Persona::None);
    client.query(&request).await.unwrap();

    let body = server.bodies.recv().await.unwrap();
    assert_eq!(body["mode"], "selected");
    assert_eq!(body["selected_text"], "A digital twin mirrors the physical robot.");
    assert!(body.get("persona").is_none());
}

#[tokio::test]
async fn test_bad_request_detail() {
    let detail = r#"{"detail": "Question must not be empty"}"#;
    let server = serve(Some((StatusCode::BAD_REQUEST, detail))).await;
    let client = RagClient::new(&server.base_url);

    let err = client.query(&ros2_request()).await.unwrap_err();
    assert_eq!(err, QueryError::BadRequest("Question must not be empty".to_string()));
}

#[tokio::test]
async fn test_bad_request_with_html_body() {
    let server = serve(Some((StatusCode::BAD_REQUEST, "<h1>Bad Request</h1>"))).await;
    let client = RagClient::new(&server.base_url);

    let err = client.query(&ros2_request()).await.unwrap_err();
    assert_eq!(err.to_string(), "Bad request: Invalid query format");
}

#[tokio::test]
async fn test_server_error() {
    let detail = r#"{"detail": "qdrant unreachable"}"#;
    let server = serve(Some((StatusCode::INTERNAL_SERVER_ERROR, detail))).await;
    let client = RagClient::new(&server.base_url);

    assert_eq!(client.query(&ros2_request()).await, Err(QueryError::ServerError));
}

#[tokio::test]
async fn test_other_status() {
    let server = serve(Some((StatusCode::NOT_FOUND, r#"{"detail": "Not Found"}"#))).await;
    let client = RagClient::new(&server.base_url);

    assert_eq!(client.query(&ros2_request()).await, Err(QueryError::HttpError(404)));
}

#[tokio::test]
async fn test_malformed_success_body() {
    let server = serve(Some((StatusCode::OK, "{\"answer\": \"trunc"))).await;
    let client = RagClient::new(&server.base_url);

    assert_eq!(client.query(&ros2_request()).await, Err(QueryError::ParseError));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = RagClient::new(&base_url);

    assert_eq!(client.query(&ros2_request()).await, Err(QueryError::ConnectionFailed));
}

#[tokio::test]
async fn test_dispatcher_retries_bad_gateway_once() {
    let server = serve(Some((StatusCode::BAD_GATEWAY, ""))).await;
    let dispatcher = QueryDispatcher::new(Arc::new(RagClient::new(&server.base_url)))
        .with_timing(Duration::from_secs(5), Duration::from_millis(20));

    let err = dispatcher.dispatch(&ros2_request()).await.unwrap_err();

    assert_eq!(err, QueryError::HttpError(502));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dispatcher_times_out_silent_backend() {
    let server = serve(None).await;
    let dispatcher = QueryDispatcher::new(Arc::new(RagClient::new(&server.base_url)))
        .with_timing(Duration::from_millis(200), Duration::from_millis(20));

    let err = dispatcher.dispatch(&ros2_request()).await.unwrap_err();

    assert_eq!(err, QueryError::Timeout);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert!(!dispatcher.is_in_flight());
}

#[tokio::test]
async fn test_dispatcher_does_not_retry_bad_request() {
    let server = serve(Some((StatusCode::BAD_REQUEST, "{}"))).await;
    let dispatcher = QueryDispatcher::new(Arc::new(RagClient::new(&server.base_url)));

    let err = dispatcher.dispatch(&ros2_request()).await.unwrap_err();

    assert!(matches!(err, QueryError::BadRequest(_)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_check() {
    let server = serve(Some((StatusCode::OK, r#"{"status": "healthy"}"#))).await;
    RagClient::new(&server.base_url).health().await.unwrap();

    let down = serve(Some((StatusCode::SERVICE_UNAVAILABLE, ""))).await;
    assert!(RagClient::new(&down.base_url).health().await.is_err());
}
