use axum::{body::Body, http::Request, middleware, routing::get, Extension, Router};
use tf_telemetry::logging::{self, LogFormat};
use tf_telemetry::tracing_setup::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
use tower::ServiceExt;

#[test]
fn init_logging_is_idempotent() {
    logging::init("telemetry-test", "debug", LogFormat::Human);
    logging::init("telemetry-test", "info", LogFormat::Json);
    tracing::info!(key = "value", "log line after repeated init");
}

fn app() -> Router {
    Router::new()
        .route(
            "/echo",
            get(|Extension(id): Extension<RequestId>| async move { id.0 }),
        )
        .layer(middleware::from_fn(request_id_middleware))
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let response = app()
        .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(id.len(), 32);
}

#[tokio::test]
async fn incoming_request_id_is_echoed_and_visible_to_handlers() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header(REQUEST_ID_HEADER, "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"abc-123");
}
