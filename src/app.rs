use std::net::SocketAddr;

use axum::{extract::Request, routing::get, Router, ServiceExt};
use tower_http::{cors::CorsLayer, normalize_path::NormalizePath, trace::TraceLayer};

use crate::{error::DiaryError, meals, state::AppState};

/// Router wrapped so `/food-diary/` and `/food-diary` reach the same routes.
pub type App = NormalizePath<Router>;

pub fn build_app(state: AppState) -> App {
    let router = Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/food-diary", meals::router())
                .route("/health", get(|| async { "ok" })),
        )
        .fallback(unknown_route)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        );
    NormalizePath::trim_trailing_slash(router)
}

async fn unknown_route(req: Request) -> DiaryError {
    DiaryError::NotFound(format!("No route for {} {}", req.method(), req.uri().path()))
}

pub async fn serve(app: App, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http};
    use http_body_util::BodyExt;
    use tower::ServiceExt as _;

    #[tokio::test]
    async fn health_answers_ok() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(http::Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(res.status().is_success());
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn unknown_paths_get_the_error_envelope() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(http::Request::get("/api/v1/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), axum::http::StatusCode::NOT_FOUND);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not found");
    }
}
