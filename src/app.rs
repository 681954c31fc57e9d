use axum::{routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state);
    apply_middleware(api)
}

// CatchPanicLayer sits innermost so a panicking handler still produces a
// 500 that TraceLayer gets to log.
fn apply_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: &str) -> anyhow::Result<()> {
    serve_with_shutdown(app, addr, shutdown_signal()).await
}

pub async fn serve_with_shutdown(
    app: Router,
    addr: &str,
    signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM; in-flight requests drain before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::store::memory::MemoryStore;

    fn test_app() -> Router {
        build_app(AppState::fake(Arc::new(MemoryStore::default())))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        async fn boom() {
            panic!("boom")
        }
        let app = apply_middleware(Router::new().route("/boom", get(boom)));
        let (status, _) = send(&app, "GET", "/boom", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn serve_drains_on_shutdown_signal() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(serve_with_shutdown(test_app(), "127.0.0.1:0", async {
            rx.await.ok();
        }));

        // give the listener a moment to bind before signalling
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(()).expect("server task alive");

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("server should stop after the signal")
            .expect("serve task");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_login_me_scenario() {
        let app = test_app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            Some(json!({"email": "u@x.com", "password": "password1"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "u@x.com");
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": "u@x.com", "password": "password1"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["token"]["access_token"].as_str().unwrap().to_string();
        assert!(!access.is_empty());
        assert!(!body["token"]["refresh_token"].as_str().unwrap().is_empty());

        let (status, body) = send(&app, "GET", "/api/v1/auth/me", None, Some(&access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "u@x.com");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": "u@x.com", "password": "wrongpass"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_register_is_bad_request() {
        let app = test_app();
        let payload = json!({"email": "u@x.com", "password": "password1"});
        let (status, _) = send(&app, "POST", "/api/v1/auth/register", Some(payload.clone()), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/v1/auth/register", Some(payload), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_rotates_and_validates_input() {
        let app = test_app();
        send(
            &app,
            "POST",
            "/api/v1/auth/register",
            Some(json!({"email": "u@x.com", "password": "password1"})),
            None,
        )
        .await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({"email": "u@x.com", "password": "password1"})),
            None,
        )
        .await;
        let refresh = body["token"]["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": refresh})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["token"]["access_token"].as_str().unwrap().is_empty());

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": ""})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": "not.a.jwt"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_well_formed_bearer_token() {
        let app = test_app();

        let (status, _) = send(&app, "GET", "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("GET")
            .uri("/api/v1/auth/me")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/v1/auth/me", None, Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
