//! HTTP surface served by `trawl serve`.
//!
//! Every resource route answers with the `{data}` / paginated / `{error}`
//! envelope the cache fetcher decodes.

pub mod auth;
pub mod handlers;
pub mod response;

use crate::api::response::ApiError;
use crate::metrics::SharedMetrics;
use crate::services::{SessionProvider, Store};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::debug;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sessions: Arc<dyn SessionProvider>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(store: Store, sessions: Arc<dyn SessionProvider>, metrics: SharedMetrics) -> Self {
        Self {
            store,
            sessions,
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api/runs", get(handlers::list_runs).post(handlers::create_run))
        .route(
            "/api/runs/{id}",
            get(handlers::get_run).delete(handlers::delete_run),
        )
        .route(
            "/api/feedback",
            get(handlers::list_feedback).post(handlers::submit_feedback),
        )
        .route(
            "/api/account/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route(
            "/api/account/notifications",
            get(handlers::get_notifications).put(handlers::update_notifications),
        )
        .route(
            "/api/account/appearance",
            get(handlers::get_appearance).put(handlers::update_appearance),
        )
        .route(
            "/api/account/ai-settings",
            get(handlers::get_ai_settings).put(handlers::update_ai_settings),
        )
        .route("/api/account/data", delete(handlers::delete_account_data))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(handlers::health_handler))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ))
        .with_state(state);

    catch_panics(routes)
}

/// Answer a panicking handler with a 500 `{error}` body instead of dropping
/// the connection.
pub fn catch_panics(router: Router) -> Router {
    router.layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    ApiError::Internal(detail).into_response()
}

async fn track_requests(
    State(metrics): State<SharedMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    metrics.record_api_request(&route, status, elapsed.as_secs_f64());
    debug!(
        method = %method,
        route = %route,
        status = status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request handled"
    );

    response
}


#[cfg(test)]
mod tests {
    use super::testing::{spawn_server, ALICE, BOB};
    use super::*;
    use crate::cache::{CacheController, CacheKey, ControllerConfig, ListFilter, ResourceKind};
    use crate::client::ApiClient;
    use crate::error::TrawlError;
    use crate::metrics::create_metrics;
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    fn client(base_url: &str, token: Option<&str>) -> ApiClient {
        ApiClient::new(base_url, token.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    fn controller(api: ApiClient) -> CacheController {
        CacheController::new(
            Arc::new(api),
            ControllerConfig::default(),
            create_metrics().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthenticated() {
        let base = spawn_server(Store::new()).await;
        let cache = controller(client(&base, None));

        let result = cache.get(CacheKey::collection(ResourceKind::Runs)).await;
        assert_eq!(result, Err(TrawlError::Unauthenticated("Unauthorized".into())));

        let view = cache
            .read(&CacheKey::collection(ResourceKind::Runs))
            .await
            .unwrap();
        assert!(view.value.is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_runs_are_not_found() {
        let store = Store::with_demo_data(&["alice".to_string()]);
        let base = spawn_server(store.clone()).await;
        let alice_run = store
            .list_runs("alice", &Default::default())
            .runs
            .remove(0);

        let alice = controller(client(&base, Some(ALICE)));
        let bob = controller(client(&base, Some(BOB)));
        let not_found = Err(TrawlError::NotFound("Run not found".into()));

        let key = CacheKey::detail(ResourceKind::Runs, &alice_run.id);
        assert_eq!(alice.get(key.clone()).await.unwrap()["id"], json!(alice_run.id));
        assert_eq!(bob.get(key).await, not_found);

        let missing = CacheKey::detail(ResourceKind::Runs, "0123456789abcdef");
        assert_eq!(alice.get(missing).await, not_found);

        let malformed = CacheKey::detail(ResourceKind::Runs, "../profile");
        assert_eq!(alice.get(malformed).await, not_found);
    }

    #[tokio::test]
    async fn test_paginated_list_unwraps_to_items() {
        let base = spawn_server(Store::with_demo_data(&["alice".to_string()])).await;
        let cache = controller(client(&base, Some(ALICE)));

        let all = cache.get(CacheKey::collection(ResourceKind::Runs)).await.unwrap();
        assert_eq!(all.as_array().map(Vec::len), Some(4));

        let failed = cache
            .get(CacheKey::filtered(
                ResourceKind::Runs,
                &ListFilter::new().status("failed"),
            ))
            .await
            .unwrap();
        assert_eq!(failed.as_array().map(Vec::len), Some(1));
        assert_eq!(failed[0]["status"], json!("failed"));

        let paged = cache
            .get(CacheKey::filtered(
                ResourceKind::Runs,
                &ListFilter::new().page(2).per_page(3),
            ))
            .await
            .unwrap();
        assert_eq!(paged.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let base = spawn_server(Store::new()).await;
        let api = client(&base, Some(ALICE));

        let result = api
            .send(
                Method::POST,
                "/api/runs",
                Some(&json!({"name": "prices", "target_url": "ftp://example.com"})),
            )
            .await;
        assert_eq!(
            result,
            Err(TrawlError::Transport {
                status: Some(400),
                message: "Target URL must start with http:// or https://".into()
            })
        );

        let bad_status = api.get("/api/runs?status=exploded").await;
        assert!(matches!(
            bad_status,
            Err(TrawlError::Transport {
                status: Some(400),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_returns_no_content() {
        let store = Store::new();
        let base = spawn_server(store.clone()).await;
        let api = client(&base, Some(ALICE));

        let created = api
            .send(
                Method::POST,
                "/api/runs",
                Some(&json!({"name": "prices", "target_url": "https://example.com"})),
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert!(store.get_run("alice", &id).is_some());

        let path = format!("/api/runs/{}", id);
        assert_eq!(api.send(Method::DELETE, &path, None).await, Ok(serde_json::Value::Null));
        assert!(store.get_run("alice", &id).is_none());
        assert_eq!(
            api.send(Method::DELETE, &path, None).await,
            Err(TrawlError::NotFound("Run not found".into()))
        );
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_an_empty_list() {
        let base = spawn_server(Store::with_demo_data(&["alice".to_string()])).await;
        let api = client(&base, Some(ALICE));

        let page = api.get("/api/runs?page=4294967295").await.unwrap();
        assert_eq!(page, json!([]));

        let too_large = api.get("/api/runs?page=4294967296").await;
        assert!(matches!(
            too_large,
            Err(TrawlError::Transport {
                status: Some(400),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_panicking_handler_answers_500() {
        async fn poisoned() -> &'static str {
            panic!("store lock poisoned")
        }

        let app = catch_panics(Router::new().route("/api/boom", get(poisoned)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = client(&format!("http://{}", addr), None);
        let result = api.get("/api/boom").await;
        assert_eq!(
            result,
            Err(TrawlError::Transport {
                status: Some(500),
                message: "Internal server error".into()
            })
        );

        // The server keeps answering after the panic
        let again = api.get("/api/boom").await;
        assert!(matches!(
            again,
            Err(TrawlError::Transport {
                status: Some(500),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let base = spawn_server(Store::new()).await;
        let api = client(&base, None);

        let health = api.get("/health").await.unwrap();
        assert_eq!(health["status"], json!("healthy"));

        let _ = api.get("/api/runs").await;
        let text = reqwest::get(format!("{}/metrics", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("trawl_api_requests_total"));
        assert!(text.contains("/api/runs"));
    }
}
