use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use axum_extra::extract::{Query, QueryRejection};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beanpod_common::{Bean, Config};
use beanpod_core::{Catalog, SearchOptions};

const ERROR_MESSAGE: &str = "Malformed input. See the beanpod API reference for the expected shape.";
const SUCCESS_MESSAGE: &str = "Accepted.";

/// Process-wide token bucket: sustained rate and burst across all endpoints.
const RATE_LIMIT_RPS: f64 = 100.0;
const RATE_LIMIT_BURST: f64 = 2000.0;

// --- App state ---

struct AppState {
    catalog: Catalog,
    auth_token: String,
    limiter: Mutex<TokenBucket>,
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (does not override real env vars)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("beanpod=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let catalog = Catalog::connect(&config).await?;

    let state = Arc::new(AppState {
        catalog,
        auth_token: config.internal_auth_token.clone(),
        limiter: Mutex::new(TokenBucket::new(RATE_LIMIT_RPS, RATE_LIMIT_BURST)),
    });

    // Service-to-service surface, keyed by the internal token
    let admin = Router::new()
        .route("/beans", put(put_beans))
        .route("/rectify", post(trigger_rectify))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    // Public read surface
    let open = Router::new()
        .route("/beans/search", get(search_beans))
        .route("/beans/trending", get(trending_beans))
        .route("/nuggets/trending", get(trending_nuggets))
        .route("/health", get(health));

    let app = admin
        .merge(open)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        // Logging layer: method + path + status + latency only (no bodies)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("beanpod server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Middleware ---

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    if !state.auth_token.is_empty() && provided == Some(state.auth_token.as_str()) {
        next.run(request).await
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let allowed = state.limiter.lock().await.allow(Instant::now());
    if allowed {
        next.run(request).await
    } else {
        StatusCode::TOO_MANY_REQUESTS.into_response()
    }
}

// --- Params ---

#[derive(Deserialize)]
struct SearchParams {
    window: Option<i64>,
    topn: Option<i64>,
    #[serde(default)]
    kind: Vec<String>,
}

#[derive(Deserialize, Default)]
struct SearchBody {
    #[serde(default)]
    nuggets: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    context: Option<String>,
}

fn build_options(params: &SearchParams, body: &SearchBody) -> SearchOptions {
    let mut options = SearchOptions::new();
    if let Some(window) = params.window.filter(|w| *w > 0) {
        options = options.with_time_window(window);
    }
    if let Some(topn) = params.topn.filter(|t| *t > 0) {
        options = options.with_top_n(topn);
    }
    if !params.kind.is_empty() {
        options = options.with_kinds(params.kind.clone());
    }
    if !body.categories.is_empty() {
        options = options.with_categories(body.categories.clone());
    }
    if !body.embeddings.is_empty() {
        options = options.with_category_embeddings(body.embeddings.clone());
    }
    if let Some(context) = body.context.as_deref().filter(|c| !c.is_empty()) {
        options = options.with_context(context);
    }
    options
}

// An absent or unreadable body is fine for the read endpoints; the search
// just runs on query params alone.
fn body_or_default(body: Result<Json<SearchBody>, JsonRejection>) -> SearchBody {
    body.map(|Json(b)| b).unwrap_or_default()
}

// --- Handlers ---

async fn put_beans(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<Bean>>, JsonRejection>,
) -> Response {
    let Ok(Json(beans)) = payload else {
        return (StatusCode::BAD_REQUEST, ERROR_MESSAGE).into_response();
    };
    match state.catalog.add_beans(beans).await {
        Ok(inserted) => {
            info!(inserted, "Beans accepted");
            (StatusCode::OK, SUCCESS_MESSAGE).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Bean ingest failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn trigger_rectify(State(state): State<Arc<AppState>>) -> Response {
    let catalog = state.catalog.clone();
    tokio::spawn(async move {
        catalog.rectify().await;
    });
    (StatusCode::OK, SUCCESS_MESSAGE).into_response()
}

async fn search_beans(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, ERROR_MESSAGE).into_response();
    };
    let body = body_or_default(body);
    let options = build_options(&params, &body);

    let beans = if body.nuggets.is_empty() {
        state.catalog.fuzzy_search_beans(&options).await
    } else {
        state.catalog.nugget_search(&body.nuggets, &options).await
    };
    send_beans(beans)
}

async fn trending_beans(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, ERROR_MESSAGE).into_response();
    };
    let body = body_or_default(body);
    let options = build_options(&params, &body);
    send_beans(state.catalog.trending_beans(&options).await)
}

async fn trending_nuggets(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return (StatusCode::BAD_REQUEST, ERROR_MESSAGE).into_response();
    };
    let body = body_or_default(body);
    let options = build_options(&params, &body);
    Json(state.catalog.trending_nuggets(&options).await).into_response()
}

async fn health() -> &'static str {
    "ok"
}

fn send_beans(beans: Vec<Bean>) -> Response {
    if beans.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(beans).into_response()
    }
}

// --- Rate limiting ---

/// Plain token bucket: `rate` tokens per second up to `burst`.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    rate: f64,
    burst: f64,
}

impl TokenBucket {
    fn new(rate: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
            rate,
            burst,
        }
    }

    fn allow(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bucket_allows_up_to_burst() {
        let mut bucket = TokenBucket::new(100.0, 5.0);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(bucket.allow(now));
        }
        assert!(!bucket.allow(now));
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(100.0, 2.0);
        let now = Instant::now();
        assert!(bucket.allow(now));
        assert!(bucket.allow(now));
        assert!(!bucket.allow(now));
        // 100 tokens/s: 20ms buys two more requests
        let later = now + Duration::from_millis(20);
        assert!(bucket.allow(later));
        assert!(bucket.allow(later));
        assert!(!bucket.allow(later));
    }

    #[test]
    fn bucket_never_exceeds_burst() {
        let mut bucket = TokenBucket::new(100.0, 3.0);
        let now = Instant::now();
        let much_later = now + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(bucket.allow(much_later));
        }
        assert!(!bucket.allow(much_later));
    }

    #[test]
    fn options_ignore_non_positive_params() {
        let params = SearchParams {
            window: Some(0),
            topn: Some(-5),
            kind: vec![],
        };
        let options = build_options(&params, &SearchBody::default());
        assert_eq!(options.top_n(), beanpod_core::DEFAULT_TOP_N);
        assert!(options.since().is_none());
    }

    #[test]
    fn options_carry_body_parameters() {
        let params = SearchParams {
            window: Some(2),
            topn: Some(500),
            kind: vec!["article".to_string(), "post".to_string()],
        };
        let body = SearchBody {
            context: Some("tiktok legal".to_string()),
            ..SearchBody::default()
        };
        let options = build_options(&params, &body);
        assert_eq!(options.top_n(), beanpod_core::MAX_TOP_N);
        assert!(options.since().is_some());
        assert_eq!(options.context.as_deref(), Some("tiktok legal"));
    }
}
