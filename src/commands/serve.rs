use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::controllers::paste;
use crate::db::Database;
use crate::models::Paste;
use crate::types::api::{CreatePaste, CreatedPaste, Health, PasteView};
use crate::App;

/// Plain-text usage notes served at `/`.
const USAGE: &str = include_str!("../../assets/usage.txt");

/// Overrides the reference time of a read, in epoch milliseconds.
/// Only honored when `test_mode` is on.
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Paste \
                              unavailable</title></head><body><h1>Paste unavailable</h1><p>Paste \
                              not found or has expired.</p><p><a href=\"/\">Back</a></p></body></html>\n";

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::new(app.config.bind, app.config.port);

    if let Some(secs) = app.config.sweep_interval_secs.filter(|secs| *secs > 0) {
        tokio::spawn(sweep_periodically(app.clone(), Duration::from_secs(secs)));
    }

    let router = router(app);

    info!("listening on http://{addr}");
    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");

    Ok(())
}

/// Build the HTTP routes. The JSON API is served both at the root and
/// under `/api`.
pub fn router(app: App) -> Router {
    let api: Router<App> = Router::new()
        .route("/healthz", get(health))
        .route("/pastes", post(create_paste))
        .route("/pastes/:id", get(get_paste));

    let max_paste_size = app.config.limits.max_paste_size;

    Router::new()
        .route("/", get(index))
        .route("/p/:id", get(view_paste))
        .merge(api.clone())
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_paste_size))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn index() -> &'static str {
    USAGE
}

async fn health(State(database): State<Database>) -> impl IntoResponse {
    match database.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Health {
                ok: true,
                error: None,
            }),
        ),
        Err(err) => {
            error!("health check failed: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Health {
                    ok: false,
                    error: Some("Database connection failed"),
                }),
            )
        }
    }
}

async fn create_paste(
    State(app): State<App>,
    body: Result<Json<CreatePaste>, JsonRejection>,
) -> crate::ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let new_paste = paste::validate(request)?;
    let created = paste::create(&app, new_paste, Utc::now()).await?;

    let path = format!("/p/{id}", id = created.id);
    let url = app.config.paste_url(&created.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, path)],
        Json(CreatedPaste {
            id: created.id,
            url,
        }),
    ))
}

async fn get_paste(
    State(app): State<App>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> crate::ApiResult<Json<PasteView>> {
    let now = request_time(&app.config, &headers);
    let paste = paste::view(&app, &id, now).await?;
    Ok(Json(paste.into()))
}

async fn view_paste(
    State(app): State<App>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let now = request_time(&app.config, &headers);
    match paste::view(&app, &id, now).await {
        Ok(paste) => Html(render_paste(&paste)).into_response(),
        Err(err) if err.is_not_found() => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn request_time(config: &Config, headers: &HeaderMap) -> DateTime<Utc> {
    if config.test_mode {
        if let Some(value) = headers.get(TEST_NOW_HEADER) {
            let parsed = value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<i64>().ok())
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
            match parsed {
                Some(now) => return now,
                None => warn!("ignoring malformed {TEST_NOW_HEADER} header"),
            }
        }
    }
    Utc::now()
}

fn render_paste(paste: &Paste) -> String {
    // terminal output keeps its colors
    let body = ansi_to_html::convert_escaped(&paste.content).unwrap_or_else(|err| {
        warn!("could not render ANSI in paste '{}': {err}", paste.id);
        escape_html(&paste.content)
    });

    let mut details = Vec::new();
    if let Some(remaining) = paste.remaining_views() {
        details.push(format!("{remaining} views left"));
    }
    if let Some(expires_at) = paste.expires_at {
        details.push(format!("expires {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Paste {id}</title></head>\
         <body><h1>Paste {id}</h1><p>{details}</p><pre>{body}</pre>\
         <p><a href=\"/\">New paste</a></p></body></html>\n",
        id = paste.id,
        details = details.join(" · "),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

async fn sweep_periodically(app: App, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(err) = paste::deactivate_expired(&app, Utc::now()).await {
            error!("sweep failed: {err:?}");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
