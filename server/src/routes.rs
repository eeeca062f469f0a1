//! HTTP route handlers for the Tickbook server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /` - Endpoint index
//! - `GET /health` - Health check endpoint
//! - `GET /ws` - WebSocket notifications for checklist and todo changes
//! - `GET /house-checklist`, `GET /statistics` - Parsed checklist and its rollups
//! - `POST /house-checklist/toggle` - Set one checklist task's state
//! - `GET /todos`, `GET /todos/{id}`, `GET /todos/file/{*path}` - Todo listings
//! - `GET /stats`, `GET /files`, `GET /tags`, `GET /kanban`, `GET /calendar` - Todo views
//! - `POST /toggle` - Flip one todo by file and line
//! - `POST /refresh` - Rescan the notes directory
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (notes directory, checklist path)
//! - Notification broadcaster feeding WebSocket clients
//! - The todo cache
//! - Server start time for uptime reporting
//!
//! The checklist is read fresh from disk on every request. Todo endpoints
//! answer from the cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickbook_server::routes::{create_router, AppState};
//! use tickbook_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path as UrlPath, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use serde::{Deserialize, Serialize};
use tickbook_core::query::{self, Kanban, TagCount, TodoQuery};
use tickbook_core::stats::todo_stats_today;
use tickbook_core::{
    checklist_stats, parse_checklist_file, toggle_task, toggle_todo, Checklist, ChecklistStats,
    CoreError, TaskPath, TodoRecord, TodoStats, ToggleOutcome,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::{Broadcaster, Notification, Topic, TopicFilter};
use crate::cache::{RefreshSummary, TodoCache};
use crate::config::Config;
use crate::error::ServerError;

// ============================================================================
// Constants
// ============================================================================

/// Endpoints listed by `GET /`.
const ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /ws",
    "GET /house-checklist",
    "GET /statistics",
    "POST /house-checklist/toggle",
    "GET /todos",
    "GET /todos/{id}",
    "GET /todos/file/{*path}",
    "GET /stats",
    "POST /toggle",
    "POST /refresh",
    "GET /files",
    "GET /tags",
    "GET /kanban",
    "GET /calendar",
];

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Every field is cheap to clone; the file watcher's change processor holds
/// a clone too.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Notification channel for WebSocket clients.
    pub broadcaster: Broadcaster,

    /// Last scan of the notes directory.
    pub cache: TodoCache,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates a new application state with the given configuration.
    ///
    /// The todo cache starts empty; call [`refresh_todos`](Self::refresh_todos)
    /// to populate it.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tickbook_server::routes::AppState;
    /// use tickbook_server::config::Config;
    ///
    /// let config = Config::from_env().expect("failed to load config");
    /// let state = AppState::new(config);
    /// ```
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_broadcaster(config, Broadcaster::new())
    }

    /// Creates application state with a custom broadcaster.
    #[must_use]
    pub fn with_broadcaster(config: Config, broadcaster: Broadcaster) -> Self {
        let cache = TodoCache::new(config.notes_dir.clone());
        Self {
            config: Arc::new(config),
            broadcaster,
            cache,
            start_time: Instant::now(),
        }
    }

    /// Reads and parses the checklist, returning it with its statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the checklist file does not exist,
    /// or [`ServerError::Core`] if it cannot be read.
    pub async fn load_checklist(&self) -> Result<(Checklist, ChecklistStats), ServerError> {
        let path = self.config.checklist_path.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_checklist_file(&path)).await?;

        let checklist = parsed.map_err(|err| match err {
            CoreError::Io { ref path, ref source } if source.kind() == io::ErrorKind::NotFound => {
                ServerError::not_found(format!("checklist {}", path.display()))
            }
            other => other.into(),
        })?;
        let stats = checklist_stats(&checklist);
        Ok((checklist, stats))
    }

    /// Re-parses the checklist and broadcasts it as an `update`.
    ///
    /// Returns the number of clients notified.
    ///
    /// # Errors
    ///
    /// Returns an error if the checklist cannot be loaded.
    pub async fn publish_checklist(&self) -> Result<usize, ServerError> {
        let (data, stats) = self.load_checklist().await?;
        let total = stats.overall.total;
        let receivers = self.broadcaster.broadcast(Notification::Update { data, stats });
        info!(receivers, total, "Checklist update published");
        Ok(receivers)
    }

    /// Rescans the notes directory and broadcasts the new cache version.
    ///
    /// # Errors
    ///
    /// Returns an error if the notes directory cannot be enumerated.
    pub async fn refresh_todos(&self) -> Result<RefreshSummary, ServerError> {
        let summary = self.cache.refresh().await?;
        self.broadcaster.broadcast(Notification::Todos {
            version: summary.version,
            count: summary.count,
            last_update: summary.last_update,
        });
        Ok(summary)
    }

    /// Runs the follow-up work for a file this server just wrote.
    ///
    /// The write already succeeded, so failures here are logged and not
    /// returned to the caller.
    async fn after_write(&self, path: &Path) {
        let path = canonical_or_self(path);
        if same_file(&path, &self.config.checklist_path) {
            if let Err(err) = self.publish_checklist().await {
                warn!(error = %err, "Failed to publish checklist after toggle");
            }
        }

        if path.starts_with(canonical_or_self(&self.config.notes_dir)) {
            if let Err(err) = self.refresh_todos().await {
                warn!(error = %err, "Failed to refresh todos after toggle");
            }
        }
    }

    /// Resolves a client-supplied path to a markdown file inside the notes
    /// directory. Relative paths are taken relative to the notes directory.
    fn resolve_notes_file(&self, file_path: &str) -> Result<PathBuf, ServerError> {
        let notes_dir = &self.config.notes_dir;
        let root = notes_dir
            .canonicalize()
            .map_err(|err| CoreError::io(notes_dir, err))?;

        let requested = Path::new(file_path);
        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            notes_dir.join(requested)
        };

        let resolved = match candidate.canonicalize() {
            Ok(resolved) => resolved,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ServerError::not_found(format!("file {file_path}")));
            }
            Err(err) => return Err(CoreError::io(candidate, err).into()),
        };

        if !resolved.starts_with(&root) {
            warn!(file_path, "Rejected path outside the notes directory");
            return Err(ServerError::validation(
                "file_path is outside the notes directory",
            ));
        }
        if resolved.extension().is_none_or(|ext| ext != "md") {
            return Err(ServerError::validation("file_path is not a markdown file"));
        }

        Ok(resolved)
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn same_file(a: &Path, b: &Path) -> bool {
    canonical_or_self(a) == canonical_or_self(b)
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// Responses carry permissive CORS headers, and every request is traced.
///
/// # Example
///
/// ```rust,no_run
/// use tickbook_server::routes::{create_router, AppState};
/// use tickbook_server::config::Config;
///
/// let config = Config::from_env().expect("failed to load config");
/// let state = AppState::new(config);
/// let router = create_router(state);
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/health", get(get_health))
        .route("/ws", get(get_ws))
        .route("/house-checklist", get(get_checklist))
        .route("/house-checklist/toggle", post(post_checklist_toggle))
        .route("/statistics", get(get_checklist_statistics))
        .route("/todos", get(get_todos))
        .route("/todos/{id}", get(get_todo))
        .route("/todos/file/{*path}", get(get_file_todos))
        .route("/stats", get(get_stats))
        .route("/toggle", post(post_toggle))
        .route("/refresh", post(post_refresh))
        .route("/files", get(get_files))
        .route("/tags", get(get_tags))
        .route("/kanban", get(get_kanban))
        .route("/calendar", get(get_calendar))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Shared Response Types
// ============================================================================

/// Response body for both toggle endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub message: String,
    /// The task's state after the call; absent when nothing was found.
    pub completed: Option<bool>,
}

impl ToggleResponse {
    fn toggled(completed: bool) -> Self {
        let state = if completed { "complete" } else { "incomplete" };
        Self {
            success: true,
            message: format!("Task marked as {state}"),
            completed: Some(completed),
        }
    }

    fn not_found() -> Self {
        Self {
            success: false,
            message: "Task not found".to_string(),
            completed: None,
        }
    }
}


// ============================================================================
// GET / - Endpoint Index
// ============================================================================

/// Response body for the endpoint index.
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: &'static [&'static str],
}

async fn get_index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS,
    })
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of active WebSocket connections.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "connections": 2,
///   "uptime_seconds": 3600
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.subscriber_count(),
        uptime_seconds: uptime.as_secs(),
    })
}

// ============================================================================
// GET /ws - WebSocket Notifications
// ============================================================================

/// Query parameters for the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WsQueryParams {
    /// Only forward notifications for this topic.
    pub topic: Option<Topic>,
}

impl WsQueryParams {
    fn to_filter(&self) -> TopicFilter {
        let mut filter = TopicFilter::new();
        if let Some(topic) = self.topic {
            filter = filter.with_topic(topic);
        }
        filter
    }
}

/// GET /ws - WebSocket notification stream.
///
/// # WebSocket Protocol
///
/// Right after the upgrade the server sends `{"type": "initial", ...}` with
/// the current checklist (skipped for `?topic=todos`). After that it forwards
/// every `update` and `todos` notification that passes the topic filter.
/// Messages from the client are ignored.
async fn get_ws(
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let filter = params.to_filter();
    info!(filter = ?filter, "WebSocket client connecting");

    ws.on_upgrade(move |socket| handle_websocket(socket, state, filter))
}

/// Handles an established WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: AppState, filter: TopicFilter) {
    use futures_util::StreamExt;

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before loading the snapshot so no change falls in between.
    let mut notification_rx = state.broadcaster.subscribe();

    info!("WebSocket client connected");

    if filter.wants_checklist() {
        match state.load_checklist().await {
            Ok((data, stats)) => {
                let initial = Notification::Initial { data, stats };
                if let Err(err) = send_notification(&mut sender, &initial).await {
                    debug!(error = %err, "Failed to send initial checklist");
                    return;
                }
            }
            Err(err) => warn!(error = %err, "No initial checklist for WebSocket client"),
        }
    }

    let forward_task = tokio::spawn(async move {
        loop {
            match notification_rx.recv().await {
                Ok(notification) => {
                    if !filter.matches(&notification) {
                        trace!(kind = notification.kind(), "Notification filtered out");
                        continue;
                    }
                    if let Err(err) = send_notification(&mut sender, &notification).await {
                        debug!(error = %err, "Failed to send to WebSocket client");
                        break;
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "WebSocket client lagged, skipped notifications");
                }
                Err(RecvError::Closed) => {
                    debug!("Broadcaster closed");
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                // axum answers pings itself
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!("WebSocket client disconnected");
}

/// Serializes and sends one notification. Serialization failures are logged
/// and skipped; only transport errors are returned.
async fn send_notification(
    sender: &mut SplitSink<WebSocket, Message>,
    notification: &Notification,
) -> Result<(), axum::Error> {
    use futures_util::SinkExt;

    match serde_json::to_string(notification) {
        Ok(json) => {
            trace!(kind = notification.kind(), "Sending notification");
            sender.send(Message::Text(json.into())).await
        }
        Err(err) => {
            error!(error = %err, kind = notification.kind(), "Failed to serialize notification");
            Ok(())
        }
    }
}

// ============================================================================
// Checklist
// ============================================================================

/// GET /house-checklist - The parsed checklist tree.
async fn get_checklist(State(state): State<AppState>) -> Result<Json<Checklist>, ServerError> {
    let (checklist, _) = state.load_checklist().await?;
    Ok(Json(checklist))
}

/// GET /statistics - Checklist completion rollups.
async fn get_checklist_statistics(
    State(state): State<AppState>,
) -> Result<Json<ChecklistStats>, ServerError> {
    let (_, stats) = state.load_checklist().await?;
    Ok(Json(stats))
}

/// Request body for `POST /house-checklist/toggle`.
///
/// ```json
/// {"section": "interior", "phaseIndex": 0, "subPhaseIndex": 0, "roomIndex": 1, "taskIndex": 2, "completed": true}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TaskToggleRequest {
    #[serde(flatten)]
    pub path: TaskPath,
    pub completed: bool,
}

/// POST /house-checklist/toggle - Set one checklist task.
///
/// # Responses
///
/// - `200 OK` - `{"success": true, ...}`, or `{"success": false, "message": "Task not found"}`
///   when the path does not resolve to a task
async fn post_checklist_toggle(
    State(state): State<AppState>,
    Json(request): Json<TaskToggleRequest>,
) -> Result<Json<ToggleResponse>, ServerError> {
    let checklist_path = state.config.checklist_path.clone();
    let TaskToggleRequest { path, completed } = request;

    let outcome = {
        let checklist_path = checklist_path.clone();
        tokio::task::spawn_blocking(move || toggle_task(&checklist_path, &path, completed))
            .await??
    };

    match outcome {
        ToggleOutcome::Toggled { completed, .. } => {
            state.after_write(&checklist_path).await;
            Ok(Json(ToggleResponse::toggled(completed)))
        }
        ToggleOutcome::NotFound => {
            debug!(task_path = ?path, "Checklist task not found");
            Ok(Json(ToggleResponse::not_found()))
        }
    }
}

// ============================================================================
// Todo Dashboard
// ============================================================================

/// GET /todos - Filtered, sorted todo listing.
///
/// # Query Parameters
///
/// `completed`, `tag`, `file`, `priority`, `search`, `sort`
/// (`file` | `priority` | `date` | `recent`) and `limit`.
async fn get_todos(
    State(state): State<AppState>,
    Query(query): Query<TodoQuery>,
) -> Json<Vec<TodoRecord>> {
    let snapshot = state.cache.snapshot().await;
    let todos = query.apply(&snapshot.todos);
    debug!(query = ?query, matched = todos.len(), "Listing todos");
    Json(todos)
}

/// GET /todos/{id} - One todo.
async fn get_todo(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<TodoRecord>, ServerError> {
    state
        .cache
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::not_found(format!("todo {id}")))
}

/// GET /todos/file/{*path} - Todos of one file in line order.
async fn get_file_todos(
    State(state): State<AppState>,
    UrlPath(file): UrlPath<String>,
) -> Json<Vec<TodoRecord>> {
    let snapshot = state.cache.snapshot().await;
    Json(query::todos_in_file(&snapshot.todos, &file))
}

/// Response body for `GET /stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: TodoStats,
    pub last_update: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub version: u64,
}

/// GET /stats - Todo statistics plus cache metadata.
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.cache.snapshot().await;
    Json(StatsResponse {
        stats: todo_stats_today(&snapshot.todos),
        last_update: snapshot.last_update,
        total_files: snapshot.file_count,
        version: snapshot.version,
    })
}

/// Request body for `POST /toggle`.
#[derive(Debug, Clone, Deserialize)]
pub struct TodoToggleRequest {
    /// Absolute, or relative to the notes directory.
    pub file_path: String,
    /// 1-based.
    pub line_number: usize,
}

/// POST /toggle - Flip one todo's checkbox.
///
/// # Responses
///
/// - `200 OK` - `{"success": true, "completed": ...}`
/// - `400 Bad Request` - Line has no checkbox, or path is outside the notes directory
/// - `404 Not Found` - File or line does not exist
async fn post_toggle(
    State(state): State<AppState>,
    Json(request): Json<TodoToggleRequest>,
) -> Result<(StatusCode, Json<ToggleResponse>), ServerError> {
    let path = state.resolve_notes_file(&request.file_path)?;
    let line_number = request.line_number;

    let outcome = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || toggle_todo(&path, line_number)).await??
    };

    match outcome {
        ToggleOutcome::Toggled { completed, .. } => {
            state.after_write(&path).await;
            Ok((StatusCode::OK, Json(ToggleResponse::toggled(completed))))
        }
        ToggleOutcome::NotFound => {
            Ok((StatusCode::NOT_FOUND, Json(ToggleResponse::not_found())))
        }
    }
}

/// Response body for `POST /refresh`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub last_update: DateTime<Utc>,
}

/// POST /refresh - Rescan the notes directory now.
async fn post_refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ServerError> {
    let summary = state.refresh_todos().await?;
    Ok(Json(RefreshResponse {
        success: true,
        message: format!("Refreshed {} todos", summary.count),
        count: summary.count,
        last_update: summary.last_update,
    }))
}

/// GET /files - Relative names of files that contain todos.
async fn get_files(State(state): State<AppState>) -> Json<Vec<String>> {
    let snapshot = state.cache.snapshot().await;
    Json(query::files(&snapshot.todos))
}

/// GET /tags - Tag usage counts.
async fn get_tags(State(state): State<AppState>) -> Json<Vec<TagCount>> {
    let snapshot = state.cache.snapshot().await;
    Json(query::tag_counts(&snapshot.todos))
}

/// GET /kanban - Todos bucketed by state and priority.
async fn get_kanban(State(state): State<AppState>) -> Json<Kanban> {
    let snapshot = state.cache.snapshot().await;
    Json(query::kanban(&snapshot.todos))
}

/// GET /calendar - Dated todos keyed by due date.
async fn get_calendar(State(state): State<AppState>) -> Json<BTreeMap<String, Vec<TodoRecord>>> {
    let snapshot = state.cache.snapshot().await;
    Json(query::calendar(&snapshot.todos))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CHECKLIST: &str = "\
# House Checklist

**Interior Tasks (Post-Drywall)**

**Phase 1: Demo**
- [ ] Remove carpet
- [x] Pull baseboards

**Exterior Tasks**

**Phase 1: Roof**
- [ ] Patch flashing
";

    const INBOX: &str = "\
# Inbox
- [ ] Call roofer #house !!!
- [x] Buy paint #house
- [ ] Renew passport 2020-01-01 !!

Not a todo.
- [ ] Read manual
";

    /// Creates a notes directory holding the checklist and one inbox file.
    fn notes_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("House Checklist.md"), CHECKLIST).unwrap();
        fs::write(dir.path().join("inbox.md"), INBOX).unwrap();
        dir
    }

    async fn test_state(dir: &TempDir) -> AppState {
        let state = AppState::new(Config::for_notes_dir(dir.path()));
        state.refresh_todos().await.unwrap();
        state
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_json(response).await
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_json(response).await
    }

    async fn read_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    // ========================================================================
    // Health and index
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_status() {
        let dir = notes_dir();
        let app = create_router(test_state(&dir).await);

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
    }

    #[tokio::test]
    async fn health_reports_subscriber_count() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        let _subscriber = state.broadcaster.subscribe();

        let (_, body) = get_json(create_router(state), "/health").await;
        assert_eq!(body["connections"], 1);
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let dir = notes_dir();
        let (status, body) = get_json(create_router(test_state(&dir).await), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "tickbook-server");
        assert!(body["endpoints"]
            .as_array()
            .unwrap()
            .contains(&json!("POST /toggle")));
    }

    // ========================================================================
    // Checklist
    // ========================================================================

    #[tokio::test]
    async fn checklist_and_statistics() {
        let dir = notes_dir();
        let state = test_state(&dir).await;

        let (status, body) = get_json(create_router(state.clone()), "/house-checklist").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interior"]["phases"][0]["title"], "Phase 1: Demo");
        assert_eq!(body["interior"]["phases"][0]["tasks"][1]["completed"], true);

        let (status, body) = get_json(create_router(state), "/statistics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["completed"], 1);
        assert_eq!(body["interior"]["total"], 2);
        assert_eq!(body["exterior"]["completed"], 0);
    }

    #[tokio::test]
    async fn missing_checklist_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(Config::for_notes_dir(dir.path()));

        let (status, body) = get_json(create_router(state), "/house-checklist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn checklist_toggle_writes_and_broadcasts() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        let mut rx = state.broadcaster.subscribe();

        let (status, body) = post_json(
            create_router(state.clone()),
            "/house-checklist/toggle",
            json!({"section": "exterior", "phaseIndex": 0, "taskIndex": 0, "completed": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["completed"], true);

        let content = fs::read_to_string(dir.path().join("House Checklist.md")).unwrap();
        assert!(content.contains("- [x] Patch flashing"));

        match rx.recv().await.unwrap() {
            Notification::Update { stats, .. } => assert_eq!(stats.overall.completed, 2),
            other => panic!("expected update, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), Notification::Todos { .. }));
    }

    #[tokio::test]
    async fn checklist_toggle_unknown_task() {
        let dir = notes_dir();
        let state = test_state(&dir).await;

        let (status, body) = post_json(
            create_router(state),
            "/house-checklist/toggle",
            json!({"section": "interior", "phaseIndex": 4, "taskIndex": 0, "completed": true}),
        )
        .await;
        // Clients read `success`; an unknown task is not an HTTP error here.
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Task not found");
        assert_eq!(body["completed"], Value::Null);

        let content = fs::read_to_string(dir.path().join("House Checklist.md")).unwrap();
        assert_eq!(content, CHECKLIST);
    }

    // ========================================================================
    // Todo listings
    // ========================================================================

    #[tokio::test]
    async fn todos_lists_every_file_in_order() {
        let dir = notes_dir();
        let (status, body) = get_json(create_router(test_state(&dir).await), "/todos").await;
        assert_eq!(status, StatusCode::OK);

        let todos = body.as_array().unwrap();
        assert_eq!(todos.len(), 7);
        assert_eq!(todos[0]["file"], "House Checklist.md");
        assert_eq!(todos[3]["file"], "inbox.md");
        assert_eq!(todos[3]["text"], "Call roofer");
    }

    #[tokio::test]
    async fn todos_query_filters_and_sorts() {
        let dir = notes_dir();
        let state = test_state(&dir).await;

        let (_, body) = get_json(
            create_router(state.clone()),
            "/todos?tag=house&completed=false",
        )
        .await;
        let texts: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["Call roofer"]);

        let (_, body) = get_json(create_router(state), "/todos?sort=priority&limit=2").await;
        let todos = body.as_array().unwrap();
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0]["priority"], 3);
        assert_eq!(todos[1]["priority"], 2);
    }

    #[tokio::test]
    async fn todo_by_id_and_unknown_id() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        let id = state.cache.snapshot().await.todos[0].id.clone();

        let (status, body) = get_json(create_router(state.clone()), &format!("/todos/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let (status, body) = get_json(create_router(state), "/todos/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn file_todos_support_nested_paths() {
        let dir = notes_dir();
        fs::create_dir(dir.path().join("work")).unwrap();
        fs::write(dir.path().join("work/today.md"), "- [ ] a\n- [ ] b\n").unwrap();
        let state = test_state(&dir).await;

        let (status, body) = get_json(create_router(state), "/todos/file/work/today.md").await;
        assert_eq!(status, StatusCode::OK);
        let todos = body.as_array().unwrap();
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0]["line_number"], 1);
        assert_eq!(todos[1]["line_number"], 2);
    }

    #[tokio::test]
    async fn stats_include_cache_metadata() {
        let dir = notes_dir();
        let (_, body) = get_json(create_router(test_state(&dir).await), "/stats").await;

        assert_eq!(body["total"], 7);
        assert_eq!(body["completed"], 2);
        assert_eq!(body["pending"], 5);
        assert_eq!(body["high_priority"], 2);
        assert_eq!(body["overdue"], 1);
        assert_eq!(body["total_files"], 2);
        assert_eq!(body["version"], 1);
        assert!(body["last_update"].is_string());
        assert_eq!(body["by_tag"]["house"]["total"], 2);
    }

    #[tokio::test]
    async fn files_tags_kanban_calendar() {
        let dir = notes_dir();
        let state = test_state(&dir).await;

        let (_, files) = get_json(create_router(state.clone()), "/files").await;
        assert_eq!(files, json!(["House Checklist.md", "inbox.md"]));

        let (_, tags) = get_json(create_router(state.clone()), "/tags").await;
        assert_eq!(tags, json!([{"name": "house", "count": 2}]));

        let (_, board) = get_json(create_router(state.clone()), "/kanban").await;
        assert_eq!(board["done"].as_array().unwrap().len(), 2);
        assert_eq!(board["in_progress"][0]["text"], "Call roofer");
        assert_eq!(board["todo"][0]["text"], "Renew passport 2020-01-01");

        let (_, calendar) = get_json(create_router(state), "/calendar").await;
        assert_eq!(calendar["2020-01-01"][0]["text"], "Renew passport 2020-01-01");
    }

    // ========================================================================
    // POST /toggle and /refresh
    // ========================================================================

    #[tokio::test]
    async fn toggle_flips_line_and_refreshes_cache() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        let mut rx = state.broadcaster.subscribe();

        let (status, body) = post_json(
            create_router(state.clone()),
            "/toggle",
            json!({"file_path": "inbox.md", "line_number": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["completed"], true);

        let content = fs::read_to_string(dir.path().join("inbox.md")).unwrap();
        assert_eq!(content.lines().nth(1), Some("- [x] Call roofer #house !!!"));

        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::Todos { version: 2, .. }
        ));
        let snapshot = state.cache.snapshot().await;
        assert_eq!(snapshot.version, 2);
        assert!(snapshot
            .todos
            .iter()
            .any(|t| t.text == "Call roofer" && t.completed));
    }

    #[tokio::test]
    async fn toggle_accepts_absolute_paths() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        let file_path = dir.path().join("inbox.md").display().to_string();

        let (status, body) = post_json(
            create_router(state),
            "/toggle",
            json!({"file_path": file_path, "line_number": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], false);
    }

    #[tokio::test]
    async fn toggle_errors_map_to_status_codes() {
        let dir = notes_dir();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.md"), "- [ ] hidden\n").unwrap();
        let state = test_state(&dir).await;

        let (status, body) = post_json(
            create_router(state.clone()),
            "/toggle",
            json!({"file_path": "inbox.md", "line_number": 99}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, body) = post_json(
            create_router(state.clone()),
            "/toggle",
            json!({"file_path": "inbox.md", "line_number": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");

        let (status, _) = post_json(
            create_router(state.clone()),
            "/toggle",
            json!({"file_path": "missing.md", "line_number": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let escape = outside.path().join("secret.md").display().to_string();
        let (status, _) = post_json(
            create_router(state),
            "/toggle",
            json!({"file_path": escape, "line_number": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let untouched = fs::read_to_string(outside.path().join("secret.md")).unwrap();
        assert_eq!(untouched, "- [ ] hidden\n");
    }

    #[tokio::test]
    async fn refresh_picks_up_new_files() {
        let dir = notes_dir();
        let state = test_state(&dir).await;
        fs::write(dir.path().join("new.md"), "- [ ] fresh\n").unwrap();

        let (status, body) = post_json(create_router(state.clone()), "/refresh", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 8);
        assert_eq!(state.cache.snapshot().await.version, 2);
    }

    // ========================================================================
    // Request types
    // ========================================================================

    #[test]
    fn ws_query_params_build_filters() {
        assert_eq!(WsQueryParams::default().to_filter(), TopicFilter::new());

        let params: WsQueryParams = serde_json::from_value(json!({"topic": "todos"})).unwrap();
        assert!(!params.to_filter().wants_checklist());
    }

    #[test]
    fn task_toggle_request_accepts_optional_indices() {
        let request: TaskToggleRequest = serde_json::from_value(json!({
            "section": "interior",
            "phaseIndex": 0,
            "subPhaseIndex": 1,
            "roomIndex": 2,
            "taskIndex": 3,
            "completed": false
        }))
        .unwrap();
        assert_eq!(request.path.sub_phase_index, Some(1));
        assert_eq!(request.path.room_index, Some(2));
        assert!(!request.completed);

        let request: TaskToggleRequest = serde_json::from_value(json!({
            "section": "exterior",
            "phaseIndex": 0,
            "taskIndex": 0,
            "completed": true
        }))
        .unwrap();
        assert_eq!(request.path.sub_phase_index, None);
    }

    #[test]
    fn toggle_response_messages() {
        assert_eq!(ToggleResponse::toggled(true).message, "Task marked as complete");
        assert_eq!(ToggleResponse::toggled(false).completed, Some(false));
        assert!(!ToggleResponse::not_found().success);
    }
}
