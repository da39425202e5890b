//! End-to-end sync against an in-process HTTP sync service

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use planboard_sync::db::create_pool;
use planboard_sync::session::ActiveUser;
use planboard_sync::store::{SqliteTaskStore, TaskStore};
use planboard_sync::sync::{
    CheckpointStore, Conflict, Connectivity, EngineConfig, HttpRemote, Position, PullRequest,
    PullResponse, PushRequest, PushResponse, RemoteSync, SqliteCheckpointStore, SyncEngine, Task,
    Timestamp, TASKS_COLLECTION,
};
use planboard_sync::tasks::TaskService;
use planboard_sync::SyncError;

#[derive(Default)]
struct ServerState {
    docs: Vec<Task>,
    checkpoint: Option<Timestamp>,
    conflicts: Vec<Conflict>,
    pulls: Vec<PullRequest>,
    pushes: Vec<PushRequest>,
}

type Shared = Arc<Mutex<ServerState>>;

async fn pull(State(state): State<Shared>, Json(request): Json<PullRequest>) -> Json<PullResponse> {
    let mut state = state.lock().unwrap();
    let docs = state
        .docs
        .iter()
        .filter(|d| d.user_id == request.user_id && d.updated_at > request.since)
        .take(request.limit as usize)
        .cloned()
        .collect();
    let checkpoint = state.checkpoint;
    state.pulls.push(request);
    Json(PullResponse { docs, checkpoint })
}

async fn push(State(state): State<Shared>, Json(request): Json<PushRequest>) -> Json<PushResponse> {
    let mut state = state.lock().unwrap();
    state.pushes.push(request);
    Json(PushResponse {
        conflicts: std::mem::take(&mut state.conflicts),
    })
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn sync_server(state: Shared) -> String {
    let router = Router::new()
        .route("/sync/pull", post(pull))
        .route("/sync/push", post(push))
        .with_state(state);
    spawn_server(router).await
}

fn server_task(id: &str, updated_at: &str) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "userId": "u1",
        "planId": "plan-1",
        "title": format!("Server {}", id),
        "position": {"x": 0.5, "y": 0.5},
        "checklist": [],
        "createdAt": "2025-01-01T00:00:00.000Z",
        "updatedAt": updated_at,
        "clientId": "server-device",
        "_deleted": false
    }))
    .unwrap()
}

struct Device {
    engine: SyncEngine,
    store: Arc<SqliteTaskStore>,
    checkpoints: Arc<SqliteCheckpointStore>,
    service: TaskService,
}

async fn device(base_url: &str) -> Device {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    let store = Arc::new(SqliteTaskStore::new(pool.clone()));
    let checkpoints = Arc::new(SqliteCheckpointStore::new(pool));
    let user = ActiveUser::signed_in("u1");
    let remote = HttpRemote::new(base_url, Duration::from_secs(5)).unwrap();

    let engine = SyncEngine::new(
        EngineConfig::new("device-a"),
        store.clone(),
        Arc::new(remote),
        checkpoints.clone(),
        user.clone(),
        Connectivity::new(true),
    );
    let service = TaskService::new(store.clone(), "device-a", user);

    Device {
        engine,
        store,
        checkpoints,
        service,
    }
}

#[tokio::test]
async fn test_pull_then_push_round_trip() {
    let state: Shared = Arc::new(Mutex::new(ServerState {
        docs: vec![
            server_task("s1", "2025-01-01T00:00:00.000Z"),
            server_task("s2", "2025-01-02T00:00:00.000Z"),
        ],
        checkpoint: Some(Timestamp::parse("2025-01-02T00:00:00.000Z").unwrap()),
        ..Default::default()
    }));
    let base_url = sync_server(state.clone()).await;
    let device = device(&base_url).await;

    device.engine.sync_once().await;

    assert!(device.store.find_one("s1").await.unwrap().is_some());
    assert!(device.store.find_one("s2").await.unwrap().is_some());
    assert_eq!(
        device.checkpoints.load(TASKS_COLLECTION).await.unwrap(),
        Some(Timestamp::parse("2025-01-02T00:00:00.000Z").unwrap())
    );
    // Nothing local is newer than the pulled checkpoint
    assert!(state.lock().unwrap().pushes.is_empty());

    let created = device
        .service
        .create_task("plan-1", "Patch wall", Position::new(0.3, 0.6), vec![])
        .await
        .unwrap();
    device.engine.sync_once().await;

    let state = state.lock().unwrap();
    assert_eq!(state.pulls.len(), 2);
    assert_eq!(state.pulls[1].since.to_string(), "2025-01-02T00:00:00.000Z");
    assert_eq!(state.pushes.len(), 1);
    assert_eq!(state.pushes[0].docs, vec![created.clone()]);
    drop(state);

    assert_eq!(
        device.checkpoints.load(TASKS_COLLECTION).await.unwrap(),
        Some(created.updated_at)
    );
}

#[tokio::test]
async fn test_push_conflict_is_merged_locally() {
    let state: Shared = Arc::new(Mutex::new(ServerState::default()));
    let base_url = sync_server(state.clone()).await;
    let device = device(&base_url).await;

    let local = device
        .service
        .create_task("plan-1", "Local title", Position::new(0.5, 0.5), vec![])
        .await
        .unwrap();
    let local = device.service.add_checklist_item(&local.id, "Paint").await.unwrap();
    let item_id = local.checklist[0].id.clone();

    let mut server = local.clone();
    server.title = "Server title".to_string();
    server.client_id = Some("server-device".to_string());
    server.checklist = serde_json::from_value(json!([
        {"id": item_id, "text": "Paint", "status": "done"},
        {"id": "extra", "text": "Sand", "status": "not_started"}
    ]))
    .unwrap();
    state.lock().unwrap().conflicts.push(Conflict {
        id: local.id.clone(),
        server,
        client: local.clone(),
    });

    device.engine.sync_once().await;

    let stored = device.store.find_one(&local.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Server title");
    let ids: Vec<&str> = stored.checklist.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![item_id.as_str(), "extra"]);
    // The client's own item fields overlay the server's
    assert_eq!(
        serde_json::to_value(&stored.checklist[0]).unwrap()["status"],
        json!("not_started")
    );
}

#[tokio::test]
async fn test_error_status_surfaces_as_remote_error() {
    let router = Router::new().route(
        "/sync/pull",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base_url = spawn_server(router).await;
    let remote = HttpRemote::new(&base_url, Duration::from_secs(5)).unwrap();

    let err = remote
        .pull(&PullRequest {
            user_id: "u1".to_string(),
            since: Timestamp::epoch(),
            limit: 10,
        })
        .await
        .unwrap_err();

    match err {
        SyncError::Remote { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_pull_leaves_local_state_untouched() {
    let router = Router::new().route(
        "/sync/pull",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let base_url = spawn_server(router).await;
    let device = device(&base_url).await;
    device
        .service
        .create_task("plan-1", "Offline edit", Position::new(0.5, 0.5), vec![])
        .await
        .unwrap();

    device.engine.sync_once().await;

    assert!(device.checkpoints.load(TASKS_COLLECTION).await.unwrap().is_none());
    assert_eq!(device.engine.state(), planboard_sync::sync::SyncState::Idle);
}
