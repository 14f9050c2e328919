//! In-memory emulation of the Saturn REST surface used by the client tests.
//!
//! Every route except `/api/status` requires `Authorization: token <TOKEN>`.
//! Errors are JSON bodies of the form `{"message": "..."}`.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Token accepted by the mock server.
pub const TOKEN: &str = "test-token";

/// Recipes per page for `GET /api/recipes`.
pub const PAGE_SIZE: usize = 2;

#[derive(Default)]
pub struct Store {
    pub projects: HashMap<String, Value>,
    pub jupyter_servers: HashMap<String, Value>,
    pub dask_clusters: HashMap<String, Value>,
    /// Insertion order gives stable pagination.
    pub recipes: Vec<Value>,
}

pub type Db = Arc<RwLock<Store>>;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("{what} {id} not found"))
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    let api = Router::new()
        .route("/api/user", get(current_user))
        .route("/api/orgs", get(orgs))
        .route("/api/info/servers", get(server_options))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/jupyter_servers/{id}", get(get_jupyter_server))
        .route("/api/jupyter_servers/{id}/start", post(start_jupyter_server))
        .route("/api/jupyter_servers/{id}/stop", post(stop_jupyter_server))
        .route("/api/dask_clusters/{id}/start", post(start_dask_cluster))
        .route("/api/dask_clusters/{id}/close", post(close_dask_cluster))
        .route("/api/recipes", get(list_recipes).post(create_recipe).put(apply_recipe))
        .route("/api/recipes/{kind}/{name}", get(get_recipe))
        .route("/api/{kinds}/{id}", axum::routing::delete(delete_resource).patch(patch_resource))
        .route("/api/{kinds}/{id}/{action}", get(resource_info).post(resource_action))
        .route(
            "/api/pod/namespace/main-namespace/name/{pod}/runtimesummary",
            get(pod_runtime_summary),
        )
        .route_layer(middleware::from_fn(require_token));
    Router::new()
        .route("/api/status", get(status))
        .merge(api)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_token(headers: HeaderMap, request: Request, next: Next) -> Response {
    let expected = format!("token {TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => next.run(request).await,
        _ => ApiError(StatusCode::UNAUTHORIZED, "invalid API token".to_string()).into_response(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError(StatusCode::BAD_REQUEST, "expected a JSON object".to_string())),
    }
}

async fn status() -> Json<Value> {
    Json(json!({ "version": "2024.08.01", "status": "ok" }))
}

async fn current_user() -> Json<Value> {
    Json(json!({ "id": "u1", "username": "alice", "email": "alice@example.com" }))
}

async fn orgs() -> Json<Value> {
    Json(json!({ "orgs": [
        { "id": "o2", "name": "research", "is_primary": false },
        { "id": "o1", "name": "saturn", "is_primary": true }
    ]}))
}

async fn server_options() -> Json<Value> {
    Json(json!({
        "sizes": { "medium": "Medium - 2 cores - 4 GB RAM", "large": "Large - 2 cores - 16 GB RAM" },
        "auto_shutoff": ["Never", "1 hour", "6 hours"]
    }))
}

// --- projects ---

async fn list_projects(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let mut projects: Vec<Value> = store.projects.values().cloned().collect();
    projects.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Json(Value::Array(projects))
}

async fn create_project(State(db): State<Db>, Json(body): Json<Value>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut project = object(body)?;
    let name = project
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "name is required".to_string()))?
        .to_string();

    let mut store = db.write().await;
    if store.projects.values().any(|p| p["name"] == name.as_str()) {
        return Err(ApiError(StatusCode::CONFLICT, format!("project {name} already exists")));
    }
    let id = new_id();
    let server_id = new_id();
    let cluster_id = new_id();
    store.jupyter_servers.insert(
        server_id.clone(),
        json!({ "id": server_id, "project_id": id, "status": "stopped" }),
    );
    store.dask_clusters.insert(
        cluster_id.clone(),
        json!({ "id": cluster_id, "project_id": id, "status": "stopped" }),
    );
    project.insert("id".to_string(), Value::from(id.clone()));
    project.insert("jupyter_server_id".to_string(), Value::from(server_id));
    project.insert("dask_cluster_id".to_string(), Value::from(cluster_id));
    let project = Value::Object(project);
    store.projects.insert(id, project.clone());
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    let store = db.read().await;
    store.projects.get(&id).cloned().map(Json).ok_or_else(|| not_found("project", &id))
}

async fn update_project(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    let changes = object(body)?;
    if changes.contains_key("name") {
        return Err(ApiError(StatusCode::BAD_REQUEST, "name cannot be updated".to_string()));
    }
    let mut store = db.write().await;
    let project = store
        .projects
        .get_mut(&id)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| not_found("project", &id))?;
    project.extend(changes);
    Ok(Json(Value::Object(project.clone())))
}

async fn delete_project(State(db): State<Db>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let mut store = db.write().await;
    let project = store.projects.remove(&id).ok_or_else(|| not_found("project", &id))?;
    if let Some(server_id) = project["jupyter_server_id"].as_str() {
        store.jupyter_servers.remove(server_id);
    }
    if let Some(cluster_id) = project["dask_cluster_id"].as_str() {
        store.dask_clusters.remove(cluster_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- jupyter servers and dask clusters ---

async fn get_jupyter_server(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    let store = db.read().await;
    store.jupyter_servers.get(&id).cloned().map(Json).ok_or_else(|| not_found("jupyter server", &id))
}

async fn set_status(
    db: &Db,
    pick: fn(&mut Store) -> &mut HashMap<String, Value>,
    what: &str,
    id: &str,
    status: &str,
) -> ApiResult {
    let mut store = db.write().await;
    let entry = pick(&mut *store).get_mut(id).ok_or_else(|| not_found(what, id))?;
    entry["status"] = Value::from(status);
    Ok(Json(entry.clone()))
}

async fn start_jupyter_server(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    set_status(&db, |s| &mut s.jupyter_servers, "jupyter server", &id, "pending").await
}

async fn stop_jupyter_server(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    set_status(&db, |s| &mut s.jupyter_servers, "jupyter server", &id, "stopping").await
}

async fn start_dask_cluster(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    set_status(&db, |s| &mut s.dask_clusters, "dask cluster", &id, "pending").await
}

async fn close_dask_cluster(State(db): State<Db>, Path(id): Path<String>) -> ApiResult {
    set_status(&db, |s| &mut s.dask_clusters, "dask cluster", &id, "stopping").await
}

// --- recipes ---

#[derive(Deserialize)]
pub struct RecipeQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub last_key: Option<usize>,
    pub enforce_unknown: Option<String>,
}

fn recipe_name(recipe: &Value) -> Option<&str> {
    recipe.pointer("/spec/name").and_then(Value::as_str)
}

fn recipe_kind(recipe: &Value) -> Option<&str> {
    recipe.get("type").and_then(Value::as_str)
}

fn singular(kinds: &str) -> &str {
    kinds.strip_suffix('s').unwrap_or(kinds)
}

async fn list_recipes(State(db): State<Db>, Query(query): Query<RecipeQuery>) -> Json<Value> {
    let store = db.read().await;
    let matching: Vec<&Value> = store
        .recipes
        .iter()
        .filter(|r| query.kind.as_deref().map_or(true, |k| recipe_kind(r) == Some(k)))
        .filter(|r| query.name.as_deref().map_or(true, |n| recipe_name(r) == Some(n)))
        .filter(|r| {
            query
                .owner_name
                .as_deref()
                .map_or(true, |o| r.pointer("/spec/owner").and_then(Value::as_str) == Some(o))
        })
        .collect();
    let start = query.last_key.unwrap_or(0);
    let end = (start + PAGE_SIZE).min(matching.len());
    let page: Vec<Value> = matching
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|r| (*r).clone())
        .collect();
    let next_last_key = (end < matching.len()).then_some(end);
    Json(json!({ "recipes": page, "next_last_key": next_last_key }))
}

fn insert_recipe(store: &mut Store, recipe: Value) -> Result<Value, ApiError> {
    let mut recipe = object(recipe)?;
    let kind = recipe
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "type is required".to_string()))?
        .to_string();
    let spec = recipe
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "spec is required".to_string()))?;
    if !spec.get("name").is_some_and(Value::is_string) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "spec.name is required".to_string()));
    }
    spec.entry("owner").or_insert_with(|| Value::from("alice"));
    let recipe = Value::Object(recipe);
    let existing = store
        .recipes
        .iter()
        .position(|r| recipe_kind(r) == Some(kind.as_str()) && recipe_name(r) == recipe_name(&recipe));
    let stored = match existing {
        Some(index) => {
            let state = store.recipes[index]["state"].clone();
            let mut updated = recipe;
            updated["state"] = state;
            store.recipes[index] = updated.clone();
            updated
        }
        None => {
            let mut created = recipe;
            created["state"] = json!({ "id": new_id(), "status": "stopped" });
            store.recipes.push(created.clone());
            created
        }
    };
    Ok(stored)
}

async fn create_recipe(
    State(db): State<Db>,
    Query(query): Query<RecipeQuery>,
    Json(recipe): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let enforce = query.enforce_unknown.as_deref() != Some("false");
    if enforce && recipe.get("unknown_field").is_some() {
        return Err(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "unknown field".to_string()));
    }
    let mut store = db.write().await;
    if let (Some(kind), Some(name)) = (recipe_kind(&recipe), recipe_name(&recipe)) {
        if store.recipes.iter().any(|r| recipe_kind(r) == Some(kind) && recipe_name(r) == Some(name)) {
            return Err(ApiError(StatusCode::CONFLICT, format!("{kind} {name} already exists")));
        }
    }
    let stored = insert_recipe(&mut *store, recipe)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn apply_recipe(State(db): State<Db>, Json(recipe): Json<Value>) -> ApiResult {
    let mut store = db.write().await;
    insert_recipe(&mut *store, recipe).map(Json)
}

async fn get_recipe(
    State(db): State<Db>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let store = db.read().await;
    let recipe = store
        .recipes
        .iter()
        .find(|r| recipe_kind(r) == Some(kind.as_str()) && recipe_name(r) == Some(name.as_str()))
        .ok_or_else(|| not_found(&kind, &name))?;
    let mut recipe = recipe.clone();
    if query.get("as_template").map(String::as_str) == Some("true") {
        if let Some(map) = recipe.as_object_mut() {
            map.remove("state");
        }
    }
    Ok(Json(recipe))
}

fn find_by_id<'a>(store: &'a mut Store, kinds: &str, id: &str) -> Option<&'a mut Value> {
    let kind = singular(kinds);
    store
        .recipes
        .iter_mut()
        .find(|r| recipe_kind(r) == Some(kind) && r.pointer("/state/id").and_then(Value::as_str) == Some(id))
}

async fn delete_resource(
    State(db): State<Db>,
    Path((kinds, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let mut store = db.write().await;
    let kind = singular(&kinds).to_string();
    let before = store.recipes.len();
    store.recipes.retain(|r| {
        !(recipe_kind(r) == Some(kind.as_str()) && r.pointer("/state/id").and_then(Value::as_str) == Some(id.as_str()))
    });
    if store.recipes.len() == before {
        return Err(not_found(&kind, &id));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn resource_action(
    State(db): State<Db>,
    Path((kinds, id, action)): Path<(String, String, String)>,
    body: Option<Json<Value>>,
) -> ApiResult {
    let status = match action.as_str() {
        "start" | "restart" => Some("pending"),
        "stop" => Some("stopping"),
        "schedule" | "unschedule" if kinds == "jobs" => None,
        _ => return Err(ApiError(StatusCode::NOT_FOUND, format!("unknown action {action}"))),
    };
    let debug_mode = body
        .and_then(|Json(b)| b.get("debug_mode").and_then(Value::as_bool))
        .unwrap_or(false);
    let mut store = db.write().await;
    let recipe = find_by_id(&mut *store, &kinds, &id).ok_or_else(|| not_found(singular(&kinds), &id))?;
    match status {
        Some(status) => recipe["state"]["status"] = Value::from(status),
        None => recipe["spec"]["scheduled"] = Value::Bool(action == "schedule"),
    }
    Ok(Json(json!({ "state": recipe["state"].clone(), "debug_mode": debug_mode })))
}

async fn patch_resource(
    State(db): State<Db>,
    Path((kinds, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    let changes = object(body)?;
    let mut store = db.write().await;
    let recipe = find_by_id(&mut *store, &kinds, &id).ok_or_else(|| not_found(singular(&kinds), &id))?;
    if let Some(spec) = recipe.get_mut("spec").and_then(Value::as_object_mut) {
        spec.extend(changes);
    }
    Ok(Json(recipe.clone()))
}

fn live_pod_name(recipe: &Value) -> Option<String> {
    let status = recipe.pointer("/state/status").and_then(Value::as_str)?;
    if status != "pending" && status != "running" {
        return None;
    }
    recipe_name(recipe).map(|name| format!("{name}-live"))
}

fn live_pod_summary(recipe: &Value, pod_name: &str) -> Value {
    let resource_id = recipe.pointer("/state/id").cloned().unwrap_or(Value::Null);
    json!({
        "name": pod_name,
        "status": "running",
        "started_at": "2024-08-01T12:00:00+00:00",
        "labels": { "saturncloud.io/resource-id": resource_id },
        "container_summaries": [
            { "name": "main", "status": "running", "logs": format!("hello from {pod_name}") }
        ],
        "init_container_summaries": []
    })
}

/// `history`, `runtimesummary` and `logs` views of a resource.
async fn resource_info(
    State(db): State<Db>,
    Path((kinds, id, view)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let mut store = db.write().await;
    let recipe = find_by_id(&mut *store, &kinds, &id).ok_or_else(|| not_found(singular(&kinds), &id))?;
    let name = recipe_name(recipe).unwrap_or_default().to_string();
    match view.as_str() {
        "history" => Ok(Json(json!({ "pods": [{
            "pod_name": format!("{name}-old"),
            "status": "completed",
            "start_time": "2024-07-01T12:00:00+00:00",
            "end_time": "2024-07-01T13:00:00+00:00"
        }]}))),
        "runtimesummary" => {
            let pods: Vec<Value> = live_pod_name(recipe)
                .map(|pod| live_pod_summary(recipe, &pod))
                .into_iter()
                .collect();
            Ok(Json(json!({ "pod_summaries": pods })))
        }
        "logs" => {
            let pod = query.get("pod_name").cloned().unwrap_or_default();
            Ok(Json(json!({ "logs": format!("archived logs of {pod}") })))
        }
        _ => Err(ApiError(StatusCode::NOT_FOUND, format!("unknown view {view}"))),
    }
}

async fn pod_runtime_summary(State(db): State<Db>, Path(pod): Path<String>) -> ApiResult {
    let store = db.read().await;
    store
        .recipes
        .iter()
        .find(|r| live_pod_name(r).as_deref() == Some(pod.as_str()))
        .map(|r| Json(live_pod_summary(r, &pod)))
        .ok_or_else(|| not_found("pod", &pod))
}
