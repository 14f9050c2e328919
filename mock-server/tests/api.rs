use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, TOKEN};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn authed(method: &str, uri: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("token {TOKEN}"))
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    authed(method, uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    authed(method, uri).body(String::new()).unwrap()
}

// --- auth ---

#[tokio::test]
async fn status_needs_no_token() {
    let resp = app()
        .oneshot(Request::builder().uri("/api/status").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let status = body_json(resp).await;
    assert!(status["version"].is_string());
}

#[tokio::test]
async fn missing_token_returns_401() {
    let resp = app()
        .oneshot(Request::builder().uri("/api/projects").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "invalid API token");
}

// --- projects ---

#[tokio::test]
async fn list_projects_empty() {
    let resp = app().oneshot(empty_request("GET", "/api/projects")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!([]));
}

#[tokio::test]
async fn create_project_returns_201_with_ids() {
    let resp = app()
        .oneshot(json_request("POST", "/api/projects", r#"{"name":"demo","description":"d"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let project = body_json(resp).await;
    assert_eq!(project["name"], "demo");
    assert_eq!(project["description"], "d");
    assert!(project["id"].is_string());
    assert!(project["jupyter_server_id"].is_string());
    assert!(project["dask_cluster_id"].is_string());
}

#[tokio::test]
async fn create_project_without_name_returns_400() {
    let resp = app()
        .oneshot(json_request("POST", "/api/projects", r#"{"description":"no name"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_project_not_found() {
    let resp = app().oneshot(empty_request("GET", "/api/projects/missing")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "project missing not found");
}

#[tokio::test]
async fn update_project_rejects_name() {
    let resp = app()
        .oneshot(json_request("PATCH", "/api/projects/any", r#"{"name":"x"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_project_not_found() {
    let resp = app().oneshot(empty_request("DELETE", "/api/projects/missing")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- recipes ---

#[tokio::test]
async fn get_recipe_not_found() {
    let resp = app()
        .oneshot(empty_request("GET", "/api/recipes/job/nightly"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_recipe_enforces_unknown_fields() {
    let recipe = r#"{"type":"job","spec":{"name":"nightly"},"unknown_field":1}"#;
    let resp = app()
        .oneshot(json_request("POST", "/api/recipes?enforce_unknown=true", recipe))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = app()
        .oneshot(json_request("POST", "/api/recipes?enforce_unknown=false", recipe))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

// --- full project lifecycle ---

#[tokio::test]
async fn project_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("POST", "/api/projects", r#"{"name":"walk-dog"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    let server_id = created["jupyter_server_id"].as_str().unwrap().to_string();

    // list: should contain the one project
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/api/projects"))
        .await
        .unwrap();
    let projects = body_json(resp).await;
    assert_eq!(projects.as_array().unwrap().len(), 1);
    assert_eq!(projects[0]["id"], id.as_str());

    // update: merges options
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PATCH",
            &format!("/api/projects/{id}"),
            r#"{"jupyter_size":"large"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await;
    assert_eq!(updated["name"], "walk-dog"); // unchanged
    assert_eq!(updated["jupyter_size"], "large");

    // start the jupyter server
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("POST", &format!("/api/jupyter_servers/{server_id}/start")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "pending");

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("DELETE", &format!("/api/projects/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // the server went with the project
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", &format!("/api/jupyter_servers/{server_id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recipes_paginate() {
    use tower::Service;

    let mut app = app().into_service();
    for name in ["a", "b", "c"] {
        let body = json!({"type": "job", "spec": {"name": name}}).to_string();
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(json_request("PUT", "/api/recipes", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/api/recipes?type=job"))
        .await
        .unwrap();
    let page = body_json(resp).await;
    assert_eq!(page["recipes"].as_array().unwrap().len(), 2);
    assert_eq!(page["next_last_key"], 2);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/api/recipes?type=job&last_key=2"))
        .await
        .unwrap();
    let page = body_json(resp).await;
    assert_eq!(page["recipes"][0]["spec"]["name"], "c");
    assert!(page["next_last_key"].is_null());
}
