//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises the connection
//! over real HTTP through the default `UreqTransport`.

use std::net::SocketAddr;

use saturn_core::{
    DataSource, LogsRequest, ProjectSettings, ResourceFilter, ResourceType, SaturnConnection,
    SaturnError,
};
use serde_json::{json, Value};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn connect(addr: SocketAddr) -> SaturnConnection {
    SaturnConnection::new(Some(&format!("http://{addr}/")), Some(mock_server::TOKEN)).unwrap()
}

#[test]
fn project_lifecycle() {
    let addr = start_server();
    let conn = connect(addr);
    assert_eq!(conn.url(), format!("http://{addr}"));

    // Step 1: list: should be empty.
    assert_eq!(conn.list_projects().unwrap(), json!([]));

    // Step 2: create a project with pass-through settings.
    let settings = ProjectSettings::new()
        .set("description", "integration")
        .set("jupyter_size", "medium")
        .set("environment_variables", json!({"MODE": "test"}));
    let created = conn.create_project("integration-test", &settings).unwrap();
    assert_eq!(created["name"], "integration-test");
    assert_eq!(created["environment_variables"]["MODE"], "test");
    let id = created["id"].as_str().unwrap().to_string();
    let server_id = created["jupyter_server_id"].as_str().unwrap().to_string();
    let cluster_id = created["dask_cluster_id"].as_str().unwrap().to_string();

    // Step 3: get the created project.
    assert_eq!(conn.get_project(&id).unwrap(), created);

    // Step 4: update; the mock rejects `name`, so this also proves it is dropped.
    let update = ProjectSettings::new()
        .set("name", "renamed")
        .set("jupyter_size", "large");
    let updated = conn.update_project(&id, &update).unwrap();
    assert_eq!(updated["name"], "integration-test");
    assert_eq!(updated["jupyter_size"], "large");

    // Step 5: jupyter server start/stop.
    assert_eq!(conn.get_jupyter_server(&server_id).unwrap()["status"], "stopped");
    assert_eq!(conn.start_jupyter_server(&server_id).unwrap()["status"], "pending");
    assert_eq!(conn.stop_jupyter_server(&server_id).unwrap()["status"], "stopping");

    // Step 6: dask cluster start/stop.
    assert_eq!(conn.start_dask_cluster(&cluster_id).unwrap()["status"], "pending");
    assert_eq!(conn.stop_dask_cluster(&cluster_id).unwrap()["status"], "stopping");

    // Step 7: list: one project.
    assert_eq!(conn.list_projects().unwrap().as_array().unwrap().len(), 1);

    // Step 8: delete returns no content.
    assert_eq!(conn.delete_project(&id).unwrap(), Value::Null);

    // Step 9: get after delete: 404.
    let err = conn.get_project(&id).unwrap_err();
    assert!(matches!(err, SaturnError::Api { status: 404, .. }));

    // Step 10: delete again: 404 with the remote message.
    match conn.delete_project(&id).unwrap_err() {
        SaturnError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, format!("project {id} not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn platform_info() {
    let conn = connect(start_server());
    assert_eq!(conn.saturn_version().unwrap(), "2024.08.01");
    assert_eq!(conn.current_user().unwrap()["username"], "alice");
    assert_eq!(conn.orgs().unwrap().len(), 2);
    assert_eq!(conn.primary_org().unwrap()["name"], "saturn");
    assert!(conn.options().unwrap()["sizes"].is_object());
}

#[test]
fn wrong_token_is_unauthorized() {
    let addr = start_server();
    let conn = SaturnConnection::new(Some(&format!("http://{addr}")), Some("wrong")).unwrap();
    let err = conn.list_projects().unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[test]
fn unreachable_service_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let conn = connect(addr);
    let err = conn.list_projects().unwrap_err();
    assert!(matches!(err, SaturnError::Transport(_)));
}

#[test]
fn recipe_lifecycle() {
    let conn = connect(start_server());

    // Three jobs and a workspace; the mock pages two recipes at a time.
    for name in ["nightly", "weekly", "hourly"] {
        conn.apply(&json!({"type": "job", "spec": {"name": name, "command": "python run.py"}}))
            .unwrap();
    }
    let ws = conn
        .create_resource(&json!({"type": "workspace", "spec": {"name": "ws"}}), true)
        .unwrap();
    assert_eq!(ws["state"]["status"], "stopped");

    let jobs = conn.list_resources(&ResourceFilter::of_type(ResourceType::Job)).unwrap();
    let names: Vec<&str> = jobs.iter().map(|r| r["spec"]["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["nightly", "weekly", "hourly"]);
    assert_eq!(conn.list_resources(&ResourceFilter::default()).unwrap().len(), 4);

    let nightly = conn.get_resource(ResourceType::Job, "nightly", None, false).unwrap();
    let job_id = nightly["state"]["id"].as_str().unwrap().to_string();

    let started = conn.start(ResourceType::Job, &job_id, true).unwrap();
    assert_eq!(started["state"]["status"], "pending");
    assert_eq!(started["debug_mode"], true);

    let running = conn
        .list_resources(&ResourceFilter::of_type(ResourceType::Job).status("pending"))
        .unwrap();
    assert_eq!(running.len(), 1);

    assert_eq!(conn.stop(ResourceType::Job, &job_id).unwrap()["state"]["status"], "stopping");
    assert_eq!(conn.restart(ResourceType::Job, &job_id, false).unwrap()["debug_mode"], false);

    conn.schedule(&job_id, Some("0 3 * * *"), false).unwrap();
    let scheduled = conn.get_resource(ResourceType::Job, "nightly", None, false).unwrap();
    assert_eq!(scheduled["spec"]["cron_schedule_options"]["schedule"], "0 3 * * *");
    assert_eq!(scheduled["spec"]["scheduled"], true);

    // Template fetch drops state.
    let template = conn.get_resource(ResourceType::Job, "nightly", None, true).unwrap();
    assert!(template.get("state").is_none());

    assert_eq!(conn.delete(ResourceType::Job, &job_id).unwrap(), Value::Null);
    let err = conn.get_resource(ResourceType::Job, "nightly", None, false).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn clone_job_into_deployment() {
    let conn = connect(start_server());
    conn.apply(&json!({
        "type": "job",
        "spec": {
            "name": "train",
            "command": "python train.py",
            "routes": [{"container_port": 8888, "visibility": "owner"}]
        }
    }))
    .unwrap();

    let cloned = conn
        .clone_resource(&saturn_core::CloneRequest {
            resource_type: ResourceType::Job,
            resource_name: "train",
            new_resource_type: ResourceType::Deployment,
            new_resource_name: "serve",
            owner: None,
            command: Some("python serve.py"),
            ide: None,
            disk_space: None,
        })
        .unwrap();
    assert_eq!(cloned["type"], "deployment");
    assert_eq!(cloned["spec"]["name"], "serve");
    assert_eq!(cloned["spec"]["command"], "python serve.py");
    assert_eq!(cloned["spec"]["routes"], json!([]));
}

#[test]
fn pods_and_logs() {
    let conn = connect(start_server());
    let ws = conn.apply(&json!({"type": "workspace", "spec": {"name": "lab"}})).unwrap();
    let ws_id = ws["state"]["id"].as_str().unwrap().to_string();

    // Stopped: only the historical pod.
    let pods = conn.get_pods(ResourceType::Workspace, "lab", None, None, &[]).unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].pod_name, "lab-old");
    assert_eq!(pods[0].source, DataSource::Historical);

    let logs = conn.get_logs(&LogsRequest::new(ResourceType::Workspace, "lab")).unwrap();
    assert!(logs.starts_with("Pod: lab-old\n"));
    assert!(logs.contains("archived logs of lab-old"));

    // Running: live pod first, read from the runtime summary.
    conn.start(ResourceType::Workspace, &ws_id, false).unwrap();
    let pods = conn.get_pods(ResourceType::Workspace, "lab", None, None, &[]).unwrap();
    let names: Vec<&str> = pods.iter().map(|p| p.pod_name.as_str()).collect();
    assert_eq!(names, vec!["lab-live", "lab-old"]);

    let live_only = conn
        .get_pods(ResourceType::Workspace, "lab", None, Some(DataSource::Live), &[])
        .unwrap();
    assert_eq!(live_only.len(), 1);

    let completed = conn
        .get_pods(ResourceType::Workspace, "lab", None, None, &["completed"])
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].pod_name, "lab-old");

    let logs = conn.get_logs(&LogsRequest::new(ResourceType::Workspace, "lab")).unwrap();
    assert!(logs.starts_with("Pod: lab-live\n"));
    assert!(logs.contains("Container: main"));
    assert!(logs.contains("hello from lab-live"));

    let historical = conn
        .get_logs(&LogsRequest {
            source: Some(DataSource::Historical),
            ..LogsRequest::new(ResourceType::Workspace, "lab")
        })
        .unwrap();
    assert!(historical.contains("archived logs of lab-old"));
}

#[test]
fn names_with_reserved_characters_address_their_own_resource() {
    let conn = connect(start_server());
    let names = ["a", "a#b", "a?x=1", "my job"];
    for name in names {
        conn.apply(&json!({"type": "job", "spec": {"name": name}})).unwrap();
    }
    for name in names {
        let recipe = conn.get_resource(ResourceType::Job, name, None, false).unwrap();
        assert_eq!(recipe["spec"]["name"], name);
    }

    let spaced = conn.get_resource(ResourceType::Job, "my job", None, false).unwrap();
    let id = spaced["state"]["id"].as_str().unwrap().to_string();
    assert_eq!(conn.delete(ResourceType::Job, &id).unwrap(), Value::Null);
    assert!(conn.get_resource(ResourceType::Job, "my job", None, false).unwrap_err().is_not_found());
    assert_eq!(conn.get_resource(ResourceType::Job, "a", None, false).unwrap()["spec"]["name"], "a");
}
