//! `SaturnConnection`: the caller-facing API, one method per REST operation.
//!
//! # Design
//! A connection pairs a `SaturnClient` (request building, response parsing)
//! with a `Transport` (I/O). Every method is a blocking call that issues its
//! request(s) immediately and surfaces the first failure; nothing is retried
//! or cached. The connection holds no mutable state, so it can be shared
//! across threads when the transport allows it.

use std::collections::HashSet;

use serde_json::Value;

use crate::client::{api_path, with_query, SaturnClient};
use crate::error::{Result, SaturnError};
use crate::http::{HttpMethod, HttpRequest};
use crate::logs::{format_historical_logs, format_logs, is_live};
use crate::settings::Settings;
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    DataSource, Pod, PodSummary, ProjectSettings, ResourceFilter, ResourceType, RuntimeSummary,
};

/// Label the platform puts on every pod to tie it to its resource.
const RESOURCE_ID_LABEL: &str = "saturncloud.io/resource-id";

/// Connection to one Saturn instance.
#[derive(Debug, Clone)]
pub struct SaturnConnection<T = UreqTransport> {
    client: SaturnClient,
    transport: T,
}

impl SaturnConnection<UreqTransport> {
    /// Connect with explicit values, falling back to `SATURN_BASE_URL` and
    /// `SATURN_TOKEN`. Fails with `SaturnError::Configuration` when either
    /// cannot be resolved. No request is sent.
    pub fn new(url: Option<&str>, api_token: Option<&str>) -> Result<Self> {
        Ok(Self::from_settings(Settings::new(url, api_token)?))
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::from_settings(Settings::from_env()?))
    }

    pub fn from_settings(settings: Settings) -> Self {
        let transport = UreqTransport::new(settings.timeout());
        Self::with_transport(settings, transport)
    }
}

impl<T: Transport> SaturnConnection<T> {
    pub fn with_transport(settings: Settings, transport: T) -> Self {
        Self {
            client: SaturnClient::new(settings),
            transport,
        }
    }

    /// Base URL of the Saturn instance.
    pub fn url(&self) -> &str {
        self.client.settings().url()
    }

    pub fn client(&self) -> &SaturnClient {
        &self.client
    }

    /// Send an arbitrary request to `path` and decode the JSON response.
    pub fn request(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let request = self.client.build_request(method, path, body)?;
        self.send(request)
    }

    fn send(&self, request: HttpRequest) -> Result<Value> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(&request)?;
        tracing::debug!(status = response.status, url = %request.url, "received response");
        self.client.parse_response(response)
    }

    fn get(&self, path: &str) -> Result<Value> {
        self.request(HttpMethod::Get, path, None)
    }

    // --- projects ---

    /// Create a project named `name` with the given options.
    pub fn create_project(&self, name: &str, settings: &ProjectSettings) -> Result<Value> {
        self.send(self.client.build_create_project(name, settings)?)
    }

    pub fn list_projects(&self) -> Result<Value> {
        self.send(self.client.build_list_projects()?)
    }

    pub fn get_project(&self, project_id: &str) -> Result<Value> {
        self.send(self.client.build_get_project(project_id)?)
    }

    /// Update project options. A `name` key is never sent.
    pub fn update_project(&self, project_id: &str, settings: &ProjectSettings) -> Result<Value> {
        self.send(self.client.build_update_project(project_id, settings)?)
    }

    pub fn delete_project(&self, project_id: &str) -> Result<Value> {
        self.send(self.client.build_delete_project(project_id)?)
    }

    // --- jupyter servers ---

    pub fn get_jupyter_server(&self, server_id: &str) -> Result<Value> {
        self.send(self.client.build_get_jupyter_server(server_id)?)
    }

    pub fn start_jupyter_server(&self, server_id: &str) -> Result<Value> {
        self.send(self.client.build_start_jupyter_server(server_id)?)
    }

    pub fn stop_jupyter_server(&self, server_id: &str) -> Result<Value> {
        self.send(self.client.build_stop_jupyter_server(server_id)?)
    }

    // --- dask clusters ---

    pub fn start_dask_cluster(&self, cluster_id: &str) -> Result<Value> {
        self.send(self.client.build_start_dask_cluster(cluster_id)?)
    }

    pub fn stop_dask_cluster(&self, cluster_id: &str) -> Result<Value> {
        self.send(self.client.build_stop_dask_cluster(cluster_id)?)
    }

    // --- platform info ---

    /// Version string reported by `api/status`.
    pub fn saturn_version(&self) -> Result<String> {
        let status = self.get("api/status")?;
        status
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SaturnError::Unexpected("status response has no version".to_string()))
    }

    pub fn current_user(&self) -> Result<Value> {
        self.get("api/user")
    }

    pub fn orgs(&self) -> Result<Vec<Value>> {
        match self.get("api/orgs")?.get_mut("orgs").map(Value::take) {
            Some(Value::Array(orgs)) => Ok(orgs),
            _ => Err(SaturnError::Unexpected("orgs response has no orgs list".to_string())),
        }
    }

    pub fn primary_org(&self) -> Result<Value> {
        self.orgs()?
            .into_iter()
            .find(|org| org.get("is_primary").and_then(Value::as_bool) == Some(true))
            .ok_or_else(|| SaturnError::Unexpected("primary organization not found".to_string()))
    }

    /// Server size and shutoff options offered by the instance.
    pub fn options(&self) -> Result<Value> {
        self.get("api/info/servers")
    }

    // --- recipe resources ---

    /// List resource recipes, following pagination until the service stops
    /// returning `next_last_key`.
    pub fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Value>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(resource_type) = filter.resource_type {
            params.push(("type", resource_type.as_str().to_string()));
        }
        if let Some(owner) = filter.owner.as_deref().filter(|o| !o.is_empty()) {
            params.push(("owner_name", owner.to_string()));
        }
        if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
            params.push(("name", name.to_string()));
        }
        if filter.as_template {
            params.push(("as_template", "true".to_string()));
        }

        let mut recipes = Vec::new();
        let mut last_key: Option<String> = None;
        loop {
            let mut page_params: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            if let Some(key) = last_key.as_deref() {
                page_params.push(("last_key", key));
            }
            let mut page = self.get(&with_query("api/recipes", &page_params))?;
            if let Some(Value::Array(items)) = page.get_mut("recipes").map(Value::take) {
                recipes.extend(items);
            }
            last_key = match page.get("next_last_key") {
                Some(Value::String(key)) => Some(key.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            if last_key.is_none() {
                break;
            }
        }

        if !filter.status.is_empty() {
            recipes.retain(|r| {
                r.pointer("/state/status")
                    .and_then(Value::as_str)
                    .is_some_and(|s| filter.status.contains(s))
            });
        }
        Ok(recipes)
    }

    pub fn get_resource(
        &self,
        resource_type: ResourceType,
        name: &str,
        owner: Option<&str>,
        as_template: bool,
    ) -> Result<Value> {
        let mut params = Vec::new();
        if let Some(owner) = owner.filter(|o| !o.is_empty()) {
            params.push(("owner_name", owner));
        }
        if as_template {
            params.push(("as_template", "true"));
        }
        let path = api_path(&["recipes", resource_type.as_str(), name]);
        self.get(&with_query(&path, &params))
    }

    /// Create or update a resource from its recipe.
    pub fn apply(&self, recipe: &Value) -> Result<Value> {
        self.send(self.client.build_apply(recipe)?)
    }

    pub fn create_resource(&self, recipe: &Value, enforce_unknown: bool) -> Result<Value> {
        self.send(self.client.build_create_resource(recipe, enforce_unknown)?)
    }

    pub fn start(&self, resource_type: ResourceType, resource_id: &str, debug_mode: bool) -> Result<Value> {
        self.send(self.client.build_start(resource_type, resource_id, debug_mode)?)
    }

    pub fn stop(&self, resource_type: ResourceType, resource_id: &str) -> Result<Value> {
        self.send(self.client.build_stop(resource_type, resource_id)?)
    }

    pub fn restart(&self, resource_type: ResourceType, resource_id: &str, debug_mode: bool) -> Result<Value> {
        self.send(self.client.build_restart(resource_type, resource_id, debug_mode)?)
    }

    pub fn delete(&self, resource_type: ResourceType, resource_id: &str) -> Result<Value> {
        self.send(self.client.build_delete(resource_type, resource_id)?)
    }

    /// Enable or disable a job's schedule, first replacing its cron
    /// expression when one is given.
    pub fn schedule(&self, job_id: &str, cron_schedule: Option<&str>, disable: bool) -> Result<Value> {
        let base = api_path(&[&ResourceType::Job.url_name(), job_id]);
        if let Some(cron) = cron_schedule.filter(|c| !c.is_empty()) {
            let body = serde_json::json!({ "cron_schedule_options": { "schedule": cron } });
            self.request(HttpMethod::Patch, &base, Some(&body))?;
        }
        let action = if disable { "unschedule" } else { "schedule" };
        self.request(HttpMethod::Post, &format!("{base}/{action}"), None)
    }

    /// Copy an existing resource into a new one, possibly of another type.
    pub fn clone_resource(&self, request: &CloneRequest<'_>) -> Result<Value> {
        let template = self.get_resource(
            request.resource_type,
            request.resource_name,
            request.owner,
            true,
        )?;
        let recipe = clone_recipe(template, request)?;
        self.create_resource(&recipe, false)
    }

    // --- pods and logs ---

    /// Pods of a resource, newest first. Without a source, live pods come
    /// first followed by historical pods not already listed as live.
    pub fn get_pods(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
        owner: Option<&str>,
        source: Option<DataSource>,
        status: &[&str],
    ) -> Result<Vec<Pod>> {
        let resource = self.get_resource(resource_type, resource_name, owner, false)?;
        let resource_id = resource_id(&resource)?;
        let mut pods = match source {
            None => self.all_pods(resource_type, &resource_id)?,
            Some(DataSource::Live) => self.live_pods(resource_type, &resource_id)?,
            Some(DataSource::Historical) => self.historical_pods(resource_type, &resource_id)?,
        };
        if !status.is_empty() {
            pods.retain(|p| status.contains(&p.status.as_str()));
        }
        Ok(pods)
    }

    /// Formatted logs of a resource's pod.
    ///
    /// Without `pod_name`, the newest live pod is used, then the newest
    /// historical pod. Returns an empty string when there is nothing to show.
    pub fn get_logs(&self, request: &LogsRequest<'_>) -> Result<String> {
        let resource_id = match request.resource_id {
            Some(id) => id.to_string(),
            None => {
                let resource = self.get_resource(
                    request.resource_type,
                    request.resource_name,
                    request.owner,
                    false,
                )?;
                resource_id(&resource)?
            }
        };
        let want_live = request.source != Some(DataSource::Historical);
        let want_historical = request.source != Some(DataSource::Live);

        if let Some(pod_name) = request.pod_name {
            if want_live {
                let summary = self.pod_runtime_summary(pod_name, Some(&resource_id))?;
                if is_live(summary.as_ref()) {
                    if let Some(summary) = summary {
                        return Ok(format_logs(&summary, request.all_containers));
                    }
                }
            }
            if want_historical {
                return self.historical_pod_logs(request.resource_type, &resource_id, pod_name);
            }
            return Ok(String::new());
        }

        if want_live {
            if let Some(pod) = self.live_pods(request.resource_type, &resource_id)?.first() {
                return self.get_logs(&LogsRequest {
                    pod_name: Some(pod.pod_name.as_str()),
                    resource_id: Some(resource_id.as_str()),
                    source: None,
                    ..*request
                });
            }
        }
        if want_historical {
            if let Some(pod) = self.historical_pods(request.resource_type, &resource_id)?.first() {
                return self.historical_pod_logs(request.resource_type, &resource_id, &pod.pod_name);
            }
        }
        Ok(String::new())
    }

    fn all_pods(&self, resource_type: ResourceType, resource_id: &str) -> Result<Vec<Pod>> {
        let historical = self.historical_pods(resource_type, resource_id)?;
        let mut pods = self.live_pods(resource_type, resource_id)?;
        let live_names: HashSet<String> = pods.iter().map(|p| p.pod_name.clone()).collect();
        pods.extend(historical.into_iter().filter(|p| !live_names.contains(&p.pod_name)));
        Ok(pods)
    }

    fn historical_pods(&self, resource_type: ResourceType, resource_id: &str) -> Result<Vec<Pod>> {
        let path = api_path(&[&resource_type.url_name(), resource_id, "history"]);
        let mut history = self.get(&path)?;
        let raw = history.get_mut("pods").map(Value::take).unwrap_or(Value::Array(Vec::new()));
        let mut pods: Vec<Pod> =
            serde_json::from_value(raw).map_err(|e| SaturnError::Deserialization(e.to_string()))?;
        for pod in &mut pods {
            pod.source = DataSource::Historical;
        }
        sort_newest_first(&mut pods);
        Ok(pods)
    }

    fn live_pods(&self, resource_type: ResourceType, resource_id: &str) -> Result<Vec<Pod>> {
        let path = api_path(&[&resource_type.url_name(), resource_id, "runtimesummary"]);
        let summary: RuntimeSummary = serde_json::from_value(self.get(&path)?)
            .map_err(|e| SaturnError::Deserialization(e.to_string()))?;
        let last_seen = chrono::Utc::now().to_rfc3339();
        let mut pods: Vec<Pod> = summary
            .into_pod_summaries()
            .into_iter()
            .map(|summary| Pod {
                label_job_name: summary.labels.get("job-name").filter(|n| !n.is_empty()).cloned(),
                pod_name: summary.name,
                status: summary.status,
                source: DataSource::Live,
                start_time: Some(summary.started_at.unwrap_or_default()),
                end_time: Some(summary.completed_at.unwrap_or_default()),
                last_seen: Some(last_seen.clone()),
            })
            .collect();
        sort_newest_first(&mut pods);
        Ok(pods)
    }

    /// Runtime summary of a single pod; `None` when the pod is gone.
    fn pod_runtime_summary(&self, pod_name: &str, resource_id: Option<&str>) -> Result<Option<PodSummary>> {
        let path = api_path(&["pod", "namespace", "main-namespace", "name", pod_name, "runtimesummary"]);
        let value = match self.get(&path) {
            Ok(value) => value,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let summary: PodSummary =
            serde_json::from_value(value).map_err(|e| SaturnError::Deserialization(e.to_string()))?;
        if let Some(expected) = resource_id {
            if summary.labels.get(RESOURCE_ID_LABEL).map(String::as_str) != Some(expected) {
                return Err(SaturnError::Unexpected(format!(
                    "unable to find pod '{pod_name}' matching this resource"
                )));
            }
        }
        Ok(Some(summary))
    }

    fn historical_pod_logs(&self, resource_type: ResourceType, resource_id: &str, pod_name: &str) -> Result<String> {
        let path = with_query(
            &api_path(&[&resource_type.url_name(), resource_id, "logs"]),
            &[("pod_name", pod_name)],
        );
        let result = self.get(&path)?;
        let logs = result.get("logs").and_then(Value::as_str).unwrap_or_default();
        Ok(format_historical_logs(pod_name, logs))
    }
}

/// Parameters for `SaturnConnection::get_logs`.
#[derive(Debug, Clone, Copy)]
pub struct LogsRequest<'a> {
    pub resource_type: ResourceType,
    pub resource_name: &'a str,
    pub owner: Option<&'a str>,
    pub pod_name: Option<&'a str>,
    /// Skips the recipe lookup when already known.
    pub resource_id: Option<&'a str>,
    pub source: Option<DataSource>,
    pub all_containers: bool,
}

impl<'a> LogsRequest<'a> {
    pub fn new(resource_type: ResourceType, resource_name: &'a str) -> Self {
        Self {
            resource_type,
            resource_name,
            owner: None,
            pod_name: None,
            resource_id: None,
            source: None,
            all_containers: false,
        }
    }
}

/// Parameters for `SaturnConnection::clone_resource`.
#[derive(Debug, Clone, Copy)]
pub struct CloneRequest<'a> {
    pub resource_type: ResourceType,
    pub resource_name: &'a str,
    pub new_resource_type: ResourceType,
    pub new_resource_name: &'a str,
    pub owner: Option<&'a str>,
    /// Command for deployments and jobs.
    pub command: Option<&'a str>,
    /// IDE and disk space apply when cloning from a workspace.
    pub ide: Option<&'a str>,
    pub disk_space: Option<&'a str>,
}

fn resource_id(resource: &Value) -> Result<String> {
    resource
        .pointer("/state/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SaturnError::Unexpected("resource has no state.id".to_string()))
}

fn sort_newest_first(pods: &mut [Pod]) {
    pods.sort_by(|a, b| {
        let key_a = (a.start_time.as_deref().unwrap_or_default(), a.pod_name.as_str());
        let key_b = (b.start_time.as_deref().unwrap_or_default(), b.pod_name.as_str());
        key_b.cmp(&key_a)
    });
}

/// Rewrite a template recipe into the recipe of the clone.
fn clone_recipe(mut recipe: Value, request: &CloneRequest<'_>) -> Result<Value> {
    let source_type = recipe
        .get("type")
        .and_then(Value::as_str)
        .map(ResourceType::lookup)
        .transpose()?
        .unwrap_or(request.resource_type);
    let default_port = source_type.default_port();
    let new_type = request.new_resource_type;

    let spec = recipe
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| SaturnError::Unexpected("recipe has no spec".to_string()))?;

    if let Some(Value::Array(routes)) = spec.get_mut("routes") {
        routes.retain(|r| r.get("container_port").and_then(Value::as_u64) != Some(default_port));
        if source_type == ResourceType::Workspace {
            for route in routes.iter_mut() {
                let visibility = route.get("visibility").and_then(Value::as_str);
                if !matches!(visibility, Some("owner") | Some("org")) {
                    if let Some(route) = route.as_object_mut() {
                        route.insert("visibility".to_string(), Value::from("org"));
                    }
                }
            }
        }
    }
    if let Some(Value::Array(viewers)) = spec.get_mut("viewers") {
        viewers.retain(|v| {
            v.pointer("/route/container_port").and_then(Value::as_u64) != Some(default_port)
        });
    }

    spec.insert("name".to_string(), Value::from(request.new_resource_name));
    if matches!(new_type, ResourceType::Deployment | ResourceType::Job) {
        spec.insert("command".to_string(), request.command.map_or(Value::Null, Value::from));
    }
    if new_type == ResourceType::Job {
        spec.insert("start_dind".to_string(), Value::Bool(false));
    }
    if request.resource_type != ResourceType::Workspace && new_type == ResourceType::Workspace {
        if let Some(Value::Array(repos)) = spec.get_mut("git_repositories") {
            for repo in repos.iter_mut().filter_map(Value::as_object_mut) {
                repo.insert("on_restart".to_string(), Value::from("preserve changes"));
            }
        }
    }
    if request.resource_type == ResourceType::Workspace {
        spec.insert("ide".to_string(), request.ide.map_or(Value::Null, Value::from));
        spec.insert("disk_space".to_string(), request.disk_space.map_or(Value::Null, Value::from));
    }
    recipe["type"] = Value::from(new_type.as_str());
    Ok(recipe)
}
