//! Stateless HTTP request builder and response parser for the Saturn API.
//!
//! # Design
//! `SaturnClient` holds only the resolved `Settings` and carries no mutable
//! state between calls. Every operation is split into a `build_*` method
//! that produces an `HttpRequest` and a shared `parse_response` that turns
//! an `HttpResponse` into the decoded JSON body. Bodies are passed through
//! without reshaping; the service owns their schema.

use serde_json::{Map, Value};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

use crate::error::{Result, SaturnError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::settings::Settings;
use crate::types::{ProjectSettings, ResourceType};

/// Request builder and response parser bound to one Saturn instance.
#[derive(Debug, Clone)]
pub struct SaturnClient {
    settings: Settings,
}

impl SaturnClient {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.url(), path.trim_start_matches('/'))
    }

    /// Build a request for `path` (relative to the base URL), serializing
    /// `body` as JSON when present.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpRequest> {
        let mut headers = self.settings.headers();
        let body = match body {
            Some(body) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(
                    serde_json::to_string(body)
                        .map_err(|e| SaturnError::Serialization(e.to_string()))?,
                )
            }
            None => None,
        };
        Ok(HttpRequest {
            method,
            url: self.url(path),
            headers,
            body,
        })
    }

    // --- projects ---

    pub fn build_create_project(
        &self,
        name: &str,
        settings: &ProjectSettings,
    ) -> Result<HttpRequest> {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(name.to_string()));
        for (key, value) in settings.clone().into_map() {
            if key != "name" {
                body.insert(key, value);
            }
        }
        self.build_request(HttpMethod::Post, "api/projects", Some(&Value::Object(body)))
    }

    pub fn build_list_projects(&self) -> Result<HttpRequest> {
        self.build_request(HttpMethod::Get, "api/projects", None)
    }

    pub fn build_get_project(&self, project_id: &str) -> Result<HttpRequest> {
        self.build_request(HttpMethod::Get, &api_path(&["projects", project_id]), None)
    }

    /// Project names are immutable, so a `name` key is dropped from the
    /// payload.
    pub fn build_update_project(
        &self,
        project_id: &str,
        settings: &ProjectSettings,
    ) -> Result<HttpRequest> {
        let mut settings = settings.clone();
        if settings.remove("name").is_some() {
            tracing::warn!(project_id, "ignoring `name` in project update; names cannot be changed");
        }
        let body = serde_json::to_value(&settings)
            .map_err(|e| SaturnError::Serialization(e.to_string()))?;
        self.build_request(
            HttpMethod::Patch,
            &api_path(&["projects", project_id]),
            Some(&body),
        )
    }

    pub fn build_delete_project(&self, project_id: &str) -> Result<HttpRequest> {
        self.build_request(HttpMethod::Delete, &api_path(&["projects", project_id]), None)
    }

    // --- jupyter servers ---

    pub fn build_get_jupyter_server(&self, server_id: &str) -> Result<HttpRequest> {
        self.build_request(HttpMethod::Get, &api_path(&["jupyter_servers", server_id]), None)
    }

    pub fn build_start_jupyter_server(&self, server_id: &str) -> Result<HttpRequest> {
        self.build_request(
            HttpMethod::Post,
            &api_path(&["jupyter_servers", server_id, "start"]),
            None,
        )
    }

    pub fn build_stop_jupyter_server(&self, server_id: &str) -> Result<HttpRequest> {
        self.build_request(
            HttpMethod::Post,
            &api_path(&["jupyter_servers", server_id, "stop"]),
            None,
        )
    }

    // --- dask clusters ---

    pub fn build_start_dask_cluster(&self, cluster_id: &str) -> Result<HttpRequest> {
        self.build_request(
            HttpMethod::Post,
            &api_path(&["dask_clusters", cluster_id, "start"]),
            None,
        )
    }

    pub fn build_stop_dask_cluster(&self, cluster_id: &str) -> Result<HttpRequest> {
        self.build_request(
            HttpMethod::Post,
            &api_path(&["dask_clusters", cluster_id, "close"]),
            None,
        )
    }

    // --- recipe resources ---

    pub fn build_create_resource(&self, recipe: &Value, enforce_unknown: bool) -> Result<HttpRequest> {
        let flag = if enforce_unknown { "true" } else { "false" };
        let path = with_query("api/recipes", &[("enforce_unknown", flag)]);
        self.build_request(HttpMethod::Post, &path, Some(recipe))
    }

    pub fn build_apply(&self, recipe: &Value) -> Result<HttpRequest> {
        self.build_request(HttpMethod::Put, "api/recipes", Some(recipe))
    }

    pub fn build_start(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        debug_mode: bool,
    ) -> Result<HttpRequest> {
        self.build_lifecycle(resource_type, resource_id, "start", debug_mode)
    }

    pub fn build_restart(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        debug_mode: bool,
    ) -> Result<HttpRequest> {
        self.build_lifecycle(resource_type, resource_id, "restart", debug_mode)
    }

    pub fn build_stop(&self, resource_type: ResourceType, resource_id: &str) -> Result<HttpRequest> {
        self.build_lifecycle(resource_type, resource_id, "stop", false)
    }

    pub fn build_delete(&self, resource_type: ResourceType, resource_id: &str) -> Result<HttpRequest> {
        self.build_request(
            HttpMethod::Delete,
            &api_path(&[&resource_type.url_name(), resource_id]),
            None,
        )
    }

    fn build_lifecycle(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        action: &str,
        debug_mode: bool,
    ) -> Result<HttpRequest> {
        let body = debug_mode.then(|| serde_json::json!({ "debug_mode": true }));
        self.build_request(
            HttpMethod::Post,
            &api_path(&[&resource_type.url_name(), resource_id, action]),
            body.as_ref(),
        )
    }

    /// Decode a response body, mapping non-2xx statuses to `SaturnError::Api`.
    ///
    /// Empty bodies (204 and friends) decode to `Value::Null`.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Value> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| SaturnError::Deserialization(e.to_string()))
    }
}

/// Characters escaped inside a single path segment: the URL path set plus
/// `/` and `%`, so an id always stays one segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Join `segments` under `api/`, percent-encoding each one.
pub fn api_path(segments: &[&str]) -> String {
    let mut path = String::from("api");
    for segment in segments {
        path.push('/');
        path.extend(utf8_percent_encode(segment, PATH_SEGMENT));
    }
    path
}

/// Append URL-encoded query parameters to `path`.
pub fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

/// Map non-success status codes to `SaturnError::Api`, extracting the
/// remote message when the body carries one.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(SaturnError::Api {
        status: response.status,
        message: error_message(response),
    })
}

fn error_message(response: &HttpResponse) -> String {
    let body = response.body.trim();
    if body.is_empty() {
        return canonical_reason(response.status);
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.to_string(),
    }
}

fn canonical_reason(status: u16) -> String {
    ureq::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map_or_else(|| format!("HTTP {status}"), str::to_string)
}
