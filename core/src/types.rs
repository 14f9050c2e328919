//! Domain types for the Saturn API.
//!
//! # Design
//! Resource bodies are passed through as `serde_json::Value`; the service
//! owns their schema and it evolves independently of this crate. The types
//! here are the few shapes the client itself has to interpret: resource
//! type names used in URLs, pod listings and runtime summaries used for log
//! formatting, and the opaque settings payload.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SaturnError;

/// Recipe-backed resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Deployment,
    Job,
    Workspace,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Deployment,
        ResourceType::Job,
        ResourceType::Workspace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Deployment => "deployment",
            ResourceType::Job => "job",
            ResourceType::Workspace => "workspace",
        }
    }

    /// Name used in resource URLs (`api/jobs/...`).
    pub fn url_name(&self) -> String {
        format!("{}s", self.as_str())
    }

    /// Case-insensitive lookup that also accepts the plural form.
    pub fn lookup(value: &str) -> Result<Self, SaturnError> {
        let lowered = value.to_lowercase();
        let find = |name: &str| Self::ALL.into_iter().find(|t| t.as_str() == name);
        find(lowered.as_str())
            .or_else(|| lowered.strip_suffix('s').and_then(find))
            .ok_or_else(|| SaturnError::UnknownResourceType(value.to_string()))
    }

    /// Port of the route the platform creates by default for this type.
    pub fn default_port(&self) -> u64 {
        match self {
            ResourceType::Deployment => 8000,
            _ => 8888,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = SaturnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
    }
}

/// Lifecycle states reported in `state.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Running => "running",
            ResourceStatus::Stopping => "stopping",
            ResourceStatus::Stopped => "stopped",
            ResourceStatus::Error => "error",
        }
    }

    pub const ALL: [ResourceStatus; 5] = [
        ResourceStatus::Pending,
        ResourceStatus::Running,
        ResourceStatus::Stopping,
        ResourceStatus::Stopped,
        ResourceStatus::Error,
    ];

    pub fn lookup(value: &str) -> Result<Self, SaturnError> {
        let lowered = value.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == lowered)
            .ok_or_else(|| SaturnError::UnknownResourceStatus(value.to_string()))
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = SaturnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
    }
}

/// Where pods and logs are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Historical,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Historical => "historical",
        }
    }

    pub fn lookup(value: &str) -> Result<Self, SaturnError> {
        match value.to_lowercase().as_str() {
            "live" => Ok(DataSource::Live),
            "historical" => Ok(DataSource::Historical),
            _ => Err(SaturnError::UnknownDataSource(value.to_string())),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = SaturnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
    }
}

/// Opaque option map sent as a project body. Keys are not validated
/// locally; the service rejects what it does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectSettings(Map<String, Value>);

impl ProjectSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ProjectSettings {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Query for `SaturnConnection::list_resources`.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub resource_type: Option<ResourceType>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub as_template: bool,
    /// Applied locally to `state.status` after all pages are fetched.
    pub status: BTreeSet<String>,
}

impl ResourceFilter {
    pub fn of_type(resource_type: ResourceType) -> Self {
        Self {
            resource_type: Some(resource_type),
            ..Self::default()
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status.insert(status.into());
        self
    }
}

/// A pod belonging to a resource, either currently running or recorded in
/// the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub pod_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default = "default_source")]
    pub source: DataSource,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_job_name: Option<String>,
}

fn default_source() -> DataSource {
    DataSource::Historical
}

/// History rows may carry `null` where a string is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Runtime summary for a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub previous: Option<Box<ContainerSummary>>,
}

/// Runtime summary for a pod, as returned by the `runtimesummary` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub container_summaries: Vec<ContainerSummary>,
    #[serde(default)]
    pub init_container_summaries: Vec<ContainerSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct JobSummary {
    #[serde(default)]
    pub pod_summaries: Vec<PodSummary>,
}

/// Resource-level runtime summary. Jobs nest pods under `job_summaries`,
/// other resources list them directly.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RuntimeSummary {
    #[serde(default)]
    pub job_summaries: Option<Vec<JobSummary>>,
    #[serde(default)]
    pub pod_summaries: Vec<PodSummary>,
}

impl RuntimeSummary {
    pub fn into_pod_summaries(self) -> Vec<PodSummary> {
        match self.job_summaries {
            Some(jobs) => jobs.into_iter().flat_map(|j| j.pod_summaries).collect(),
            None => self.pod_summaries,
        }
    }
}
