//! Synchronous client for the Saturn Cloud REST API.
//!
//! # Overview
//! `SaturnConnection` exposes one blocking method per API operation
//! (projects, Jupyter servers, Dask clusters, recipe resources, pods and
//! logs). Each method builds a request, sends it through a `Transport`, and
//! returns the decoded JSON body as the service sent it.
//!
//! # Design
//! - `SaturnClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network, so request shapes are testable in
//!   isolation.
//! - `Transport` is the only I/O seam; `UreqTransport` is the default.
//! - `Settings` resolves the base URL and token from explicit arguments,
//!   then the environment, and fails with `SaturnError::Configuration`
//!   otherwise.
//! - Nothing is retried or cached. Errors go straight to the caller.

pub mod client;
pub mod connection;
pub mod error;
pub mod http;
pub mod logs;
pub mod settings;
pub mod transport;
pub mod types;

pub use client::SaturnClient;
pub use connection::{CloneRequest, LogsRequest, SaturnConnection};
pub use error::{Result, SaturnError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use settings::Settings;
pub use transport::{Transport, UreqTransport};
pub use types::{
    ContainerSummary, DataSource, Pod, PodSummary, ProjectSettings, ResourceFilter,
    ResourceStatus, ResourceType,
};
