use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use saturn_core::{
    DataSource, LogsRequest, ResourceFilter, ResourceStatus, ResourceType, SaturnConnection,
    SaturnError,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

mod output;

use output::{pod_table, print_json, resource_table, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "sc")]
#[command(about = "Manage Saturn Cloud workspaces, jobs and deployments")]
#[command(version)]
struct Args {
    /// Base URL of the Saturn Cloud instance
    #[arg(long, global = true, env = "SATURN_BASE_URL")]
    url: Option<String>,

    /// API token
    #[arg(long, global = true, env = "SATURN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List resources belonging to an owner (workspace, deployment, job)
    List {
        resource_type: ResourceType,
        /// Resource owner name. Defaults to the current auth identity.
        #[arg(long)]
        owner: Option<String>,
        /// Only show resources with this status (repeatable)
        #[arg(long)]
        status: Vec<ResourceStatus>,
    },
    /// List pods associated with a resource
    Pods {
        resource_type: ResourceType,
        resource_name: String,
        #[arg(long)]
        owner: Option<String>,
        /// live or historical; both when omitted
        #[arg(long)]
        source: Option<DataSource>,
        #[arg(long)]
        status: Vec<String>,
    },
    /// Print resource logs. Defaults to the most recent pod.
    Logs {
        resource_type: ResourceType,
        resource_name: String,
        pod_name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        source: Option<DataSource>,
        /// Include logs from every container, not just main
        #[arg(long)]
        all_containers: bool,
    },
    /// Create or update a resource from a recipe file
    Apply {
        input_file: PathBuf,
        /// Start the resource once the recipe is applied
        #[arg(long)]
        start: bool,
    },
    /// Show the instance version and the authenticated identity
    Status,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let conn = SaturnConnection::new(args.url.as_deref(), args.token.as_deref())?;

    match args.command {
        Commands::List {
            resource_type,
            owner,
            status,
        } => {
            let mut filter = ResourceFilter::of_type(resource_type);
            if let Some(owner) = owner {
                filter = filter.owner(owner);
            }
            for status in status {
                filter = filter.status(status.as_str());
            }
            let resources = conn.list_resources(&filter)?;
            match args.output {
                OutputFormat::Table => println!("{}", resource_table(&resources)),
                OutputFormat::Json => print_json(&resources)?,
            }
        }
        Commands::Pods {
            resource_type,
            resource_name,
            owner,
            source,
            status,
        } => {
            let status: Vec<&str> = status.iter().map(String::as_str).collect();
            let pods = conn.get_pods(resource_type, &resource_name, owner.as_deref(), source, &status)?;
            match args.output {
                OutputFormat::Table => println!("{}", pod_table(&pods)),
                OutputFormat::Json => print_json(&pods)?,
            }
        }
        Commands::Logs {
            resource_type,
            resource_name,
            pod_name,
            owner,
            source,
            all_containers,
        } => {
            let logs = conn.get_logs(&LogsRequest {
                owner: owner.as_deref(),
                pod_name: pod_name.as_deref(),
                source,
                all_containers,
                ..LogsRequest::new(resource_type, &resource_name)
            })?;
            println!("{logs}");
        }
        Commands::Apply { input_file, start } => {
            let raw = std::fs::read_to_string(&input_file)
                .with_context(|| format!("reading {}", input_file.display()))?;
            let recipe: Value = serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing {}", input_file.display()))?;
            let result = conn.apply(&recipe)?;
            if start {
                let (resource_type, resource_id) = applied_resource(&result)?;
                conn.start(resource_type, resource_id, false)?;
                tracing::info!(%resource_type, resource_id, "started");
            }
            if args.output == OutputFormat::Json {
                print_json(&result)?;
            }
        }
        Commands::Status => {
            let version = conn.saturn_version()?;
            let user = conn.current_user()?;
            let status = json!({
                "url": conn.url(),
                "version": version,
                "username": user.get("username").cloned().unwrap_or(Value::Null),
            });
            match args.output {
                OutputFormat::Table => {
                    println!("url:      {}", conn.url());
                    println!("version:  {version}");
                    println!("username: {}", status["username"].as_str().unwrap_or(""));
                }
                OutputFormat::Json => print_json(&status)?,
            }
        }
    }
    Ok(())
}

/// Type and id of a resource as echoed back by `apply`.
fn applied_resource(result: &Value) -> Result<(ResourceType, &str), SaturnError> {
    let resource_type = result
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SaturnError::Unexpected("applied recipe has no type".to_string()))?;
    let resource_id = result
        .pointer("/state/id")
        .and_then(Value::as_str)
        .ok_or_else(|| SaturnError::Unexpected("applied recipe has no state.id".to_string()))?;
    Ok((ResourceType::lookup(resource_type)?, resource_id))
}
