//! Table and JSON rendering for CLI output.

use clap::ValueEnum;
use comfy_table::{presets::NOTHING, Cell, Table};
use saturn_core::Pod;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub const RESOURCE_HEADERS: [&str; 7] = [
    "owner",
    "name",
    "resource_type",
    "status",
    "instance_type",
    "instance_count",
    "id",
];

pub const POD_HEADERS: [&str; 5] = ["pod_name", "status", "source", "start_time", "end_time"];

pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn resource_table(recipes: &[Value]) -> Table {
    let rows = recipes.iter().map(|recipe| {
        let spec = &recipe["spec"];
        let state = &recipe["state"];
        vec![
            text(&spec["owner"]),
            text(&spec["name"]),
            text(&recipe["type"]),
            text(&state["status"]),
            text(&spec["instance_type"]),
            match &spec["instance_count"] {
                Value::Null => "1".to_string(),
                count => text(count),
            },
            text(&state["id"]),
        ]
    });
    table(&RESOURCE_HEADERS, rows)
}

pub fn pod_table(pods: &[Pod]) -> Table {
    let rows = pods.iter().map(|pod| {
        vec![
            pod.pod_name.clone(),
            pod.status.clone(),
            pod.source.to_string(),
            pod.start_time.clone().unwrap_or_default(),
            pod.end_time.clone().unwrap_or_default(),
        ]
    });
    table(&POD_HEADERS, rows)
}

fn table(headers: &[&str], rows: impl Iterator<Item = Vec<String>>) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(headers.iter().map(|h| Cell::new(h)));
    for row in rows {
        table.add_row(row.into_iter().map(Cell::new));
    }
    table
}

/// Strings print bare; missing fields print empty.
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
