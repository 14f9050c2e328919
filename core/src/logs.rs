//! Plain-text rendering of pod and container logs.

use crate::types::{ContainerSummary, PodSummary};

const WIDTH: usize = 100;

/// Render the logs of a live pod.
///
/// Without `all_containers`, only the `main` container is shown (or every
/// container when there is no `main`), falling back to the init containers
/// while all selected containers are still waiting.
pub fn format_logs(pod: &PodSummary, all_containers: bool) -> String {
    let containers: Vec<&ContainerSummary> = if all_containers {
        pod.init_container_summaries
            .iter()
            .chain(pod.container_summaries.iter())
            .collect()
    } else {
        let selected: Vec<&ContainerSummary> =
            match pod.container_summaries.iter().find(|c| c.name == "main") {
                Some(main) => vec![main],
                None => pod.container_summaries.iter().collect(),
            };
        if selected.iter().all(|c| c.status.as_deref() == Some("waiting")) {
            pod.init_container_summaries.iter().collect()
        } else {
            selected
        }
    };

    let mut sections = Vec::new();
    for container in containers {
        if let Some(previous) = &container.previous {
            sections.push(format_container_logs(previous, true));
        }
        sections.push(format_container_logs(container, false));
    }

    let mut logs = sections.join("\n\n");
    if logs.is_empty() {
        logs = format!("Status: {}", pod.status);
    }
    section_header(&format!("Pod: {}", pod.name), &logs, '=')
}

/// True when the summary describes a pod worth reading live logs from.
///
/// Completed pods whose node has shut down come back without logs; those
/// are read from the history instead.
pub fn is_live(pod: Option<&PodSummary>) -> bool {
    match pod {
        None => false,
        Some(pod) if has_logs(pod) => true,
        Some(pod) => !matches!(pod.status.as_str(), "completed" | "stopping" | "stopped"),
    }
}

pub fn has_logs(pod: &PodSummary) -> bool {
    pod.container_summaries
        .iter()
        .chain(pod.init_container_summaries.iter())
        .any(|c| c.logs.as_deref().is_some_and(|l| !l.is_empty()))
}

pub fn format_container_logs(container: &ContainerSummary, is_previous: bool) -> String {
    let label = if is_previous { " (previous)" } else { "" };
    let body = match container.logs.as_deref() {
        Some(logs) if !logs.is_empty() => logs.to_string(),
        _ => format!("Status: {}", container.status.as_deref().unwrap_or("unknown")),
    };
    let logs = section_header(&format!("Container: {}{label}", container.name), &body, '-');
    match container.finished_at.as_deref() {
        Some(finished_at) if !finished_at.is_empty() => {
            format_terminated(&logs, finished_at, container.exit_code)
        }
        _ => logs,
    }
}

pub fn format_historical_logs(pod_name: &str, logs: &str) -> String {
    let logs = section_header("Historical", logs, '-');
    section_header(&format!("Pod: {pod_name}"), &logs, '=')
}

fn format_terminated(logs: &str, end_time: &str, exit_code: Option<i64>) -> String {
    let info = match exit_code {
        Some(code) => format!("{code} at {end_time}"),
        None => format!("at {end_time}"),
    };
    let footer = format!(" Terminated {info} ");
    let remaining = WIDTH.saturating_sub(footer.chars().count());
    let marker = "=".repeat(remaining / 2);
    let end_marker = "=".repeat(remaining / 2 + remaining % 2);
    format!("{logs}\n{marker}{footer}{end_marker}")
}

fn section_header(label: &str, content: &str, ch: char) -> String {
    format!("{label}\n{}\n{content}", ch.to_string().repeat(WIDTH))
}
