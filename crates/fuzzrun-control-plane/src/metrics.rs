//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use fuzzrun_core::{DashboardStats, TaskStatus};

use crate::service::FuzzService;

/// Collect all metrics from the service and format as Prometheus text.
pub async fn collect_metrics(service: &FuzzService) -> String {
    let dashboard = service.dashboard().await;
    let observers = service.hub().observer_count().await;

    let mut output = String::new();
    write_task_metrics(&dashboard, &mut output);
    write_fuzzing_metrics(&dashboard, &mut output);

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP fuzzrun_observers_connected Number of connected live-update observers"
    )
    .ok();
    writeln!(output, "# TYPE fuzzrun_observers_connected gauge").ok();
    writeln!(output, "fuzzrun_observers_connected {observers}").ok();

    output
}

/// Task counts, one series per status.
fn write_task_metrics(dashboard: &DashboardStats, output: &mut String) {
    writeln!(
        output,
        "# HELP fuzzrun_tasks_total Total number of tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE fuzzrun_tasks_total gauge").ok();
    for status in TaskStatus::ALL {
        writeln!(
            output,
            "fuzzrun_tasks_total{{status=\"{}\"}} {}",
            status.as_str(),
            dashboard.by_status.get(status)
        )
        .ok();
    }
}

fn write_fuzzing_metrics(dashboard: &DashboardStats, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP fuzzrun_crashes_total Unique crashes across all tasks"
    )
    .ok();
    writeln!(output, "# TYPE fuzzrun_crashes_total gauge").ok();
    writeln!(output, "fuzzrun_crashes_total {}", dashboard.total_crashes).ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP fuzzrun_executions_total Target executions across all tasks"
    )
    .ok();
    writeln!(output, "# TYPE fuzzrun_executions_total gauge").ok();
    writeln!(
        output,
        "fuzzrun_executions_total {}",
        dashboard.total_executions
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP fuzzrun_coverage_avg_percent Mean edge coverage over tasks with coverage"
    )
    .ok();
    writeln!(output, "# TYPE fuzzrun_coverage_avg_percent gauge").ok();
    writeln!(
        output,
        "fuzzrun_coverage_avg_percent {}",
        dashboard.avg_coverage
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzrun_core::{CreateTaskRequest, TaskKind};
    use tempfile::TempDir;

    use crate::config::Config;

    #[tokio::test]
    async fn test_collect_metrics_empty_service() {
        let dir = TempDir::new().unwrap();
        let service = FuzzService::open(Config::with_data_root(dir.path()))
            .await
            .unwrap();
        let output = collect_metrics(&service).await;

        // Every status has a series
        for status in TaskStatus::ALL {
            assert!(output.contains(&format!("status=\"{}\"", status.as_str())));
        }

        // All counts should be 0
        assert!(output.contains("fuzzrun_tasks_total{status=\"pending\"} 0"));
        assert!(output.contains("fuzzrun_crashes_total 0"));
        assert!(output.contains("fuzzrun_observers_connected 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts_tasks() {
        let dir = TempDir::new().unwrap();
        let service = FuzzService::open(Config::with_data_root(dir.path()))
            .await
            .unwrap();
        service
            .create(CreateTaskRequest::new("a", TaskKind::SourceBuild))
            .await
            .unwrap();

        let output = collect_metrics(&service).await;
        assert!(output.contains("fuzzrun_tasks_total{status=\"pending\"} 1"));
        assert!(output.contains("fuzzrun_tasks_total{status=\"running\"} 0"));
    }
}
