//! HTTP request handlers.

mod artifacts;
mod events;
mod health;
mod tasks;

pub use artifacts::{download_crash, list_all_crashes, list_corpus, list_crashes};
pub use events::events;
pub use health::{health_check, metrics_handler};
pub use tasks::{
    advance_stage, create_task, dashboard, delete_task, export_report, get_stats, get_task,
    list_tasks, pause_task, resume_task, start_task, stop_task,
};
