// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod db;
pub mod devices;
pub mod error;
pub mod news;
pub mod normalize;
pub mod notify;
pub mod producer;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;
pub use crate::db::Database;
pub use crate::error::{NotifierError, Result};
pub use crate::scheduler::{PipelineCtx, PipelineScheduler, RunOutcome};
