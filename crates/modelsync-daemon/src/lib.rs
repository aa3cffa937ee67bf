//! modelsync daemon library
//!
//! This module provides the core components for modelsyncd:
//! - Layered configuration
//! - Component wiring
//! - Scheduler and reconciliation

pub mod app;
pub mod config;
pub mod error;
pub mod scheduler;

pub use app::App;
pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult, ReconcileError};
pub use scheduler::{Reconciler, Scheduler, TickReport};
