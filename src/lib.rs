// ABOUTME: Library root for keystone - exposes the control plane for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod bootstrap;
pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod output;
pub mod plane;
pub mod planner;
pub mod rollback;
pub mod services;
pub mod state;
pub mod tracker;
pub mod types;

pub use plane::{ControlPlane, FailureOutcome, MonitorOptions};
