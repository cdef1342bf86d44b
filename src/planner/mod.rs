// ABOUTME: Converts a possibly cyclic service-dependency graph into an ordered phase list.
// ABOUTME: Cycles are broken at standalone-capable edges, which become integration phases.

mod error;
mod graph;
mod plan;

pub use error::PlanningError;
pub use graph::{DeferredEdge, ServiceDependency};
pub use plan::{BootstrapPlan, DependencyGraphPlanner};
