// ABOUTME: Error types for dependency planning.
// ABOUTME: Raised before any phase runs, so durable state is never touched.

use crate::types::{PhaseId, ServiceName};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanningError {
    /// A cycle in which no edge starts at a standalone-capable service.
    #[error("dependency cycle cannot be broken: {}", format_cycle(.cycle))]
    CycleUnresolved { cycle: Vec<ServiceName> },

    #[error("service '{service}' depends on undeclared service '{dependency}'")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    #[error("service '{0}' declared more than once")]
    DuplicateService(ServiceName),

    #[error("service '{0}' depends on itself")]
    SelfDependency(ServiceName),

    #[error("two phases share the id '{0}'")]
    DuplicatePhase(PhaseId),
}

fn format_cycle(cycle: &[ServiceName]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(ServiceName::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = PlanningError::CycleUnresolved {
            cycle: vec![
                ServiceName::new("a").unwrap(),
                ServiceName::new("b").unwrap(),
            ],
        };
        assert_eq!(err.to_string(), "dependency cycle cannot be broken: a -> b -> a");
    }
}
