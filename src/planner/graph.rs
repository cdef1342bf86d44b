// ABOUTME: Service dependency declarations and cycle breaking.
// ABOUTME: Depth-first search finds cycles; each is cut at its smallest standalone-capable edge.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::PlanningError;
use crate::bootstrap::RecoveryStrategy;
use crate::config::ServiceConfig;
use crate::services::BootstrapMode;
use crate::types::ServiceName;

/// One service and the services it needs, including bootstrap-only edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDependency {
    pub service: ServiceName,
    pub depends_on: BTreeSet<ServiceName>,
    pub bootstrap_mode: BootstrapMode,
    /// Start-phase suffix override.
    pub phase: Option<String>,
    /// Start-phase recovery override.
    pub recovery: Option<RecoveryStrategy>,
}

impl ServiceDependency {
    pub fn new(
        service: ServiceName,
        depends_on: impl IntoIterator<Item = ServiceName>,
        bootstrap_mode: BootstrapMode,
    ) -> Self {
        Self {
            service,
            depends_on: depends_on.into_iter().collect(),
            bootstrap_mode,
            phase: None,
            recovery: None,
        }
    }

    pub fn with_phase(mut self, suffix: impl Into<String>) -> Self {
        self.phase = Some(suffix.into());
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

impl From<&ServiceConfig> for ServiceDependency {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            service: config.name.clone(),
            depends_on: config.depends_on.clone(),
            bootstrap_mode: config.bootstrap_mode,
            phase: config.phase.clone(),
            recovery: config.recovery,
        }
    }
}

/// A dependency edge ignored for first boot and wired in by an integration phase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeferredEdge {
    pub service: ServiceName,
    pub dependency: ServiceName,
}

/// Dependency graph with edges pointing from a service to what it needs.
pub(super) type Graph = BTreeMap<ServiceName, BTreeSet<ServiceName>>;

/// Validate declarations and build the full dependency graph.
pub(super) fn build_graph(services: &[ServiceDependency]) -> Result<Graph, PlanningError> {
    let mut graph = Graph::new();
    for dep in services {
        if graph.insert(dep.service.clone(), dep.depends_on.clone()).is_some() {
            return Err(PlanningError::DuplicateService(dep.service.clone()));
        }
    }

    for dep in services {
        for target in &dep.depends_on {
            if target == &dep.service {
                return Err(PlanningError::SelfDependency(dep.service.clone()));
            }
            if !graph.contains_key(target) {
                return Err(PlanningError::UnknownDependency {
                    service: dep.service.clone(),
                    dependency: target.clone(),
                });
            }
        }
    }

    Ok(graph)
}

/// Remove edges from `graph` until it is acyclic.
///
/// Returns the removed edges in the order they were cut. Every loop
/// iteration removes one edge, so this terminates.
pub(super) fn break_cycles(
    graph: &mut Graph,
    modes: &HashMap<ServiceName, BootstrapMode>,
) -> Result<Vec<DeferredEdge>, PlanningError> {
    let mut deferred = Vec::new();

    while let Some(cycle) = find_cycle(graph) {
        let edge = cycle_edges(&cycle)
            .filter(|edge| modes.get(&edge.service) == Some(&BootstrapMode::Standalone))
            .min()
            .ok_or_else(|| PlanningError::CycleUnresolved {
                cycle: cycle.clone(),
            })?;

        tracing::debug!(
            service = %edge.service,
            dependency = %edge.dependency,
            "deferring dependency edge to break cycle"
        );
        if let Some(targets) = graph.get_mut(&edge.service) {
            targets.remove(&edge.dependency);
        }
        deferred.push(edge);
    }

    Ok(deferred)
}

/// Edges of a cycle given as `[a, b, c]`, meaning `a -> b -> c -> a`.
fn cycle_edges(cycle: &[ServiceName]) -> impl Iterator<Item = DeferredEdge> + '_ {
    cycle.iter().enumerate().map(|(i, service)| DeferredEdge {
        service: service.clone(),
        dependency: cycle[(i + 1) % cycle.len()].clone(),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// First cycle found by a depth-first search visiting services in name order.
pub(super) fn find_cycle(graph: &Graph) -> Option<Vec<ServiceName>> {
    let mut visits = HashMap::new();
    let mut stack = Vec::new();

    for node in graph.keys() {
        if !visits.contains_key(node)
            && let Some(cycle) = visit(node, graph, &mut visits, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a ServiceName,
    graph: &'a Graph,
    visits: &mut HashMap<&'a ServiceName, Visit>,
    stack: &mut Vec<&'a ServiceName>,
) -> Option<Vec<ServiceName>> {
    visits.insert(node, Visit::InProgress);
    stack.push(node);

    for next in graph.get(node).into_iter().flatten() {
        match visits.get(next) {
            Some(Visit::InProgress) => {
                let start = stack.iter().position(|n| *n == next)?;
                return Some(stack[start..].iter().map(|n| (*n).clone()).collect());
            }
            Some(Visit::Done) => {}
            None => {
                if let Some(cycle) = visit(next, graph, visits, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    visits.insert(node, Visit::Done);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    fn graph(edges: &[(&str, &[&str])]) -> Graph {
        edges
            .iter()
            .map(|(s, deps)| (name(s), deps.iter().map(|d| name(d)).collect()))
            .collect()
    }

    #[test]
    fn finds_two_node_cycle() {
        let g = graph(&[("nomad", &["vault"]), ("vault", &["nomad"]), ("traefik", &["nomad"])]);
        assert_eq!(find_cycle(&g), Some(vec![name("nomad"), name("vault")]));
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn breaks_cycle_at_standalone_edge() {
        let mut g = graph(&[("nomad", &["vault"]), ("vault", &["nomad"])]);
        let modes = HashMap::from([
            (name("nomad"), BootstrapMode::Standalone),
            (name("vault"), BootstrapMode::Integrated),
        ]);

        let deferred = break_cycles(&mut g, &modes).unwrap();

        assert_eq!(
            deferred,
            vec![DeferredEdge {
                service: name("nomad"),
                dependency: name("vault"),
            }]
        );
        assert!(g[&name("nomad")].is_empty());
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn unbreakable_cycle_is_reported() {
        let mut g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let modes = HashMap::new();

        let err = break_cycles(&mut g, &modes).unwrap_err();
        assert_eq!(
            err,
            PlanningError::CycleUnresolved {
                cycle: vec![name("a"), name("b"), name("c")],
            }
        );
    }

    #[test]
    fn rejects_unknown_and_self_dependencies() {
        let unknown = [ServiceDependency::new(name("a"), [name("ghost")], BootstrapMode::Integrated)];
        assert!(matches!(
            build_graph(&unknown),
            Err(PlanningError::UnknownDependency { .. })
        ));

        let selfish = [ServiceDependency::new(name("a"), [name("a")], BootstrapMode::Standalone)];
        assert_eq!(
            build_graph(&selfish),
            Err(PlanningError::SelfDependency(name("a")))
        );
    }
}
