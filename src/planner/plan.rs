// ABOUTME: Topological ordering of start and integration phases.
// ABOUTME: Ties are broken by service name so the same input always yields the same plan.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::error::PlanningError;
use super::graph::{DeferredEdge, Graph, ServiceDependency, break_cycles, build_graph};
use crate::bootstrap::{Phase, RecoveryStrategy};
use crate::config::Config;
use crate::services::BootstrapMode;
use crate::types::ServiceName;

const STANDALONE_SUFFIX: &str = "standalone";
const DEPLOY_SUFFIX: &str = "deploy";

/// Ordered bootstrap phases plus the edges that were deferred to reach them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    phases: Vec<Phase>,
    deferred: Vec<DeferredEdge>,
}

impl BootstrapPlan {
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn into_phases(self) -> Vec<Phase> {
        self.phases
    }

    pub fn deferred(&self) -> &[DeferredEdge] {
        &self.deferred
    }

    /// Services in the order their start phases run.
    pub fn start_order(&self) -> Vec<ServiceName> {
        self.phases
            .iter()
            .filter(|p| p.is_start())
            .map(|p| p.service.clone())
            .collect()
    }
}

/// Plans bootstrap phases from service dependency declarations.
#[derive(Debug, Clone)]
pub struct DependencyGraphPlanner {
    services: Vec<ServiceDependency>,
}

impl DependencyGraphPlanner {
    pub fn new(services: Vec<ServiceDependency>) -> Self {
        Self { services }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.services.iter().map(ServiceDependency::from).collect())
    }

    /// Produce the acyclic, deterministic phase list.
    pub fn plan(&self) -> Result<BootstrapPlan, PlanningError> {
        let mut retained = build_graph(&self.services)?;
        let modes: HashMap<ServiceName, BootstrapMode> = self
            .services
            .iter()
            .map(|s| (s.service.clone(), s.bootstrap_mode))
            .collect();

        let mut deferred = break_cycles(&mut retained, &modes)?;
        deferred.sort();

        let order = schedule(&retained, &deferred)?;
        let phases = self.build_phases(&order, &deferred)?;

        tracing::debug!(
            phases = phases.len(),
            deferred = deferred.len(),
            "bootstrap plan computed"
        );
        Ok(BootstrapPlan { phases, deferred })
    }

    fn build_phases(
        &self,
        order: &[Node],
        deferred: &[DeferredEdge],
    ) -> Result<Vec<Phase>, PlanningError> {
        let declared: HashMap<&ServiceName, &ServiceDependency> =
            self.services.iter().map(|s| (&s.service, s)).collect();

        let mut seen = HashSet::new();
        let mut phases = Vec::with_capacity(order.len());

        for node in order {
            let phase = match &node.dependency {
                Some(dependency) => Phase::integration(node.service.clone(), dependency.clone()),
                None => {
                    let has_deferred = deferred.iter().any(|e| e.service == node.service);
                    let declaration = declared.get(&node.service);
                    let (default_suffix, mode, default_recovery) = if has_deferred {
                        (
                            STANDALONE_SUFFIX,
                            BootstrapMode::Standalone,
                            RecoveryStrategy::RestartClean,
                        )
                    } else {
                        (
                            DEPLOY_SUFFIX,
                            BootstrapMode::Integrated,
                            RecoveryStrategy::Redeploy,
                        )
                    };
                    let suffix = declaration
                        .and_then(|d| d.phase.as_deref())
                        .unwrap_or(default_suffix);
                    let recovery = declaration
                        .and_then(|d| d.recovery)
                        .unwrap_or(default_recovery);
                    Phase::start(node.service.clone(), suffix, mode, recovery)
                }
            };

            if !seen.insert(phase.id.clone()) {
                return Err(PlanningError::DuplicatePhase(phase.id));
            }
            phases.push(phase);
        }

        Ok(phases)
    }
}

/// Scheduling node: a start phase (`dependency: None`) or an integration phase.
///
/// Field order gives the tie-break: service name, then start before
/// integration, then dependency name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Node {
    service: ServiceName,
    kind: u8,
    dependency: Option<ServiceName>,
}

impl Node {
    fn start(service: &ServiceName) -> Self {
        Self {
            service: service.clone(),
            kind: 0,
            dependency: None,
        }
    }

    fn integration(edge: &DeferredEdge) -> Self {
        Self {
            service: edge.service.clone(),
            kind: 1,
            dependency: Some(edge.dependency.clone()),
        }
    }
}

type Preds = BTreeMap<Node, BTreeSet<Node>>;

/// Kahn's algorithm over start and integration nodes.
///
/// Hard constraints: a start phase follows the start phases of its retained
/// dependencies; an integration phase follows the start phases of both ends
/// and of the service's retained dependencies. Soft constraint: a start phase
/// also follows the integration phases of its retained dependencies, unless
/// that integration itself (transitively) waits for this start.
fn schedule(retained: &Graph, deferred: &[DeferredEdge]) -> Result<Vec<Node>, PlanningError> {
    let mut preds: Preds = BTreeMap::new();

    for (service, deps) in retained {
        let entry = preds.entry(Node::start(service)).or_default();
        entry.extend(deps.iter().map(Node::start));
    }

    for edge in deferred {
        let mut before = BTreeSet::from([Node::start(&edge.service), Node::start(&edge.dependency)]);
        if let Some(deps) = retained.get(&edge.service) {
            before.extend(deps.iter().map(Node::start));
        }
        preds.insert(Node::integration(edge), before);
    }

    for (service, deps) in retained {
        let start = Node::start(service);
        for edge in deferred.iter().filter(|e| deps.contains(&e.service)) {
            let integration = Node::integration(edge);
            if depends_on(&preds, &integration, &start) {
                tracing::debug!(
                    service = %service,
                    integration = %format!("{}-{}", edge.service, edge.dependency),
                    "integration waits on this service; not ordering after it"
                );
                continue;
            }
            if let Some(before) = preds.get_mut(&start) {
                before.insert(integration);
            }
        }
    }

    let mut successors: BTreeMap<&Node, Vec<&Node>> = BTreeMap::new();
    let mut remaining: BTreeMap<&Node, usize> = BTreeMap::new();
    for (node, before) in &preds {
        remaining.insert(node, before.len());
        for pred in before {
            successors.entry(pred).or_default().push(node);
        }
    }

    let mut ready: BTreeSet<&Node> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(preds.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.clone());
        for next in successors.get(node).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if order.len() != preds.len() {
        let scheduled: BTreeSet<&Node> = order.iter().collect();
        let cycle = preds
            .keys()
            .filter(|n| !scheduled.contains(n))
            .map(|n| n.service.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        return Err(PlanningError::CycleUnresolved { cycle });
    }

    Ok(order)
}

/// Whether `node` transitively waits for `target`.
fn depends_on(preds: &Preds, node: &Node, target: &Node) -> bool {
    let mut stack = vec![node];
    let mut seen = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        stack.extend(preds.get(current).into_iter().flatten());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    fn ids(plan: &BootstrapPlan) -> Vec<&str> {
        plan.phases().iter().map(|p| p.id.as_str()).collect()
    }

    fn trio() -> Vec<ServiceDependency> {
        vec![
            ServiceDependency::new(name("nomad"), [name("vault")], BootstrapMode::Standalone),
            ServiceDependency::new(name("vault"), [name("nomad")], BootstrapMode::Integrated)
                .with_phase("init")
                .with_recovery(RecoveryStrategy::Reinitialize),
            ServiceDependency::new(
                name("traefik"),
                [name("nomad"), name("vault")],
                BootstrapMode::Integrated,
            ),
        ]
    }

    #[test]
    fn plans_the_nomad_vault_traefik_cycle() {
        let plan = DependencyGraphPlanner::new(trio()).plan().unwrap();

        assert_eq!(
            ids(&plan),
            vec![
                "nomad-standalone",
                "vault-init",
                "nomad-vault-integration",
                "traefik-deploy"
            ]
        );

        let phases = plan.phases();
        assert_eq!(phases[0].mode, BootstrapMode::Standalone);
        assert_eq!(phases[0].recovery, RecoveryStrategy::RestartClean);
        assert_eq!(phases[1].recovery, RecoveryStrategy::Reinitialize);
        assert_eq!(phases[2].recovery, RecoveryStrategy::ResetIntegration);
        assert_eq!(phases[3].recovery, RecoveryStrategy::Redeploy);
        assert_eq!(
            plan.start_order(),
            vec![name("nomad"), name("vault"), name("traefik")]
        );
    }

    #[test]
    fn plan_is_independent_of_declaration_order() {
        let mut reversed = trio();
        reversed.reverse();

        let a = DependencyGraphPlanner::new(trio()).plan().unwrap();
        let b = DependencyGraphPlanner::new(reversed).plan().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn acyclic_graph_has_only_deploy_phases() {
        let services = vec![
            ServiceDependency::new(name("web"), [name("db")], BootstrapMode::Integrated),
            ServiceDependency::new(name("db"), [], BootstrapMode::Integrated),
        ];
        let plan = DependencyGraphPlanner::new(services).plan().unwrap();

        assert_eq!(ids(&plan), vec!["db-deploy", "web-deploy"]);
        assert!(plan.deferred().is_empty());
    }

    #[test]
    fn duplicate_services_are_rejected() {
        let services = vec![
            ServiceDependency::new(name("db"), [], BootstrapMode::Integrated),
            ServiceDependency::new(name("db"), [], BootstrapMode::Standalone),
        ];
        assert_eq!(
            DependencyGraphPlanner::new(services).plan(),
            Err(PlanningError::DuplicateService(name("db")))
        );
    }

    #[test]
    fn colliding_phase_ids_are_rejected() {
        // `a-b` deploy phase collides with `a` using suffix `b-deploy`.
        let services = vec![
            ServiceDependency::new(name("a"), [], BootstrapMode::Integrated).with_phase("b-deploy"),
            ServiceDependency::new(name("a-b"), [], BootstrapMode::Integrated),
        ];
        assert!(matches!(
            DependencyGraphPlanner::new(services).plan(),
            Err(PlanningError::DuplicatePhase(_))
        ));
    }
}
