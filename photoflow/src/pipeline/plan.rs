//! Validation and topological planning of the enricher graph.

use super::catalog::StageCatalog;
use crate::core::{EnricherKind, EnricherSet};
use crate::errors::{CycleDetectedError, PipelineValidationError};
use crate::stages::Enricher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// One stage of a validated plan.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub(crate) kind: EnricherKind,
    pub(crate) enricher: Arc<dyn Enricher>,
    /// Indices of the stages this one waits on.
    pub(crate) dependencies: Vec<usize>,
    /// Indices of the stages waiting on this one.
    pub(crate) dependents: Vec<usize>,
}

impl PlannedStage {
    /// The stage's kind.
    #[must_use]
    pub const fn kind(&self) -> EnricherKind {
        self.kind
    }

    /// Number of in-plan dependencies.
    #[must_use]
    pub fn in_degree(&self) -> usize {
        self.dependencies.len()
    }
}

/// A validated, acyclic execution plan.
///
/// Built fresh for every run and discarded afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    stages: Vec<PlannedStage>,
    order: Vec<usize>,
}

impl ExecutionPlan {
    /// Validates the active enrichers of `catalog` and plans them.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineValidationError`] if the catalog has no active
    /// enrichers, registers a kind twice, contains a self-dependency, names a
    /// dependency that is not active, or contains a cycle.
    pub fn build(catalog: &StageCatalog) -> Result<Self, PipelineValidationError> {
        Self::build_with_satisfied(catalog, EnricherSet::empty())
    }

    /// Like [`ExecutionPlan::build`], but a dependency on an inactive kind is
    /// accepted when its bit is already present in `satisfied`.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionPlan::build`].
    pub fn build_with_satisfied(
        catalog: &StageCatalog,
        satisfied: EnricherSet,
    ) -> Result<Self, PipelineValidationError> {
        let active: Vec<_> = catalog.active().collect();
        if active.is_empty() {
            return Err(PipelineValidationError::empty());
        }

        let mut index: HashMap<EnricherKind, usize> = HashMap::with_capacity(active.len());
        for (i, descriptor) in active.iter().enumerate() {
            if index.insert(descriptor.kind(), i).is_some() {
                return Err(PipelineValidationError::duplicate(descriptor.kind()));
            }
        }

        let mut stages: Vec<PlannedStage> = active
            .iter()
            .map(|d| PlannedStage {
                kind: d.kind(),
                enricher: Arc::clone(d.enricher()),
                dependencies: Vec::new(),
                dependents: Vec::new(),
            })
            .collect();

        for (i, descriptor) in active.iter().enumerate() {
            let kind = descriptor.kind();
            for &dependency in descriptor.dependencies() {
                if dependency == kind {
                    return Err(PipelineValidationError::self_dependency(kind));
                }
                match index.get(&dependency) {
                    Some(&j) => {
                        if !stages[i].dependencies.contains(&j) {
                            stages[i].dependencies.push(j);
                            stages[j].dependents.push(i);
                        }
                    }
                    None if satisfied.has(dependency) => {}
                    None => {
                        return Err(PipelineValidationError::missing_dependency(kind, dependency));
                    }
                }
            }
        }

        let order = topological_order(&stages)?;
        Ok(Self { stages, order })
    }

    /// Number of planned stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Planned stages, in catalog order.
    #[must_use]
    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    /// One valid topological order of the planned kinds.
    #[must_use]
    pub fn topological_order(&self) -> Vec<EnricherKind> {
        self.order.iter().map(|&i| self.stages[i].kind).collect()
    }

    /// Kinds that directly wait on `kind`.
    #[must_use]
    pub fn dependents_of(&self, kind: EnricherKind) -> Vec<EnricherKind> {
        self.position(kind)
            .map(|i| {
                self.stages[i]
                    .dependents
                    .iter()
                    .map(|&d| self.stages[d].kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of in-plan dependencies of `kind`.
    #[must_use]
    pub fn in_degree(&self, kind: EnricherKind) -> Option<usize> {
        self.position(kind).map(|i| self.stages[i].in_degree())
    }

    /// Kinds of every planned stage.
    #[must_use]
    pub fn kinds(&self) -> EnricherSet {
        self.stages.iter().map(|s| s.kind).collect()
    }

    fn position(&self, kind: EnricherKind) -> Option<usize> {
        self.stages.iter().position(|s| s.kind == kind)
    }
}

/// Kahn's algorithm; leftover stages mean a cycle.
fn topological_order(stages: &[PlannedStage]) -> Result<Vec<usize>, CycleDetectedError> {
    let mut in_degree: Vec<usize> = stages.iter().map(PlannedStage::in_degree).collect();
    let mut queue: VecDeque<usize> = (0..stages.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(stages.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &stages[i].dependents {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() == stages.len() {
        return Ok(order);
    }

    let unresolved: Vec<usize> = (0..stages.len()).filter(|&i| in_degree[i] > 0).collect();
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();
    let cycle = unresolved
        .iter()
        .find_map(|&start| dfs_cycle(stages, start, &mut visited, &mut on_stack, &mut path))
        .unwrap_or_default();

    Err(CycleDetectedError::new(
        cycle.into_iter().map(|i| stages[i].kind).collect(),
        unresolved.into_iter().map(|i| stages[i].kind).collect(),
    ))
}

fn dfs_cycle(
    stages: &[PlannedStage],
    node: usize,
    visited: &mut HashSet<usize>,
    on_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    if !visited.insert(node) {
        return None;
    }
    on_stack.insert(node);
    path.push(node);

    for &dependency in &stages[node].dependencies {
        if on_stack.contains(&dependency) {
            let start = path.iter().position(|&n| n == dependency).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(dependency);
            return Some(cycle);
        }
        if let Some(cycle) = dfs_cycle(stages, dependency, visited, on_stack, path) {
            return Some(cycle);
        }
    }

    path.pop();
    on_stack.remove(&node);
    None
}
