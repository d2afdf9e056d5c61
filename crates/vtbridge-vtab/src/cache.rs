//! Per-table cache of negotiated index solutions.

use std::collections::HashMap;

use crate::constraint::{ConstraintInfo, Index, IndexSolution};

/// A cached solution together with the plan id the host refers to it by.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPlan {
    /// Cache slot id; handed to the host as `idx_num`.
    pub plan: i32,
    pub solution: IndexSolution,
    /// `true` if the solution came from the cache rather than a fresh
    /// `propose_index` call.
    pub hit: bool,
}

/// Maps [`ConstraintInfo`] proposals to their [`IndexSolution`].
///
/// Populated lazily and never invalidated except by [`IndexCache::clear`].
/// Plan ids increase monotonically and are never reused, even across a
/// clear, so a host holding an id from before the clear gets a miss rather
/// than somebody else's plan.
#[derive(Debug, Default)]
pub struct IndexCache {
    by_info: HashMap<ConstraintInfo, i32>,
    by_plan: HashMap<i32, IndexSolution>,
    next_plan: i32,
}

impl IndexCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the solution for a proposal.
    pub fn lookup(&self, info: &ConstraintInfo) -> Option<CachedPlan> {
        let plan = *self.by_info.get(info)?;
        let solution = self.by_plan.get(&plan)?.clone();
        Some(CachedPlan {
            plan,
            solution,
            hit: true,
        })
    }

    /// Store a freshly negotiated solution and return its plan id.
    pub fn insert(&mut self, info: ConstraintInfo, solution: IndexSolution) -> i32 {
        let plan = self.next_plan;
        self.next_plan = self.next_plan.wrapping_add(1);
        if let Some(previous) = self.by_info.insert(info, plan) {
            self.by_plan.remove(&previous);
        }
        self.by_plan.insert(plan, solution);
        plan
    }

    /// Resolve a plan id to its index, if the id is still cached and names
    /// a satisfiable solution.
    pub fn get(&self, plan: i32) -> Option<&Index> {
        self.by_plan.get(&plan).and_then(IndexSolution::index)
    }

    /// Drop every cached solution.
    pub fn clear(&mut self) {
        self.by_info.clear();
        self.by_plan.clear();
    }

    pub fn len(&self) -> usize {
        self.by_plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_plan.is_empty()
    }
}
