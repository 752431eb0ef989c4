// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The analysis's exposed surface: the CS call graph, a `pointsToSet` query
//! usable either context-sensitively or context-free, and the taint-flow
//! set, wrapping the finished solver's owned state behind read-only
//! accessors rather than handing callers the solver itself.

use crate::context::ContextId;
use crate::graph::call_graph::CallGraph;
use crate::ir::ids::{MethodId, ObjId, VarId};
use crate::pointer::Pointer;
use crate::pts_set::points_to::{HybridPointsToSet, PointsToSet};
use crate::pts_set::pt_data::DiffPTData;

use super::solver::{Solver, SolverStats};
use super::taint::TaintFlow;
use crate::cs_manager::CSManager;
use crate::graph::pfg::PointerId;

use super::context_selector::ContextSelector;
use super::heap_model::HeapModel;

/// Immutable snapshot of everything the solver computed, safe to query after
/// `Solver::run` returns.
pub struct PointerAnalysisResult {
    cs_manager: CSManager,
    call_graph: CallGraph,
    pt_data: DiffPTData<PointerId, ObjId, HybridPointsToSet<ObjId>>,
    taint_flows: Vec<TaintFlow>,
    stats: SolverStats,
}

impl PointerAnalysisResult {
    /// Consumes a finished solver, extracting its state into a lightweight,
    /// borrow-free result. `Solver` itself borrows `&Program`; this drops
    /// that borrow so the result can outlive the ingestion step.
    pub fn from_solver<S: ContextSelector, H: HeapModel>(mut solver: Solver<'_, S, H>) -> Self {
        solver.run();
        let (cs_manager, call_graph, pt_data, taint, stats) = solver.into_parts();
        let taint_flows = taint.map(|t| t.flows().copied().collect()).unwrap_or_default();
        PointerAnalysisResult { cs_manager, call_graph, pt_data, taint_flows, stats }
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn cs_manager(&self) -> &CSManager {
        &self.cs_manager
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// `pointsToSet(csVar)`: the context-sensitive query.
    pub fn points_to_set_cs(&self, ctx: ContextId, method: MethodId, var: VarId) -> HybridPointsToSet<ObjId> {
        match self.cs_manager.pfg().node_id(&Pointer::CSVar(ctx, method, var)) {
            Some(id) => self.pt_data.pts_of(id),
            None => HybridPointsToSet::new(),
        }
    }

    /// `pointsToSet(var)`: unions the points-to set of `var` across
    /// every context it was ever analyzed under.
    pub fn points_to_set(&self, method: MethodId, var: VarId) -> HybridPointsToSet<ObjId> {
        let mut out = HybridPointsToSet::new();
        for (id, pointer) in self.cs_manager.pfg().pointers() {
            if let Pointer::CSVar(_, m, v) = pointer {
                if m == method && v == var {
                    out.union(&self.pt_data.pts_of(id));
                }
            }
        }
        out
    }

    pub fn taint_flows(&self) -> &[TaintFlow] {
        &self.taint_flows
    }

    /// Every interned pointer paired with its finished points-to set, for the
    /// results dumper. Skips pointers with an empty set.
    pub fn all_points_to(&self) -> impl Iterator<Item = (Pointer, HybridPointsToSet<ObjId>)> + '_ {
        self.cs_manager.pfg().pointers().filter_map(move |(id, pointer)| {
            let pts = self.pt_data.pts_of(id);
            (!pts.is_empty()).then_some((pointer, pts))
        })
    }
}
