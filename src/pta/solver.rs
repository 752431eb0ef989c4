// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The fixpoint engine: the worklist-driven Andersen-style propagation loop,
//! restructured around the abstract IR's flat `Stmt` set and this crate's
//! single-kind pointer flow graph.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info, trace};

use crate::call_site::{CSCallSite, CSCallSiteId};
use crate::context::{ContextId, EMPTY_CONTEXT_ID};
use crate::cs_manager::CSManager;
use crate::graph::call_graph::CallGraph;
use crate::graph::pfg::PointerId;
use crate::ir::class_hierarchy::ClassHierarchy;
use crate::ir::ids::{CSMethodId, MethodId, ObjId, StmtId, VarId};
use crate::ir::program::{Program, Stmt};
use crate::pointer::{BaseObj, CSObj, Pointer};
use crate::pts_set::points_to::{HybridPointsToSet, PointsToSet};
use crate::pts_set::pt_data::DiffPTData;

use super::context_selector::ContextSelector;
use super::heap_model::HeapModel;
use super::taint::{TaintPlugin, TaintPosition};
use super::worklist::{WorkList, WorkListEntry};

/// Per-method index of the statements each local variable participates in as
/// a store/load/invoke base, built once per reachable method and cached:
/// sets of statements that *use* a variable as store-base, load-base,
/// array-base, or invoke-receiver. Kept here rather than on `Program` itself
/// since it is solver-derived state, not part of the IR.
#[derive(Default)]
struct MethodIndex {
    instance_stores_by_base: HashMap<VarId, Vec<StmtId>>,
    instance_loads_by_base: HashMap<VarId, Vec<StmtId>>,
    array_stores_by_base: HashMap<VarId, Vec<StmtId>>,
    array_loads_by_base: HashMap<VarId, Vec<StmtId>>,
    invokes_by_receiver: HashMap<VarId, Vec<StmtId>>,
    invokes_by_arg: HashMap<VarId, Vec<StmtId>>,
}

impl MethodIndex {
    fn build(method: &crate::ir::program::Method) -> Self {
        let mut idx = MethodIndex::default();
        for (i, stmt) in method.stmts.iter().enumerate() {
            let stmt_id = StmtId::new(i);
            match stmt {
                Stmt::StoreField { base, .. } => {
                    idx.instance_stores_by_base.entry(*base).or_default().push(stmt_id);
                }
                Stmt::LoadField { base, .. } => {
                    idx.instance_loads_by_base.entry(*base).or_default().push(stmt_id);
                }
                Stmt::StoreArray { base, .. } => {
                    idx.array_stores_by_base.entry(*base).or_default().push(stmt_id);
                }
                Stmt::LoadArray { base, .. } => {
                    idx.array_loads_by_base.entry(*base).or_default().push(stmt_id);
                }
                Stmt::Invoke { receiver: Some(recv), args, .. } => {
                    idx.invokes_by_receiver.entry(*recv).or_default().push(stmt_id);
                    for &arg in args {
                        idx.invokes_by_arg.entry(arg).or_default().push(stmt_id);
                    }
                }
                Stmt::Invoke { args, .. } => {
                    for &arg in args {
                        idx.invokes_by_arg.entry(arg).or_default().push(stmt_id);
                    }
                }
                _ => {}
            }
        }
        idx
    }
}

#[derive(Default, Debug)]
pub struct SolverStats {
    pub worklist_pops: usize,
}

/// Owns every piece of solver-derived state and borrows the program it
/// analyzes; nothing is left ambient or global.
pub struct Solver<'p, S: ContextSelector, H: HeapModel> {
    program: &'p Program,
    class_hierarchy: ClassHierarchy<'p>,
    main_method: MethodId,
    cs_manager: CSManager,
    call_graph: CallGraph,
    pt_data: DiffPTData<PointerId, ObjId, HybridPointsToSet<ObjId>>,
    worklist: WorkList,
    selector: S,
    heap_model: H,
    taint: Option<TaintPlugin>,
    method_indices: HashMap<MethodId, MethodIndex>,
    reachable_stmts: std::collections::HashSet<crate::ir::ids::StmtRef>,
    stats: SolverStats,
}

impl<'p, S: ContextSelector, H: HeapModel> Solver<'p, S, H> {
    pub fn new(program: &'p Program, main_method: MethodId, selector: S, heap_model: H, taint: Option<TaintPlugin>) -> Self {
        Solver {
            program,
            class_hierarchy: ClassHierarchy::new(program),
            main_method,
            cs_manager: CSManager::new(),
            call_graph: CallGraph::new(),
            pt_data: DiffPTData::new(),
            worklist: WorkList::new(),
            selector,
            heap_model,
            taint,
            method_indices: HashMap::new(),
            reachable_stmts: std::collections::HashSet::new(),
            stats: SolverStats::default(),
        }
    }

    pub fn cs_manager(&self) -> &CSManager {
        &self.cs_manager
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    pub fn pt_data(&self) -> &DiffPTData<PointerId, ObjId, HybridPointsToSet<ObjId>> {
        &self.pt_data
    }

    pub fn taint(&self) -> Option<&TaintPlugin> {
        self.taint.as_ref()
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Tears the finished solver down into its owned pieces, for
    /// `PointerAnalysisResult::from_solver` to repackage without holding the
    /// solver's `&'p Program` borrow any longer than `run()` needs it.
    pub fn into_parts(
        self,
    ) -> (
        CSManager,
        CallGraph,
        DiffPTData<PointerId, ObjId, HybridPointsToSet<ObjId>>,
        Option<TaintPlugin>,
        SolverStats,
    ) {
        (self.cs_manager, self.call_graph, self.pt_data, self.taint, self.stats)
    }

    /// Runs the whole analysis to fixpoint, then the taint plugin's "on
    /// finish" sink scan. The single public entry point the CLI drives.
    pub fn run(&mut self) {
        let start = Instant::now();
        info!("pointer analysis starting from entry method {:?}", self.main_method);
        let main_cs_method = self.cs_manager.get_cs_method(EMPTY_CONTEXT_ID, self.main_method);
        self.add_reachable(main_cs_method);
        self.analyze();
        self.collect_sinks();
        info!(
            "pointer analysis finished in {}: {} reachable methods, {} worklist pops",
            humantime::format_duration(start.elapsed()),
            self.call_graph.reachable_methods().count(),
            self.stats.worklist_pops
        );
    }

    /// `addReachable`: idempotent, indexes the method's statements, and
    /// processes every statement whose effect does not depend on a
    /// variable's points-to set growing first.
    fn add_reachable(&mut self, cs_method: CSMethodId) {
        if !self.call_graph.add_reachable(cs_method) {
            return;
        }
        let (ctx, method_id) = self.cs_manager.cs_method(cs_method);
        debug!("new reachable method {:?} under {:?}", method_id, ctx);
        let method = self.program.method(method_id);
        self.method_indices.entry(method_id).or_insert_with(|| MethodIndex::build(method));

        for (i, stmt) in method.stmts.iter().enumerate() {
            let stmt_id = StmtId::new(i);
            self.reachable_stmts.insert(crate::ir::ids::StmtRef { method: method_id, stmt: stmt_id });
            match stmt {
                Stmt::New { lhs, class } => {
                    let site = crate::ir::ids::StmtRef { method: method_id, stmt: stmt_id };
                    let base = self.heap_model.abstract_object(site, *class);
                    let heap_ctx = self.selector.select_heap_context(ctx, base);
                    let obj = self.cs_manager.get_cs_obj(base, heap_ctx);
                    let ptr = self.cs_manager.get_cs_var(ctx, method_id, *lhs);
                    let mut delta = HybridPointsToSet::new();
                    delta.insert(obj);
                    self.worklist.add_entry(ptr, delta);
                }
                Stmt::Copy { lhs, rhs } => {
                    let src = self.cs_manager.get_cs_var(ctx, method_id, *rhs);
                    let dst = self.cs_manager.get_cs_var(ctx, method_id, *lhs);
                    self.add_pfg_edge(src, dst);
                }
                Stmt::LoadStatic { lhs, field } => {
                    let src = self.cs_manager.get_static_field(*field);
                    let dst = self.cs_manager.get_cs_var(ctx, method_id, *lhs);
                    self.add_pfg_edge(src, dst);
                }
                Stmt::StoreStatic { field, rhs } => {
                    let src = self.cs_manager.get_cs_var(ctx, method_id, *rhs);
                    let dst = self.cs_manager.get_static_field(*field);
                    self.add_pfg_edge(src, dst);
                }
                Stmt::Invoke { receiver: None, .. } => {
                    self.resolve_call(ctx, method_id, stmt_id, None, None);
                }
                _ => {
                    // Instance loads/stores, array loads/stores, and instance
                    // invokes are deferred until the base variable's
                    // points-to set grows.
                }
            }
        }
    }

    /// Adds the subset edge and replays the source's current points-to set
    /// so the target needn't wait for the source to grow again.
    fn add_pfg_edge(&mut self, src: PointerId, dst: PointerId) {
        if self.cs_manager.pfg_mut().add_edge(src, dst) {
            let pts = self.pt_data.pts_of(src);
            if !pts.is_empty() {
                self.worklist.add_entry(dst, pts);
            }
        }
    }

    /// The fixpoint loop proper.
    fn analyze(&mut self) {
        while let Some(WorkListEntry { pointer, delta }) = self.worklist.poll() {
            self.stats.worklist_pops += 1;
            trace!("worklist pop: {:?}", pointer);

            let grew = self.pt_data.union_pts_to(pointer, &delta);
            if !grew {
                continue;
            }
            let true_delta = self.pt_data.get_diff_pts(pointer).cloned().unwrap_or_else(HybridPointsToSet::new);
            self.pt_data.flush(pointer);
            if true_delta.is_empty() {
                continue;
            }

            for succ in self.cs_manager.pfg().succs_of(pointer) {
                self.worklist.add_entry(succ, true_delta.clone());
            }

            if let Pointer::CSVar(ctx, method_id, var) = self.cs_manager.pointer(pointer) {
                self.handle_var_growth(ctx, method_id, var, &true_delta);
            }
        }
    }

    /// Per-object effect list for a `CSVar(c,v)` whose points-to set just
    /// grew by `delta`.
    fn handle_var_growth(&mut self, ctx: ContextId, method_id: MethodId, var: VarId, delta: &HybridPointsToSet<ObjId>) {
        let Some(index) = self.method_indices.get(&method_id) else {
            return;
        };
        let instance_stores = index.instance_stores_by_base.get(&var).cloned().unwrap_or_default();
        let instance_loads = index.instance_loads_by_base.get(&var).cloned().unwrap_or_default();
        let array_stores = index.array_stores_by_base.get(&var).cloned().unwrap_or_default();
        let array_loads = index.array_loads_by_base.get(&var).cloned().unwrap_or_default();
        let invokes_by_receiver = index.invokes_by_receiver.get(&var).cloned().unwrap_or_default();
        let invokes_by_arg = index.invokes_by_arg.get(&var).cloned().unwrap_or_default();

        let any_taint = delta.iter().any(|obj| self.cs_manager.cs_obj(obj).is_taint());

        for obj in delta.iter() {
            for &stmt_id in &instance_stores {
                let Stmt::StoreField { field, rhs, .. } = self.program.method(method_id).stmt_ref(stmt_id) else {
                    unreachable!("instance_stores_by_base only indexes StoreField statements")
                };
                let src = self.cs_manager.get_cs_var(ctx, method_id, *rhs);
                let dst = self.cs_manager.get_instance_field(obj, *field);
                self.add_pfg_edge(src, dst);
            }
            for &stmt_id in &instance_loads {
                let Stmt::LoadField { lhs, field, .. } = self.program.method(method_id).stmt_ref(stmt_id) else {
                    unreachable!("instance_loads_by_base only indexes LoadField statements")
                };
                let src = self.cs_manager.get_instance_field(obj, *field);
                let dst = self.cs_manager.get_cs_var(ctx, method_id, *lhs);
                self.add_pfg_edge(src, dst);
            }
            for &stmt_id in &array_stores {
                let Stmt::StoreArray { rhs, .. } = self.program.method(method_id).stmt_ref(stmt_id) else {
                    unreachable!("array_stores_by_base only indexes StoreArray statements")
                };
                let src = self.cs_manager.get_cs_var(ctx, method_id, *rhs);
                let dst = self.cs_manager.get_array_index(obj);
                self.add_pfg_edge(src, dst);
            }
            for &stmt_id in &array_loads {
                let Stmt::LoadArray { lhs, .. } = self.program.method(method_id).stmt_ref(stmt_id) else {
                    unreachable!("array_loads_by_base only indexes LoadArray statements")
                };
                let src = self.cs_manager.get_array_index(obj);
                let dst = self.cs_manager.get_cs_var(ctx, method_id, *lhs);
                self.add_pfg_edge(src, dst);
            }
            for &stmt_id in &invokes_by_receiver {
                self.resolve_call(ctx, method_id, stmt_id, Some(var), Some(obj));
            }
        }

        if any_taint {
            for &stmt_id in &invokes_by_arg {
                let callee = self.callee_at(ctx, method_id, stmt_id);
                if let Some(callee) = callee {
                    self.fire_taint_transfers(ctx, method_id, stmt_id, callee);
                }
            }
        }
    }

    /// Looks up the callee currently resolved for a call-graph edge at this
    /// call site, for re-firing taint transfers when an argument grows after
    /// the call was already resolved. Arbitrary if several callees share the
    /// site (rare; only from virtual dispatch variance under distinct
    /// contexts), which is harmless since transfer rules are keyed by the
    /// concrete callee method anyway and are applied to each in turn.
    fn callee_at(&mut self, ctx: ContextId, method_id: MethodId, stmt_id: StmtId) -> Option<MethodId> {
        let call_site = crate::ir::ids::StmtRef { method: method_id, stmt: stmt_id };
        let cs_call_site = self.cs_manager.get_cs_call_site(ctx, call_site);
        self.call_graph
            .get_callees(cs_call_site)
            .into_iter()
            .next()
            .map(|cs_method| self.cs_manager.cs_method(cs_method).1)
    }

    /// Resolves one call site against one candidate receiver object (or
    /// none, for a static call): dispatches to the concrete callee, derives
    /// its context, binds the receiver and arguments, fires taint effects,
    /// and adds the call-graph edge if it's new. `recv_var`/`recv_obj` are
    /// both `None` for a static call; both `Some` for an instance call
    /// resolved against one specific newly-discovered receiver object.
    fn resolve_call(&mut self, ctx: ContextId, caller_method_id: MethodId, stmt_id: StmtId, recv_var: Option<VarId>, recv_obj: Option<ObjId>) {
        let call_site_ref = crate::ir::ids::StmtRef { method: caller_method_id, stmt: stmt_id };
        if !self.reachable_stmts.contains(&call_site_ref) {
            return;
        }
        let stmt = self.program.method(caller_method_id).stmt_ref(stmt_id).clone();
        let Stmt::Invoke { lhs, static_class, method_name, args, .. } = stmt else {
            return;
        };

        let recv_cs_obj: Option<CSObj> = recv_obj.map(|id| self.cs_manager.cs_obj(id));

        // Dispatch.
        let declared_class = match recv_cs_obj {
            Some(obj) => obj.declared_class(),
            None => static_class,
        };
        let Some(declared_class) = declared_class else {
            return; // Unresolvable callee: e.g. an instance call onto a taint object.
        };
        let Some(callee_id) = self.class_hierarchy.dispatch(declared_class, &method_name) else {
            return; // Unresolvable callee.
        };
        if self.program.method(callee_id).is_abstract {
            return;
        }

        let cs_call_site_key = CSCallSite { ctx, call_site: call_site_ref };
        let cs_call_site = self.cs_manager.get_cs_call_site(ctx, call_site_ref);

        // Callee context.
        let callee_ctx = match recv_cs_obj {
            Some(obj) => self.selector.select_instance_call_context(cs_call_site_key, Some(obj)),
            None => self.selector.select_static_call_context(cs_call_site_key),
        };
        let cs_callee = self.cs_manager.get_cs_method(callee_ctx, callee_id);

        self.seed_taint_sources(cs_call_site, callee_id, ctx, caller_method_id, lhs);

        // Bind the receiver.
        if let (Some(_), Some(obj_id)) = (recv_var, recv_obj) {
            let callee_method = self.program.method(callee_id);
            if let Some(this_var) = callee_method.this_var {
                let this_ptr = self.cs_manager.get_cs_var(callee_ctx, callee_id, this_var);
                let mut delta = HybridPointsToSet::new();
                delta.insert(obj_id);
                self.worklist.add_entry(this_ptr, delta);
            }
        }

        self.fire_taint_transfers(ctx, caller_method_id, stmt_id, callee_id);

        // Add the call-graph edge, and seed params/return only the first time it's new.
        let caller_cs_method = self.cs_manager.get_cs_method(ctx, caller_method_id);
        if self.call_graph.add_edge(cs_call_site, caller_cs_method, cs_callee) {
            debug!("new call-graph edge {:?} -> {:?}", caller_cs_method, cs_callee);
            self.add_reachable(cs_callee);
            let callee_method = self.program.method(callee_id);
            let params = callee_method.params.clone();
            for (i, &arg_var) in args.iter().enumerate() {
                if let Some(&param_var) = params.get(i) {
                    let arg_ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, arg_var);
                    let param_ptr = self.cs_manager.get_cs_var(callee_ctx, callee_id, param_var);
                    self.add_pfg_edge(arg_ptr, param_ptr);
                }
            }
            if let Some(lhs_var) = lhs {
                let return_vars: Vec<VarId> = self.program.method(callee_id).return_vars().collect();
                let lhs_ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, lhs_var);
                for ret_var in return_vars {
                    let ret_ptr = self.cs_manager.get_cs_var(callee_ctx, callee_id, ret_var);
                    self.add_pfg_edge(ret_ptr, lhs_ptr);
                }
            }
        }
    }

    /// Manufactures and seeds any taint objects this call's callee produces.
    fn seed_taint_sources(&mut self, cs_call_site: CSCallSiteId, callee_id: MethodId, ctx: ContextId, caller_method_id: MethodId, lhs: Option<VarId>) {
        let Some(taint) = self.taint.as_ref() else {
            return;
        };
        let sources = taint.sources_for(cs_call_site, callee_id);
        if sources.is_empty() {
            return;
        }
        let Some(lhs_var) = lhs else {
            return;
        };
        let lhs_ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, lhs_var);
        let mut delta = HybridPointsToSet::new();
        for base in sources {
            delta.insert(self.cs_manager.get_cs_obj(base, EMPTY_CONTEXT_ID));
        }
        self.worklist.add_entry(lhs_ptr, delta);
    }

    /// Reads the current points-to sets of the receiver and each argument,
    /// asks the plugin which new taints result, and seeds them at the
    /// rule's declared destination.
    fn fire_taint_transfers(&mut self, ctx: ContextId, caller_method_id: MethodId, stmt_id: StmtId, callee_id: MethodId) {
        if self.taint.is_none() {
            return;
        }
        let stmt = self.program.method(caller_method_id).stmt_ref(stmt_id).clone();
        let Stmt::Invoke { lhs, receiver, args, .. } = stmt else {
            return;
        };

        let base_taints = match receiver {
            Some(v) => {
                let ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, v);
                self.taint_objs_in(ptr)
            }
            None => Vec::new(),
        };
        let arg_taints: Vec<Vec<BaseObj>> = args
            .iter()
            .map(|&v| {
                let ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, v);
                self.taint_objs_in(ptr)
            })
            .collect();

        let transfers = self.taint.as_ref().unwrap().apply_transfers(callee_id, &base_taints, &arg_taints);
        if transfers.is_empty() {
            return;
        }

        for (position, base_obj) in transfers {
            let target_var = match position {
                TaintPosition::Base => receiver,
                TaintPosition::Result => lhs,
                TaintPosition::Arg(i) => args.get(i).copied(),
            };
            let Some(var) = target_var else {
                continue;
            };
            let ptr = self.cs_manager.get_cs_var(ctx, caller_method_id, var);
            let obj = self.cs_manager.get_cs_obj(base_obj, EMPTY_CONTEXT_ID);
            let mut delta = HybridPointsToSet::new();
            delta.insert(obj);
            self.worklist.add_entry(ptr, delta);
        }
    }

    fn taint_objs_in(&self, ptr: PointerId) -> Vec<BaseObj> {
        self.pt_data
            .pts_of(ptr)
            .iter()
            .filter_map(|obj_id| {
                let obj = self.cs_manager.cs_obj(obj_id);
                obj.is_taint().then_some(obj.base)
            })
            .collect()
    }

    /// Scans every resolved call-graph edge for sink calls whose tainted
    /// argument traces back to a source. Runs once, after the fixpoint.
    fn collect_sinks(&mut self) {
        if self.taint.is_none() {
            return;
        }
        let call_sites: Vec<CSCallSiteId> = self.call_graph.call_sites().collect();
        let mut to_record: Vec<(CSCallSiteId, CSCallSiteId, usize)> = Vec::new();

        for cs_call_site in call_sites {
            let cs_call = self.cs_manager.cs_call_site(cs_call_site);
            let callees: Vec<CSMethodId> = self.call_graph.get_callees(cs_call_site).into_iter().collect();
            for callee_cs in callees {
                let (_, callee_id) = self.cs_manager.cs_method(callee_cs);
                let is_sink = self.taint.as_ref().unwrap().is_sink(callee_id);
                if !is_sink {
                    continue;
                }
                let indices = self.taint.as_ref().unwrap().sink_arg_indices(callee_id).to_vec();
                let stmt = self.program.method(cs_call.call_site.method).stmt_ref(cs_call.call_site.stmt).clone();
                let Stmt::Invoke { args, .. } = stmt else {
                    continue;
                };
                for idx in indices {
                    let Some(&arg_var) = args.get(idx) else {
                        continue;
                    };
                    let ptr = self.cs_manager.get_cs_var(cs_call.ctx, cs_call.call_site.method, arg_var);
                    for base_obj in self.taint_objs_in(ptr) {
                        if let BaseObj::Taint { source, .. } = base_obj {
                            to_record.push((source, cs_call_site, idx));
                        }
                    }
                }
            }
        }

        let taint = self.taint.as_mut().unwrap();
        for (source, sink, idx) in to_record {
            taint.record_flow(source, sink, idx);
        }
    }
}
