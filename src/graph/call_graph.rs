// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The context-sensitive call graph: `addReachable`/call-resolution builds
//! this up on the fly as the fixpoint discovers new call edges. Node and
//! edge identity are fixed to this crate's own `CSMethodId`/`CSCallSiteId`
//! (there is only ever one instantiation here), with a plain `VecDeque`
//! driving the reachable-methods queue.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::Graph;

use crate::cs_manager::CSManager;
use crate::ir::ids::{CSCallSiteId, CSMethodId};

pub type CGNodeId = NodeIndex<DefaultIx>;
pub type CGEdgeId = EdgeIndex<DefaultIx>;

#[derive(Debug)]
struct CallGraphNode {
    method: CSMethodId,
}

#[derive(Debug)]
struct CallGraphEdge {
    call_site: CSCallSiteId,
}

/// The call graph proper, plus the monotone set of call sites and reachable
/// methods the fixpoint grows over time: `add_reachable` is idempotent, and
/// edges are added monotonically.
pub struct CallGraph {
    graph: Graph<CallGraphNode, CallGraphEdge>,
    method_nodes: HashMap<CSMethodId, CGNodeId>,
    callsite_to_edges: HashMap<CSCallSiteId, HashSet<CGEdgeId>>,
    reach_methods: VecDeque<CSMethodId>,
    reach_methods_seen: HashSet<CSMethodId>,
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::new(),
            method_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
            reach_methods: VecDeque::new(),
            reach_methods_seen: HashSet::new(),
        }
    }

    /// Marks `method` reachable, returning `true` the first time. This is the
    /// entry point for the solver's `addReachable(csMethod)` step.
    pub fn add_reachable(&mut self, method: CSMethodId) -> bool {
        self.get_or_insert_node(method);
        if self.reach_methods_seen.insert(method) {
            self.reach_methods.push_back(method);
            true
        } else {
            false
        }
    }

    pub fn is_reachable(&self, method: CSMethodId) -> bool {
        self.reach_methods_seen.contains(&method)
    }

    fn get_or_insert_node(&mut self, method: CSMethodId) -> CGNodeId {
        match self.method_nodes.entry(method) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = self.graph.add_node(CallGraphNode { method });
                *v.insert(id)
            }
        }
    }

    pub fn get_callees(&self, call_site: CSCallSiteId) -> HashSet<CSMethodId> {
        match self.callsite_to_edges.get(&call_site) {
            Some(edges) => edges
                .iter()
                .filter_map(|&e| self.graph.edge_endpoints(e))
                .map(|(_, callee)| self.graph.node_weight(callee).unwrap().method)
                .collect(),
            None => HashSet::new(),
        }
    }

    pub fn has_edge(&self, call_site: CSCallSiteId, callee: CSMethodId) -> bool {
        self.get_callees(call_site).contains(&callee)
    }

    /// Adds a call edge `caller --call_site--> callee`. Returns `true` iff the
    /// edge is new, so the caller can seed the worklist with parameter/return
    /// assignments only once per edge.
    pub fn add_edge(&mut self, call_site: CSCallSiteId, caller: CSMethodId, callee: CSMethodId) -> bool {
        let caller_node = self.get_or_insert_node(caller);
        let callee_node = self.get_or_insert_node(callee);
        if self.has_edge(call_site, callee) {
            return false;
        }
        let edge_id = self.graph.add_edge(caller_node, callee_node, CallGraphEdge { call_site });
        self.callsite_to_edges.entry(call_site).or_default().insert(edge_id);
        true
    }

    pub fn reachable_methods(&self) -> impl Iterator<Item = CSMethodId> + '_ {
        self.reach_methods_seen.iter().copied()
    }

    /// Every call site with at least one resolved edge, for the taint
    /// plugin's "on finish" sink scan.
    pub fn call_sites(&self) -> impl Iterator<Item = CSCallSiteId> + '_ {
        self.callsite_to_edges.keys().copied()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn num_methods(&self) -> usize {
        self.graph.node_count()
    }

    /// Graphviz export for `--dump-call-graph`. Node and
    /// edge labels defer to `CSManager` so that the graph module itself stays
    /// free of any `ir::program` dependency.
    pub fn to_dot(&self, cs_manager: &CSManager) -> String {
        let display = self.graph.map(
            |_, node| format!("{:?}", cs_manager.cs_method(node.method)),
            |_, edge| format!("{:?}", cs_manager.cs_call_site(edge.call_site)),
        );
        format!("{:?}", petgraph::dot::Dot::with_config(&display, &[]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::EMPTY_CONTEXT_ID;
    use crate::ir::ids::MethodId;

    fn method(cs_manager: &mut CSManager, n: u32) -> CSMethodId {
        cs_manager.get_cs_method(EMPTY_CONTEXT_ID, MethodId(n))
    }

    #[test]
    fn add_reachable_is_novel_once() {
        let mut cs_manager = CSManager::new();
        let mut cg = CallGraph::new();
        let m = method(&mut cs_manager, 0);
        assert!(cg.add_reachable(m));
        assert!(!cg.add_reachable(m));
    }

    #[test]
    fn add_edge_reports_novelty_and_tracks_callees() {
        let mut cs_manager = CSManager::new();
        let mut cg = CallGraph::new();
        let caller = method(&mut cs_manager, 0);
        let callee = method(&mut cs_manager, 1);
        let cs_call_site = cs_manager.get_cs_call_site(
            EMPTY_CONTEXT_ID,
            crate::ir::ids::StmtRef { method: MethodId(0), stmt: crate::ir::ids::StmtId(0) },
        );
        assert!(cg.add_edge(cs_call_site, caller, callee));
        assert!(!cg.add_edge(cs_call_site, caller, callee));
        assert_eq!(cg.get_callees(cs_call_site), [callee].into_iter().collect());
    }
}
