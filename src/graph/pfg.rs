// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The pointer flow graph: a directed multigraph over `Pointer` nodes,
//! propagating points-to sets along `subset` edges. Every edge here is a
//! subset/copy edge — the abstract IR's flat statement set never needs the
//! addr/load/store/gep/cast distinctions a richer IR would carry — so there
//! is nothing left to tag and a single edge kind suffices.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use petgraph::graph::{DefaultIx, NodeIndex};
use petgraph::Graph;

use crate::pointer::Pointer;

/// Node handle. Petgraph's own `NodeIndex` is reused directly as the pointer
/// handle: a node is added exactly once, at first-interning time, so its
/// `NodeIndex` is stable for the node's lifetime.
pub type PointerId = NodeIndex<DefaultIx>;

struct PFGNode {
    pointer: Pointer,
}

/// The pointer flow graph plus the `Pointer -> PointerId` interning table
/// that hands out the handles points-to sets and the solver key everything
/// on: one node per distinct `Pointer`.
pub struct PointerFlowGraph {
    graph: Graph<PFGNode, ()>,
    values: HashMap<Pointer, PointerId>,
    /// `(src, dst)` pairs already connected by a subset edge, so that
    /// `add_edge` can report novelty without an O(out-degree) scan.
    edges: HashSet<(PointerId, PointerId)>,
}

impl Default for PointerFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerFlowGraph {
    pub fn new() -> Self {
        PointerFlowGraph {
            graph: Graph::new(),
            values: HashMap::new(),
            edges: HashSet::new(),
        }
    }

    pub fn pointer(&self, id: PointerId) -> Pointer {
        self.graph.node_weight(id).unwrap().pointer
    }

    pub fn node_id(&self, pointer: &Pointer) -> Option<PointerId> {
        self.values.get(pointer).copied()
    }

    /// Interns `pointer`, creating a node on first use.
    pub fn get_or_insert_node(&mut self, pointer: Pointer) -> PointerId {
        match self.values.entry(pointer) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = self.graph.add_node(PFGNode { pointer });
                *v.insert(id)
            }
        }
    }

    /// Adds a subset edge `src -> dst` if not already present. Returns `true`
    /// iff the edge is new, mirroring the novelty-reporting `CallGraph::add_edge`
    /// the solver's worklist seeding depends on.
    pub fn add_edge(&mut self, src: PointerId, dst: PointerId) -> bool {
        if src == dst {
            return false;
        }
        if self.edges.insert((src, dst)) {
            self.graph.add_edge(src, dst, ());
            true
        } else {
            false
        }
    }

    pub fn has_edge(&self, src: PointerId, dst: PointerId) -> bool {
        self.edges.contains(&(src, dst))
    }

    /// Successors of `id` along subset edges: everywhere `id`'s points-to
    /// set must be propagated to when it grows.
    pub fn succs_of(&self, id: PointerId) -> impl Iterator<Item = PointerId> + '_ {
        self.graph.neighbors(id)
    }

    pub fn num_pointers(&self) -> usize {
        self.graph.node_count()
    }

    pub fn pointers(&self) -> impl Iterator<Item = (PointerId, Pointer)> + '_ {
        self.graph.node_indices().map(move |id| (id, self.pointer(id)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::EMPTY_CONTEXT_ID;
    use crate::ir::ids::{MethodId, VarId};

    #[test]
    fn interning_is_idempotent() {
        let mut pfg = PointerFlowGraph::new();
        let p = Pointer::CSVar(EMPTY_CONTEXT_ID, MethodId(0), VarId(0));
        let a = pfg.get_or_insert_node(p);
        let b = pfg.get_or_insert_node(p);
        assert_eq!(a, b);
        assert_eq!(pfg.num_pointers(), 1);
    }

    #[test]
    fn add_edge_reports_novelty_once() {
        let mut pfg = PointerFlowGraph::new();
        let x = pfg.get_or_insert_node(Pointer::CSVar(EMPTY_CONTEXT_ID, MethodId(0), VarId(0)));
        let y = pfg.get_or_insert_node(Pointer::CSVar(EMPTY_CONTEXT_ID, MethodId(0), VarId(1)));
        assert!(pfg.add_edge(x, y));
        assert!(!pfg.add_edge(x, y));
        assert_eq!(pfg.succs_of(x).collect::<Vec<_>>(), vec![y]);
    }

    #[test]
    fn self_edge_is_never_added() {
        let mut pfg = PointerFlowGraph::new();
        let x = pfg.get_or_insert_node(Pointer::CSVar(EMPTY_CONTEXT_ID, MethodId(0), VarId(0)));
        assert!(!pfg.add_edge(x, x));
    }
}
