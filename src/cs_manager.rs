// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The interning authority: every context-sensitive pointer, object, method
//! and call site in the analysis is handed out from here, and only from
//! here, so that pointer/object identity reduces to handle equality. Each
//! entity kind gets its own bidirectional table (vec for id -> value, hash
//! map for value -> id), following the same entry-API idiom throughout.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::context::ContextId;
use crate::call_site::{CallSite, CSCallSite};
use crate::graph::pfg::{PointerFlowGraph, PointerId};
use crate::ir::ids::{CSCallSiteId, CSMethodId, FieldId, MethodId, ObjId, VarId};
use crate::pointer::{BaseObj, CSObj, Pointer};

pub struct CSManager {
    /// Owns `Pointer` identity; `CSManager` is the sole writer. Exposed read
    /// access so the solver can walk subset edges during propagation.
    pfg: PointerFlowGraph,

    objs: Vec<CSObj>,
    obj_table: HashMap<CSObj, ObjId>,

    cs_methods: Vec<(ContextId, MethodId)>,
    cs_method_table: HashMap<(ContextId, MethodId), CSMethodId>,

    cs_call_sites: Vec<CSCallSite>,
    cs_call_site_table: HashMap<CSCallSite, CSCallSiteId>,
}

impl Default for CSManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CSManager {
    pub fn new() -> Self {
        CSManager {
            pfg: PointerFlowGraph::new(),
            objs: Vec::new(),
            obj_table: HashMap::new(),
            cs_methods: Vec::new(),
            cs_method_table: HashMap::new(),
            cs_call_sites: Vec::new(),
            cs_call_site_table: HashMap::new(),
        }
    }

    pub fn pfg(&self) -> &PointerFlowGraph {
        &self.pfg
    }

    pub fn pfg_mut(&mut self) -> &mut PointerFlowGraph {
        &mut self.pfg
    }

    // --- Pointer interning (delegates to the PFG, which owns the node table) ---

    pub fn get_cs_var(&mut self, ctx: ContextId, method: MethodId, var: VarId) -> PointerId {
        self.pfg.get_or_insert_node(Pointer::CSVar(ctx, method, var))
    }

    pub fn get_instance_field(&mut self, base: ObjId, field: FieldId) -> PointerId {
        self.pfg.get_or_insert_node(Pointer::InstanceField(base, field))
    }

    pub fn get_array_index(&mut self, base: ObjId) -> PointerId {
        self.pfg.get_or_insert_node(Pointer::ArrayIndex(base))
    }

    pub fn get_static_field(&mut self, field: FieldId) -> PointerId {
        self.pfg.get_or_insert_node(Pointer::StaticField(field))
    }

    pub fn pointer(&self, id: PointerId) -> Pointer {
        self.pfg.pointer(id)
    }

    // --- Object interning ---

    /// Interns an abstract object under the allocation-site heap model:
    /// `(base, heap_ctx) -> ObjId`, identity via this table alone.
    pub fn get_cs_obj(&mut self, base: BaseObj, heap_ctx: ContextId) -> ObjId {
        let obj = CSObj { base, heap_ctx };
        match self.obj_table.entry(obj) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = ObjId::new(self.objs.len());
                self.objs.push(obj);
                *v.insert(id)
            }
        }
    }

    pub fn cs_obj(&self, id: ObjId) -> CSObj {
        self.objs[id.0 as usize]
    }

    // --- Method interning ---

    pub fn get_cs_method(&mut self, ctx: ContextId, method: MethodId) -> CSMethodId {
        let key = (ctx, method);
        match self.cs_method_table.entry(key) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = CSMethodId::new(self.cs_methods.len());
                self.cs_methods.push(key);
                *v.insert(id)
            }
        }
    }

    pub fn cs_method(&self, id: CSMethodId) -> (ContextId, MethodId) {
        self.cs_methods[id.0 as usize]
    }

    /// Read-only counterpart to `get_cs_method`: looks up a `(ctx, method)`
    /// pair's handle without interning it, for callers (e.g. tests) that only
    /// have a `&CSManager` and want to know whether a method was ever made
    /// context-sensitive-reachable.
    pub fn find_cs_method(&self, ctx: ContextId, method: MethodId) -> Option<CSMethodId> {
        self.cs_method_table.get(&(ctx, method)).copied()
    }

    // --- Call-site interning ---

    pub fn get_cs_call_site(&mut self, ctx: ContextId, call_site: CallSite) -> CSCallSiteId {
        let cs = CSCallSite { ctx, call_site };
        match self.cs_call_site_table.entry(cs) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let id = CSCallSiteId::new(self.cs_call_sites.len());
                self.cs_call_sites.push(cs);
                *v.insert(id)
            }
        }
    }

    pub fn cs_call_site(&self, id: CSCallSiteId) -> CSCallSite {
        self.cs_call_sites[id.0 as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::EMPTY_CONTEXT_ID;
    use crate::ir::ids::{ClassId, StmtId, StmtRef};

    #[test]
    fn var_interning_is_idempotent() {
        let mut m = CSManager::new();
        let a = m.get_cs_var(EMPTY_CONTEXT_ID, MethodId(0), VarId(0));
        let b = m.get_cs_var(EMPTY_CONTEXT_ID, MethodId(0), VarId(0));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_contexts_give_distinct_objects() {
        let mut m = CSManager::new();
        let site = StmtRef { method: MethodId(0), stmt: StmtId(0) };
        let base = BaseObj::Alloc { site, class: ClassId(0) };
        let o1 = m.get_cs_obj(base, EMPTY_CONTEXT_ID);
        let o2 = m.get_cs_obj(base, ContextId(1));
        assert_ne!(o1, o2);
        assert_eq!(m.get_cs_obj(base, EMPTY_CONTEXT_ID), o1);
    }

    #[test]
    fn method_and_call_site_interning_round_trip() {
        let mut m = CSManager::new();
        let cs_method = m.get_cs_method(EMPTY_CONTEXT_ID, MethodId(3));
        assert_eq!(m.cs_method(cs_method), (EMPTY_CONTEXT_ID, MethodId(3)));

        let call_site = StmtRef { method: MethodId(3), stmt: StmtId(1) };
        let cs_call_site = m.get_cs_call_site(EMPTY_CONTEXT_ID, call_site);
        assert_eq!(m.cs_call_site(cs_call_site), CSCallSite { ctx: EMPTY_CONTEXT_ID, call_site });
    }
}
