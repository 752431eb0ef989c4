// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The `Obj`/`Pointer` tagged unions: every pointer-like and object-like
//! entity the analysis reasons about collapsed into two small enums, with
//! only the variant set the abstract IR actually needs.

use crate::call_site::CSCallSiteId;
use crate::context::ContextId;
use crate::ir::ids::{ClassId, FieldId, MethodId, ObjId, StmtRef, TaintTypeId, VarId};

/// The un-contextualized identity of an abstract object: either a real
/// allocation site, or a taint marker naming the call that produced it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseObj {
    Alloc { site: StmtRef, class: ClassId },
    /// `makeTaint(invoke, type)`: a taint-flavored object keyed by its source
    /// call and declared taint type.
    Taint { source: CSCallSiteId, taint_type: TaintTypeId },
}

/// A fully contextualized abstract object: what actually lives in points-to
/// sets. Two regular objects share identity iff they share allocation site and
/// heap context; taint objects always carry the empty heap context.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSObj {
    pub base: BaseObj,
    pub heap_ctx: ContextId,
}

impl CSObj {
    pub fn is_taint(&self) -> bool {
        matches!(self.base, BaseObj::Taint { .. })
    }

    pub fn declared_class(&self) -> Option<ClassId> {
        match self.base {
            BaseObj::Alloc { class, .. } => Some(class),
            BaseObj::Taint { .. } => None,
        }
    }
}

/// A node in the pointer flow graph. `CSVar` carries its owning method
/// alongside the variable so that looking up the statements that use this
/// var as a store/load/invoke base (needed by the solver's per-object
/// field/array/call effects) never needs a separate var-to-method reverse
/// index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Pointer {
    CSVar(ContextId, MethodId, VarId),
    InstanceField(ObjId, FieldId),
    ArrayIndex(ObjId),
    StaticField(FieldId),
}
