// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Pluggable context sensitivity behind a `ContextSelector` trait, with one
//! `CtxElem` sum type shared by every selector so they all use a single
//! `ContextCache<CtxElem>` — the abstract IR has only two kinds of
//! context-worthy entity (call sites and objects) and nothing is gained by
//! keeping them in separate caches.

use crate::call_site::CSCallSite;
use crate::context::{Context, ContextCache, ContextElement, ContextId, EMPTY_CONTEXT_ID};
use crate::ir::ids::ClassId;
use crate::pointer::{BaseObj, CSObj};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CtxElem {
    CallSite(CSCallSite),
    Object(CSObj),
    Type(ClassId),
}

impl ContextElement for CtxElem {}

/// Selects the callee context for a call-resolution step, deriving
/// `calleeCtx` via the configured `ContextSelector`. `receiver` is `None`
/// for static calls and for calls onto a taint object (taint objects always
/// carry the empty heap context, so they never contribute object-sensitive
/// context).
pub trait ContextSelector {
    fn select_instance_call_context(&mut self, call_site: CSCallSite, receiver: Option<CSObj>) -> ContextId;
    fn select_static_call_context(&mut self, call_site: CSCallSite) -> ContextId;

    /// Heap context for an object allocated by a method running under
    /// `method_ctx` (`selectHeapContext(csMethod, allocObj)`, taking the
    /// method's already-resolved context directly rather than a
    /// `CSMethodId` so this trait stays independent of `CSManager`). Every
    /// selector here propagates the allocating method's own context
    /// unchanged, which is the usual "heap context = allocation context"
    /// realization of k-object sensitivity; `alloc_obj` is available for
    /// selectors that want to special-case by allocated type.
    fn select_heap_context(&mut self, method_ctx: ContextId, _alloc_obj: BaseObj) -> ContextId {
        method_ctx
    }
}

#[derive(Default)]
pub struct ContextInsensitive;

impl ContextSelector for ContextInsensitive {
    fn select_instance_call_context(&mut self, _call_site: CSCallSite, _receiver: Option<CSObj>) -> ContextId {
        EMPTY_CONTEXT_ID
    }

    fn select_static_call_context(&mut self, _call_site: CSCallSite) -> ContextId {
        EMPTY_CONTEXT_ID
    }
}

pub struct KCallSiteSensitive {
    k: usize,
    ctx_cache: ContextCache<CtxElem>,
}

impl KCallSiteSensitive {
    pub fn new(k: usize) -> Self {
        KCallSiteSensitive { k, ctx_cache: ContextCache::new() }
    }

    fn new_context(&mut self, call_site: CSCallSite) -> ContextId {
        let caller_ctx = self.ctx_cache.get_context(call_site.ctx).unwrap_or_else(Context::new_empty);
        let callee_ctx = Context::new_k_limited_context(&caller_ctx, CtxElem::CallSite(call_site), self.k);
        self.ctx_cache.get_context_id(&callee_ctx)
    }
}

impl ContextSelector for KCallSiteSensitive {
    fn select_instance_call_context(&mut self, call_site: CSCallSite, _receiver: Option<CSObj>) -> ContextId {
        self.new_context(call_site)
    }

    fn select_static_call_context(&mut self, call_site: CSCallSite) -> ContextId {
        self.new_context(call_site)
    }
}

/// k-limited object sensitivity: the callee's context is the receiver
/// object's own context extended by the receiver object itself.
pub struct KObjectSensitive {
    k: usize,
    ctx_cache: ContextCache<CtxElem>,
}

impl KObjectSensitive {
    pub fn new(k: usize) -> Self {
        KObjectSensitive { k, ctx_cache: ContextCache::new() }
    }
}

impl ContextSelector for KObjectSensitive {
    fn select_instance_call_context(&mut self, _call_site: CSCallSite, receiver: Option<CSObj>) -> ContextId {
        match receiver {
            Some(obj) => {
                let recv_ctx = self.ctx_cache.get_context(obj.heap_ctx).unwrap_or_else(Context::new_empty);
                let callee_ctx = Context::new_k_limited_context(&recv_ctx, CtxElem::Object(obj), self.k);
                self.ctx_cache.get_context_id(&callee_ctx)
            }
            // No receiver to key on (a static call, or dispatch onto a taint
            // object): fall back to the empty context.
            None => EMPTY_CONTEXT_ID,
        }
    }

    fn select_static_call_context(&mut self, call_site: CSCallSite) -> ContextId {
        // Same context as the caller: object sensitivity has nothing to key a
        // static call on.
        call_site.ctx
    }
}

/// k-limited type sensitivity: the same shape as object sensitivity, but the
/// context element is the receiver's declared (allocation) class rather than
/// the object itself, collapsing together every object of the same type.
pub struct KTypeSensitive {
    k: usize,
    ctx_cache: ContextCache<CtxElem>,
}

impl KTypeSensitive {
    pub fn new(k: usize) -> Self {
        KTypeSensitive { k, ctx_cache: ContextCache::new() }
    }
}

impl ContextSelector for KTypeSensitive {
    fn select_instance_call_context(&mut self, _call_site: CSCallSite, receiver: Option<CSObj>) -> ContextId {
        match receiver.and_then(|obj| obj.declared_class().map(|class| (obj.heap_ctx, class))) {
            Some((heap_ctx, class)) => {
                let recv_ctx = self.ctx_cache.get_context(heap_ctx).unwrap_or_else(Context::new_empty);
                let callee_ctx = Context::new_k_limited_context(&recv_ctx, CtxElem::Type(class), self.k);
                self.ctx_cache.get_context_id(&callee_ctx)
            }
            None => EMPTY_CONTEXT_ID,
        }
    }

    fn select_static_call_context(&mut self, call_site: CSCallSite) -> ContextId {
        call_site.ctx
    }
}
