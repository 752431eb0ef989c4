// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Call-site identifiers: a call site is just the `Invoke` statement's
//! location in its method, paired with a context to make it context-sensitive.

use crate::context::ContextId;
use crate::ir::ids::StmtRef;

pub use crate::ir::ids::CSCallSiteId;

/// A call site, context-free: the `Invoke` statement's position.
pub type CallSite = StmtRef;

/// A call site paired with the context it was reached under. Hashed/interned
/// by `CSManager::get_cs_call_site` into a `CSCallSiteId`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CSCallSite {
    pub ctx: ContextId,
    pub call_site: CallSite,
}
