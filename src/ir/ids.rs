// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Small newtype handles used as interning keys and points-to-set elements
//! throughout the crate. Equality on any of these implies identity: they are only
//! ever produced by the interning tables in [`crate::cs_manager`].

use crate::util::bit_vec::Idx;
use serde::{Deserialize, Serialize};

macro_rules! index_newtype {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(idx: usize) -> Self {
                $name(idx as u32)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl Idx for $name {
            fn new(idx: usize) -> Self {
                $name(idx as u32)
            }
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

/// A class in the program's class hierarchy.
index_newtype!(ClassId);
/// A method declared by some class.
index_newtype!(MethodId);
/// A local variable, scoped to its owning method.
index_newtype!(VarId);
/// A field declared by some class.
index_newtype!(FieldId);
/// A statement, scoped to its owning method. Doubles as an allocation-site id
/// for `New` statements and as a call-site id for `Invoke` statements.
index_newtype!(StmtId);

/// A statement within a specific method: the IR-level reference a `New` or
/// `Invoke` statement is identified by.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct StmtRef {
    pub method: MethodId,
    pub stmt: StmtId,
}

/// Interned abstract-object handle.
index_newtype!(ObjId);
/// Interned (context, method) handle.
index_newtype!(CSMethodId);
/// Interned (context, call-site) handle.
index_newtype!(CSCallSiteId);
/// Interned taint-type name, so `BaseObj::Taint` stays `Copy` (see
/// `crate::pta::taint::TaintPlugin`'s `type_ids` table).
index_newtype!(TaintTypeId);
