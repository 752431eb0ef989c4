// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The IR consumed by the solver: classes, methods, statements, forming an
//! abstract three-address form built directly from a JSON document rather
//! than lowered from a compiler's own intermediate representation.

use serde::{Deserialize, Serialize};

use super::ids::{ClassId, FieldId, MethodId, StmtId, VarId};

/// One statement of the three-address IR. Variants correspond exactly to the
/// shapes the solver's per-statement dispatch handles, plus `Return`, which
/// carries no solver action of its own but marks a method's return
/// variables for the call-resolution return-edge wiring.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stmt {
    /// `x = new T()`
    New { lhs: VarId, class: ClassId },
    /// `x = y`
    Copy { lhs: VarId, rhs: VarId },
    /// `x = T.f`
    LoadStatic { lhs: VarId, field: FieldId },
    /// `T.f = y`
    StoreStatic { field: FieldId, rhs: VarId },
    /// `y = v.f`
    LoadField { lhs: VarId, base: VarId, field: FieldId },
    /// `v.f = y`
    StoreField { base: VarId, field: FieldId, rhs: VarId },
    /// `y = v[*]`
    LoadArray { lhs: VarId, base: VarId },
    /// `v[*] = y`
    StoreArray { base: VarId, rhs: VarId },
    /// A call, static or instance. `receiver = None` marks a static call, in
    /// which case `static_class` names the statically known target class to
    /// dispatch against.
    Invoke {
        lhs: Option<VarId>,
        receiver: Option<VarId>,
        static_class: Option<ClassId>,
        method_name: String,
        args: Vec<VarId>,
    },
    /// Marks `var` as one of the method's return variables.
    Return { var: VarId },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub declaring_class: ClassId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,
    pub name: String,
    pub class: ClassId,
    /// `None` for a static method.
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    pub is_abstract: bool,
    pub stmts: Vec<Stmt>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.this_var.is_none()
    }

    pub fn stmt_ref(&self, stmt: StmtId) -> &Stmt {
        &self.stmts[stmt.0 as usize]
    }

    /// Variables marked by a `Return` statement, in statement order.
    pub fn return_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.stmts.iter().filter_map(|s| match s {
            Stmt::Return { var } => Some(*var),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub superclass: Option<ClassId>,
    /// Methods declared directly on this class (not inherited).
    pub declared_methods: Vec<MethodId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Program {
    pub classes: Vec<Class>,
    pub methods: Vec<Method>,
    pub fields: Vec<Field>,
}

impl Program {
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    /// Finds the entry method by `Class.method` name, as the CLI's `--entry`
    /// option requires for main-method discovery.
    pub fn find_method_by_qualified_name(&self, qualified: &str) -> Option<MethodId> {
        let (class_name, method_name) = qualified.split_once('.')?;
        let class = self.classes.iter().find(|c| c.name == class_name)?;
        class
            .declared_methods
            .iter()
            .map(|&m| self.method(m))
            .find(|m| m.name == method_name)
            .map(|m| m.id)
    }
}
