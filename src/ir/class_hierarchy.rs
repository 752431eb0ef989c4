// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The dispatch oracle: resolving a virtual call's callee from the declared
//! (allocation) type of the receiver and the call's method name, walking the
//! subclass lattice. Kept as a standalone lookup table, separate from the
//! propagator itself.

use std::collections::HashMap;

use super::ids::{ClassId, MethodId};
use super::program::Program;

pub struct ClassHierarchy<'p> {
    program: &'p Program,
    /// (class, method name) -> the method declared on that exact class, if any.
    declared: HashMap<(ClassId, &'p str), MethodId>,
}

impl<'p> ClassHierarchy<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut declared = HashMap::new();
        for class in &program.classes {
            for &method_id in &class.declared_methods {
                let method = program.method(method_id);
                declared.insert((class.id, method.name.as_str()), method_id);
            }
        }
        ClassHierarchy { program, declared }
    }

    /// Walks from `start` up through superclasses, returning the first
    /// declaration of `method_name` found. This is the single-dispatch vtable
    /// lookup that resolves a virtual call's callee using the receiver's
    /// declared type. Returns `None` if unresolvable; returns an abstract
    /// method's id too, left for the caller to reject.
    pub fn dispatch(&self, start: ClassId, method_name: &str) -> Option<MethodId> {
        let mut current = Some(start);
        while let Some(class_id) = current {
            if let Some(&method_id) = self.declared.get(&(class_id, method_name)) {
                return Some(method_id);
            }
            current = self.program.class(class_id).superclass;
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::ids::VarId;
    use crate::ir::program::{Class, Method};

    fn two_level_hierarchy() -> Program {
        let m_a = Method {
            id: MethodId(0),
            name: "m".into(),
            class: ClassId(0),
            this_var: Some(VarId(0)),
            params: vec![],
            is_abstract: false,
            stmts: vec![],
        };
        let m_b = Method {
            id: MethodId(1),
            name: "m".into(),
            class: ClassId(1),
            this_var: Some(VarId(1)),
            params: vec![],
            is_abstract: false,
            stmts: vec![],
        };
        Program {
            classes: vec![
                Class { id: ClassId(0), name: "A".into(), superclass: None, declared_methods: vec![MethodId(0)] },
                Class { id: ClassId(1), name: "B".into(), superclass: Some(ClassId(0)), declared_methods: vec![MethodId(1)] },
            ],
            methods: vec![m_a, m_b],
            fields: vec![],
        }
    }

    #[test]
    fn overriding_subclass_wins() {
        let program = two_level_hierarchy();
        let ch = ClassHierarchy::new(&program);
        assert_eq!(ch.dispatch(ClassId(1), "m"), Some(MethodId(1)));
    }

    #[test]
    fn inherited_method_found_on_superclass() {
        let program = two_level_hierarchy();
        let ch = ClassHierarchy::new(&program);
        assert_eq!(ch.dispatch(ClassId(0), "m"), Some(MethodId(0)));
    }

    #[test]
    fn unresolvable_method_is_none() {
        let program = two_level_hierarchy();
        let ch = ClassHierarchy::new(&program);
        assert_eq!(ch.dispatch(ClassId(1), "nope"), None);
    }
}
