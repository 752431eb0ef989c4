// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.
//
// End-to-end scenario tests (S1-S6) and the universal invariants, driven
// against directly-constructed `Program` values rather than compiled source
// fixtures, since there is no compiler front-end to invoke here.

use taipan::context::EMPTY_CONTEXT_ID;
use taipan::ir::ids::{ClassId, FieldId, MethodId, VarId};
use taipan::ir::program::{Class, Field, Method, Program, Stmt};
use taipan::pta::context_selector::{ContextInsensitive, KCallSiteSensitive};
use taipan::pta::heap_model::AllocSiteHeapModel;
use taipan::pta::result::PointerAnalysisResult;
use taipan::pta::solver::Solver;
use taipan::pta::taint::{RawTaintConfig, TaintPlugin};
use taipan::pts_set::points_to::PointsToSet;

fn class(id: u32, name: &str, superclass: Option<ClassId>, methods: Vec<MethodId>) -> Class {
    Class { id: ClassId(id), name: name.into(), superclass, declared_methods: methods }
}

fn method(id: u32, name: &str, class: u32, this_var: Option<u32>, params: Vec<u32>, stmts: Vec<Stmt>) -> Method {
    Method {
        id: MethodId(id),
        name: name.into(),
        class: ClassId(class),
        this_var: this_var.map(VarId),
        params: params.into_iter().map(VarId).collect(),
        is_abstract: false,
        stmts,
    }
}

/// S1 - Basic allocation & copy: `main() { A x = new A(); A y = x; }`.
#[test]
fn s1_allocation_and_copy_share_the_same_object() {
    let main = method(
        0,
        "main",
        0,
        None,
        vec![],
        vec![Stmt::New { lhs: VarId(0), class: ClassId(1) }, Stmt::Copy { lhs: VarId(1), rhs: VarId(0) }],
    );
    let program = Program {
        classes: vec![class(0, "Main", None, vec![MethodId(0)]), class(1, "A", None, vec![])],
        methods: vec![main],
        fields: vec![],
    };

    let solver = Solver::new(&program, MethodId(0), ContextInsensitive, AllocSiteHeapModel, None);
    let result = PointerAnalysisResult::from_solver(solver);

    let pts_x = result.points_to_set(MethodId(0), VarId(0));
    let pts_y = result.points_to_set(MethodId(0), VarId(1));
    assert_eq!(pts_x.count(), 1);
    assert_eq!(pts_y.count(), 1);
    assert!(pts_x.iter().eq(pts_y.iter()));
}

/// S2 - Virtual dispatch discovers a callee: `B extends A`, both override
/// `m()`. `main() { A a = new B(); a.m(); }` must resolve to `B.m` only.
#[test]
fn s2_virtual_dispatch_resolves_the_override() {
    let a_m = method(0, "m", 0, Some(0), vec![], vec![]);
    let b_m = method(1, "m", 1, Some(0), vec![], vec![]);
    let main = method(
        2,
        "main",
        2,
        None,
        vec![],
        vec![
            Stmt::New { lhs: VarId(0), class: ClassId(1) },
            Stmt::Invoke { lhs: None, receiver: Some(VarId(0)), static_class: None, method_name: "m".into(), args: vec![] },
        ],
    );
    let program = Program {
        classes: vec![
            class(0, "A", None, vec![MethodId(0)]),
            class(1, "B", Some(ClassId(0)), vec![MethodId(1)]),
            class(2, "Main", None, vec![MethodId(2)]),
        ],
        methods: vec![a_m, b_m, main],
        fields: vec![],
    };

    let solver = Solver::new(&program, MethodId(2), ContextInsensitive, AllocSiteHeapModel, None);
    let result = PointerAnalysisResult::from_solver(solver);

    let main_cs = result.cs_manager().find_cs_method(EMPTY_CONTEXT_ID, MethodId(2)).unwrap();
    let b_m_cs = result.cs_manager().find_cs_method(EMPTY_CONTEXT_ID, MethodId(1)).unwrap();

    assert!(result.call_graph().is_reachable(b_m_cs));
    assert!(result.cs_manager().find_cs_method(EMPTY_CONTEXT_ID, MethodId(0)).is_none());
    assert!(result.call_graph().is_reachable(main_cs));
}

/// S3 - Context distinguishes call sites: two call sites `id(p)` with
/// distinct allocation arguments produce distinct parameter points-to sets
/// under a 1-call-site-sensitive selector.
#[test]
fn s3_call_site_sensitivity_separates_two_calls() {
    let id_fn = method(
        0,
        "id",
        0,
        None,
        vec![10],
        vec![Stmt::Return { var: VarId(10) }],
    );
    let main = method(
        1,
        "main",
        0,
        None,
        vec![],
        vec![
            Stmt::New { lhs: VarId(0), class: ClassId(1) },
            Stmt::Invoke {
                lhs: Some(VarId(1)),
                receiver: None,
                static_class: Some(ClassId(0)),
                method_name: "id".into(),
                args: vec![VarId(0)],
            },
            Stmt::New { lhs: VarId(2), class: ClassId(2) },
            Stmt::Invoke {
                lhs: Some(VarId(3)),
                receiver: None,
                static_class: Some(ClassId(0)),
                method_name: "id".into(),
                args: vec![VarId(2)],
            },
        ],
    );
    let program = Program {
        classes: vec![
            class(0, "Util", None, vec![MethodId(0), MethodId(1)]),
            class(1, "A", None, vec![]),
            class(2, "B", None, vec![]),
        ],
        methods: vec![id_fn, main],
        fields: vec![],
    };

    let solver = Solver::new(&program, MethodId(1), KCallSiteSensitive::new(1), AllocSiteHeapModel, None);
    let result = PointerAnalysisResult::from_solver(solver);

    // Both call results, unioned across contexts, see exactly their own
    // argument's object and not the other call's.
    let ret1 = result.points_to_set(MethodId(1), VarId(1));
    let ret2 = result.points_to_set(MethodId(1), VarId(3));
    assert_eq!(ret1.count(), 1);
    assert_eq!(ret2.count(), 1);
    assert!(!ret1.iter().eq(ret2.iter()));
}

/// S4 - Instance field flow: `x.f = a; y = x.f;` propagates through the
/// object `x` points to.
#[test]
fn s4_instance_field_store_then_load() {
    let main = method(
        0,
        "main",
        0,
        None,
        vec![],
        vec![
            Stmt::New { lhs: VarId(0), class: ClassId(1) }, // x = new A()
            Stmt::New { lhs: VarId(1), class: ClassId(2) }, // a = new V()
            Stmt::StoreField { base: VarId(0), field: FieldId(0), rhs: VarId(1) }, // x.f = a
            Stmt::LoadField { lhs: VarId(2), base: VarId(0), field: FieldId(0) },  // y = x.f
        ],
    );
    let program = Program {
        classes: vec![
            class(0, "Main", None, vec![MethodId(0)]),
            class(1, "A", None, vec![]),
            class(2, "V", None, vec![]),
        ],
        methods: vec![main],
        fields: vec![Field { id: FieldId(0), name: "f".into(), declaring_class: ClassId(1) }],
    };

    let solver = Solver::new(&program, MethodId(0), ContextInsensitive, AllocSiteHeapModel, None);
    let result = PointerAnalysisResult::from_solver(solver);

    let pts_a = result.points_to_set(MethodId(0), VarId(1));
    let pts_y = result.points_to_set(MethodId(0), VarId(2));
    assert_eq!(pts_a.count(), 1);
    assert!(pts_y.superset(&pts_a));
}

fn source_sink_program() -> Program {
    let get = method(0, "get", 0, None, vec![], vec![]);
    let leak = method(1, "leak", 1, None, vec![10], vec![]);
    let main = method(
        2,
        "main",
        2,
        None,
        vec![],
        vec![
            Stmt::Invoke {
                lhs: Some(VarId(0)),
                receiver: None,
                static_class: Some(ClassId(0)),
                method_name: "get".into(),
                args: vec![],
            },
            Stmt::Invoke {
                lhs: None,
                receiver: None,
                static_class: Some(ClassId(1)),
                method_name: "leak".into(),
                args: vec![VarId(0)],
            },
        ],
    );
    Program {
        classes: vec![
            class(0, "Source", None, vec![MethodId(0)]),
            class(1, "Sink", None, vec![MethodId(1)]),
            class(2, "Main", None, vec![MethodId(2)]),
        ],
        methods: vec![get, leak, main],
        fields: vec![],
    }
}

/// S5 - Taint end-to-end: `t = Source.get(); Sink.leak(t);` yields exactly
/// one flow from the `get` call site to the `leak` call site at argument 0.
#[test]
fn s5_taint_flows_straight_from_source_to_sink() {
    let program = source_sink_program();
    let raw: RawTaintConfig = serde_json::from_str(
        r#"{"sources":[{"method":"Source.get","type":"tainted"}],"sinks":[{"method":"Sink.leak","index":0}],"transfers":[]}"#,
    )
    .unwrap();
    let taint = TaintPlugin::load(&raw, &program).unwrap();

    let solver = Solver::new(&program, MethodId(2), ContextInsensitive, AllocSiteHeapModel, Some(taint));
    let result = PointerAnalysisResult::from_solver(solver);

    assert_eq!(result.taint_flows().len(), 1);
    let flow = &result.taint_flows()[0];
    assert_eq!(flow.sink_index, 0);
}

/// S6 - Taint transfer through arg-to-result: a `String.concat` transfer
/// rule retypes the tainted argument into the call's result, which still
/// reaches the sink.
#[test]
fn s6_taint_survives_an_arg_to_result_transfer() {
    let get = method(0, "get", 0, None, vec![], vec![]);
    let leak = method(1, "leak", 1, None, vec![10], vec![]);
    let concat = method(2, "concat", 2, Some(20), vec![21], vec![]);
    let main = method(
        3,
        "main",
        3,
        None,
        vec![],
        vec![
            Stmt::Invoke {
                lhs: Some(VarId(0)),
                receiver: None,
                static_class: Some(ClassId(0)),
                method_name: "get".into(),
                args: vec![],
            },
            Stmt::New { lhs: VarId(1), class: ClassId(2) },
            Stmt::Invoke {
                lhs: Some(VarId(2)),
                receiver: Some(VarId(1)),
                static_class: None,
                method_name: "concat".into(),
                args: vec![VarId(0)],
            },
            Stmt::Invoke {
                lhs: None,
                receiver: None,
                static_class: Some(ClassId(1)),
                method_name: "leak".into(),
                args: vec![VarId(2)],
            },
        ],
    );
    let program = Program {
        classes: vec![
            class(0, "Source", None, vec![MethodId(0)]),
            class(1, "Sink", None, vec![MethodId(1)]),
            class(2, "String", None, vec![MethodId(2)]),
            class(3, "Main", None, vec![MethodId(3)]),
        ],
        methods: vec![get, leak, concat, main],
        fields: vec![],
    };

    let raw: RawTaintConfig = serde_json::from_str(
        r#"{
            "sources": [{"method": "Source.get", "type": "tainted"}],
            "sinks": [{"method": "Sink.leak", "index": 0}],
            "transfers": [{"method": "String.concat", "from": 0, "to": "result", "type": "tainted"}]
        }"#,
    )
    .unwrap();
    let taint = TaintPlugin::load(&raw, &program).unwrap();

    let solver = Solver::new(&program, MethodId(3), ContextInsensitive, AllocSiteHeapModel, Some(taint));
    let result = PointerAnalysisResult::from_solver(solver);

    assert_eq!(result.taint_flows().len(), 1);
    let flow = &result.taint_flows()[0];
    assert_eq!(flow.sink_index, 0);
}

/// Universal invariant: `addReachable` is idempotent (running the same
/// program twice through independent solvers yields the same reachable
/// method count).
#[test]
fn invariant_add_reachable_is_idempotent_across_runs() {
    let program = source_sink_program();
    let solver_a = Solver::new(&program, MethodId(2), ContextInsensitive, AllocSiteHeapModel, None);
    let result_a = PointerAnalysisResult::from_solver(solver_a);
    let solver_b = Solver::new(&program, MethodId(2), ContextInsensitive, AllocSiteHeapModel, None);
    let result_b = PointerAnalysisResult::from_solver(solver_b);

    assert_eq!(
        result_a.call_graph().reachable_methods().count(),
        result_b.call_graph().reachable_methods().count()
    );
    assert_eq!(result_a.call_graph().num_edges(), result_b.call_graph().num_edges());
}

/// Universal invariant: no taint object without a known source call — every
/// recorded flow's source is one of the program's own source-rule call sites.
#[test]
fn invariant_every_flow_traces_to_a_configured_source_call() {
    let program = source_sink_program();
    let raw: RawTaintConfig = serde_json::from_str(
        r#"{"sources":[{"method":"Source.get","type":"tainted"}],"sinks":[{"method":"Sink.leak","index":0}],"transfers":[]}"#,
    )
    .unwrap();
    let taint = TaintPlugin::load(&raw, &program).unwrap();
    let solver = Solver::new(&program, MethodId(2), ContextInsensitive, AllocSiteHeapModel, Some(taint));
    let result = PointerAnalysisResult::from_solver(solver);

    for flow in result.taint_flows() {
        let call_site = result.cs_manager().cs_call_site(flow.source_call);
        assert_eq!(call_site.call_site.method, MethodId(2));
    }
}
