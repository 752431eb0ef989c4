// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The taint plugin: a capability with two hooks, sources plus transfers
//! fired at call resolution, and arg-based transfers fired as argument
//! points-to sets grow. Configuration is loaded from JSON via serde, the
//! same way the rest of this crate's external inputs are ingested.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context as _, Result};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::call_site::CSCallSiteId;
use crate::ir::ids::{MethodId, TaintTypeId};
use crate::ir::program::Program;
use crate::pointer::BaseObj;

/// One position a taint rule can name: the call's receiver, its result, or a
/// zero-based positional argument.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TaintPosition {
    Base,
    Result,
    Arg(usize),
}

impl<'de> Deserialize<'de> for TaintPosition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Index(usize),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Name(s) if s == "base" => Ok(TaintPosition::Base),
            Raw::Name(s) if s == "result" => Ok(TaintPosition::Result),
            Raw::Name(other) => Err(de::Error::custom(format!(
                "taint position must be \"base\", \"result\", or a non-negative integer, got {other:?}"
            ))),
            Raw::Index(i) => Ok(TaintPosition::Arg(i)),
        }
    }
}

#[derive(Deserialize)]
struct RawSourceRule {
    method: String,
    #[serde(rename = "type")]
    taint_type: String,
}

#[derive(Deserialize)]
struct RawSinkRule {
    method: String,
    index: usize,
}

#[derive(Deserialize)]
struct RawTransferRule {
    method: String,
    from: TaintPosition,
    to: TaintPosition,
    #[serde(rename = "type")]
    taint_type: String,
}

/// The external taint configuration document: three arrays of rules,
/// `method` given as a fully-qualified `Class.method` signature matching
/// `Program::find_method_by_qualified_name`.
#[derive(Deserialize)]
pub struct RawTaintConfig {
    #[serde(default)]
    sources: Vec<RawSourceRule>,
    #[serde(default)]
    sinks: Vec<RawSinkRule>,
    #[serde(default)]
    transfers: Vec<RawTransferRule>,
}

struct TransferRule {
    from: TaintPosition,
    to: TaintPosition,
    taint_type: TaintTypeId,
}

/// One observed taint flow: a source call, a sink call, and the sink's
/// tainted argument position. `Ord` gives a stable "by source call, then
/// sink call, then argument index" total order over the exposed
/// `TaintFlow` set, since `CSCallSiteId` is itself ordered by interning
/// (discovery) order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
pub struct TaintFlow {
    pub source_call: CSCallSiteId,
    pub sink_call: CSCallSiteId,
    pub sink_index: usize,
}

/// Loaded, method-resolved taint configuration, plus the flows accumulated
/// as the solver runs. The only fatal path in the core: a rule
/// naming a method not found in the program fails `TaintPlugin::load` eagerly.
pub struct TaintPlugin {
    sources: HashMap<MethodId, Vec<TaintTypeId>>,
    sinks: HashMap<MethodId, Vec<usize>>,
    transfers: HashMap<MethodId, Vec<TransferRule>>,
    type_names: Vec<String>,
    type_ids: HashMap<String, TaintTypeId>,
    flows: BTreeSet<TaintFlow>,
}

impl TaintPlugin {
    pub fn load(raw: &RawTaintConfig, program: &Program) -> Result<Self> {
        let mut plugin = TaintPlugin {
            sources: HashMap::new(),
            sinks: HashMap::new(),
            transfers: HashMap::new(),
            type_names: Vec::new(),
            type_ids: HashMap::new(),
            flows: BTreeSet::new(),
        };

        for rule in &raw.sources {
            let method = plugin.resolve_method(program, &rule.method)?;
            let taint_type = plugin.intern_type(&rule.taint_type);
            plugin.sources.entry(method).or_default().push(taint_type);
        }
        for rule in &raw.sinks {
            let method = plugin.resolve_method(program, &rule.method)?;
            plugin.sinks.entry(method).or_default().push(rule.index);
        }
        for rule in &raw.transfers {
            let method = plugin.resolve_method(program, &rule.method)?;
            let taint_type = plugin.intern_type(&rule.taint_type);
            plugin.transfers.entry(method).or_default().push(TransferRule {
                from: rule.from,
                to: rule.to,
                taint_type,
            });
        }
        Ok(plugin)
    }

    fn resolve_method(&self, program: &Program, qualified: &str) -> Result<MethodId> {
        program
            .find_method_by_qualified_name(qualified)
            .with_context(|| format!("taint config names unknown method {qualified:?}"))
    }

    fn intern_type(&mut self, name: &str) -> TaintTypeId {
        if let Some(&id) = self.type_ids.get(name) {
            return id;
        }
        let id = TaintTypeId::new(self.type_names.len());
        self.type_names.push(name.to_owned());
        self.type_ids.insert(name.to_owned(), id);
        id
    }

    pub fn type_name(&self, id: TaintTypeId) -> &str {
        &self.type_names[id.0 as usize]
    }

    pub fn is_sink(&self, callee: MethodId) -> bool {
        self.sinks.contains_key(&callee)
    }

    pub fn sink_arg_indices(&self, callee: MethodId) -> &[usize] {
        self.sinks.get(&callee).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The taint objects a call to `callee` at `cs_call_site` manufactures,
    /// one per configured source rule. Always placed under the empty context.
    pub fn sources_for(&self, cs_call_site: CSCallSiteId, callee: MethodId) -> Vec<BaseObj> {
        self.sources
            .get(&callee)
            .into_iter()
            .flatten()
            .map(|&taint_type| BaseObj::Taint { source: cs_call_site, taint_type })
            .collect()
    }

    /// Given the taint objects currently visible at `BASE` (the receiver)
    /// and at each positional argument, returns the `(position, new taint
    /// object)` pairs to seed. Source provenance is inherited from each
    /// input taint's own source call, never from `cs_call_site` — transfers
    /// never create new source invokes, they only retype existing taints.
    pub fn apply_transfers(
        &self,
        callee: MethodId,
        base_taints: &[BaseObj],
        arg_taints: &[Vec<BaseObj>],
    ) -> Vec<(TaintPosition, BaseObj)> {
        let mut out = Vec::new();
        let Some(rules) = self.transfers.get(&callee) else {
            return out;
        };
        for rule in rules {
            let sources: &[BaseObj] = match rule.from {
                TaintPosition::Base => base_taints,
                TaintPosition::Arg(i) => arg_taints.get(i).map(Vec::as_slice).unwrap_or(&[]),
                TaintPosition::Result => &[],
            };
            for taint in sources {
                if let BaseObj::Taint { source, .. } = *taint {
                    out.push((rule.to, BaseObj::Taint { source, taint_type: rule.taint_type }));
                }
            }
        }
        out
    }

    /// Records one observed flow.
    pub fn record_flow(&mut self, source_call: CSCallSiteId, sink_call: CSCallSiteId, sink_index: usize) {
        self.flows.insert(TaintFlow { source_call, sink_call, sink_index });
    }

    pub fn flows(&self) -> impl Iterator<Item = &TaintFlow> {
        self.flows.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::ids::{ClassId, StmtId, StmtRef, VarId};
    use crate::ir::program::{Class, Method};

    fn program_with_methods() -> Program {
        let get = Method {
            id: MethodId(0),
            name: "get".into(),
            class: ClassId(0),
            this_var: None,
            params: vec![],
            is_abstract: false,
            stmts: vec![],
        };
        let leak = Method {
            id: MethodId(1),
            name: "leak".into(),
            class: ClassId(1),
            this_var: None,
            params: vec![VarId(0)],
            is_abstract: false,
            stmts: vec![],
        };
        Program {
            classes: vec![
                Class { id: ClassId(0), name: "Source".into(), superclass: None, declared_methods: vec![MethodId(0)] },
                Class { id: ClassId(1), name: "Sink".into(), superclass: None, declared_methods: vec![MethodId(1)] },
            ],
            methods: vec![get, leak],
            fields: vec![],
        }
    }

    #[test]
    fn rejects_config_naming_unknown_method() {
        let program = program_with_methods();
        let raw: RawTaintConfig = serde_json::from_str(
            r#"{"sources":[{"method":"Source.missing","type":"tainted"}],"sinks":[],"transfers":[]}"#,
        )
        .unwrap();
        assert!(TaintPlugin::load(&raw, &program).is_err());
    }

    #[test]
    fn sources_for_manufactures_one_taint_per_rule() {
        let program = program_with_methods();
        let raw: RawTaintConfig = serde_json::from_str(
            r#"{"sources":[{"method":"Source.get","type":"tainted"}],"sinks":[{"method":"Sink.leak","index":0}],"transfers":[]}"#,
        )
        .unwrap();
        let plugin = TaintPlugin::load(&raw, &program).unwrap();
        assert!(plugin.is_sink(MethodId(1)));
        assert_eq!(plugin.sink_arg_indices(MethodId(1)), &[0]);

        let site = StmtRef { method: MethodId(2), stmt: StmtId(0) };
        let cs_call_site = CSCallSiteId::new(0);
        let _ = site; // call site identity is caller-provided; only used to disambiguate taints
        let taints = plugin.sources_for(cs_call_site, MethodId(0));
        assert_eq!(taints.len(), 1);
        assert!(matches!(taints[0], BaseObj::Taint { source, .. } if source == cs_call_site));
    }

    #[test]
    fn transfer_retypes_and_inherits_source() {
        let program = program_with_methods();
        let raw: RawTaintConfig = serde_json::from_str(
            r#"{"sources":[],"sinks":[],"transfers":[{"method":"Sink.leak","from":0,"to":"result","type":"String"}]}"#,
        )
        .unwrap();
        let plugin = TaintPlugin::load(&raw, &program).unwrap();
        let original_source = CSCallSiteId::new(5);
        let arg0_taints = vec![BaseObj::Taint { source: original_source, taint_type: TaintTypeId::new(0) }];
        let transferred = plugin.apply_transfers(MethodId(1), &[], &[arg0_taints]);
        assert_eq!(transferred.len(), 1);
        let (position, obj) = transferred[0];
        assert_eq!(position, TaintPosition::Result);
        match obj {
            BaseObj::Taint { source, taint_type } => {
                assert_eq!(source, original_source);
                assert_eq!(plugin.type_name(taint_type), "String");
            }
            _ => panic!("expected a taint object"),
        }
    }
}
