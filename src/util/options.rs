// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options, parsed with `clap` 3.2's builder-style API (`Command`/
//! `Arg`, not the derive macros) from a JSON program file plus the usual
//! context-sensitivity and taint-config knobs.

use clap::{Arg, Command};

/// `--context`: which `ContextSelector` implementation to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Insensitive,
    CallSite,
    Object,
    Type,
}

impl ContextKind {
    fn parse(s: &str) -> Self {
        match s {
            "insensitive" => ContextKind::Insensitive,
            "callsite" => ContextKind::CallSite,
            "object" => ContextKind::Object,
            "type" => ContextKind::Type,
            // clap's value_parser already restricts "context" to these four.
            _ => unreachable!("unexpected context kind {s:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub input: String,
    pub entry: String,
    pub context: ContextKind,
    pub context_depth: usize,
    pub taint_config: Option<String>,
    pub pts_output: Option<String>,
    pub call_graph_output: Option<String>,
    pub taint_flows_output: Option<String>,
    pub dump_stats: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            input: String::new(),
            entry: String::new(),
            context: ContextKind::CallSite,
            context_depth: 1,
            taint_config: None,
            pts_output: None,
            call_graph_output: None,
            taint_flows_output: None,
            dump_stats: false,
        }
    }
}

fn make_options_parser() -> Command<'static> {
    Command::new("taipan")
        .about("Context-sensitive pointer and taint analysis over an abstract IR.")
        .arg(Arg::new("INPUT").required(true).help("Path to the program JSON document."))
        .arg(
            Arg::new("entry")
                .long("entry")
                .takes_value(true)
                .required(true)
                .help("Fully-qualified name (Class.method) of the entry method."),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .takes_value(true)
                .value_parser(["insensitive", "callsite", "object", "type"])
                .default_value("callsite")
                .help("Context-selector kind."),
        )
        .arg(
            Arg::new("context-depth")
                .long("context-depth")
                .takes_value(true)
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("Depth limit (k) for k-limited selectors."),
        )
        .arg(
            Arg::new("taint-config")
                .long("taint-config")
                .takes_value(true)
                .help("Path to the taint-rule document."),
        )
        .arg(
            Arg::new("dump-pts")
                .long("dump-pts")
                .takes_value(true)
                .help("Dump points-to results to this path (\"-\" for stdout)."),
        )
        .arg(
            Arg::new("dump-call-graph")
                .long("dump-call-graph")
                .takes_value(true)
                .help("Dump the call graph in DOT format to this path (\"-\" for stdout)."),
        )
        .arg(
            Arg::new("dump-taint-flows")
                .long("dump-taint-flows")
                .takes_value(true)
                .help("Dump taint flows to this path (\"-\" for stdout)."),
        )
        .arg(
            Arg::new("dump-stats")
                .long("dump-stats")
                .takes_value(false)
                .help("Print solver statistics on completion."),
        )
}

impl AnalysisOptions {
    /// Parses a flat argv-style slice into a typed options struct.
    pub fn parse_from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = make_options_parser()
            .try_get_matches_from(args)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        Ok(AnalysisOptions {
            input: matches.get_one::<String>("INPUT").cloned().unwrap_or_default(),
            entry: matches.get_one::<String>("entry").cloned().unwrap_or_default(),
            context: ContextKind::parse(matches.get_one::<String>("context").map(String::as_str).unwrap_or("callsite")),
            context_depth: matches.get_one::<usize>("context-depth").copied().unwrap_or(1),
            taint_config: matches.get_one::<String>("taint-config").cloned(),
            pts_output: matches.get_one::<String>("dump-pts").cloned(),
            call_graph_output: matches.get_one::<String>("dump-call-graph").cloned(),
            taint_flows_output: matches.get_one::<String>("dump-taint-flows").cloned(),
            dump_stats: matches.contains_id("dump-stats"),
        })
    }
}
