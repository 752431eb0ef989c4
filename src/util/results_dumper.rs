// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Result / sink exporters: points-to sets and the call graph dumped to
//! stdout or file in a stable, greppable text shape, plus a taint-flow dump.

use std::fs::File;
use std::io::{BufWriter, Write};

use log::info;

use crate::pointer::Pointer;
use crate::pta::result::PointerAnalysisResult;
use crate::pts_set::points_to::PointsToSet;

use super::options::AnalysisOptions;

fn writer_for(path: &str) -> Box<dyn Write> {
    if path == "-" {
        Box::new(std::io::stdout())
    } else {
        Box::new(File::create(path).expect("unable to create output file"))
    }
}

/// Drives every `--dump-*` flag the options carry.
pub fn dump_results(options: &AnalysisOptions, result: &PointerAnalysisResult) {
    if let Some(path) = &options.pts_output {
        info!("dumping points-to results to {path}");
        dump_pts(result, path);
    }
    if let Some(path) = &options.call_graph_output {
        info!("dumping call graph to {path}");
        dump_call_graph(result, path);
    }
    if let Some(path) = &options.taint_flows_output {
        info!("dumping taint flows to {path}");
        dump_taint_flows(result, path);
    }
    if options.dump_stats {
        let stats = result.stats();
        info!(
            "stats: {} reachable methods, {} call-graph edges, {} worklist pops",
            result.call_graph().reachable_methods().count(),
            result.call_graph().num_edges(),
            stats.worklist_pops,
        );
    }
}

fn dump_pts(result: &PointerAnalysisResult, path: &str) {
    let mut writer = BufWriter::new(writer_for(path));
    for (pointer, pts) in result.all_points_to() {
        if !matches!(pointer, Pointer::CSVar(..)) {
            continue;
        }
        write!(writer, "{pointer:?} ==> {{ ").expect("unable to write data");
        for obj in &pts {
            write!(writer, "{:?} ", result.cs_manager().cs_obj(obj)).expect("unable to write data");
        }
        writeln!(writer, "}}").expect("unable to write data");
    }
}

fn dump_call_graph(result: &PointerAnalysisResult, path: &str) {
    let mut writer = BufWriter::new(writer_for(path));
    let dot = result.call_graph().to_dot(result.cs_manager());
    writer.write_all(dot.as_bytes()).expect("unable to write data");
}

fn dump_taint_flows(result: &PointerAnalysisResult, path: &str) {
    let mut writer = BufWriter::new(writer_for(path));
    for flow in result.taint_flows() {
        writeln!(
            writer,
            "{:?} -> {:?} (arg {})",
            flow.source_call, flow.sink_call, flow.sink_index
        )
        .expect("unable to write data");
    }
}
