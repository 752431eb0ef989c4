// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use log::info;

use taipan::ir::program::Program;
use taipan::pta::context_selector::{ContextInsensitive, KCallSiteSensitive, KObjectSensitive, KTypeSensitive};
use taipan::pta::heap_model::AllocSiteHeapModel;
use taipan::pta::result::PointerAnalysisResult;
use taipan::pta::solver::Solver;
use taipan::pta::taint::{RawTaintConfig, TaintPlugin};
use taipan::util::options::{AnalysisOptions, ContextKind};
use taipan::util::results_dumper;

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let options = AnalysisOptions::parse_from_args(std::env::args_os())?;

    let program_json =
        fs::read_to_string(&options.input).with_context(|| format!("reading program file {:?}", options.input))?;
    let program: Program =
        serde_json::from_str(&program_json).with_context(|| format!("parsing program file {:?}", options.input))?;

    let entry = program
        .find_method_by_qualified_name(&options.entry)
        .with_context(|| format!("entry method {:?} not found in program", options.entry))?;

    let taint = match &options.taint_config {
        Some(path) => {
            let raw_json = fs::read_to_string(path).with_context(|| format!("reading taint config {path:?}"))?;
            let raw: RawTaintConfig =
                serde_json::from_str(&raw_json).with_context(|| format!("parsing taint config {path:?}"))?;
            Some(TaintPlugin::load(&raw, &program).with_context(|| format!("resolving taint config {path:?}"))?)
        }
        None => None,
    };

    info!("analyzing {:?} from entry {:?} with {:?} context sensitivity", options.input, options.entry, options.context);
    let k = options.context_depth;
    let result = match options.context {
        ContextKind::Insensitive => {
            let solver = Solver::new(&program, entry, ContextInsensitive, AllocSiteHeapModel, taint);
            PointerAnalysisResult::from_solver(solver)
        }
        ContextKind::CallSite => {
            let solver = Solver::new(&program, entry, KCallSiteSensitive::new(k), AllocSiteHeapModel, taint);
            PointerAnalysisResult::from_solver(solver)
        }
        ContextKind::Object => {
            let solver = Solver::new(&program, entry, KObjectSensitive::new(k), AllocSiteHeapModel, taint);
            PointerAnalysisResult::from_solver(solver)
        }
        ContextKind::Type => {
            let solver = Solver::new(&program, entry, KTypeSensitive::new(k), AllocSiteHeapModel, taint);
            PointerAnalysisResult::from_solver(solver)
        }
    };

    results_dumper::dump_results(&options, &result);
    Ok(())
}
