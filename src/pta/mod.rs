//! The pointer-analysis core: context sensitivity, the heap model,
//! the worklist-driven solver, the taint plugin, and the result surface
//! exposed to callers.

pub mod context_selector;
pub mod heap_model;
pub mod result;
pub mod solver;
pub mod taint;
pub mod worklist;
