//! Ambient stack utilities: the hybrid bit-vector primitive, CLI option
//! parsing, and the results dumper.

pub mod bit_vec;
pub mod options;
pub mod results_dumper;
