pub mod class_hierarchy;
pub mod ids;
pub mod program;
