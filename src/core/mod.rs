//! Core domain models for looper.
//!
//! This module contains the task data model, the task file that stores
//! it, and the dependency graph used to validate it before scheduling.

pub mod dag;
pub mod file;
pub mod task;

pub use dag::DependencyGraph;
pub use file::{Project, TaskFile, ValidationIssue, ValidationReport, SCHEMA_VERSION};
pub use task::{compare_ids, id_before, merge_unique, Task, TaskStatus};
