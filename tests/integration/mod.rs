//! Integration test suite for looper.
//!
//! These tests drive the scheduler, executor and worker pool together
//! against a real task file in a temporary directory.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Full runs from task file to task file
//! - `parallel_agents`: Batch sizing, consensus and fail-fast behavior
//! - `task_file`: Persistence format, validation and selection
//!
//! # CI Compatibility
//!
//! Agents are in-process mocks; no agent binary is spawned.

mod fixtures;

mod parallel_agents;
mod task_file;
