//! gitsync: personal file sync over git.
//!
//! A small HTTP backend that serves a sandboxed files directory, commits and
//! pushes changes to a git remote, and pulls from it on a fixed interval.

pub mod config;
pub mod file_store;
pub mod git;
pub mod handlers;
pub mod logging;
pub mod path_sandbox;
pub mod repository;
pub mod scheduler;
pub mod server;
