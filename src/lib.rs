// src/lib.rs
//! forgefix: automated code-quality remediation.
//!
//! Scans files for quality issues, drafts a unified-diff fix per file,
//! applies it with a durable backup, and publishes the result. Previously
//! accepted fixes are remembered in a similarity index so a recurring issue
//! is fixed without another model call.

pub mod analysis;
pub mod apply;
pub mod cli;
pub mod collab;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod exit;
pub mod lang;
pub mod limiter;
pub mod memory;
pub mod patch;
pub mod pipeline;
pub mod reporting;
pub mod types;
