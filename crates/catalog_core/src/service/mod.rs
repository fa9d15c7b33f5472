//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into reconciliation and export APIs.
//! - Keep the CLI decoupled from storage details.

pub mod attribute_variable_sync;
pub mod duplicate_merge;
pub mod entity_sync;
pub mod reconcile_service;
pub mod report;
pub mod snapshot_service;
