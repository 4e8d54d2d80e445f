//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep request handlers decoupled from storage details.

pub mod ledger_service;
pub mod registry_service;
