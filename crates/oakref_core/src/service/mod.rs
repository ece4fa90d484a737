//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Run cross-repository validation before any write transaction opens.

pub mod entry_service;
