//! detsql - Deterministic SQL logical planning for replicated databases
//!
//! Features:
//! - PostgreSQL-dialect parsing into an owned AST
//! - Named and positional bind parameters normalized to `$n` ordinals
//! - Validated logical plans over a versioned catalog snapshot
//! - Canonical SQL rendering, byte-identical across replicas

pub mod catalog;
pub mod planner;
pub mod sql;
