//! SQL layer - parsing, classification, parameters, and rendering
//!
//! This module provides:
//! - `Parser`: Parses SQL text into the internal AST
//! - `StatementClassifier`: Labels statements as DML or procedure calls
//! - `ParameterResolver`: Normalizes bind parameters to ordinals
//! - `ToSql`: Renders the AST back to canonical SQL
//! - `SyntaxChecker`: Contract to the reference parser

pub mod ast;
pub mod classify;
pub mod error;
pub mod params;
pub mod parser;
pub mod syntax;
pub mod writer;

pub use ast::*;
pub use classify::{ClassifiedStatement, StatementClassifier, StatementKind};
pub use error::{SqlError, SqlResult};
pub use params::{BindParameter, ParamIdentity, ParameterResolver, ParameterSet};
pub use parser::Parser;
pub use syntax::{ReferenceParser, SyntaxChecker};
pub use writer::{SqlWriter, ToSql};
