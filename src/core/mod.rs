//! Core analysis logic: addresses, expressions, bodies, schemas, loading, analysis.

pub mod addrs;
pub mod analyzer;
pub mod body;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod loader;
pub mod narrow;
pub mod parser;
pub mod schema;
pub mod types;
