//! Morloc middle end: from parsed polyglot modules to nexus and pools
//!
//! The surface parser and the type-inference engine are external
//! collaborators. This crate resolves the module DAG, desugars type
//! aliases, unifies signatures into the term-type table, builds the
//! manifold graph, and emits one pool per backend language plus the nexus
//! dispatcher.

pub mod alias;
pub mod ast;
pub mod codegen;
pub mod compile;
pub mod dag;
pub mod error;
pub mod manifold;
pub mod serial;
pub mod termtypes;
pub mod test_support;

pub use ast::{EVar, Lang, MVar, Module, Type};
pub use compile::{compile, write_artifacts, Artifacts, Config};
pub use error::MorlocError;
pub use manifold::{Manifold, ManifoldGraph};
