//! Compiler-wide error aggregation
//!
//! Each pass owns its error enum; this module provides the top-level sum
//! and the diagnostic record that ties an error to a source index or, when
//! no index is known, to the enclosing module.

use std::fmt;

use thiserror::Error;

use crate::alias::AliasError;
use crate::codegen::EmitError;
use crate::dag::DagError;
use crate::manifold::TreeError;
use crate::termtypes::TermError;
use crate::ast::MVar;

/// An error located in the program: the node index when known, otherwise
/// the enclosing module name.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub node: Option<u32>,
    pub module: Option<MVar>,
    pub error: TreeError,
}

impl Diagnostic {
    pub fn new(error: TreeError) -> Self {
        Diagnostic {
            node: None,
            module: None,
            error,
        }
    }

    pub fn at_node(mut self, idx: u32) -> Self {
        self.node = Some(idx);
        self
    }

    pub fn in_module(mut self, module: MVar) -> Self {
        self.module = Some(module);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.node, &self.module) {
            (Some(idx), _) => write!(f, "[node {}] {}", idx, self.error),
            (None, Some(m)) => write!(f, "[module {}] {}", m, self.error),
            (None, None) => write!(f, "{}", self.error),
        }
    }
}

/// The top-level compiler error
#[derive(Error, Debug)]
pub enum MorlocError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Alias(#[from] AliasError),

    #[error(transparent)]
    Term(#[from] TermError),

    #[error("{}", render_diagnostics(.0))]
    Tree(Vec<Diagnostic>),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("internal error (this is a compiler bug, please report it): {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn render_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EVar;

    #[test]
    fn diagnostic_prefers_node_index() {
        let d = Diagnostic::new(TreeError::UnboundVariable(EVar::new("f")))
            .at_node(7)
            .in_module(MVar::new("Main"));
        assert_eq!(d.to_string(), "[node 7] unbound variable 'f'");
    }

    #[test]
    fn diagnostic_falls_back_to_module() {
        let d = Diagnostic::new(TreeError::UnboundVariable(EVar::new("f")))
            .in_module(MVar::new("Main"));
        assert_eq!(d.to_string(), "[module Main] unbound variable 'f'");
    }

    #[test]
    fn tree_error_lists_every_diagnostic() {
        let err = MorlocError::Tree(vec![
            Diagnostic::new(TreeError::UnboundVariable(EVar::new("f"))),
            Diagnostic::new(TreeError::UnboundVariable(EVar::new("g"))),
        ]);
        let text = err.to_string();
        assert!(text.contains("'f'"));
        assert!(text.contains("'g'"));
    }

    #[test]
    fn internal_errors_are_marked_as_bugs() {
        let err = MorlocError::Internal("bad counter".to_string());
        assert!(err.to_string().contains("compiler bug"));
    }
}
