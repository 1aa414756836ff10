//! The grammar abstraction: one strategy object per backend language
//!
//! A grammar carries every language-specific rendering decision the pool
//! emitter needs; the emitter's walk itself is language-agnostic.

use std::path::Path;

use crate::ast::{Lang, Literal};

use super::python::PythonGrammar;
use super::r::RGrammar;
use super::EmitError;

/// Language-specific rendering strategy
pub trait Grammar: std::fmt::Debug {
    /// The language this grammar renders
    fn lang(&self) -> Lang;

    /// Canonical file suffix; pools are named `pool.<ext>`
    fn extension(&self) -> &'static str;

    /// One line of comment
    fn comment(&self, text: &str) -> String;

    /// One indentation step
    fn indent(&self) -> &'static str;

    /// String literal quoting
    fn quote(&self, s: &str) -> String;

    fn bool_lit(&self, b: bool) -> String;

    fn unit_lit(&self) -> String;

    fn num_lit(&self, n: f64) -> String {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        }
    }

    fn list(&self, items: &[String]) -> String;

    fn tuple(&self, items: &[String]) -> String;

    fn record(&self, fields: &[(String, String)]) -> String;

    fn assign(&self, lhs: &str, rhs: &str) -> String;

    fn call(&self, func: &str, args: &[String]) -> String {
        format!("{}({})", func, args.join(", "))
    }

    /// A full function definition from a name, parameter names, and body
    /// lines (unindented; the grammar applies its own indent step)
    fn function(&self, name: &str, params: &[String], body: &[String]) -> String;

    /// The return statement form
    fn ret(&self, expr: &str) -> String;

    /// Import one backend source file into the pool
    fn source_import(&self, path: &Path) -> String;

    /// A source call wrapped in the pool's error-aggregating try helper
    fn try_call(&self, func: &str, manifold_id: u32, args: &[String]) -> String;

    /// Apply an unpacker to a serialized value
    fn unpack(&self, unpacker: &str, value: &str) -> String {
        self.call(unpacker, &[value.to_string()])
    }

    /// Spawn another pool and capture its stdout:
    /// `spawn(executor, [pool, manifold-id, args...])`
    fn foreign_call(&self, executor: &str, pool: &str, manifold_id: u32, args: &[String])
        -> String;

    /// Access the i-th command-line argument (0 is the manifold id)
    fn argv(&self, i: usize) -> String;

    /// Shebang, runtime helpers, and source imports
    fn preamble(&self, imports: &[String]) -> String;

    /// The dispatch tail: read argv[1] as an integer manifold id, switch to
    /// the matching function, pack the result, print it
    fn dispatch(&self, entries: &[(u32, usize)], packer: &str) -> String;
}

/// Look up the grammar for a language
pub fn grammar_for(lang: &Lang) -> Result<Box<dyn Grammar>, EmitError> {
    match lang.as_str() {
        "py" => Ok(Box::new(PythonGrammar)),
        "R" => Ok(Box::new(RGrammar)),
        _ => Err(EmitError::UnknownLanguage(lang.clone())),
    }
}

/// Render literal data through a grammar
pub fn render_literal(g: &dyn Grammar, lit: &Literal) -> String {
    match lit {
        Literal::Num(n) => g.num_lit(*n),
        Literal::Str(s) => g.quote(s),
        Literal::Bool(b) => g.bool_lit(*b),
        Literal::Unit => g.unit_lit(),
        Literal::List(items) => {
            let rendered: Vec<String> =
                items.iter().map(|i| render_literal(g, i)).collect();
            g.list(&rendered)
        }
        Literal::Tuple(items) => {
            let rendered: Vec<String> =
                items.iter().map(|i| render_literal(g, i)).collect();
            g.tuple(&rendered)
        }
        Literal::Record(fields) => {
            let rendered: Vec<(String, String)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), render_literal(g, v)))
                .collect();
            g.record(&rendered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_python_and_r() {
        assert!(grammar_for(&Lang::new("py")).is_ok());
        assert!(grammar_for(&Lang::new("R")).is_ok());
    }

    #[test]
    fn unknown_language_is_an_error() {
        let err = grammar_for(&Lang::new("fortran")).unwrap_err();
        assert_eq!(err, EmitError::UnknownLanguage(Lang::new("fortran")));
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        let g = grammar_for(&Lang::new("py")).unwrap();
        assert_eq!(g.num_lit(42.0), "42");
        assert_eq!(g.num_lit(2.5), "2.5");
    }

    #[test]
    fn nested_literals_render_recursively() {
        let g = grammar_for(&Lang::new("py")).unwrap();
        let lit = Literal::List(vec![
            Literal::Num(1.0),
            Literal::Tuple(vec![Literal::Bool(true), Literal::Str("x".to_string())]),
        ]);
        assert_eq!(render_literal(g.as_ref(), &lit), "[1, (True, \"x\")]");
    }
}
