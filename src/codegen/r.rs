//! R backend grammar

use std::path::Path;

use crate::ast::Lang;

use super::grammar::Grammar;

#[derive(Debug)]
pub struct RGrammar;

impl Grammar for RGrammar {
    fn lang(&self) -> Lang {
        Lang::new("R")
    }

    fn extension(&self) -> &'static str {
        "R"
    }

    fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }

    fn indent(&self) -> &'static str {
        "  "
    }

    fn quote(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    fn bool_lit(&self, b: bool) -> String {
        if b { "TRUE" } else { "FALSE" }.to_string()
    }

    fn unit_lit(&self) -> String {
        "NULL".to_string()
    }

    fn list(&self, items: &[String]) -> String {
        format!("list({})", items.join(", "))
    }

    fn tuple(&self, items: &[String]) -> String {
        // R has no tuple; a plain list carries positional fields
        format!("list({})", items.join(", "))
    }

    fn record(&self, fields: &[(String, String)]) -> String {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect();
        format!("list({})", rendered.join(", "))
    }

    fn assign(&self, lhs: &str, rhs: &str) -> String {
        format!("{} <- {}", lhs, rhs)
    }

    fn function(&self, name: &str, params: &[String], body: &[String]) -> String {
        let mut out = format!("{} <- function({}) {{\n", name, params.join(", "));
        for line in body {
            out.push_str(self.indent());
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }

    fn ret(&self, expr: &str) -> String {
        // the last expression of an R function is its value
        expr.to_string()
    }

    fn source_import(&self, path: &Path) -> String {
        format!("source({})", self.quote(&path.display().to_string()))
    }

    fn try_call(&self, func: &str, manifold_id: u32, args: &[String]) -> String {
        let mut full = vec![func.to_string(), manifold_id.to_string()];
        full.extend(args.iter().cloned());
        self.call(".morloc_try", &full)
    }

    fn foreign_call(
        &self,
        executor: &str,
        pool: &str,
        manifold_id: u32,
        args: &[String],
    ) -> String {
        let mut cmd = vec![self.quote(pool), self.quote(&manifold_id.to_string())];
        cmd.extend(args.iter().cloned());
        format!(
            ".morloc_foreign({}, c({}))",
            self.quote(executor),
            cmd.join(", ")
        )
    }

    fn argv(&self, i: usize) -> String {
        format!("commandArgs(trailingOnly = TRUE)[[{}]]", i + 1)
    }

    fn preamble(&self, imports: &[String]) -> String {
        let mut out = String::new();
        out.push_str("#!/usr/bin/env Rscript\n");
        out.push('\n');
        for line in imports {
            out.push_str(line);
            out.push('\n');
        }
        if !imports.is_empty() {
            out.push('\n');
        }
        out.push_str(".morloc_error <- function(mid, msg) {\n");
        out.push_str("  write(sprintf(\"error in m%s: %s\", mid, msg), stderr())\n");
        out.push_str("  quit(status = 1)\n");
        out.push_str("}\n");
        out.push('\n');
        out.push_str(".morloc_try <- function(f, mid, ...) {\n");
        out.push_str(
            "  tryCatch(f(...), error = function(e) .morloc_error(mid, conditionMessage(e)))\n",
        );
        out.push_str("}\n");
        out.push('\n');
        out.push_str(".morloc_foreign <- function(cmd, args) {\n");
        out.push_str("  out <- system2(cmd, args, stdout = TRUE)\n");
        out.push_str("  status <- attr(out, \"status\")\n");
        out.push_str("  if (!is.null(status) && status != 0) {\n");
        out.push_str("    quit(status = status)\n");
        out.push_str("  }\n");
        out.push_str("  paste(out, collapse = \"\\n\")\n");
        out.push_str("}\n");
        out.push('\n');
        out.push_str(".morloc_pack <- function(x) {\n");
        out.push_str("  paste(format(x, trim = TRUE), collapse = \" \")\n");
        out.push_str("}\n");
        out.push('\n');
        out.push_str(".morloc_unpack <- function(x) {\n");
        out.push_str("  n <- suppressWarnings(as.numeric(x))\n");
        out.push_str("  if (length(n) == 1 && !is.na(n)) n else x\n");
        out.push_str("}\n");
        out.push('\n');
        out
    }

    fn dispatch(&self, entries: &[(u32, usize)], packer: &str) -> String {
        let mut out = String::new();
        out.push_str("args <- commandArgs(trailingOnly = TRUE)\n");
        out.push_str("mid <- as.integer(args[[1]])\n");
        out.push_str("rest <- as.list(args[-1])\n");
        for (i, (id, _)) in entries.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "} else if" };
            out.push_str(&format!("{} (mid == {}) {{\n", keyword, id));
            out.push_str(&format!("  result <- do.call(m{}, rest)\n", id));
        }
        if entries.is_empty() {
            out.push_str(".morloc_error(mid, \"unknown manifold id\")\n");
        } else {
            out.push_str("} else {\n");
            out.push_str("  .morloc_error(mid, \"unknown manifold id\")\n");
            out.push_str("}\n");
            out.push_str(&format!("cat({}(result), \"\\n\", sep = \"\")\n", packer));
        }
        out
    }
}
