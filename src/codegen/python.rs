//! Python backend grammar

use std::path::Path;

use crate::ast::Lang;

use super::grammar::Grammar;

#[derive(Debug)]
pub struct PythonGrammar;

impl Grammar for PythonGrammar {
    fn lang(&self) -> Lang {
        Lang::new("py")
    }

    fn extension(&self) -> &'static str {
        "py"
    }

    fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }

    fn indent(&self) -> &'static str {
        "    "
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
        if b { "True" } else { "False" }.to_string()
    }

    fn unit_lit(&self) -> String {
        "None".to_string()
    }

    fn list(&self, items: &[String]) -> String {
        format!("[{}]", items.join(", "))
    }

    fn tuple(&self, items: &[String]) -> String {
        match items.len() {
            1 => format!("({},)", items[0]),
            _ => format!("({})", items.join(", ")),
        }
    }

    fn record(&self, fields: &[(String, String)]) -> String {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}: {}", self.quote(k), v))
            .collect();
        format!("{{{}}}", rendered.join(", "))
    }

    fn assign(&self, lhs: &str, rhs: &str) -> String {
        format!("{} = {}", lhs, rhs)
    }

    fn function(&self, name: &str, params: &[String], body: &[String]) -> String {
        let mut out = format!("def {}({}):\n", name, params.join(", "));
        for line in body {
            out.push_str(self.indent());
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    fn ret(&self, expr: &str) -> String {
        format!("return {}", expr)
    }

    fn source_import(&self, path: &Path) -> String {
        let shown = path.display().to_string();
        format!(
            "exec(compile(open({q}).read(), {q}, \"exec\"))",
            q = self.quote(&shown)
        )
    }

    fn try_call(&self, func: &str, manifold_id: u32, args: &[String]) -> String {
        let mut full = vec![func.to_string(), manifold_id.to_string()];
        full.extend(args.iter().cloned());
        self.call("_morloc_try", &full)
    }

    fn foreign_call(
        &self,
        executor: &str,
        pool: &str,
        manifold_id: u32,
        args: &[String],
    ) -> String {
        let mut cmd = vec![
            self.quote(executor),
            self.quote(pool),
            self.quote(&manifold_id.to_string()),
        ];
        cmd.extend(args.iter().cloned());
        self.call("_morloc_foreign", &[self.list(&cmd)])
    }

    fn argv(&self, i: usize) -> String {
        format!("sys.argv[{}]", i + 1)
    }

    fn preamble(&self, imports: &[String]) -> String {
        let mut out = String::new();
        out.push_str("#!/usr/bin/env python3\n");
        out.push('\n');
        out.push_str("import json\n");
        out.push_str("import subprocess\n");
        out.push_str("import sys\n");
        out.push('\n');
        for line in imports {
            out.push_str(line);
            out.push('\n');
        }
        if !imports.is_empty() {
            out.push('\n');
        }
        out.push_str("def _morloc_error(mid, msg):\n");
        out.push_str("    sys.stderr.write(\"error in m%s: %s\\n\" % (mid, msg))\n");
        out.push_str("    sys.exit(1)\n");
        out.push('\n');
        out.push_str("def _morloc_try(f, mid, *args):\n");
        out.push_str("    try:\n");
        out.push_str("        return f(*args)\n");
        out.push_str("    except Exception as e:\n");
        out.push_str("        _morloc_error(mid, str(e))\n");
        out.push('\n');
        out.push_str("def _morloc_foreign(cmd):\n");
        out.push_str("    proc = subprocess.run(cmd, capture_output=True, text=True)\n");
        out.push_str("    sys.stderr.write(proc.stderr)\n");
        out.push_str("    if proc.returncode != 0:\n");
        out.push_str("        sys.exit(proc.returncode)\n");
        out.push_str("    return proc.stdout.rstrip(\"\\n\")\n");
        out.push('\n');
        out.push_str("def _morloc_pack(x):\n");
        out.push_str("    return x if isinstance(x, str) else json.dumps(x)\n");
        out.push('\n');
        out.push_str("def _morloc_unpack(x):\n");
        out.push_str("    try:\n");
        out.push_str("        return json.loads(x)\n");
        out.push_str("    except Exception:\n");
        out.push_str("        return x\n");
        out.push('\n');
        out
    }

    fn dispatch(&self, entries: &[(u32, usize)], packer: &str) -> String {
        let mut out = String::new();
        out.push_str("if __name__ == \"__main__\":\n");
        out.push_str(&format!("    mid = int({})\n", self.argv(0)));
        out.push_str("    args = sys.argv[2:]\n");
        for (i, (id, _)) in entries.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "elif" };
            out.push_str(&format!("    {} mid == {}:\n", keyword, id));
            out.push_str(&format!("        result = m{}(*args)\n", id));
        }
        if entries.is_empty() {
            out.push_str("    _morloc_error(mid, \"unknown manifold id\")\n");
        } else {
            out.push_str("    else:\n");
            out.push_str("        _morloc_error(mid, \"unknown manifold id\")\n");
            out.push_str(&format!("    print({}(result))\n", packer));
        }
        out
    }
}
