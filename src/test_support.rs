//! Builders shared by the test suites
//!
//! Tests construct module sets the way the external parser would deliver
//! them; these helpers keep that construction readable. Node indexes are
//! left at zero and renumbered on ingestion.

use std::path::PathBuf;

use crate::ast::{
    EType, EVar, Expr, ExprI, Import, Lang, Literal, MVar, Module, Property, Source, TVar,
    Type,
};

pub fn var(name: &str) -> ExprI {
    ExprI::new(0, Expr::Var(EVar::new(name)))
}

pub fn num(n: f64) -> ExprI {
    ExprI::new(0, Expr::Lit(Literal::Num(n)))
}

pub fn strlit(s: &str) -> ExprI {
    ExprI::new(0, Expr::Lit(Literal::Str(s.to_string())))
}

pub fn app(func: ExprI, args: Vec<ExprI>) -> ExprI {
    ExprI::new(
        0,
        Expr::App {
            func: Box::new(func),
            args,
        },
    )
}

/// Apply a named term to arguments
pub fn call(func: &str, args: Vec<ExprI>) -> ExprI {
    app(var(func), args)
}

pub fn lam(params: &[&str], body: ExprI) -> ExprI {
    ExprI::new(
        0,
        Expr::Lambda {
            params: params.iter().map(|p| EVar::new(*p)).collect(),
            body: Box::new(body),
        },
    )
}

pub fn decl(name: &str, rhs: ExprI) -> ExprI {
    ExprI::new(
        0,
        Expr::Declaration {
            name: EVar::new(name),
            rhs: Box::new(rhs),
            wheres: vec![],
        },
    )
}

pub fn sig(name: &str, lang: Option<&str>, ty: Type) -> ExprI {
    ExprI::new(
        0,
        Expr::Signature {
            name: EVar::new(name),
            lang: lang.map(Lang::new),
            etype: EType::new(ty),
        },
    )
}

/// A concrete signature carrying a serialization property
pub fn prop_sig(name: &str, lang: &str, ty: Type, prop: Property) -> ExprI {
    ExprI::new(
        0,
        Expr::Signature {
            name: EVar::new(name),
            lang: Some(Lang::new(lang)),
            etype: EType::new(ty).with_prop(prop),
        },
    )
}

pub fn src(lang: &str, path: &str, names: &[(&str, &str)]) -> ExprI {
    ExprI::new(
        0,
        Expr::Source(Source {
            lang: Lang::new(lang),
            path: Some(PathBuf::from(path)),
            names: names
                .iter()
                .map(|(remote, alias)| (remote.to_string(), EVar::new(*alias)))
                .collect(),
        }),
    )
}

pub fn type_alias(name: &str, params: &[&str], body: Type) -> ExprI {
    ExprI::new(
        0,
        Expr::TypeAlias {
            name: TVar::gen(name),
            params: params.iter().map(|p| TVar::gen(*p)).collect(),
            body,
        },
    )
}

/// Serialization sources and generic pack/unpack signatures for a language
pub fn serialization(lang: &str) -> Vec<ExprI> {
    let path = format!("serial.{}", lang);
    let pack_name = format!("{}_pack", lang);
    let unpack_name = format!("{}_unpack", lang);
    vec![
        src(
            lang,
            &path,
            &[(pack_name.as_str(), "pack"), (unpack_name.as_str(), "unpack")],
        ),
        prop_sig(
            "pack",
            lang,
            Type::arrow(Type::var("a"), Type::var("Str")),
            Property::Pack,
        ),
        prop_sig(
            "unpack",
            lang,
            Type::arrow(Type::var("a"), Type::var("b")),
            Property::Unpack,
        ),
    ]
}

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    name: String,
    exports: Vec<EVar>,
    imports: Vec<Import>,
    body: Vec<ExprI>,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn export(mut self, name: &str) -> Self {
        self.exports.push(EVar::new(name));
        self
    }

    pub fn import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }

    pub fn item(mut self, item: ExprI) -> Self {
        self.body.push(item);
        self
    }

    pub fn items(mut self, items: Vec<ExprI>) -> Self {
        self.body.extend(items);
        self
    }

    pub fn build(self) -> Module {
        Module {
            name: MVar::new(&self.name),
            exports: self.exports,
            imports: self.imports,
            body: self.body,
        }
    }
}

/// Renumber a module set the way ingestion does
pub fn index(modules: &mut [Module]) {
    let mut counter = 0;
    for m in modules {
        m.ensure_indexes(&mut counter);
    }
}
