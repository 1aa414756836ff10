//! Code emission: per-language pools and the nexus dispatcher
//!
//! Emission is parameterised by a [`Grammar`](grammar::Grammar) strategy
//! object; adding a backend language means providing one implementation
//! and a registry entry.

pub mod grammar;
pub mod nexus;
pub mod pool;
pub mod python;
pub mod r;

use thiserror::Error;

use crate::ast::{EVar, Lang};
use crate::manifold::Manifold;

pub use grammar::{grammar_for, Grammar};
pub use nexus::emit_nexus;
pub use pool::emit_pool;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("unknown language '{0}'")]
    UnknownLanguage(Lang),
    #[error("no executor configured for language '{0}'")]
    MissingExecutor(Lang),
    #[error("language '{0}' declares no generic packer")]
    MissingGenericPacker(Lang),
    #[error("language '{0}' declares no generic unpacker")]
    MissingGenericUnpacker(Lang),
    #[error("term '{term}' has no realization in language '{lang}'")]
    NoRealization { term: EVar, lang: Lang },
}

/// Classification of a manifold with respect to the language being emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldClass {
    /// A pure re-export of a foreign function: emitted with positional
    /// placeholders
    Source,
    /// Lives in this language and is invoked here: emitted in full
    Cis,
    /// Invoked from this language but lives in another: appears only as a
    /// foreign call inside its caller
    Trans,
    /// Plays no part in this language's pool
    Uncalled,
}

/// Classify one manifold for the language `lang`. Value manifolds (no
/// realization) belong to the configured default language.
pub fn classify(
    m: &Manifold,
    lang: &Lang,
    is_root: bool,
    default_lang: &Lang,
) -> ManifoldClass {
    let in_lang = m.in_lang(lang) || (m.is_value() && lang == default_lang);
    let reachable = m.called || is_root;
    match (in_lang, reachable) {
        (true, true) => {
            // synthesized re-exports have no call site of their own
            if m.call_id.is_none() && !m.called {
                ManifoldClass::Source
            } else {
                ManifoldClass::Cis
            }
        }
        (false, true) => ManifoldClass::Trans,
        (_, false) => ManifoldClass::Uncalled,
    }
}

/// The language a manifold is dispatched in: its first realization
/// language in sorted order, or the default for value manifolds
pub fn manifold_lang(m: &Manifold, default_lang: &Lang) -> Lang {
    let mut langs: Vec<&Lang> = m.realizations.iter().map(|r| &r.lang).collect();
    langs.sort();
    langs
        .first()
        .map(|l| (*l).clone())
        .unwrap_or_else(|| default_lang.clone())
}
