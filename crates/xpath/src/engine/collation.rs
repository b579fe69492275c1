use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::canonical_combining_class;

use crate::consts::{CODEPOINT_URI, SIMPLE_ACCENT_URI, SIMPLE_CASE_ACCENT_URI, SIMPLE_CASE_URI};
use crate::engine::runtime::{Error, ErrorCode};

/// String comparison strategy selected by a collation URI.
pub trait Collation: Send + Sync {
    fn uri(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> Ordering;
    fn key(&self, s: &str) -> String {
        s.to_string()
    }
}

pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Compares normalized keys: optionally lowercased, optionally stripped of combining marks.
pub struct FoldingCollation {
    uri: &'static str,
    fold_case: bool,
    strip_accents: bool,
}

impl FoldingCollation {
    pub const SIMPLE_CASE: FoldingCollation =
        FoldingCollation { uri: SIMPLE_CASE_URI, fold_case: true, strip_accents: false };
    pub const SIMPLE_ACCENT: FoldingCollation =
        FoldingCollation { uri: SIMPLE_ACCENT_URI, fold_case: false, strip_accents: true };
    pub const SIMPLE_CASE_ACCENT: FoldingCollation =
        FoldingCollation { uri: SIMPLE_CASE_ACCENT_URI, fold_case: true, strip_accents: true };
}

impl Collation for FoldingCollation {
    fn uri(&self) -> &str {
        self.uri
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }

    fn key(&self, s: &str) -> String {
        let base: String = if self.strip_accents {
            s.nfd().filter(|&ch| canonical_combining_class(ch) == 0).collect()
        } else {
            s.to_string()
        };
        if self.fold_case { base.to_lowercase() } else { base }
    }
}

static CODEPOINT: LazyLock<Arc<dyn Collation>> = LazyLock::new(|| Arc::new(CodepointCollation));

/// A resolved collation as stored on comparison nodes. `Codepoint` needs no lookup.
#[derive(Clone)]
pub enum CollationRef {
    Codepoint,
    Named(Arc<dyn Collation>),
}

impl CollationRef {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            CollationRef::Codepoint => a.cmp(b),
            CollationRef::Named(c) => c.compare(a, b),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            CollationRef::Codepoint => CODEPOINT_URI,
            CollationRef::Named(c) => c.uri(),
        }
    }
}

impl fmt::Debug for CollationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collation({})", self.uri())
    }
}

impl PartialEq for CollationRef {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

/// Named collations available to an expression, keyed by URI.
pub struct CollationMap {
    by_uri: HashMap<String, Arc<dyn Collation>>,
}

impl fmt::Debug for CollationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_uri.keys()).finish()
    }
}

impl Default for CollationMap {
    fn default() -> Self {
        let mut map = Self { by_uri: HashMap::new() };
        map.insert(CODEPOINT.clone());
        map.insert(Arc::new(FoldingCollation::SIMPLE_CASE));
        map.insert(Arc::new(FoldingCollation::SIMPLE_ACCENT));
        map.insert(Arc::new(FoldingCollation::SIMPLE_CASE_ACCENT));
        map
    }
}

impl CollationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codepoint() -> Arc<dyn Collation> {
        CODEPOINT.clone()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.by_uri.get(uri).cloned()
    }

    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_uri.insert(collation.uri().to_string(), collation);
    }

    /// Resolves a collation URI; `None` or the codepoint URI resolve without lookup.
    pub fn resolve(&self, uri: Option<&str>) -> Result<CollationRef, Error> {
        match uri {
            None | Some(CODEPOINT_URI) => Ok(CollationRef::Codepoint),
            Some(u) => self.get(u).map(CollationRef::Named).ok_or_else(|| {
                Error::from_code(ErrorCode::FOCH0002, format!("unknown collation URI: {u}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folding_keys() {
        let c = FoldingCollation::SIMPLE_CASE_ACCENT;
        assert_eq!(c.compare("Éte", "ete"), Ordering::Equal);
        assert_eq!(FoldingCollation::SIMPLE_CASE.compare("A", "a"), Ordering::Equal);
        assert_ne!(FoldingCollation::SIMPLE_CASE.compare("é", "e"), Ordering::Equal);
    }

    #[test]
    fn unknown_collation_is_foch0002() {
        let map = CollationMap::default();
        assert!(matches!(map.resolve(None), Ok(CollationRef::Codepoint)));
        let err = map.resolve(Some("urn:nope")).unwrap_err();
        assert_eq!(err.code, ErrorCode::FOCH0002);
    }
}
