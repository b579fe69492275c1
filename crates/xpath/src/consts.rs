//! Namespace URIs and other well-known constants.

/// XPath/XQuery error namespace (xqt-errors).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// XML Schema namespace (`xs:` types).
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
/// Default function namespace (`fn:`).
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
/// The `xml` prefix namespace; bound implicitly in every static context.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Namespace for functions the optimizer introduces on its own (never resolvable by name).
pub const INTERNAL_NS: &str = "urn:xpath-core:internal";
/// Unicode codepoint collation; always available without lookup.
pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
/// Case-insensitive sample collation.
pub const SIMPLE_CASE_URI: &str = "urn:xpath-core:collation:simple-case";
/// Accent-insensitive sample collation (NFD with combining marks removed).
pub const SIMPLE_ACCENT_URI: &str = "urn:xpath-core:collation:simple-accent";
/// Case- and accent-insensitive sample collation.
pub const SIMPLE_CASE_ACCENT_URI: &str = "urn:xpath-core:collation:simple-case-accent";
