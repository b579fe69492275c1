use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::compiler::hooks::CompilerHooks;
use crate::consts::{CODEPOINT_URI, ERR_NS, FNS, XML_URI};
use crate::engine::collation::CollationMap;
use crate::types::{ContextItemType, SequenceType};
use crate::xdm::{ExpandedName, XdmItem, XdmSequence};

/// Error codes emitted by the compiler and the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum ErrorCode {
    XPST0003, // static error: malformed tree handed over by the front end
    XPST0008, // undeclared variable
    XPST0017, // unknown function / wrong arity
    XPST0080, // cast to abstract type
    XPTY0004, // type mismatch
    XPTY0018, // path result mixes nodes and atomic values
    XPTY0019, // path step applied to an atomic value
    XPTY0020, // axis step with non-node context item
    XPDY0002, // context item undefined
    XPDY0050, // treat as failed
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow/underflow
    FOCA0002, // invalid lexical value
    FOCA0005, // NaN supplied as float/double value
    FOCH0002, // collation does not exist
    FODT0001, // overflow in date/time arithmetic
    FODT0002, // overflow in duration arithmetic
    FOER0000, // unidentified error
    FORG0001, // invalid value for cast/constructor
    FORG0003, // zero-or-one called with more than one item
    FORG0004, // one-or-more called with empty sequence
    FORG0005, // exactly-one called with wrong cardinality
    FORG0006, // invalid argument type (e.g. effective boolean value)
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0080 => "XPST0080",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FOCA0005 => "FOCA0005",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::FODT0001 => "FODT0001",
            ErrorCode::FODT0002 => "FODT0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
        }
    }

    /// Returns the QName for this error code in the xqt-errors namespace.
    pub fn qname(&self) -> ExpandedName {
        ExpandedName::new(Some(ERR_NS), self.as_str())
    }

    /// Parses `err:XPTY0004` or the bare local part.
    pub fn from_code(s: &str) -> Option<Self> {
        use ErrorCode::*;
        let local = s.strip_prefix("err:").unwrap_or(s);
        Some(match local {
            "XPST0003" => XPST0003,
            "XPST0008" => XPST0008,
            "XPST0017" => XPST0017,
            "XPST0080" => XPST0080,
            "XPTY0004" => XPTY0004,
            "XPTY0018" => XPTY0018,
            "XPTY0019" => XPTY0019,
            "XPTY0020" => XPTY0020,
            "XPDY0002" => XPDY0002,
            "XPDY0050" => XPDY0050,
            "FOAR0001" => FOAR0001,
            "FOAR0002" => FOAR0002,
            "FOCA0002" => FOCA0002,
            "FOCA0005" => FOCA0005,
            "FOCH0002" => FOCH0002,
            "FODT0001" => FODT0001,
            "FODT0002" => FODT0002,
            "FOER0000" => FOER0000,
            "FORG0001" => FORG0001,
            "FORG0003" => FORG0003,
            "FORG0004" => FORG0004,
            "FORG0005" => FORG0005,
            "FORG0006" => FORG0006,
            _ => return None,
        })
    }

    /// The error category implied by the code's prefix.
    pub fn default_kind(&self) -> ErrorKind {
        let s = self.as_str();
        if s.starts_with("XPST") {
            ErrorKind::Static
        } else if s.starts_with("XPTY") {
            ErrorKind::Type
        } else {
            ErrorKind::Dynamic
        }
    }
}

/// Broad error taxonomy. Static and type errors found during compilation abort the
/// compilation; dynamic errors surface from evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Static,
    Type,
    Dynamic,
}

/// Source position handed over by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub module: Option<Arc<str>>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { module: None, line, column }
    }

    pub fn in_module(module: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self { module: Some(module.into()), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{m}:{}:{}", self.line, self.column),
            None => write!(f, "line {}, column {}", self.line, self.column),
        }
    }
}

/// Snapshot of the focus at the point a dynamic error was raised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub position: Option<usize>,
    pub item: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<Location>,
    pub context: Option<ErrorContext>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    // Raised only while evaluating speculatively: the dynamic context needed to decide
    // the outcome is not available yet.
    pub(crate) deferred: bool,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            kind: code.default_kind(),
            code,
            message: msg.into(),
            location: None,
            context: None,
            source: None,
            deferred: false,
        }
    }

    /// A type error reported while compiling (`XPTY*` codes detected statically).
    pub fn static_type(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Type, ..Self::from_code(code, msg) }
    }

    pub fn dynamic(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Dynamic, ..Self::from_code(code, msg) }
    }

    pub(crate) fn deferred(what: &str) -> Self {
        Self {
            deferred: true,
            ..Self::from_code(ErrorCode::XPDY0002, format!("{what} is not available during compilation"))
        }
    }

    pub(crate) fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Stable error code string such as `XPTY0004`.
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn code_qname(&self) -> ExpandedName {
        self.code.qname()
    }

    pub fn format_code(&self) -> String {
        format!("err:{}", self.code.as_str())
    }

    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Attaches a location unless an inner expression already did.
    pub fn maybe_set_location(&mut self, location: Option<&Location>) {
        if self.location.is_none() {
            self.location = location.cloned();
        }
    }

    /// Attaches the focus snapshot unless one is already recorded.
    pub fn maybe_set_context(&mut self, context: impl FnOnce() -> Option<ErrorContext>) {
        if self.context.is_none() {
            self.context = context();
        }
    }

    #[must_use]
    pub fn at(mut self, location: Option<&Location>) -> Self {
        self.maybe_set_location(location);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

/// Switches for the optimize phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerOptions {
    /// Fold subtrees whose operands are all literals.
    pub early_evaluation: bool,
    /// Rewrite `position()` predicates to `subsequence`/`remove`/first-item forms.
    pub positional_rewrites: bool,
    /// Hoist focus- and range-independent subexpressions into let bindings.
    pub loop_lifting: bool,
    /// Record each rewrite decision on the compiled expression.
    pub trace_optimizer_decisions: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            early_evaluation: true,
            positional_rewrites: true,
            loop_lifting: true,
            trace_optimizer_decisions: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticContext {
    pub base_uri: Option<String>,
    pub default_function_namespace: Option<String>,
    pub default_collation: Option<String>,
    pub namespaces: NamespaceBindings,
    pub in_scope_variables: HashMap<ExpandedName, SequenceType>,
    pub backwards_compatible: bool,
    pub context_item_type: ContextItemType,
    pub optimizer: OptimizerOptions,
    pub collations: Arc<CollationMap>,
    pub hooks: CompilerHooks,
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        ns.by_prefix.insert("xml".to_string(), XML_URI.to_string());
        Self {
            base_uri: None,
            default_function_namespace: Some(FNS.to_string()),
            default_collation: Some(CODEPOINT_URI.to_string()),
            namespaces: ns,
            in_scope_variables: HashMap::new(),
            backwards_compatible: false,
            context_item_type: ContextItemType::Unknown,
            optimizer: OptimizerOptions::default(),
            collations: Arc::new(CollationMap::default()),
            hooks: CompilerHooks::default(),
        }
    }
}

impl StaticContext {
    pub fn variable_type(&self, name: &ExpandedName) -> Option<&SequenceType> {
        self.in_scope_variables.get(name)
    }
}

pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self { ctx: StaticContext::default() }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_collation = Some(uri.into());
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    /// Declares an external variable; undeclared references fail with `XPST0008`.
    pub fn with_variable(mut self, name: ExpandedName, declared: SequenceType) -> Self {
        self.ctx.in_scope_variables.insert(name, declared);
        self
    }

    pub fn with_backwards_compatible(mut self, on: bool) -> Self {
        self.ctx.backwards_compatible = on;
        self
    }

    pub fn with_context_item_type(mut self, t: ContextItemType) -> Self {
        self.ctx.context_item_type = t;
        self
    }

    pub fn with_optimizer(mut self, options: OptimizerOptions) -> Self {
        self.ctx.optimizer = options;
        self
    }

    pub fn with_trace_optimizer_decisions(mut self, on: bool) -> Self {
        self.ctx.optimizer.trace_optimizer_decisions = on;
        self
    }

    pub fn with_collations(mut self, collations: Arc<CollationMap>) -> Self {
        self.ctx.collations = collations;
        self
    }

    pub fn with_hooks(mut self, hooks: CompilerHooks) -> Self {
        self.ctx.hooks = hooks;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

#[derive(Debug, Clone)]
pub struct DynamicContext<N> {
    pub context_item: Option<XdmItem<N>>,
    pub variables: HashMap<ExpandedName, XdmSequence<N>>,
    pub default_collation: Option<String>,
    pub collations: Option<Arc<CollationMap>>,
    pub now: Option<DateTime<FixedOffset>>,
    pub timezone_override: Option<FixedOffset>,
}

impl<N> Default for DynamicContext<N> {
    fn default() -> Self {
        Self {
            context_item: None,
            variables: HashMap::new(),
            default_collation: None,
            collations: None,
            now: None,
            timezone_override: None,
        }
    }
}

impl<N> DynamicContext<N> {
    /// Implicit timezone: explicit override, else the offset of `now`, else UTC.
    pub fn implicit_timezone(&self) -> FixedOffset {
        self.timezone_override
            .or_else(|| self.now.map(|n| *n.offset()))
            .unwrap_or_else(|| Utc.fix())
    }
}

pub struct DynamicContextBuilder<N> {
    ctx: DynamicContext<N>,
}

impl<N> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self { ctx: DynamicContext::default() }
    }
}

impl<N> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.ctx.context_item = Some(item.into());
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<XdmSequence<N>>) -> Self {
        self.ctx.variables.insert(name, value.into());
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_collation = Some(uri.into());
        self
    }

    pub fn with_collations(mut self, collations: Arc<CollationMap>) -> Self {
        self.ctx.collations = Some(collations);
        self
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.ctx.now = Some(now);
        self
    }

    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        self.ctx.timezone_override = FixedOffset::east_opt(offset_minutes * 60);
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        self.ctx
    }
}
