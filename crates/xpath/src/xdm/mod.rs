use core::fmt;

mod atomic;
mod grounded;

pub use atomic::XdmAtomicValue;
pub use grounded::GroundedValue;

use crate::engine::cursors::SequenceCursor;
use crate::engine::runtime::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<&str>, local: impl Into<String>) -> Self {
        Self { ns_uri: ns_uri.map(str::to_string), local: local.into() }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self { ns_uri: None, local: local.into() }
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

pub type XdmSequence<N> = Vec<XdmItem<N>>;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

pub type XdmItemResult<N> = Result<XdmItem<N>, Error>;

impl<N> XdmItem<N> {
    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            XdmItem::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }
}

impl<N> From<N> for XdmItem<N> {
    fn from(n: N) -> Self {
        XdmItem::Node(n)
    }
}

impl<N> fmt::Display for XdmItem<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(n) => write!(f, "{n:?}"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
        }
    }
}

/// Lazy result of [`CompiledXPath::evaluate_stream`](crate::CompiledXPath::evaluate_stream).
///
/// Items are produced on demand; dropping the stream (or calling [`close`](Self::close))
/// releases the underlying cursors without reading the remainder.
pub struct XdmSequenceStream<N> {
    cursor: Box<dyn SequenceCursor<N>>,
    done: bool,
}

impl<N> XdmSequenceStream<N> {
    pub(crate) fn new(cursor: Box<dyn SequenceCursor<N>>) -> Self {
        Self { cursor, done: false }
    }

    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.cursor.close();
        }
    }

    pub fn materialize(self) -> Result<XdmSequence<N>, Error> {
        self.collect()
    }
}

impl<N> Iterator for XdmSequenceStream<N> {
    type Item = XdmItemResult<N>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.cursor.next_item();
        if next.is_none() {
            self.done = true;
        }
        next
    }
}
