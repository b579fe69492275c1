//! Arc-backed in-memory tree implementing [`XdmNode`], for tests and quick prototypes.
//!
//! Trees are built bottom-up and are immutable once built; parent links are fixed when
//! the parent is built.
//!
//! ```
//! use xpath_core::model::simple::{attr, doc, elem, text};
//! use xpath_core::model::XdmNode;
//!
//! // <root id="r"><child>Hello</child><child/></root>
//! let document = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child")),
//!     )
//!     .build();
//! let root = document.children()[0].clone();
//! assert_eq!(root.children().len(), 2);
//! assert_eq!(root.string_value(), "Hello");
//! assert_eq!(root.parent(), Some(document));
//! ```
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use super::{NodeKind, QName, XdmNode};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    text: OnceLock<String>,
}

#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SimpleNode");
        d.field("kind", &self.0.kind);
        if let Some(n) = &self.0.name {
            d.field("name", &n.local);
        }
        if let Some(v) = &self.0.value {
            d.field("value", v);
        }
        d.finish()
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: &str) -> Self {
        SimpleNodeBuilder::new(kind, name, Some(value.to_string())).build()
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None, None)
    }

    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(QName::local(name)), None)
    }

    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Attribute, Some(QName::local(name)), value)
    }

    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, value)
    }

    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, value)
    }

    pub fn namespace(prefix: &str, uri: &str) -> SimpleNode {
        let name = QName { prefix: Some(prefix.to_string()), local: prefix.to_string(), ns_uri: None };
        Self::leaf(NodeKind::Namespace, Some(name), uri)
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        Self { kind, name, value, attributes: Vec::new(), namespaces: Vec::new(), children: Vec::new() }
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.children.push(child.into().into_node());
        self
    }

    pub fn children<I>(mut self, it: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SimpleNodeOrBuilder>,
    {
        self.children.extend(it.into_iter().map(|c| c.into().into_node()));
        self
    }

    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert_eq!(attr.kind(), NodeKind::Attribute);
        self.attributes.push(attr);
        self
    }

    pub fn namespace(mut self, ns: SimpleNode) -> Self {
        debug_assert_eq!(ns.kind(), NodeKind::Namespace);
        self.namespaces.push(ns);
        self
    }

    pub fn build(self) -> SimpleNode {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            for n in self.attributes.iter().chain(&self.namespaces).chain(&self.children) {
                // nodes are adopted exactly once; a second adoption keeps the first parent
                let _ = n.0.parent.set(weak.clone());
            }
            Inner {
                kind: self.kind,
                name: self.name,
                value: self.value,
                parent: OnceLock::new(),
                attributes: self.attributes,
                namespaces: self.namespaces,
                children: self.children,
                text: OnceLock::new(),
            }
        });
        SimpleNode(inner)
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn into_node(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}

impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}

pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}

pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}

pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}

pub fn ns(prefix: &str, uri: &str) -> SimpleNode {
    SimpleNode::namespace(prefix, uri)
}

impl XdmNode for SimpleNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => self
                .0
                .text
                .get_or_init(|| {
                    fn collect(n: &SimpleNode, out: &mut String) {
                        for c in &n.0.children {
                            match c.0.kind {
                                NodeKind::Text => out.push_str(c.0.value.as_deref().unwrap_or_default()),
                                NodeKind::Element => collect(c, out),
                                _ => {}
                            }
                        }
                    }
                    let mut out = String::new();
                    collect(self, &mut out);
                    out
                })
                .clone(),
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn attributes(&self) -> Vec<Self> {
        self.0.attributes.clone()
    }

    fn namespaces(&self) -> Vec<Self> {
        self.0.namespaces.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn document_order_attributes_before_children() {
        let r = elem("r").attr(attr("a", "1")).child(elem("c")).build();
        let a = r.attributes()[0].clone();
        let c = r.children()[0].clone();
        assert_eq!(a.compare_document_order(&c).unwrap(), Ordering::Less);
        assert_eq!(r.compare_document_order(&a).unwrap(), Ordering::Less);
    }

    #[test]
    fn different_roots_need_adapter() {
        let a = elem("a").build();
        let b = elem("b").build();
        let err = a.compare_document_order(&b).unwrap_err();
        assert_eq!(err.code_str(), "FOER0000");
    }
}
