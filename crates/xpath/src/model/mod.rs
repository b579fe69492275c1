//! Node capability consumed by the evaluator.
//!
//! The engine never looks inside a tree; it navigates through [`XdmNode`], compares
//! nodes by identity (`Eq`) and document order, and atomizes them through their
//! string value.

use core::cmp::Ordering;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::XdmAtomicValue;

pub mod simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn test_name(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
            NodeKind::Namespace => "namespace-node()",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }
}

/// Document order from ancestry and sibling position.
///
/// - An ancestor precedes its descendants.
/// - Among siblings, attributes come first, then namespaces, then children.
/// - Nodes under different roots cannot be ordered this way (`err:FOER0000`); adapters
///   with multi-root trees override [`XdmNode::compare_document_order`].
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(n: &N) -> Vec<N> {
        let mut path = vec![n.clone()];
        let mut cur = n.parent();
        while let Some(p) = cur {
            cur = p.parent();
            path.push(p);
        }
        path.reverse();
        path
    }
    let pa = path_to_root(a);
    let pb = path_to_root(b);
    let common = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    if common == pa.len().min(pb.len()) {
        return Ok(pa.len().cmp(&pb.len()));
    }
    if common == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "document order requires adapter: nodes from different roots",
        ));
    }
    let parent = &pa[common - 1];
    let siblings: Vec<N> = parent
        .attributes()
        .into_iter()
        .chain(parent.namespaces())
        .chain(parent.children())
        .collect();
    let pos = |n: &N| siblings.iter().position(|s| s == n);
    Ok(match (pos(&pa[common]), pos(&pb[common])) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

pub trait XdmNode: Clone + Eq + core::fmt::Debug + 'static {
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    /// Typed value of the node. Without schema information elements, attributes, text
    /// and document nodes carry `xs:untypedAtomic`; the remaining kinds carry `xs:string`.
    fn typed_value(&self) -> XdmAtomicValue {
        match self.kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                XdmAtomicValue::String(self.string_value())
            }
            _ => XdmAtomicValue::UntypedAtomic(self.string_value()),
        }
    }

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<Self>;
    fn namespaces(&self) -> Vec<Self> {
        Vec::new()
    }

    fn root(&self) -> Self {
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }
}
