//! XPath 2.0 expression compiler and evaluator over a pluggable node model.
//!
//! Expressions are built as trees in an [`ExprArena`], compiled with [`compile`] and
//! evaluated against any type implementing [`XdmNode`].

pub mod compiler;
pub mod consts;
pub mod engine;
pub mod model;
pub mod types;
pub mod xdm;

pub use compiler::{CompiledXPath, ExprArena, ExprId, OptimizerTrace, VarId, compile};
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Error, ErrorCode, OptimizerOptions, StaticContext, StaticContextBuilder,
};
pub use engine::{Receiver, XPathContext};
pub use model::simple::{SimpleNode, SimpleNodeBuilder, attr, doc, elem, text};
pub use model::{NodeKind, QName, XdmNode};
pub use xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence, XdmSequenceStream};
