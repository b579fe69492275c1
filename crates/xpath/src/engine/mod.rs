pub mod calculator;
pub mod casting;
pub mod collation;
pub mod comparer;
pub mod context;
pub mod cursors;
pub(crate) mod evaluator;
pub(crate) mod numeric;
pub mod runtime;

pub use context::{Receiver, XPathContext};
pub use cursors::SequenceCursor;
