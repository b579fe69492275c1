//! Optional collaborators that generate code for, or stream, individual expressions.
//!
//! The interpreter never consults these hooks. They are looked up per node through
//! [`CompiledXPath::expression_compiler`](crate::CompiledXPath::expression_compiler) and
//! [`CompiledXPath::streaming_adjunct`](crate::CompiledXPath::streaming_adjunct).

use core::fmt;
use std::sync::Arc;

use crate::compiler::expr::ExprKind;

/// Generates native code for selected expression kinds.
pub trait ExpressionCompilerHook: fmt::Debug + Send + Sync {
    fn handles(&self, kind: &ExprKind) -> bool;
}

/// Evaluates selected expression kinds over a streamed input.
pub trait StreamingAdjunctHook: fmt::Debug + Send + Sync {
    fn handles(&self, kind: &ExprKind) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct CompilerHooks {
    pub expression_compiler: Option<Arc<dyn ExpressionCompilerHook>>,
    pub streaming_adjunct: Option<Arc<dyn StreamingAdjunctHook>>,
}

impl CompilerHooks {
    #[must_use]
    pub fn with_expression_compiler(mut self, hook: Arc<dyn ExpressionCompilerHook>) -> Self {
        self.expression_compiler = Some(hook);
        self
    }

    #[must_use]
    pub fn with_streaming_adjunct(mut self, hook: Arc<dyn StreamingAdjunctHook>) -> Self {
        self.streaming_adjunct = Some(hook);
        self
    }
}
