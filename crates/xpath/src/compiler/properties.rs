use bitflags::bitflags;

bitflags! {
    /// Static facts about the sequence an expression produces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StaticProperty: u16 {
        /// Nodes come in document order without duplicates.
        const ORDERED = 1 << 0;
        /// No node in the result is an ancestor of another.
        const PEER = 1 << 1;
        /// Every node is within the subtree of the context node.
        const SUBTREE = 1 << 2;
        /// Evaluation creates no new nodes.
        const NON_CREATIVE = 1 << 3;
        /// Atomizing the result never yields `xs:untypedAtomic`.
        const NOT_UNTYPED_ATOMIC = 1 << 4;
        /// All nodes lie in the document containing the context item.
        const CONTEXT_DOCUMENT_NODESET = 1 << 5;
    }
}

bitflags! {
    /// Parts of the dynamic context an expression reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Dependencies: u16 {
        const CONTEXT_ITEM = 1 << 0;
        const POSITION = 1 << 1;
        const LAST = 1 << 2;
        /// Navigates from the root of the context document.
        const CONTEXT_DOCUMENT = 1 << 3;
        const LOCAL_VARIABLES = 1 << 4;
        const GLOBAL_VARIABLES = 1 << 5;
        const IMPLICIT_TIMEZONE = 1 << 6;

        const FOCUS = Self::CONTEXT_ITEM.bits()
            | Self::POSITION.bits()
            | Self::LAST.bits()
            | Self::CONTEXT_DOCUMENT.bits();
    }
}

impl Dependencies {
    pub fn depends_on_focus(self) -> bool {
        self.intersects(Dependencies::FOCUS)
    }
}
