//! Layout tree nodes.
//!
//! Offsets are always relative to the enclosing node. A [`RepeatNode`]
//! element and a [`MemoryRegion`] element sit at offset 0 of each slot.
//!
//! ```text
//! LayoutDescriptor
//! └── BlockNode (root)
//!     ├── RegisterNode            cfg_val        @0x0
//!     ├── BlockNode               loop_intlk     @0x40
//!     │   └── RegisterNode        ctl            @0x0  [fields...]
//!     ├── MemoryRegion            sps_ram_bank   @0x800  512 × data
//!     └── RepeatNode              ch             @0x1000 12 × 0x1000
//!         └── BlockNode (element)
//!             ├── MemoryRegion    coeff_ram_bank @0x0
//!             └── BlockNode       acc            @0x800
//! ```

use crate::field::{Access, FieldDescriptor, FieldSemantic, FormatRef, RegisterWidth};

/// Any node of a layout tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Single register
    Register(RegisterNode),
    /// Named group of nodes
    Block(BlockNode),
    /// Array of identical blocks at a fixed stride
    Repeat(RepeatNode),
    /// Densely packed array of identical registers
    Memory(MemoryRegion),
}

impl Node {
    /// Node name
    pub fn name(&self) -> &str {
        match self {
            Self::Register(n) => &n.name,
            Self::Block(n) => &n.name,
            Self::Repeat(n) => &n.name,
            Self::Memory(n) => &n.name,
        }
    }

    /// Offset relative to the parent
    pub const fn offset(&self) -> u64 {
        match self {
            Self::Register(n) => n.offset,
            Self::Block(n) => n.offset,
            Self::Repeat(n) => n.offset,
            Self::Memory(n) => n.offset,
        }
    }

    /// Bytes covered, trailing padding of declared blocks included
    ///
    /// Saturates at `u64::MAX`; see [`checked_extent`](Self::checked_extent).
    pub fn extent(&self) -> u64 {
        self.checked_extent().unwrap_or(u64::MAX)
    }

    /// Bytes covered, or `None` if the extent overflows `u64`
    pub fn checked_extent(&self) -> Option<u64> {
        match self {
            Self::Register(n) => Some(n.width.bytes()),
            Self::Block(n) => n.checked_extent(),
            Self::Repeat(n) => n.checked_extent(),
            Self::Memory(n) => n.checked_extent(),
        }
    }

    /// Offset of the first byte past the node, or `None` on overflow
    pub fn checked_end(&self) -> Option<u64> {
        self.offset().checked_add(self.checked_extent()?)
    }

    /// Node kind for messages and map dumps
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Block(_) => "block",
            Self::Repeat(_) => "repeat",
            Self::Memory(_) => "memory",
        }
    }
}

impl From<RegisterNode> for Node {
    fn from(node: RegisterNode) -> Self {
        Self::Register(node)
    }
}

impl From<BlockNode> for Node {
    fn from(node: BlockNode) -> Self {
        Self::Block(node)
    }
}

impl From<RepeatNode> for Node {
    fn from(node: RepeatNode) -> Self {
        Self::Repeat(node)
    }
}

impl From<MemoryRegion> for Node {
    fn from(node: MemoryRegion) -> Self {
        Self::Memory(node)
    }
}

/// One addressable register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterNode {
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) width: RegisterWidth,
    pub(crate) access: Access,
    pub(crate) semantic: FieldSemantic,
    pub(crate) fields: Vec<FieldDescriptor>,
}

impl RegisterNode {
    /// 32-bit register with no fields
    pub fn new(name: impl Into<String>, offset: u64, access: Access) -> Self {
        Self {
            name: name.into(),
            offset,
            width: RegisterWidth::Word,
            access,
            semantic: FieldSemantic::RawUint,
            fields: Vec::new(),
        }
    }

    /// Change the register width
    #[must_use]
    pub fn width(mut self, width: RegisterWidth) -> Self {
        self.width = width;
        self
    }

    /// Add a bit-field
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Interpretation of the whole register value
    #[must_use]
    pub fn semantic(mut self, semantic: FieldSemantic) -> Self {
        self.semantic = semantic;
        self
    }

    /// Interpret the whole register as signed fixed-point
    #[must_use]
    pub fn fixed_point(self, format: FormatRef) -> Self {
        self.semantic(FieldSemantic::SignedFixedPoint(format))
    }

    /// Interpret the whole register as a signed integer of its own width
    #[must_use]
    pub fn signed(self) -> Self {
        let bits = self.width.bits();
        self.fixed_point(FormatRef::integer(bits))
    }

    /// Register name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset relative to the parent
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Register width
    pub const fn register_width(&self) -> RegisterWidth {
        self.width
    }

    /// Access mode
    pub const fn access(&self) -> Access {
        self.access
    }

    /// Whole-register interpretation
    pub const fn whole_semantic(&self) -> &FieldSemantic {
        &self.semantic
    }

    /// Bit-fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// Named, fixed-offset group of child nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) size: Option<u64>,
    pub(crate) children: Vec<Node>,
}

impl BlockNode {
    /// Empty block at `offset`
    pub fn new(name: impl Into<String>, offset: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            size: None,
            children: Vec::new(),
        }
    }

    /// Unnamed block at offset 0, used as a repeat element template
    pub fn template() -> Self {
        Self::new("", 0)
    }

    /// Declare the block extent (the generator's `_SIZE` constant)
    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Add a child node
    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Block name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset relative to the parent
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Declared extent, if any
    pub const fn declared_size(&self) -> Option<u64> {
        self.size
    }

    /// Children, sorted by offset once the layout is built
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Look up a child by name
    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// End of the highest child, saturating at `u64::MAX`
    pub fn computed_extent(&self) -> u64 {
        self.checked_computed_extent().unwrap_or(u64::MAX)
    }

    fn checked_computed_extent(&self) -> Option<u64> {
        self.children
            .iter()
            .try_fold(0, |end, c| Some(end.max(c.checked_end()?)))
    }

    /// Declared extent, or the computed one when none was declared
    pub fn extent(&self) -> u64 {
        self.checked_extent().unwrap_or(u64::MAX)
    }

    /// [`extent`](Self::extent), or `None` if it overflows `u64`
    pub fn checked_extent(&self) -> Option<u64> {
        match self.size {
            Some(size) => Some(size),
            None => self.checked_computed_extent(),
        }
    }
}

/// Homogeneous array of blocks at a fixed stride (`ch[12]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatNode {
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) count: usize,
    pub(crate) stride: u64,
    pub(crate) element: BlockNode,
}

impl RepeatNode {
    /// `count` copies of `element`, the first at `offset`
    pub fn new(
        name: impl Into<String>,
        offset: u64,
        count: usize,
        stride: u64,
        element: BlockNode,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            count,
            stride,
            element,
        }
    }

    /// Array name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset of element 0
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of elements
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Distance between consecutive elements
    pub const fn stride(&self) -> u64 {
        self.stride
    }

    /// Element template
    pub const fn element(&self) -> &BlockNode {
        &self.element
    }

    /// Offset of element `index`, relative to the parent
    pub const fn element_offset(&self, index: usize) -> u64 {
        self.offset + index as u64 * self.stride
    }

    /// Bytes from element 0 to the end of the last element
    pub fn extent(&self) -> u64 {
        self.checked_extent().unwrap_or(u64::MAX)
    }

    /// [`extent`](Self::extent), or `None` if it overflows `u64`
    pub fn checked_extent(&self) -> Option<u64> {
        match self.count {
            0 => Some(0),
            n => (n as u64 - 1)
                .checked_mul(self.stride)?
                .checked_add(self.element.checked_extent()?),
        }
    }
}

/// RAM window: `count` registers packed back to back (`coeffs[50]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) count: usize,
    pub(crate) element: RegisterNode,
}

impl MemoryRegion {
    /// `count` copies of `element` starting at `offset`
    pub fn new(name: impl Into<String>, offset: u64, count: usize, element: RegisterNode) -> Self {
        Self {
            name: name.into(),
            offset,
            count,
            element,
        }
    }

    /// Region name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset of element 0
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of elements
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Element register template
    pub const fn element(&self) -> &RegisterNode {
        &self.element
    }

    /// Distance between elements (the element width)
    pub const fn stride(&self) -> u64 {
        self.element.width.bytes()
    }

    /// Bytes covered by the whole window, saturating at `u64::MAX`
    pub const fn extent(&self) -> u64 {
        match self.checked_extent() {
            Some(extent) => extent,
            None => u64::MAX,
        }
    }

    /// [`extent`](Self::extent), or `None` if it overflows `u64`
    pub const fn checked_extent(&self) -> Option<u64> {
        (self.count as u64).checked_mul(self.stride())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_extent_uses_padded_element() {
        let element = BlockNode::template()
            .size(0x100)
            .child(MemoryRegion::new(
                "coeffs",
                0,
                50,
                RegisterNode::new("val", 0, Access::ReadWrite),
            ));
        let ch = RepeatNode::new("ch", 0, 12, 0x100, element);
        assert_eq!(ch.extent(), 0xC00);
        assert_eq!(ch.element_offset(3), 0x300);
        assert_eq!(ch.element().computed_extent(), 50 * 4);
    }

    #[test]
    fn block_extent_prefers_declared_size() {
        let block = BlockNode::new("bpm_pos_flatenizer", 0)
            .child(RegisterNode::new("max_num_cte", 0, Access::ReadOnly).width(RegisterWidth::Half))
            .child(RegisterNode::new("base_bpm_id", 4, Access::ReadWrite).width(RegisterWidth::Byte));
        assert_eq!(block.computed_extent(), 5);
        assert_eq!(block.clone().size(8).extent(), 8);
        assert_eq!(block.extent(), 5);
    }

    #[test]
    fn register_semantics() {
        let reg = RegisterNode::new("min", 4, Access::ReadWrite).signed();
        assert_eq!(
            reg.whole_semantic(),
            &FieldSemantic::SignedFixedPoint(FormatRef::integer(32))
        );
        assert_eq!(Node::from(reg).kind(), "register");
    }
}
