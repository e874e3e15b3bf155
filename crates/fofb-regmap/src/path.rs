//! Logical path resolution.
//!
//! Paths are dot-separated names with optional array indices:
//!
//! ```text
//! loop_intlk.ctl.sta_clr        field of a register in a block
//! ch[3].acc.gain                register in element 3 of a repeat
//! ch[3].coeff_ram_bank[10]      element 10 of a memory region
//! ch[3].coeff_ram_bank[10].data same register, named explicitly
//! ch[3].coeff_ram_bank          the whole region (region operations)
//! ```
//!
//! Resolution is pure arithmetic over the descriptor; nothing touches
//! hardware. Results are relative to the peripheral base address.

use crate::error::PathError;
use crate::field::{Access, FieldDescriptor, FieldSemantic, RegisterWidth};
use crate::layout::LayoutDescriptor;
use crate::node::{BlockNode, MemoryRegion, Node, RegisterNode, RepeatNode};

/// One parsed path segment: `name` or `name[index]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Member name
    pub name: String,
    /// Array index, if given
    pub index: Option<usize>,
}

impl PathSegment {
    /// Split a path into segments
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Syntax`] for empty segments, unbalanced brackets
    /// or non-numeric indices.
    pub fn parse_path(path: &str) -> Result<Vec<Self>, PathError> {
        let syntax = |reason| PathError::Syntax {
            path: path.to_string(),
            reason,
        };
        if path.is_empty() {
            return Err(syntax("empty path"));
        }
        path.split('.')
            .map(|text| {
                let (name, index) = match text.split_once('[') {
                    None => (text, None),
                    Some((name, rest)) => {
                        let digits = rest
                            .strip_suffix(']')
                            .ok_or_else(|| syntax("expected `]` at the end of a segment"))?;
                        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                            return Err(syntax("array index is not a decimal number"));
                        }
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| syntax("array index does not fit a usize"))?;
                        (name, Some(index))
                    }
                };
                if name.is_empty() {
                    return Err(syntax("empty segment name"));
                }
                if name.contains(']') {
                    return Err(syntax("unbalanced `]`"));
                }
                Ok(Self {
                    name: name.to_string(),
                    index,
                })
            })
            .collect()
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{i}]", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A register or bit-field resolved to an absolute location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// Path as requested
    pub path: String,
    /// Byte address of the containing register
    pub address: u64,
    /// Width of the containing register
    pub width: RegisterWidth,
    /// Field mask within the register
    pub mask: u32,
    /// Position of the lowest field bit
    pub shift: u32,
    /// Effective access mode
    pub access: Access,
    /// Value interpretation
    pub semantic: FieldSemantic,
}

impl ResolvedField {
    /// Shift the address by a peripheral base
    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        self.address += base;
        self
    }

    /// Whether the field covers the whole register
    pub const fn is_whole_register(&self) -> bool {
        self.mask == self.width.mask()
    }

    /// Number of bits in the field
    pub const fn field_bits(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Largest raw value the field holds
    pub const fn max_value(&self) -> u32 {
        self.mask >> self.shift
    }
}

/// A homogeneous array of registers resolved to an absolute location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegion {
    /// Path as requested
    pub path: String,
    /// Byte address of element 0
    pub address: u64,
    /// Distance between elements
    pub stride: u64,
    /// Number of elements
    pub count: usize,
    /// Width of each element
    pub width: RegisterWidth,
    /// Access mode of each element
    pub access: Access,
    /// Interpretation of each element
    pub semantic: FieldSemantic,
}

impl ResolvedRegion {
    /// Shift the address by a peripheral base
    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        self.address += base;
        self
    }

    /// Address of element `index` (not bounds-checked)
    pub const fn element_address(&self, index: usize) -> u64 {
        self.address + index as u64 * self.stride
    }
}

/// What a path walk ended on
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Block(&'a BlockNode),
    Repeat(&'a RepeatNode),
    Memory(&'a MemoryRegion),
    /// Indexed memory element; accepts its own name or a field name next
    Element(&'a RegisterNode),
    Register(&'a RegisterNode),
    Field(&'a RegisterNode, &'a FieldDescriptor),
}

struct Cursor<'p> {
    path: &'p str,
    segments: Vec<PathSegment>,
}

impl Cursor<'_> {
    fn type_mismatch(&self, segment: &str, reason: &'static str) -> PathError {
        PathError::TypeMismatch {
            path: self.path.to_string(),
            segment: segment.to_string(),
            reason,
        }
    }

    fn not_found(&self, segment: &str) -> PathError {
        PathError::NotFound {
            path: self.path.to_string(),
            segment: segment.to_string(),
        }
    }

    fn check_index(&self, segment: &PathSegment, index: usize, count: usize) -> Result<(), PathError> {
        if index >= count {
            return Err(PathError::IndexOutOfRange {
                path: self.path.to_string(),
                segment: segment.name.clone(),
                index,
                count,
            });
        }
        Ok(())
    }

    fn walk<'a>(&self, root: &'a BlockNode) -> Result<(Target<'a>, u64), PathError> {
        let mut target = Target::Block(root);
        let mut address = 0u64;

        for segment in &self.segments {
            target = match target {
                Target::Block(block) => {
                    let child = block
                        .find_child(&segment.name)
                        .ok_or_else(|| self.not_found(&segment.name))?;
                    address += child.offset();
                    self.enter(child, segment, &mut address)?
                }
                Target::Repeat(repeat) => {
                    return Err(self.type_mismatch(&repeat.name, "is an array and needs an index"));
                }
                Target::Memory(memory) => {
                    return Err(self.type_mismatch(&memory.name, "is an array and needs an index"));
                }
                Target::Element(register) if segment.name == register.name => {
                    if segment.index.is_some() {
                        return Err(self.type_mismatch(&segment.name, "is not an array"));
                    }
                    Target::Register(register)
                }
                Target::Element(register) | Target::Register(register) => {
                    let field = register
                        .find_field(&segment.name)
                        .ok_or_else(|| self.not_found(&segment.name))?;
                    if segment.index.is_some() {
                        return Err(self.type_mismatch(&segment.name, "is a field, not an array"));
                    }
                    Target::Field(register, field)
                }
                Target::Field(_, field) => {
                    return Err(self.type_mismatch(field.name(), "is a field and has no members"));
                }
            };
        }
        Ok((target, address))
    }

    fn enter<'a>(
        &self,
        child: &'a Node,
        segment: &PathSegment,
        address: &mut u64,
    ) -> Result<Target<'a>, PathError> {
        match (child, segment.index) {
            (Node::Register(_) | Node::Block(_), Some(_)) => {
                Err(self.type_mismatch(&segment.name, "is not an array"))
            }
            (Node::Register(register), None) => Ok(Target::Register(register)),
            (Node::Block(block), None) => Ok(Target::Block(block)),
            (Node::Repeat(repeat), None) => Ok(Target::Repeat(repeat)),
            (Node::Memory(memory), None) => Ok(Target::Memory(memory)),
            (Node::Repeat(repeat), Some(i)) => {
                self.check_index(segment, i, repeat.count)?;
                *address += i as u64 * repeat.stride;
                Ok(Target::Block(&repeat.element))
            }
            (Node::Memory(memory), Some(i)) => {
                self.check_index(segment, i, memory.count)?;
                *address += i as u64 * memory.stride();
                Ok(Target::Element(&memory.element))
            }
        }
    }

    fn last_segment(&self) -> String {
        self.segments
            .last()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

impl LayoutDescriptor {
    fn locate<'a, 'p>(&'a self, path: &'p str) -> Result<(Cursor<'p>, Target<'a>, u64), PathError> {
        let cursor = Cursor {
            path,
            segments: PathSegment::parse_path(path)?,
        };
        let (target, address) = cursor.walk(self.root())?;
        Ok((cursor, target, address))
    }

    /// Resolve a path to a register or bit-field
    ///
    /// A path ending on a register (or an indexed memory element) yields a
    /// whole-register field.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] if the path does not name a register or field.
    pub fn resolve(&self, path: &str) -> Result<ResolvedField, PathError> {
        let (cursor, target, address) = self.locate(path)?;
        let (register, field) = match target {
            Target::Register(register) | Target::Element(register) => (register, None),
            Target::Field(register, field) => (register, Some(field)),
            Target::Block(_) | Target::Repeat(_) | Target::Memory(_) => {
                return Err(cursor.type_mismatch(
                    &cursor.last_segment(),
                    "is a container, not a register or field",
                ));
            }
        };

        let resolved = match field {
            None => ResolvedField {
                path: path.to_string(),
                address,
                width: register.width,
                mask: register.width.mask(),
                shift: 0,
                access: register.access,
                semantic: register.semantic.clone(),
            },
            Some(field) => ResolvedField {
                path: path.to_string(),
                address,
                width: register.width,
                mask: field.mask(),
                shift: field.shift(),
                access: field.effective_access(register.access),
                semantic: field.semantic().clone(),
            },
        };
        Ok(resolved)
    }

    /// Resolve a path to an array of registers
    ///
    /// Accepts a memory region, or a repeat whose element holds a single
    /// register at offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::TypeMismatch`] for anything else.
    pub fn resolve_region(&self, path: &str) -> Result<ResolvedRegion, PathError> {
        let (cursor, target, address) = self.locate(path)?;
        let (register, count, stride) = match target {
            Target::Memory(memory) => (&memory.element, memory.count, memory.stride()),
            Target::Repeat(repeat) => match repeat.element.children() {
                [Node::Register(register)] if register.offset == 0 => {
                    (register, repeat.count, repeat.stride)
                }
                _ => {
                    return Err(cursor.type_mismatch(
                        &cursor.last_segment(),
                        "elements are not single registers",
                    ));
                }
            },
            _ => {
                return Err(cursor.type_mismatch(
                    &cursor.last_segment(),
                    "is not an array of registers",
                ));
            }
        };
        Ok(ResolvedRegion {
            path: path.to_string(),
            address,
            stride,
            count,
            width: register.width,
            access: register.access,
            semantic: register.semantic.clone(),
        })
    }

    /// Offset of any node (register, field, block or array) named by `path`.
    /// Fields report the offset of their register.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] if the path does not resolve.
    pub fn offset_of(&self, path: &str) -> Result<u64, PathError> {
        self.locate(path).map(|(_, _, address)| address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FormatRef;
    use crate::layout::AbiVersion;

    fn layout() -> LayoutDescriptor {
        let ch = BlockNode::template()
            .child(MemoryRegion::new(
                "coeff",
                0,
                4,
                RegisterNode::new("data", 0, Access::ReadWrite),
            ))
            .child(
                BlockNode::new("acc", 0x10)
                    .child(
                        RegisterNode::new("ctl", 0, Access::ReadWrite)
                            .field(FieldDescriptor::bit("clear", 0))
                            .field(FieldDescriptor::bit("freeze", 1)),
                    )
                    .child(
                        RegisterNode::new("gain", 4, Access::ReadWrite)
                            .fixed_point(FormatRef::integer(32)),
                    ),
            );
        LayoutDescriptor::builder("t", AbiVersion::new(1), 0x44)
            .child(RegisterNode::new("id", 0, Access::ReadOnly))
            .child(RepeatNode::new("ch", 0x4, 2, 0x20, ch))
            .child(RepeatNode::new(
                "sp",
                0x3C,
                2,
                4,
                BlockNode::template().child(RegisterNode::new("val", 0, Access::ReadWrite)),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn parse_segments() {
        let segs = PathSegment::parse_path("ch[11].acc.gain").unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].index, Some(11));
        assert_eq!(segs[0].to_string(), "ch[11]");
        for bad in ["", "a..b", "ch[", "ch[x]", "ch[1]x", "a]", "ch[+3]", "ch[]", "ch[ 3]"] {
            assert!(
                matches!(PathSegment::parse_path(bad), Err(PathError::Syntax { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn resolves_nested_register_and_field() {
        let layout = layout();
        let gain = layout.resolve("ch[1].acc.gain").unwrap();
        assert_eq!(gain.address, 0x4 + 0x20 + 0x14);
        assert!(gain.is_whole_register());

        let freeze = layout.resolve("ch[0].acc.ctl.freeze").unwrap();
        assert_eq!(freeze.address, 0x14);
        assert_eq!((freeze.mask, freeze.shift), (0x2, 1));
        assert_eq!(freeze.semantic, FieldSemantic::Flag);
        assert_eq!(freeze.clone().with_base(0x1000).address, 0x1014);
    }

    #[test]
    fn memory_elements_by_index_or_name() {
        let layout = layout();
        let a = layout.resolve("ch[1].coeff[3]").unwrap();
        let b = layout.resolve("ch[1].coeff[3].data").unwrap();
        assert_eq!(a.address, 0x4 + 0x20 + 0xC);
        assert_eq!(a.address, b.address);
    }

    #[test]
    fn resolution_errors() {
        let layout = layout();
        assert!(matches!(
            layout.resolve("ch[2].acc.gain"),
            Err(PathError::IndexOutOfRange { index: 2, count: 2, .. })
        ));
        assert!(matches!(layout.resolve("ch[0].nope"), Err(PathError::NotFound { .. })));
        assert!(matches!(layout.resolve("id[0]"), Err(PathError::TypeMismatch { .. })));
        assert!(matches!(layout.resolve("ch.acc"), Err(PathError::TypeMismatch { .. })));
        assert!(matches!(layout.resolve("ch[0].acc"), Err(PathError::TypeMismatch { .. })));
        assert!(matches!(
            layout.resolve("ch[0].acc.ctl.clear.more"),
            Err(PathError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn regions() {
        let layout = layout();
        let coeff = layout.resolve_region("ch[1].coeff").unwrap();
        assert_eq!((coeff.address, coeff.stride, coeff.count), (0x24, 4, 4));
        assert_eq!(coeff.element_address(2), 0x2C);

        let sp = layout.resolve_region("sp").unwrap();
        assert_eq!((sp.address, sp.stride, sp.count), (0x3C, 4, 2));

        assert!(matches!(layout.resolve_region("ch"), Err(PathError::TypeMismatch { .. })));
        assert!(matches!(layout.resolve_region("id"), Err(PathError::TypeMismatch { .. })));
    }

    #[test]
    fn offsets_of_containers() {
        let layout = layout();
        assert_eq!(layout.offset_of("ch[1].acc").unwrap(), 0x34);
        assert_eq!(layout.offset_of("ch").unwrap(), 0x4);
        assert_eq!(layout.offset_of("ch[0].acc.ctl.clear").unwrap(), 0x14);
    }
}
