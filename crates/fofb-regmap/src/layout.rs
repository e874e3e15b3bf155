//! Layout descriptors: the validated root of a peripheral register map.
//!
//! A [`LayoutDescriptor`] is built once from a declarative description and
//! never mutated. Construction is a pure validation pass:
//!
//! - sibling nodes must not overlap, and fields of one register must not
//!   share bits ([`LayoutError::Overlap`])
//! - children must fit their parent's declared extent, fields their register,
//!   repeat elements their stride ([`LayoutError::OutOfBounds`])
//! - the root extent, rounded to the bus word, must equal the declared total
//!   size ([`LayoutError::SizeMismatch`])
//!
//! Children are sorted by offset during validation; gaps are padding.

use std::collections::HashSet;
use std::str::FromStr;

use crate::error::{LayoutError, PathError};
use crate::field::{Access, FieldDescriptor, FieldSemantic, FormatRef};
use crate::node::{BlockNode, MemoryRegion, Node, RegisterNode, RepeatNode};
use crate::WORD_BYTES;

/// ABI revision of a peripheral's register layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbiVersion(u32);

impl AbiVersion {
    /// Wrap a revision number
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Revision number
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for AbiVersion {
    type Err = std::num::ParseIntError;

    /// Accepts `2`, `v2` and `V2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(['v', 'V']).unwrap_or(s);
        digits.parse().map(Self)
    }
}

/// How a discovered fixed-point format is read from the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatEncoding {
    /// Two fields hold `int_width` and `frac_width`
    IntFrac {
        /// Path of the `int_width` field
        int_width: String,
        /// Path of the `frac_width` field
        frac_width: String,
    },
    /// One register holds the fixed-point position (the fractional bits) of
    /// a `word_bits`-wide value; `int_width = word_bits - position`
    FracPosition {
        /// Path of the position register
        path: String,
        /// Width of the values using the format
        word_bits: u32,
    },
}

/// Named fixed-point format a peripheral describes through read-only registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSource {
    name: String,
    encoding: FormatEncoding,
}

impl FormatSource {
    /// Format described by separate `int_width`/`frac_width` fields
    pub fn int_frac(
        name: impl Into<String>,
        int_width: impl Into<String>,
        frac_width: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            encoding: FormatEncoding::IntFrac {
                int_width: int_width.into(),
                frac_width: frac_width.into(),
            },
        }
    }

    /// Format described by a fixed-point position register
    pub fn frac_position(name: impl Into<String>, path: impl Into<String>, word_bits: u32) -> Self {
        Self {
            name: name.into(),
            encoding: FormatEncoding::FracPosition {
                path: path.into(),
                word_bits,
            },
        }
    }

    /// Format name, referenced by [`FormatRef::Discovered`]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the format is read from
    pub const fn encoding(&self) -> &FormatEncoding {
        &self.encoding
    }

    fn paths(&self) -> Vec<&str> {
        match &self.encoding {
            FormatEncoding::IntFrac {
                int_width,
                frac_width,
            } => vec![int_width, frac_width],
            FormatEncoding::FracPosition { path, .. } => vec![path],
        }
    }
}

/// Validated, immutable register layout of one peripheral ABI revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDescriptor {
    kind: String,
    version: AbiVersion,
    total_size: u64,
    root: BlockNode,
    formats: Vec<FormatSource>,
    external_formats: Vec<String>,
}

/// Declarative description of a layout, checked by [`LayoutBuilder::build`]
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    kind: String,
    version: AbiVersion,
    total_size: u64,
    root: BlockNode,
    formats: Vec<FormatSource>,
    external_formats: Vec<String>,
}

impl LayoutBuilder {
    /// Add a top-level node
    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.root = self.root.child(node);
        self
    }

    /// Declare a fixed-point format source
    #[must_use]
    pub fn format(mut self, source: FormatSource) -> Self {
        self.formats.push(source);
        self
    }

    /// Name a format that has no source register and must come from the
    /// bind configuration
    #[must_use]
    pub fn external_format(mut self, name: impl Into<String>) -> Self {
        self.external_formats.push(name.into());
        self
    }

    /// Validate the description
    ///
    /// # Errors
    ///
    /// Returns the first [`LayoutError`] found.
    pub fn build(self) -> Result<LayoutDescriptor, LayoutError> {
        let label = format!("{}@{}", self.kind, self.version);
        let mut root = self.root;
        validate_block(&mut root, "")?;

        let computed = root
            .extent()
            .checked_next_multiple_of(WORD_BYTES)
            .ok_or_else(|| LayoutError::malformed(&label, "extends past the end of the address space"))?;
        if computed != self.total_size {
            return Err(LayoutError::SizeMismatch {
                layout: label,
                declared: self.total_size,
                computed,
            });
        }

        let layout = LayoutDescriptor {
            kind: self.kind,
            version: self.version,
            total_size: self.total_size,
            root,
            formats: self.formats,
            external_formats: self.external_formats,
        };
        layout.validate_formats()?;
        Ok(layout)
    }
}

impl LayoutDescriptor {
    /// Start describing a layout of `total_size` bytes
    pub fn builder(kind: impl Into<String>, version: AbiVersion, total_size: u64) -> LayoutBuilder {
        LayoutBuilder {
            kind: kind.into(),
            version,
            total_size,
            root: BlockNode::new("", 0),
            formats: Vec::new(),
            external_formats: Vec::new(),
        }
    }

    /// Peripheral kind (`fofb_processing`, ...)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// ABI revision
    pub const fn version(&self) -> AbiVersion {
        self.version
    }

    /// Declared size of the register window
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Root block
    pub const fn root(&self) -> &BlockNode {
        &self.root
    }

    /// Fixed-point format sources
    pub fn formats(&self) -> &[FormatSource] {
        &self.formats
    }

    /// Look up a format source by name
    pub fn format_source(&self, name: &str) -> Option<&FormatSource> {
        self.formats.iter().find(|f| f.name == name)
    }

    /// Formats named by the layout that are only ever configured
    pub fn external_formats(&self) -> &[String] {
        &self.external_formats
    }

    /// Whether `name` is a format of this layout, read or configured
    pub fn declares_format(&self, name: &str) -> bool {
        self.format_source(name).is_some() || self.external_formats.iter().any(|f| f == name)
    }

    /// Check header constants against the layout.
    ///
    /// Each `(path, offset)` pair is resolved (containers and arrays are
    /// allowed) and compared with the computed offset.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::OffsetMismatch`] for the first disagreeing
    /// constant, or [`LayoutError::Malformed`] if a path does not resolve.
    pub fn check_offsets(&self, constants: &[(&str, u64)]) -> Result<(), LayoutError> {
        for &(path, declared) in constants {
            let computed = self.offset_of(path)?;
            if computed != declared {
                return Err(LayoutError::OffsetMismatch {
                    path: path.to_string(),
                    declared,
                    computed,
                });
            }
        }
        Ok(())
    }

    /// Flattened register map, one entry per register template
    pub fn entries(&self) -> Vec<MapEntry> {
        let mut out = Vec::new();
        collect_entries(&self.root, "", 0, &[], &mut out);
        out
    }

    fn validate_formats(&self) -> Result<(), LayoutError> {
        let mut names: HashSet<&str> = self.external_formats.iter().map(String::as_str).collect();
        if names.len() != self.external_formats.len() {
            return Err(LayoutError::malformed(&self.kind, "duplicate external format name"));
        }
        for source in &self.formats {
            if !names.insert(source.name.as_str()) {
                return Err(LayoutError::malformed(
                    &source.name,
                    "duplicate fixed-point format name",
                ));
            }
            for path in source.paths() {
                let field = self.resolve(path)?;
                if !field.access.is_readable() {
                    return Err(LayoutError::malformed(
                        path,
                        "fixed-point format register is not readable",
                    ));
                }
            }
        }

        let mut missing = None;
        for_each_register(&self.root, "", &mut |path, register| {
            let semantics = std::iter::once((path.to_string(), &register.semantic)).chain(
                register
                    .fields
                    .iter()
                    .map(|f| (format!("{path}.{}", f.name()), f.semantic())),
            );
            for (path, semantic) in semantics {
                if let FieldSemantic::SignedFixedPoint(FormatRef::Discovered(name)) = semantic {
                    if missing.is_none() && !self.declares_format(name) {
                        missing = Some(LayoutError::malformed(
                            path,
                            format!("references undeclared fixed-point format `{name}`"),
                        ));
                    }
                }
            }
        });
        missing.map_or(Ok(()), Err)
    }
}

/// One register template of a flattened map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// Path with array sizes, e.g. `ch[12].acc.gain`
    pub path: String,
    /// Offset of the first instance
    pub offset: u64,
    /// Register width in bytes
    pub width_bytes: u64,
    /// Access mode
    pub access: Access,
    /// Array dimensions as `(count, stride)`, outermost first
    pub dims: Vec<(usize, u64)>,
    /// Bit-fields
    pub fields: Vec<FieldDescriptor>,
}

impl MapEntry {
    /// Number of register instances this entry stands for
    pub fn instances(&self) -> usize {
        self.dims.iter().map(|&(count, _)| count).product()
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn validate_block(block: &mut BlockNode, path: &str) -> Result<(), LayoutError> {
    block.children.sort_by_key(Node::offset);

    let mut names = HashSet::new();
    for child in &block.children {
        if child.checked_end().is_none() {
            return Err(LayoutError::malformed(
                join(path, child.name()),
                "extends past the end of the address space",
            ));
        }
        if child.name().is_empty() {
            return Err(LayoutError::malformed(path, "child without a name"));
        }
        if !names.insert(child.name()) {
            return Err(LayoutError::malformed(
                join(path, child.name()),
                "duplicate name",
            ));
        }
    }

    for pair in block.children.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.offset() < a.offset() + a.extent() {
            return Err(LayoutError::Overlap {
                first: join(path, a.name()),
                second: join(path, b.name()),
                offset: b.offset(),
            });
        }
    }

    for child in &mut block.children {
        let child_path = join(path, child.name());
        validate_node(child, &child_path)?;
    }

    if let Some(size) = block.size {
        for child in &block.children {
            let end = child.offset() + child.extent();
            if end > size {
                return Err(LayoutError::OutOfBounds {
                    path: join(path, child.name()),
                    end,
                    extent: size,
                });
            }
        }
    }
    Ok(())
}

fn validate_node(node: &mut Node, path: &str) -> Result<(), LayoutError> {
    match node {
        Node::Register(register) => validate_register(register, path),
        Node::Block(block) => validate_block(block, path),
        Node::Repeat(repeat) => validate_repeat(repeat, path),
        Node::Memory(memory) => validate_memory(memory, path),
    }
}

fn validate_repeat(repeat: &mut RepeatNode, path: &str) -> Result<(), LayoutError> {
    if repeat.count == 0 {
        return Err(LayoutError::malformed(path, "repeat count is zero"));
    }
    if repeat.stride == 0 {
        return Err(LayoutError::malformed(path, "repeat stride is zero"));
    }
    if repeat.element.offset != 0 {
        return Err(LayoutError::malformed(path, "repeat element must sit at offset 0"));
    }
    for value in [repeat.offset, repeat.stride] {
        if value % WORD_BYTES != 0 {
            return Err(LayoutError::Misaligned {
                path: path.to_string(),
                offset: value,
                alignment: WORD_BYTES,
            });
        }
    }

    let element_path = format!("{path}[]");
    validate_block(&mut repeat.element, &element_path)?;

    let element_extent = repeat.element.extent();
    if element_extent > repeat.stride {
        return Err(LayoutError::OutOfBounds {
            path: element_path,
            end: element_extent,
            extent: repeat.stride,
        });
    }
    Ok(())
}

fn validate_memory(memory: &mut MemoryRegion, path: &str) -> Result<(), LayoutError> {
    if memory.count == 0 {
        return Err(LayoutError::malformed(path, "memory region is empty"));
    }
    if memory.element.offset != 0 {
        return Err(LayoutError::malformed(path, "memory element must sit at offset 0"));
    }
    if memory.offset % memory.stride() != 0 {
        return Err(LayoutError::Misaligned {
            path: path.to_string(),
            offset: memory.offset,
            alignment: memory.stride(),
        });
    }
    let element_path = format!("{path}[].{}", memory.element.name);
    validate_register(&memory.element, &element_path)
}

fn validate_register(register: &RegisterNode, path: &str) -> Result<(), LayoutError> {
    let width = register.width;
    if register.offset % width.bytes() != 0 {
        return Err(LayoutError::Misaligned {
            path: path.to_string(),
            offset: register.offset,
            alignment: width.bytes(),
        });
    }
    validate_semantic(&register.semantic, width.bits(), width.mask(), path)?;

    let mut names = HashSet::new();
    let mut used = 0u32;
    let mut owners: Vec<&FieldDescriptor> = Vec::new();
    for field in &register.fields {
        let field_path = format!("{path}.{}", field.name());
        if !names.insert(field.name()) {
            return Err(LayoutError::malformed(field_path, "duplicate field name"));
        }
        if !field.is_contiguous() {
            return Err(LayoutError::malformed(
                field_path,
                format!("mask {:#x} is empty or not contiguous", field.mask()),
            ));
        }
        if field.mask() & !width.mask() != 0 {
            return Err(LayoutError::OutOfBounds {
                path: field_path,
                end: u64::from(field.shift() + field.width_bits()),
                extent: u64::from(width.bits()),
            });
        }
        if used & field.mask() != 0 {
            let first = owners
                .iter()
                .find(|f| f.mask() & field.mask() != 0)
                .map_or_else(String::new, |f| format!("{path}.{}", f.name()));
            return Err(LayoutError::Overlap {
                first,
                second: field_path,
                offset: u64::from(field.shift()),
            });
        }
        if !field.effective_access(register.access).within(register.access) {
            return Err(LayoutError::malformed(
                field_path,
                format!("field access is wider than register access `{}`", register.access),
            ));
        }
        validate_semantic(field.semantic(), field.width_bits(), field.max_value(), &field_path)?;
        used |= field.mask();
        owners.push(field);
    }
    Ok(())
}

fn validate_semantic(
    semantic: &FieldSemantic,
    bits: u32,
    max_value: u32,
    path: &str,
) -> Result<(), LayoutError> {
    match semantic {
        FieldSemantic::RawUint | FieldSemantic::SignedFixedPoint(FormatRef::Discovered(_)) => Ok(()),
        FieldSemantic::Flag if bits == 1 => Ok(()),
        FieldSemantic::Flag => Err(LayoutError::malformed(path, "flag must be a single bit")),
        FieldSemantic::SignedFixedPoint(FormatRef::Static(format)) => format
            .validate(bits)
            .map_err(|e| LayoutError::malformed(path, e.to_string())),
        FieldSemantic::Enum(variants) => {
            if variants.is_empty() {
                return Err(LayoutError::malformed(path, "enum without variants"));
            }
            let mut names = HashSet::new();
            for variant in variants {
                if variant.value > max_value {
                    return Err(LayoutError::malformed(
                        path,
                        format!("variant `{}` = {} does not fit the field", variant.name, variant.value),
                    ));
                }
                if !names.insert(variant.name.as_str()) {
                    return Err(LayoutError::malformed(
                        path,
                        format!("duplicate variant `{}`", variant.name),
                    ));
                }
            }
            Ok(())
        }
    }
}

fn for_each_register<'a>(block: &'a BlockNode, path: &str, f: &mut impl FnMut(&str, &'a RegisterNode)) {
    for child in &block.children {
        let child_path = join(path, child.name());
        match child {
            Node::Register(register) => f(&child_path, register),
            Node::Block(inner) => for_each_register(inner, &child_path, f),
            Node::Repeat(repeat) => for_each_register(&repeat.element, &format!("{child_path}[]"), f),
            Node::Memory(memory) => {
                f(&format!("{child_path}[].{}", memory.element.name), &memory.element);
            }
        }
    }
}

fn collect_entries(
    block: &BlockNode,
    path: &str,
    base: u64,
    dims: &[(usize, u64)],
    out: &mut Vec<MapEntry>,
) {
    for child in &block.children {
        let child_path = join(path, child.name());
        let offset = base + child.offset();
        match child {
            Node::Register(register) => out.push(register_entry(register, child_path, offset, dims.to_vec())),
            Node::Block(inner) => collect_entries(inner, &child_path, offset, dims, out),
            Node::Repeat(repeat) => {
                let mut inner_dims = dims.to_vec();
                inner_dims.push((repeat.count, repeat.stride));
                let array_path = format!("{child_path}[{}]", repeat.count);
                collect_entries(&repeat.element, &array_path, offset, &inner_dims, out);
            }
            Node::Memory(memory) => {
                let mut inner_dims = dims.to_vec();
                inner_dims.push((memory.count, memory.stride()));
                let element_path = format!("{child_path}[{}].{}", memory.count, memory.element.name);
                out.push(register_entry(&memory.element, element_path, offset, inner_dims));
            }
        }
    }
}

fn register_entry(register: &RegisterNode, path: String, offset: u64, dims: Vec<(usize, u64)>) -> MapEntry {
    MapEntry {
        path,
        offset,
        width_bytes: register.width.bytes(),
        access: register.access,
        dims,
        fields: register.fields.clone(),
    }
}

/// Map a path error into the layout-error domain for constant checks
impl From<PathError> for LayoutError {
    fn from(e: PathError) -> Self {
        let path = match &e {
            PathError::NotFound { path, .. }
            | PathError::IndexOutOfRange { path, .. }
            | PathError::TypeMismatch { path, .. }
            | PathError::Syntax { path, .. } => path.clone(),
        };
        Self::malformed(path, e.to_string())
    }
}
