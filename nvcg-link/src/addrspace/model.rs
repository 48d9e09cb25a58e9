//! Runtime address space model
//!
//! The generic space is a flat 64-bit window. Every specific space occupies
//! one disjoint `[base, base + size)` segment of it, so a generic pointer can
//! be tested for membership and converted to a space-relative offset.

use nvcg_common::{AddressSpace, CodegenError, SourceLocation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A pointer in the generic space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericPtr(u64);

impl GenericPtr {
    pub fn new(addr: u64) -> Self {
        GenericPtr(addr)
    }

    pub fn addr(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenericPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A pointer tagged with a specific space, holding its offset in that
/// space's segment. Only `SegmentMap` hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecificPtr {
    space: AddressSpace,
    offset: u64,
}

impl SpecificPtr {
    pub fn space(self) -> AddressSpace {
        self.space
    }

    pub fn offset(self) -> u64 {
        self.offset
    }
}

impl fmt::Display for SpecificPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x}", self.space, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub base: u64,
    pub size: u64,
}

impl Segment {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// One past the last address, `None` if the segment wraps
    pub fn end(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }

    fn overlaps(&self, other: &Segment) -> bool {
        self.base < other.base.saturating_add(other.size) && other.base < self.base.saturating_add(self.size)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("address {addr} is outside the {target} segment")]
    OutOfSegment { addr: GenericPtr, target: AddressSpace },

    #[error("offset {offset:#x} is outside the {space} segment")]
    OffsetOutOfRange { space: AddressSpace, offset: u64 },

    #[error("the generic space is not a conversion target")]
    GenericTarget,
}

impl ConversionError {
    /// Report a failed conversion as an invalid cast
    pub fn into_codegen_error(self, location: SourceLocation, function: &str) -> CodegenError {
        let to = match self {
            ConversionError::OutOfSegment { target, .. } => target,
            ConversionError::OffsetOutOfRange { space, .. } => space,
            ConversionError::GenericTarget => AddressSpace::Generic,
        };
        CodegenError::invalid_cast(location, function, AddressSpace::Generic, to)
    }
}

/// Placement of every specific space in the generic window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMap {
    pub global: Segment,
    pub shared: Segment,
    pub constant: Segment,
    pub local: Segment,
}

impl Default for SegmentMap {
    fn default() -> Self {
        Self {
            // the first page stays unmapped so null is in no segment
            global: Segment::new(0x1000, 1 << 40),
            shared: Segment::new(1 << 44, 1 << 32),
            constant: Segment::new(2 << 44, 1 << 32),
            local: Segment::new(3 << 44, 1 << 32),
        }
    }
}

impl SegmentMap {
    /// Check that every segment is non-empty, does not wrap, and that no two
    /// segments overlap
    pub fn validate(&self) -> Result<(), String> {
        let segments: Vec<(AddressSpace, Segment)> = AddressSpace::SPECIFIC
            .iter()
            .filter_map(|&space| self.segment(space).map(|seg| (space, seg)))
            .collect();

        for (space, seg) in &segments {
            if seg.size == 0 {
                return Err(format!("{space} segment is empty"));
            }
            if seg.end().is_none() {
                return Err(format!("{space} segment wraps around the address space"));
            }
            if seg.contains(0) {
                return Err(format!("{space} segment contains the null address"));
            }
        }
        for (i, (a_space, a)) in segments.iter().enumerate() {
            for (b_space, b) in &segments[i + 1..] {
                if a.overlaps(b) {
                    return Err(format!("{a_space} and {b_space} segments overlap"));
                }
            }
        }
        Ok(())
    }

    /// Segment of a specific space; the generic space has none
    pub fn segment(&self, space: AddressSpace) -> Option<Segment> {
        match space {
            AddressSpace::Generic => None,
            AddressSpace::Global => Some(self.global),
            AddressSpace::Shared => Some(self.shared),
            AddressSpace::Constant => Some(self.constant),
            AddressSpace::Local => Some(self.local),
        }
    }

    /// Build a specific pointer from a space-relative offset
    pub fn specific(&self, space: AddressSpace, offset: u64) -> Result<SpecificPtr, ConversionError> {
        let segment = self.segment(space).ok_or(ConversionError::GenericTarget)?;
        if offset >= segment.size {
            return Err(ConversionError::OffsetOutOfRange { space, offset });
        }
        Ok(SpecificPtr { space, offset })
    }

    /// Runtime membership test. Every pointer is in the generic space.
    pub fn is_in_address_space(&self, ptr: GenericPtr, space: AddressSpace) -> bool {
        match self.segment(space) {
            Some(segment) => segment.contains(ptr.addr()),
            None => true,
        }
    }

    /// The specific space whose segment holds `ptr`, if any
    pub fn space_of(&self, ptr: GenericPtr) -> Option<AddressSpace> {
        AddressSpace::SPECIFIC
            .into_iter()
            .find(|&space| self.is_in_address_space(ptr, space))
    }

    pub fn convert_generic_to_specific(
        &self,
        ptr: GenericPtr,
        target: AddressSpace,
    ) -> Result<SpecificPtr, ConversionError> {
        let segment = self.segment(target).ok_or(ConversionError::GenericTarget)?;
        if !segment.contains(ptr.addr()) {
            return Err(ConversionError::OutOfSegment { addr: ptr, target });
        }
        Ok(SpecificPtr {
            space: target,
            offset: ptr.addr() - segment.base,
        })
    }

    pub fn convert_specific_to_generic(&self, ptr: SpecificPtr) -> GenericPtr {
        // a SpecificPtr only exists for an in-range offset of a specific space
        let base = self.segment(ptr.space).map_or(0, |seg| seg.base);
        GenericPtr(base + ptr.offset)
    }
}
