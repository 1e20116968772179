//! Per-object array header decoding.
//!
//! A single heap holds both physical header shapes at once, so the shape is
//! decided per object: the contiguous header's size field doubles as the
//! discriminator. A zero there means the object carries the larger
//! discontiguous header, whose real element count sits one field later.
//!
//! Field order, from the object base:
//!
//! ```text
//! contiguous:     class | size u32 (nonzero)      | [data addr u64]
//! discontiguous:  class | 0 u32      | size u32   | [data addr u64]
//! ```
//!
//! The optional data-address slot occupies the last 8 bytes of the header
//! on 64-bit images that cache an out-of-line data pointer.

use crate::{ArrayletConfig, MemorySource, ModelError, Result};

/// Element counts are signed 31-bit in the class file format; a set sign
/// bit can only come from a torn or corrupt read.
const COUNT_SIGN_BIT: u32 = 1 << 31;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Primitive,
    Reference,
}

/// Static shape of an array class: how wide one element is and whether it
/// holds references. Decoded from class metadata by the caller (or served
/// from the `ShapeCache`), never stored in the object itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ElementShape {
    /// log2 of the element byte size, 0 to 3.
    pub shift: u32,
    pub kind: ElementKind,
}

impl ElementShape {
    pub fn primitive(shift: u32) -> Result<Self> {
        if shift > 3 {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "element shift out of range",
            });
        }
        Ok(Self {
            shift,
            kind: ElementKind::Primitive,
        })
    }

    /// Reference elements are as wide as one heap reference.
    pub fn reference(config: &ArrayletConfig) -> Self {
        Self {
            shift: if config.reference_size() == 4 { 2 } else { 3 },
            kind: ElementKind::Reference,
        }
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        1 << self.shift
    }

    /// 8-byte primitive slots (long/double shaped elements).
    #[inline]
    pub fn is_double_width_primitive(&self) -> bool {
        self.kind == ElementKind::Primitive && self.shift == 3
    }
}

/// Decoded array object header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArrayHeader {
    pub class_ref: u64,
    pub element_count: u32,
    /// The raw pre-expansion size field was nonzero.
    pub contiguous: bool,
    /// Cached out-of-line data pointer, when the image carries the slot.
    pub data_addr: Option<u64>,
}

impl ArrayHeader {
    pub fn read(
        reader: &impl MemorySource,
        address: u64,
        config: &ArrayletConfig,
    ) -> Result<Self> {
        let class_ref = reader.read_ref(address, config)?;
        let size_offset = config.reference_size() as u64;

        let raw_size = reader.read_u32(address + size_offset)?;
        let (contiguous, element_count, header_size) = if raw_size != 0 {
            (true, raw_size, config.contiguous_header_size)
        } else {
            let count = reader.read_u32(address + size_offset + 4)?;
            (false, count, config.discontiguous_header_size)
        };

        if element_count & COUNT_SIGN_BIT != 0 {
            return Err(ModelError::CorruptData {
                address,
                detail: "array element count has its sign bit set",
            });
        }

        let data_addr = if config.data_addr_present {
            Some(reader.read_u64(address + header_size as u64 - 8)?)
        } else {
            None
        };

        Ok(Self {
            class_ref,
            element_count,
            contiguous,
            data_addr,
        })
    }
}
