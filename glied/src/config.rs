//! Process-wide layout configuration, captured once at attach time.
//!
//! Nothing in here mutates after `ArrayletConfig::new`. Every engine call
//! takes the configuration by reference; there are no globals and no lazy
//! statics, so two attachments with different policies can coexist.

use std::ops::Range;

use bitflags::bitflags;

use crate::{ModelError, Result};

/// Sentinel: arraylets are disabled, every array is one piece.
pub const UNBOUNDED_LEAF_SIZE: usize = usize::MAX;
/// Sentinel: no ceiling on contiguous/hybrid spine sizes.
pub const UNBOUNDED_SPINE_SIZE: usize = usize::MAX;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct HeapFlags: u8 {
        /// Large array data is aliased into a second, contiguous virtual range.
        const DOUBLE_MAPPING = 1 << 0;
        /// Large object data lives in a virtually contiguous off-heap area.
        const VIRTUAL_LARGE_OBJECT_HEAP = 1 << 1;
        const GENERATIONAL = 1 << 2;
        const REGIONED = 1 << 3;
    }
}

impl Default for HeapFlags {
    fn default() -> Self {
        HeapFlags::empty()
    }
}

/// Historical revisions of the layout algorithm. The tag is recorded in the
/// snapshot; objects written by an older collector build must be read with
/// the matching revision, not the latest one.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AlgorithmVersion {
    /// Always attempts the hybrid layout on a nonzero tail and counts one
    /// extra leaf slot so a one-past-the-end address stays computable.
    V1 = 1,
    /// Checks double-mapping before the hybrid attempt and drops the extra
    /// leaf slot.
    V2 = 2,
}

impl AlgorithmVersion {
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(AlgorithmVersion::V1),
            2 => Ok(AlgorithmVersion::V2),
            _ => Err(ModelError::UnsupportedConfiguration {
                detail: "unrecognized layout algorithm version tag",
            }),
        }
    }
}

/// Attach-time inputs. Every `None` falls back to the default of the
/// matching `ArrayletConfig` field.
#[derive(Debug)]
pub struct SnapshotConfigInfo {
    /// Power-of-two arraylet leaf size; `None` disables arraylets.
    pub leaf_size: Option<usize>,
    /// Byte ceiling for contiguous/hybrid spines; `None` means unbounded.
    pub largest_desirable_spine_size: Option<usize>,
    pub pointer_size: Option<usize>,
    pub compressed_refs: bool,
    pub compressed_shift: Option<u32>,
    pub is_64bit: Option<bool>,
    pub flags: HeapFlags,
    pub alignment_granule: Option<usize>,
    /// Recorded header sizes from the image; derived from the reference
    /// width when absent.
    pub contiguous_header_size: Option<usize>,
    pub discontiguous_header_size: Option<usize>,
    /// Whether array headers carry a cached out-of-line data address.
    pub data_addr_present: bool,
    pub heap_range: Option<Range<u64>>,
    /// Address window where arraylet leaves may live; defaults to the heap.
    pub arraylet_range: Option<Range<u64>>,
    pub version_tag: u32,
}

impl Default for SnapshotConfigInfo {
    fn default() -> Self {
        Self {
            leaf_size: None,
            largest_desirable_spine_size: None,
            pointer_size: None,
            compressed_refs: false,
            compressed_shift: None,
            is_64bit: None,
            flags: HeapFlags::empty(),
            alignment_granule: None,
            contiguous_header_size: None,
            discontiguous_header_size: None,
            data_addr_present: false,
            heap_range: None,
            arraylet_range: None,
            // a fresh attach assumes the current collector build
            version_tag: AlgorithmVersion::V2 as u32,
        }
    }
}

/// Immutable per-attachment layout constants.
///
/// Built once by `new`; the derived fields (`leaf_log_size`,
/// `leaf_size_mask`, header sizes) stay consistent with the inputs, so
/// treat a value of this type as read-only.
#[derive(Debug, Clone)]
pub struct ArrayletConfig {
    pub leaf_size: usize,
    pub leaf_log_size: u32,
    pub leaf_size_mask: usize,
    pub largest_desirable_spine_size: usize,
    pub pointer_size: usize,
    pub compressed_refs: bool,
    pub compressed_shift: u32,
    pub is_64bit: bool,
    pub flags: HeapFlags,
    pub alignment_granule: usize,
    pub contiguous_header_size: usize,
    pub discontiguous_header_size: usize,
    pub data_addr_present: bool,
    pub heap_range: Range<u64>,
    pub arraylet_range: Range<u64>,
    pub version: AlgorithmVersion,
}

impl ArrayletConfig {
    pub fn new(info: SnapshotConfigInfo) -> Result<Self> {
        let pointer_size = info.pointer_size.unwrap_or(8);
        if pointer_size != 4 && pointer_size != 8 {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "pointer size must be 4 or 8 bytes",
            });
        }
        let is_64bit = info.is_64bit.unwrap_or(pointer_size == 8);

        if info.compressed_refs && pointer_size != 8 {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "compressed references require 8-byte pointers",
            });
        }
        if info.compressed_shift.is_some() && !info.compressed_refs {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "compressed shift given for uncompressed references",
            });
        }

        let alignment_granule = info.alignment_granule.unwrap_or(8);
        if !alignment_granule.is_power_of_two() {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "alignment granule must be a power of two",
            });
        }

        let leaf_size = info.leaf_size.unwrap_or(UNBOUNDED_LEAF_SIZE);
        let (leaf_log_size, leaf_size_mask) = if leaf_size == UNBOUNDED_LEAF_SIZE {
            (0, 0)
        } else {
            if !leaf_size.is_power_of_two() || leaf_size < alignment_granule {
                return Err(ModelError::UnsupportedConfiguration {
                    detail: "arraylet leaf size must be an aligned power of two",
                });
            }
            (leaf_size.trailing_zeros(), leaf_size - 1)
        };

        let version = AlgorithmVersion::from_tag(info.version_tag)?;

        let aliased_data = info
            .flags
            .intersects(HeapFlags::DOUBLE_MAPPING | HeapFlags::VIRTUAL_LARGE_OBJECT_HEAP);
        if aliased_data && !info.data_addr_present {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "aliased array data requires the header data-address slot",
            });
        }
        if info.data_addr_present && !is_64bit {
            return Err(ModelError::UnsupportedConfiguration {
                detail: "the header data-address slot only exists on 64-bit images",
            });
        }

        let reference_size = if info.compressed_refs { 4 } else { pointer_size };
        let mut contiguous_header_size = round_up(reference_size + 4, reference_size);
        let mut discontiguous_header_size = round_up(reference_size + 8, reference_size);
        if info.data_addr_present {
            contiguous_header_size = round_up(contiguous_header_size, 8) + 8;
            discontiguous_header_size = round_up(discontiguous_header_size, 8) + 8;
        }
        if let Some(size) = info.contiguous_header_size {
            contiguous_header_size = size;
        }
        if let Some(size) = info.discontiguous_header_size {
            discontiguous_header_size = size;
        }

        let heap_range = info.heap_range.unwrap_or(0..u64::MAX);
        let arraylet_range = info.arraylet_range.unwrap_or(heap_range.clone());

        Ok(Self {
            leaf_size,
            leaf_log_size,
            leaf_size_mask,
            largest_desirable_spine_size: info
                .largest_desirable_spine_size
                .unwrap_or(UNBOUNDED_SPINE_SIZE),
            pointer_size,
            compressed_refs: info.compressed_refs,
            compressed_shift: info.compressed_shift.unwrap_or(0),
            is_64bit,
            flags: info.flags,
            alignment_granule,
            contiguous_header_size,
            discontiguous_header_size,
            data_addr_present: info.data_addr_present,
            heap_range,
            arraylet_range,
            version,
        })
    }

    /// Width of one heap reference (class slots, arrayoid slots).
    #[inline]
    pub fn reference_size(&self) -> usize {
        if self.compressed_refs { 4 } else { self.pointer_size }
    }

    #[inline]
    pub fn arraylets_disabled(&self) -> bool {
        self.leaf_size == UNBOUNDED_LEAF_SIZE
    }

    /// All array data is kept virtually contiguous out-of-line, no matter
    /// how the object itself is laid out.
    #[inline]
    pub fn data_aliasing_enabled(&self) -> bool {
        self.flags
            .intersects(HeapFlags::DOUBLE_MAPPING | HeapFlags::VIRTUAL_LARGE_OBJECT_HEAP)
    }

    /// True when this object's data lives outside the spine even though the
    /// layout is inline-contiguous.
    #[inline]
    pub fn data_out_of_line(&self, data_size: usize) -> bool {
        self.data_aliasing_enabled() && !self.arraylets_disabled() && data_size >= self.leaf_size
    }
}

#[inline]
pub(crate) fn round_up(value: usize, granule: usize) -> usize {
    debug_assert!(granule.is_power_of_two());
    value.saturating_add(granule - 1) & !(granule - 1)
}
