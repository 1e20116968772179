//! The engine facade: one value per attachment, all queries hang off it.
//!
//! The algorithm revision recorded in the snapshot is resolved to a
//! strategy object exactly once, here in `ArrayModel::new`. Per-object
//! queries go through that object and never look at the version tag
//! again, and a model is never reused across attachments with different
//! configurations.

use std::fmt;

use log::{debug, warn};

use crate::{
    AlgorithmVersion, ArrayGeometry, ArrayHeader, ArrayLayout, ArrayletConfig, ElementShape,
    MemorySource, ModelError, Result, addressing,
    geometry::{
        header_size, number_of_arraylets_v1, number_of_arraylets_v2, should_align_data_section,
        spine_size, spine_size_without_header,
    },
    layout::{decide_layout_v1, decide_layout_v2},
    round_up, validator,
};

/// One historical revision of the layout contract.
trait VariantOps: fmt::Debug + Sync {
    fn decide_layout(
        &self,
        config: &ArrayletConfig,
        shape: ElementShape,
        data_size: usize,
    ) -> ArrayLayout;
    fn number_of_arraylets(&self, config: &ArrayletConfig, data_size: usize) -> usize;
}

#[derive(Debug)]
struct RevisionV1;

#[derive(Debug)]
struct RevisionV2;

impl VariantOps for RevisionV1 {
    fn decide_layout(
        &self,
        config: &ArrayletConfig,
        shape: ElementShape,
        data_size: usize,
    ) -> ArrayLayout {
        decide_layout_v1(config, shape, data_size)
    }

    fn number_of_arraylets(&self, config: &ArrayletConfig, data_size: usize) -> usize {
        number_of_arraylets_v1(config, data_size)
    }
}

impl VariantOps for RevisionV2 {
    fn decide_layout(
        &self,
        config: &ArrayletConfig,
        shape: ElementShape,
        data_size: usize,
    ) -> ArrayLayout {
        decide_layout_v2(config, shape, data_size)
    }

    fn number_of_arraylets(&self, config: &ArrayletConfig, data_size: usize) -> usize {
        number_of_arraylets_v2(config, data_size)
    }
}

static REVISION_V1: RevisionV1 = RevisionV1;
static REVISION_V2: RevisionV2 = RevisionV2;

fn resolve_ops(version: AlgorithmVersion) -> &'static dyn VariantOps {
    match version {
        AlgorithmVersion::V1 => &REVISION_V1,
        AlgorithmVersion::V2 => &REVISION_V2,
    }
}

/// Stateless layout engine for one attached snapshot.
#[derive(Debug)]
pub struct ArrayModel {
    config: ArrayletConfig,
    ops: &'static dyn VariantOps,
}

impl ArrayModel {
    pub fn new(config: ArrayletConfig) -> Self {
        debug!(
            "array model attached: revision {:?}, leaf size {:#x}",
            config.version, config.leaf_size
        );
        let ops = resolve_ops(config.version);
        Self { config, ops }
    }

    #[inline]
    pub fn config(&self) -> &ArrayletConfig {
        &self.config
    }

    /// Which physical layout an array with this much data gets.
    pub fn decide_layout(&self, shape: ElementShape, data_size: usize) -> ArrayLayout {
        self.ops.decide_layout(&self.config, shape, data_size)
    }

    pub fn number_of_arraylets(&self, data_size: usize) -> usize {
        self.ops.number_of_arraylets(&self.config, data_size)
    }

    pub fn header_size(&self, layout: ArrayLayout) -> usize {
        header_size(&self.config, layout)
    }

    /// Read the object at `address` and derive its full geometry.
    ///
    /// The physical header shape decides inline-contiguous directly; for
    /// the wider header the layout policy picks between hybrid and
    /// discontiguous. A wide header on an array the policy would keep
    /// inline cannot come from a well-behaved allocator and reads as
    /// corrupt data.
    pub fn geometry(
        &self,
        reader: &impl MemorySource,
        address: u64,
        shape: ElementShape,
    ) -> Result<ArrayGeometry> {
        let header = ArrayHeader::read(reader, address, &self.config)?;
        let raw_bytes = (header.element_count as usize) << shape.shift;
        let data_size = round_up(raw_bytes, self.config.pointer_size);

        let layout = if header.contiguous {
            ArrayLayout::InlineContiguous
        } else {
            match self.ops.decide_layout(&self.config, shape, data_size) {
                ArrayLayout::InlineContiguous => {
                    warn!(
                        "array at {address:#x}: wide header on {data_size} inline-size bytes"
                    );
                    return Err(ModelError::CorruptData {
                        address,
                        detail: "discontiguous header on an inline-sized array",
                    });
                }
                ArrayLayout::Illegal => {
                    return Err(ModelError::UnsupportedConfiguration {
                        detail: "array size is not representable under this configuration",
                    });
                }
                split => split,
            }
        };

        let number_of_arraylets = self.ops.number_of_arraylets(&self.config, data_size);
        Ok(ArrayGeometry {
            header_address: address,
            layout,
            shape,
            element_count: header.element_count,
            data_size,
            number_of_arraylets,
            header_size: header_size(&self.config, layout),
            spine_size: spine_size(&self.config, layout, shape, number_of_arraylets, data_size),
            align_data: should_align_data_section(&self.config, shape),
            data_addr: header.data_addr,
        })
    }

    pub fn spine_size_without_header(&self, geometry: &ArrayGeometry) -> usize {
        spine_size_without_header(
            &self.config,
            geometry.layout,
            geometry.shape,
            geometry.number_of_arraylets,
            geometry.data_size,
        )
    }

    /// Address of element `index`. Bounds against the element count are
    /// the caller's business.
    pub fn element_address(
        &self,
        reader: &impl MemorySource,
        geometry: &ArrayGeometry,
        index: u32,
    ) -> Result<u64> {
        addressing::element_address(&self.config, reader, geometry, index)
    }

    /// Bytes held in leaves outside the spine. The spine's own embedded
    /// leaf, if any, is excluded; inline-contiguous arrays have none.
    pub fn external_arraylet_bytes(&self, geometry: &ArrayGeometry) -> usize {
        match geometry.layout {
            ArrayLayout::InlineContiguous | ArrayLayout::Illegal => 0,
            ArrayLayout::Hybrid | ArrayLayout::Discontiguous => {
                if geometry.data_size == 0 {
                    return 0;
                }
                (geometry.number_of_arraylets - 1).saturating_mul(self.config.leaf_size)
            }
        }
    }

    /// Total bytes the object consumes: spine plus external leaves.
    pub fn total_footprint_with_header(&self, geometry: &ArrayGeometry) -> usize {
        geometry.spine_size + self.external_arraylet_bytes(geometry)
    }

    /// Byte offset of the identity-hash slot: the spine size rounded up
    /// to a 4-byte boundary.
    ///
    /// Recomputed here from the raw element count. The geometry's data
    /// size is already rounded to pointer granularity, and reusing it
    /// would drift from the allocator, which appends the slot right
    /// after the real data.
    pub fn hashcode_offset(
        &self,
        reader: &impl MemorySource,
        address: u64,
        shape: ElementShape,
    ) -> Result<usize> {
        let header = ArrayHeader::read(reader, address, &self.config)?;
        let raw_bytes = (header.element_count as usize) << shape.shift;

        let layout = if header.contiguous {
            ArrayLayout::InlineContiguous
        } else {
            match self.ops.decide_layout(&self.config, shape, raw_bytes) {
                ArrayLayout::InlineContiguous => {
                    return Err(ModelError::CorruptData {
                        address,
                        detail: "discontiguous header on an inline-sized array",
                    });
                }
                ArrayLayout::Illegal => {
                    return Err(ModelError::UnsupportedConfiguration {
                        detail: "array size is not representable under this configuration",
                    });
                }
                split => split,
            }
        };

        let arraylets = self.ops.number_of_arraylets(&self.config, raw_bytes);
        let spine = header_size(&self.config, layout)
            + spine_size_without_header(&self.config, layout, shape, arraylets, raw_bytes);
        Ok(round_up(spine, 4))
    }

    /// Verdict on the cached out-of-line data address. `false` means the
    /// object disagrees with its computed geometry; well-formed objects
    /// never turn this into an error.
    pub fn validate_data_addr(&self, geometry: &ArrayGeometry) -> bool {
        validator::validate_data_addr(&self.config, geometry)
    }
}
