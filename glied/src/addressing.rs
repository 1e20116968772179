//! Element address resolution: direct offset arithmetic for contiguous
//! data, arrayoid indirection for everything else.
//!
//! No bounds check against the element count happens here; callers that
//! need one must do it themselves before asking for an address.

use crate::{
    ArrayGeometry, ArrayLayout, ArrayletConfig, MemorySource, ModelError, Result,
};

pub(crate) fn element_address(
    config: &ArrayletConfig,
    reader: &impl MemorySource,
    geometry: &ArrayGeometry,
    index: u32,
) -> Result<u64> {
    // widen before multiplying: a 2^31-element long array overflows 32 bits
    let byte_offset = index as u64 * geometry.shape.element_size() as u64;

    match geometry.layout {
        ArrayLayout::InlineContiguous => {
            let base = if config.data_out_of_line(geometry.data_size) {
                match geometry.data_addr {
                    Some(addr) if addr != 0 => addr,
                    _ => {
                        return Err(ModelError::CorruptData {
                            address: geometry.header_address,
                            detail: "aliased array has no out-of-line data address",
                        });
                    }
                }
            } else {
                geometry.header_address + geometry.header_size as u64
            };
            Ok(base + byte_offset)
        }
        ArrayLayout::Hybrid | ArrayLayout::Discontiguous => {
            let arrayoid_base = geometry.header_address + geometry.header_size as u64;
            let leaf_index = (byte_offset >> config.leaf_log_size) as usize;
            let slot = arrayoid_base + (leaf_index * config.reference_size()) as u64;

            let leaf = reader.read_ref(slot, config)?;
            if leaf == 0 {
                return Err(ModelError::UninitializedLeaf {
                    spine: geometry.header_address,
                    leaf_index,
                });
            }
            if !config.arraylet_range.contains(&leaf) {
                return Err(ModelError::CorruptData {
                    address: slot,
                    detail: "arraylet leaf pointer outside the arraylet range",
                });
            }
            // a hybrid tail leaf points into the spine and may sit below
            // granule alignment, so only reference alignment is enforced
            if leaf & (config.reference_size() as u64 - 1) != 0 {
                return Err(ModelError::CorruptData {
                    address: slot,
                    detail: "arraylet leaf pointer is misaligned",
                });
            }
            Ok(leaf + (byte_offset & config.leaf_size_mask as u64))
        }
        ArrayLayout::Illegal => Err(ModelError::UnsupportedConfiguration {
            detail: "cannot address elements of an illegal layout",
        }),
    }
}
