//! Consistency check for the cached out-of-line data address.
//!
//! Heaps that alias large arrays into a contiguous virtual range cache a
//! data pointer in the header. A pointer that disagrees with the computed
//! geometry is the earliest observable sign of heap corruption, so the
//! check answers with a boolean verdict: a well-formed object never turns
//! this into an error. Reading the header itself can still fail upstream
//! with `UnreadableMemory`.

use crate::{ArrayGeometry, ArrayletConfig};

/// Three mutually exclusive cases, decided by the data size alone.
pub(crate) fn validate_data_addr(config: &ArrayletConfig, geometry: &ArrayGeometry) -> bool {
    // images without the slot have nothing to disagree with
    let Some(data_addr) = geometry.data_addr else {
        return true;
    };

    if geometry.data_size == 0 {
        // an empty array either never set the pointer or points just past
        // its discontiguous header
        data_addr == 0
            || data_addr == geometry.header_address + config.discontiguous_header_size as u64
    } else if config.arraylets_disabled() || geometry.data_size < config.leaf_size {
        // small arrays are never aliased: data follows the contiguous header
        data_addr == geometry.header_address + config.contiguous_header_size as u64
    } else if config.data_aliasing_enabled() {
        // the alias must sit outside the primary heap and the size must
        // qualify for aliasing
        data_addr != 0
            && !config.heap_range.contains(&data_addr)
            && geometry.data_size >= config.leaf_size
    } else {
        // large split arrays carry no single data pointer
        data_addr == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ArrayLayout, ArrayletConfig, ElementShape, HeapFlags, SnapshotConfigInfo,
        geometry::{header_size, number_of_arraylets_v2, spine_size},
    };

    const SPINE: u64 = 0x10000;
    const LEAF: usize = 4096;

    fn mk_config(aliased: bool) -> ArrayletConfig {
        ArrayletConfig::new(SnapshotConfigInfo {
            leaf_size: Some(LEAF),
            largest_desirable_spine_size: Some(512),
            flags: if aliased {
                HeapFlags::DOUBLE_MAPPING
            } else {
                HeapFlags::empty()
            },
            data_addr_present: true,
            heap_range: Some(0x8000..0x80000),
            ..Default::default()
        })
        .unwrap()
    }

    fn mk_geometry(config: &ArrayletConfig, data_size: usize, data_addr: u64) -> ArrayGeometry {
        let shape = ElementShape::primitive(0).unwrap();
        let layout = if data_size == 0 {
            ArrayLayout::Discontiguous
        } else if data_size < config.leaf_size || config.data_aliasing_enabled() {
            ArrayLayout::InlineContiguous
        } else {
            ArrayLayout::Discontiguous
        };
        let arraylets = number_of_arraylets_v2(config, data_size);
        ArrayGeometry {
            header_address: SPINE,
            layout,
            shape,
            element_count: data_size as u32,
            data_size,
            number_of_arraylets: arraylets,
            header_size: header_size(config, layout),
            spine_size: spine_size(config, layout, shape, arraylets, data_size),
            align_data: false,
            data_addr: Some(data_addr),
        }
    }

    #[test]
    fn every_size_class_settles_on_one_branch() {
        // every probe size against both aliasing settings answers with a
        // stable verdict; the per-branch tests below pin which one
        for &aliased in &[false, true] {
            let config = mk_config(aliased);
            for &size in &[0usize, 1, LEAF - 1, LEAF, LEAF + 1] {
                for &addr in &[0u64, SPINE + 16, 0x9000, 0x100000] {
                    let geometry = mk_geometry(&config, size, addr);
                    let verdict = validate_data_addr(&config, &geometry);
                    assert_eq!(verdict, validate_data_addr(&config, &geometry));
                    if size > 0 && size < LEAF {
                        // branch two ignores the aliasing flag entirely
                        assert_eq!(
                            verdict,
                            addr == SPINE + config.contiguous_header_size as u64,
                            "size {} addr {:#x} aliased {}",
                            size,
                            addr,
                            aliased
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn empty_arrays_accept_null_or_the_header_end() {
        let config = mk_config(true);
        let header_end = SPINE + config.discontiguous_header_size as u64;

        assert!(validate_data_addr(&config, &mk_geometry(&config, 0, 0)));
        assert!(validate_data_addr(&config, &mk_geometry(&config, 0, header_end)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, 0, 0x9000)));
    }

    #[test]
    fn small_arrays_must_point_just_past_the_contiguous_header() {
        let config = mk_config(true);
        let adjacent = SPINE + config.contiguous_header_size as u64;

        assert!(validate_data_addr(&config, &mk_geometry(&config, 100, adjacent)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, 100, 0)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, 100, 0x100000)));
    }

    #[test]
    fn aliased_large_arrays_must_point_outside_the_heap() {
        let config = mk_config(true);

        // 0x100000 is past the configured heap range
        assert!(validate_data_addr(&config, &mk_geometry(&config, LEAF, 0x100000)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, LEAF, 0x9000)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, LEAF, 0)));
    }

    #[test]
    fn unaliased_large_arrays_carry_no_data_pointer() {
        let config = mk_config(false);

        assert!(validate_data_addr(&config, &mk_geometry(&config, LEAF + 1, 0)));
        assert!(!validate_data_addr(&config, &mk_geometry(&config, LEAF + 1, 0x9000)));
    }

    #[test]
    fn absent_slot_validates_trivially() {
        let config = ArrayletConfig::new(SnapshotConfigInfo {
            leaf_size: Some(LEAF),
            ..Default::default()
        })
        .unwrap();
        let mut geometry = mk_geometry(&config, 100, 0xBAD);
        geometry.data_addr = None;
        assert!(validate_data_addr(&config, &geometry));
    }
}
