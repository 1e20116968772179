//! Geometric properties derived from a layout decision: header size,
//! spine size, leaf count, data-section alignment.

use crate::{ArrayLayout, ArrayletConfig, ElementShape};

/// Everything the engine knows about one array object. Computed fresh on
/// every query and owned by the caller; a live collector may move or
/// resize objects between calls, so this is never cached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArrayGeometry {
    pub header_address: u64,
    pub layout: ArrayLayout,
    pub shape: ElementShape,
    pub element_count: u32,
    /// Element bytes rounded up to pointer granularity.
    pub data_size: usize,
    pub number_of_arraylets: usize,
    pub header_size: usize,
    pub spine_size: usize,
    pub align_data: bool,
    /// Cached out-of-line data pointer, when the image carries the slot.
    pub data_addr: Option<u64>,
}

/// Leaf count, original revision: one slot past the data so that a
/// one-past-the-end element address stays resolvable even for a maximally
/// sized array. An exact leaf multiple therefore carries a trailing null
/// slot in its arrayoid.
pub(crate) fn number_of_arraylets_v1(config: &ArrayletConfig, data_size: usize) -> usize {
    if config.arraylets_disabled() {
        return 1;
    }
    (data_size >> config.leaf_log_size) + 1
}

/// Leaf count, later revision: plain ceiling division, minimum one.
pub(crate) fn number_of_arraylets_v2(config: &ArrayletConfig, data_size: usize) -> usize {
    if config.arraylets_disabled() || data_size == 0 {
        return 1;
    }
    (data_size >> config.leaf_log_size)
        + usize::from(data_size & config.leaf_size_mask != 0)
}

/// One of exactly two constants, chosen per object: the discontiguous
/// header reserves the secondary size field.
#[inline]
pub(crate) fn header_size(config: &ArrayletConfig, layout: ArrayLayout) -> usize {
    match layout {
        ArrayLayout::InlineContiguous => config.contiguous_header_size,
        _ => config.discontiguous_header_size,
    }
}

/// Whether the data region must start on the alignment granule rather
/// than on natural reference alignment: compressed references need
/// 8-aligned leaves for the shift scheme, and on 32-bit images an 8-byte
/// primitive slot is not naturally 8-aligned.
pub(crate) fn should_align_data_section(config: &ArrayletConfig, shape: ElementShape) -> bool {
    config.compressed_refs || (!config.is_64bit && shape.is_double_width_primitive())
}

/// Padding inserted between the arrayoid and any inline tail data.
pub(crate) fn data_section_padding(config: &ArrayletConfig, shape: ElementShape) -> usize {
    if should_align_data_section(config, shape) {
        config.alignment_granule - config.reference_size()
    } else {
        0
    }
}

/// Spine bytes past the header: padding + arrayoid + inline data.
///
/// A zero-size array contributes nothing here regardless of layout, and
/// an inline-contiguous array whose data is aliased out-of-line keeps an
/// empty spine tail: the bytes live elsewhere.
pub(crate) fn spine_size_without_header(
    config: &ArrayletConfig,
    layout: ArrayLayout,
    shape: ElementShape,
    arraylets: usize,
    data_size: usize,
) -> usize {
    match layout {
        ArrayLayout::InlineContiguous => {
            if config.data_out_of_line(data_size) {
                0
            } else {
                data_size
            }
        }
        ArrayLayout::Hybrid | ArrayLayout::Discontiguous => {
            if data_size == 0 {
                return 0;
            }
            let arrayoid = arraylets * config.reference_size();
            let inline_tail = if layout == ArrayLayout::Hybrid {
                data_size & config.leaf_size_mask
            } else {
                0
            };
            data_section_padding(config, shape) + arrayoid + inline_tail
        }
        ArrayLayout::Illegal => 0,
    }
}

pub(crate) fn spine_size(
    config: &ArrayletConfig,
    layout: ArrayLayout,
    shape: ElementShape,
    arraylets: usize,
    data_size: usize,
) -> usize {
    header_size(config, layout)
        + spine_size_without_header(config, layout, shape, arraylets, data_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementKind, HeapFlags, SnapshotConfigInfo};

    fn mk_config(info: SnapshotConfigInfo) -> ArrayletConfig {
        ArrayletConfig::new(info).expect("valid test configuration")
    }

    fn leaf_4k() -> ArrayletConfig {
        mk_config(SnapshotConfigInfo {
            leaf_size: Some(4096),
            largest_desirable_spine_size: Some(512),
            ..Default::default()
        })
    }

    fn int_shape() -> ElementShape {
        ElementShape::primitive(2).unwrap()
    }

    #[test]
    fn leaf_counts_agree_except_on_exact_multiples() {
        let config = leaf_4k();
        let cases: &[(usize, usize, usize)] = &[
            // (data size, revision 1, revision 2)
            (0, 1, 1),
            (1, 1, 1),
            (4095, 1, 1),
            (4096, 2, 1),
            (4097, 2, 2),
            (8192, 3, 2),
            (4_000_000, 977, 977),
        ];
        for &(size, v1, v2) in cases {
            assert_eq!(
                number_of_arraylets_v1(&config, size),
                v1,
                "revision 1 count for {} bytes",
                size
            );
            assert_eq!(
                number_of_arraylets_v2(&config, size),
                v2,
                "revision 2 count for {} bytes",
                size
            );
        }
    }

    #[test]
    fn leaf_count_covers_every_byte_exactly() {
        let config = leaf_4k();
        let leaf = config.leaf_size;
        for size in [0usize, 1, 100, 4095, 4096, 4097, 12288, 4_000_000] {
            let count = number_of_arraylets_v2(&config, size);
            assert!(count >= 1);
            assert!(count * leaf >= size, "leaves too small for {} bytes", size);
            if size > 0 {
                assert!(
                    (count - 1) * leaf < size,
                    "unneeded trailing leaf for {} bytes",
                    size
                );
            }
        }
    }

    #[test]
    fn v1_always_reserves_the_one_past_the_end_slot() {
        let config = leaf_4k();
        for size in [0usize, 1, 4096, 8192, 4_000_000] {
            let count = number_of_arraylets_v1(&config, size);
            // one more byte must still land inside the reserved leaves
            assert!(count * config.leaf_size >= size + 1);
        }
    }

    #[test]
    fn disabled_arraylets_collapse_to_one_leaf() {
        let config = mk_config(SnapshotConfigInfo::default());
        assert_eq!(number_of_arraylets_v1(&config, 123_456_789), 1);
        assert_eq!(number_of_arraylets_v2(&config, 123_456_789), 1);
    }

    #[test]
    fn header_size_is_one_of_two_constants() {
        let config = leaf_4k();
        for layout in [
            ArrayLayout::InlineContiguous,
            ArrayLayout::Hybrid,
            ArrayLayout::Discontiguous,
        ] {
            let size = header_size(&config, layout);
            assert!(
                size == config.contiguous_header_size
                    || size == config.discontiguous_header_size
            );
        }
        assert_eq!(
            header_size(&config, ArrayLayout::InlineContiguous),
            config.contiguous_header_size
        );
        assert_eq!(
            header_size(&config, ArrayLayout::Discontiguous),
            config.discontiguous_header_size
        );
    }

    #[test]
    fn contiguous_spine_is_header_plus_data() {
        let config = leaf_4k();
        // 100 int elements
        let size = spine_size(&config, ArrayLayout::InlineContiguous, int_shape(), 1, 400);
        assert_eq!(size, 416);
    }

    #[test]
    fn discontiguous_spine_is_header_plus_arrayoid() {
        let config = leaf_4k();
        let arraylets = number_of_arraylets_v2(&config, 4_000_000);
        let size = spine_size(
            &config,
            ArrayLayout::Discontiguous,
            int_shape(),
            arraylets,
            4_000_000,
        );
        assert_eq!(size, 16 + 977 * 8);
    }

    #[test]
    fn hybrid_spine_embeds_only_the_partial_tail() {
        let config = mk_config(SnapshotConfigInfo {
            leaf_size: Some(1024),
            largest_desirable_spine_size: Some(4096),
            ..Default::default()
        });
        // 5000 bytes = 4 full leaves + 904-byte tail, 5 arrayoid slots
        let size = spine_size(&config, ArrayLayout::Hybrid, int_shape(), 5, 5000);
        assert_eq!(size, 16 + 5 * 8 + 904);
    }

    #[test]
    fn zero_size_spine_is_just_the_header() {
        let config = leaf_4k();
        let size = spine_size(&config, ArrayLayout::Discontiguous, int_shape(), 1, 0);
        assert_eq!(size, config.discontiguous_header_size);
    }

    #[test]
    fn aliased_contiguous_data_leaves_the_spine_empty() {
        let config = mk_config(SnapshotConfigInfo {
            leaf_size: Some(4096),
            largest_desirable_spine_size: Some(512),
            flags: HeapFlags::DOUBLE_MAPPING,
            data_addr_present: true,
            ..Default::default()
        });
        let size = spine_size(
            &config,
            ArrayLayout::InlineContiguous,
            int_shape(),
            977,
            4_000_000,
        );
        assert_eq!(size, config.contiguous_header_size);

        // small arrays stay adjacent to the header even on aliased heaps
        let small = spine_size(&config, ArrayLayout::InlineContiguous, int_shape(), 1, 400);
        assert_eq!(small, config.contiguous_header_size + 400);
    }

    #[test]
    fn compressed_references_pad_the_data_section() {
        let config = mk_config(SnapshotConfigInfo {
            leaf_size: Some(1024),
            compressed_refs: true,
            compressed_shift: Some(3),
            ..Default::default()
        });
        assert!(should_align_data_section(&config, int_shape()));
        assert_eq!(data_section_padding(&config, int_shape()), 4);

        // hybrid tail must start 8-aligned: header 12 + arrayoid 5*4 + pad 4
        let size = spine_size(&config, ArrayLayout::Hybrid, int_shape(), 5, 5000);
        assert_eq!(size, 12 + 4 + 5 * 4 + 904);
    }

    #[test]
    fn double_width_primitives_align_only_without_64bit_addressing() {
        let long_shape = ElementShape::primitive(3).unwrap();
        assert!(long_shape.is_double_width_primitive());

        let wide = mk_config(SnapshotConfigInfo::default());
        assert!(!should_align_data_section(&wide, long_shape));

        let narrow = mk_config(SnapshotConfigInfo {
            pointer_size: Some(4),
            ..Default::default()
        });
        assert!(should_align_data_section(&narrow, long_shape));
        assert_eq!(data_section_padding(&narrow, long_shape), 4);
        // reference elements on the same platform need no extra alignment
        let ref_shape = ElementShape {
            shift: 2,
            kind: ElementKind::Reference,
        };
        assert!(!should_align_data_section(&narrow, ref_shape));
    }
}
