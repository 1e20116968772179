//! Layout policy: which physical shape an array of a given size gets.

use crate::config::UNBOUNDED_SPINE_SIZE;
use crate::geometry::{data_section_padding, number_of_arraylets_v1, number_of_arraylets_v2};
use crate::{ArrayletConfig, ElementShape, HeapFlags, round_up};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayLayout {
    /// Header followed directly by all element data.
    InlineContiguous,
    /// Full leaves out-of-line, the final partial leaf inline in the spine.
    Hybrid,
    /// All data in out-of-line leaves; the spine holds only the arrayoid.
    Discontiguous,
    /// The configuration cannot represent an array of this size.
    Illegal,
}

pub(crate) fn decide_layout_v1(
    config: &ArrayletConfig,
    shape: ElementShape,
    data_size: usize,
) -> ArrayLayout {
    decide_layout(config, shape, data_size, false, number_of_arraylets_v1)
}

pub(crate) fn decide_layout_v2(
    config: &ArrayletConfig,
    shape: ElementShape,
    data_size: usize,
) -> ArrayLayout {
    decide_layout(config, shape, data_size, true, number_of_arraylets_v2)
}

/// Core policy shared by both algorithm revisions.
///
/// All comparisons subtract margins from the spine ceiling instead of
/// adding them to `data_size`: the data size of a near-maximal array sits
/// close to the top of the address space and any addition could wrap.
fn decide_layout(
    config: &ArrayletConfig,
    shape: ElementShape,
    data_size: usize,
    double_map_aware: bool,
    leaf_count: fn(&ArrayletConfig, usize) -> usize,
) -> ArrayLayout {
    let ceiling = config.largest_desirable_spine_size;

    // generational and regioned heaps keep one granule of slack so a
    // hashcode slot can appear later without moving the object
    let minimum_spine = if config
        .flags
        .intersects(HeapFlags::GENERATIONAL | HeapFlags::REGIONED)
    {
        config.alignment_granule
    } else {
        0
    };

    let contiguous_budget = ceiling
        .saturating_sub(minimum_spine)
        .saturating_sub(config.contiguous_header_size);

    if ceiling == UNBOUNDED_SPINE_SIZE || data_size <= contiguous_budget {
        // a zero-length array never allocates an arrayoid but still gets
        // the discontiguous tag, and with it the wider header
        return if data_size == 0 {
            ArrayLayout::Discontiguous
        } else {
            ArrayLayout::InlineContiguous
        };
    }

    if config.arraylets_disabled() {
        // too big for a contiguous spine and nowhere to put leaves
        return ArrayLayout::Illegal;
    }

    if double_map_aware && config.data_aliasing_enabled() && data_size > 0 {
        // aliased heaps keep array bytes virtually contiguous out-of-line,
        // so the object itself stays inline-contiguous at any size
        return ArrayLayout::InlineContiguous;
    }

    let last_leaf_bytes = data_size & config.leaf_size_mask;
    if last_leaf_bytes > 0 {
        let arraylets = leaf_count(config, data_size);
        if hybrid_spine_estimate(config, shape, arraylets, last_leaf_bytes) <= ceiling {
            return ArrayLayout::Hybrid;
        }
    }
    ArrayLayout::Discontiguous
}

/// Spine size an array of this shape would need under the hybrid layout,
/// after minimum-object rounding and the regioned-heap growth granule.
fn hybrid_spine_estimate(
    config: &ArrayletConfig,
    shape: ElementShape,
    arraylets: usize,
    last_leaf_bytes: usize,
) -> usize {
    let raw = config
        .discontiguous_header_size
        .saturating_add(data_section_padding(config, shape))
        .saturating_add(arraylets.saturating_mul(config.reference_size()))
        .saturating_add(last_leaf_bytes);
    let mut adjusted = round_up(raw, config.alignment_granule);
    if config.flags.contains(HeapFlags::REGIONED) {
        adjusted = adjusted.saturating_add(config.alignment_granule);
    }
    adjusted
}
