//! Offset and alignment arithmetic shared by every layout strategy.

use crate::error::LayoutError;

/// Rounds `offset` up to the next multiple of `align`.
///
/// `align` must be a power of two. Returns `None` on overflow.
#[inline]
pub const fn align_up(offset: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match offset.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

/// Like [`align_up`], reporting overflow against the type being laid out.
pub(crate) fn align_offset(type_name: &str, offset: usize, align: usize) -> Result<usize, LayoutError> {
    align_up(offset, align).ok_or_else(|| LayoutError::SizeOverflow {
        type_name: type_name.into(),
    })
}

/// Advances `offset` by `size`, reporting overflow against the type being laid out.
pub(crate) fn advance(type_name: &str, offset: usize, size: usize) -> Result<usize, LayoutError> {
    offset.checked_add(size).ok_or_else(|| LayoutError::SizeOverflow {
        type_name: type_name.into(),
    })
}

/// Validates an alignment coming from outside the engine.
pub(crate) fn check_alignment(
    type_name: &str,
    align: usize,
    max_alignment: usize,
) -> Result<(), LayoutError> {
    if !align.is_power_of_two() {
        return Err(LayoutError::InvalidAlignment {
            type_name: type_name.into(),
            align,
        });
    }
    if align > max_alignment {
        return Err(LayoutError::AlignmentTooLarge {
            type_name: type_name.into(),
            align,
            max: max_alignment,
        });
    }
    Ok(())
}
