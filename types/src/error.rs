//! Errors reported while describing, laying out, and accessing dynamic types.
//!
//! Two failure kinds are deliberately absent here:
//!
//! - Calling a dispatch slot that was never overridden goes through
//!   [`trap`](crate::dispatch::trap), which panics. It signals an incomplete type
//!   definition and is not something callers recover from.
//! - Handing a block of the wrong size or alignment to the raw instance operations
//!   is undefined behavior. The allocation helpers in `dynlayout-values` always
//!   request the layout's own size and alignment, so safe code cannot reach it.

use alloc::string::String;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// An override was registered for a slot that does not belong to this
    /// type's dispatch table. Nothing is written when this is returned.
    #[error("invalid override of `{slot}` on `{type_name}`: {reason}")]
    InvalidOverride {
        type_name: String,
        slot: String,
        reason: OverrideMismatch,
    },

    #[error("type `{type_name}` has no member named `{member}`")]
    UnknownMember { type_name: String, member: String },

    #[error("type `{type_name}` has no dispatch slot named `{slot}`")]
    UnknownSlot { type_name: String, slot: String },

    #[error("member `{member}` is declared twice in `{type_name}`")]
    DuplicateMember { type_name: String, member: String },

    #[error("dispatch slot `{slot}` is declared twice in `{type_name}`")]
    DuplicateSlot { type_name: String, slot: String },

    #[error("a type named `{type_name}` is already registered")]
    DuplicateType { type_name: String },

    #[error("type `{type_name}` contains itself")]
    RecursiveType { type_name: String },

    #[error("layout of `{type_name}` overflows the address space")]
    SizeOverflow { type_name: String },

    #[error("alignment {align} of `{type_name}` is not a power of two")]
    InvalidAlignment { type_name: String, align: usize },

    #[error("alignment {align} of `{type_name}` exceeds the maximum of {max}")]
    AlignmentTooLarge {
        type_name: String,
        align: usize,
        max: usize,
    },

    /// An externally supplied member offset does not fit inside the type.
    #[error("member `{member}` of `{type_name}` at offset {offset} does not fit in {size} bytes")]
    MemberOutOfBounds {
        type_name: String,
        member: String,
        offset: usize,
        size: usize,
    },

    #[error("member `{member}` of `{type_name}` at offset {offset} is not aligned to {align}")]
    MisalignedMember {
        type_name: String,
        member: String,
        offset: usize,
        align: usize,
    },

    #[error("size {size} of `{type_name}` is not a multiple of its alignment {align}")]
    MisalignedSize {
        type_name: String,
        size: usize,
        align: usize,
    },

    #[error("member `{member}` holds `{actual}`, not `{expected}`")]
    TypeMismatch {
        member: String,
        expected: &'static str,
        actual: String,
    },

    #[error("dispatch slot `{slot}` is not bound to a `{expected}`")]
    SignatureMismatch { slot: String, expected: &'static str },

    #[error("member `{member}` has no resolved offset")]
    UnresolvedMember { member: String },

    #[error("required member `{member}` of `{type_name}` has no offset")]
    MissingOffset { type_name: String, member: String },

    #[error("member `{member}` of `{type_name}` is never initialized")]
    UninitializedMember { type_name: String, member: String },
}

/// Why an override was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMismatch {
    /// The type being overridden has no dispatch table at all.
    NoTable,
    /// The slot lives in a table at a different displacement.
    Displacement {
        slot: Option<usize>,
        table: usize,
    },
    /// The slot index is not inside this type's table.
    Index { index: Option<usize>, len: usize },
}

impl core::fmt::Display for OverrideMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OverrideMismatch::NoTable => write!(f, "type has no dispatch table"),
            OverrideMismatch::Displacement { slot: Some(slot), table } => write!(
                f,
                "slot table displacement {slot} does not match the type's displacement {table}"
            ),
            OverrideMismatch::Displacement { slot: None, table } => write!(
                f,
                "slot is unresolved, the type's table is at displacement {table}"
            ),
            OverrideMismatch::Index { index: Some(index), len } => {
                write!(f, "slot index {index} is out of range for a table of {len}")
            }
            OverrideMismatch::Index { index: None, len } => {
                write!(f, "slot has no index, the table has {len} entries")
            }
        }
    }
}
