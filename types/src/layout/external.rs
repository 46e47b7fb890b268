//! Layouts whose offsets are imposed from outside, for example by a record
//! format defined elsewhere.

use core::fmt;
use core::ptr::NonNull;

use alloc::string::String;
use alloc::vec::Vec;

use super::compute::check_unique_names;
use super::{ExternalLayout, Strategy, TypeLayout};
use crate::align::check_alignment;
use crate::error::LayoutError;
use crate::member::Member;
use crate::token::TypeToken;

/// Raw instance operations for an external layout.
///
/// When an external layout has no ops, initialize, finalize and copy-assign
/// are no-ops: the layout only describes where members live.
#[derive(Clone, Copy)]
pub struct ExternalOps {
    pub initialize: unsafe fn(NonNull<u8>),
    pub finalize: unsafe fn(NonNull<u8>),
    pub copy_assign: unsafe fn(NonNull<u8>, NonNull<u8>),
}

impl fmt::Debug for ExternalOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalOps").finish_non_exhaustive()
    }
}

/// Everything needed to register an external layout.
#[derive(Debug)]
pub struct ExternalSpec {
    name: String,
    size: usize,
    align: usize,
    members: Vec<(Member, Option<usize>)>,
    ops: Option<ExternalOps>,
}

impl ExternalSpec {
    pub fn new(name: impl Into<String>, size: usize, align: usize) -> Self {
        Self {
            name: name.into(),
            size,
            align,
            members: Vec::new(),
            ops: None,
        }
    }

    /// Places `member` at a fixed byte offset.
    pub fn member(mut self, member: Member, offset: usize) -> Self {
        self.members.push((member, Some(offset)));
        self
    }

    /// Declares an optional member this format does not carry.
    ///
    /// The member stays unresolved: it has no address in any instance and
    /// typed reads of it yield nothing. Only [`Member::optional`] members are
    /// accepted here.
    pub fn optional_member(mut self, member: Member) -> Self {
        self.members.push((member, None));
        self
    }

    pub fn with_ops(mut self, ops: ExternalOps) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TypeLayout {
    /// Builds a layout from an externally supplied size, alignment and offset table.
    ///
    /// Values are stored as given. Every placed member must be aligned for its
    /// value and fit within `size`, and every required member must be placed.
    /// External layouts have no parent and no dispatch table.
    pub fn external(spec: ExternalSpec) -> Result<Self, LayoutError> {
        let ExternalSpec {
            name,
            size,
            align,
            members,
            ops,
        } = spec;

        check_alignment(&name, align, usize::MAX)?;
        if size % align != 0 {
            return Err(LayoutError::MisalignedSize {
                type_name: name,
                size,
                align,
            });
        }

        let mut resolved = Vec::with_capacity(members.len());
        for (mut member, offset) in members {
            let Some(offset) = offset else {
                if !member.is_optional() {
                    return Err(LayoutError::MissingOffset {
                        type_name: name,
                        member: member.name().into(),
                    });
                }
                resolved.push(member);
                continue;
            };
            let member_align = member.value().align();
            if offset % member_align != 0 {
                return Err(LayoutError::MisalignedMember {
                    type_name: name,
                    member: member.name().into(),
                    offset,
                    align: member_align,
                });
            }
            let fits = member
                .span()
                .and_then(|span| offset.checked_add(span))
                .is_some_and(|end| end <= size);
            if !fits {
                return Err(LayoutError::MemberOutOfBounds {
                    type_name: name,
                    member: member.name().into(),
                    offset,
                    size,
                });
            }
            member.resolve(offset);
            resolved.push(member);
        }
        check_unique_names(&name, &resolved, &[])?;

        tracing::debug!(type_name = %name, size, align, members = resolved.len(), "registered external layout");

        Ok(TypeLayout {
            name,
            token: TypeToken::next(),
            parent: None,
            members: resolved,
            slots: Vec::new(),
            size,
            align,
            strategy: Strategy::External(ExternalLayout { ops }),
        })
    }
}
