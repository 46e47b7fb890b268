//! Sequential layout computation.

use alloc::string::String;

use hashbrown::HashSet;

use super::{ComputedLayout, Strategy, TypeLayout};
use crate::align::{advance, align_offset};
use crate::dispatch::{Binding, DispatchSlot, DispatchTable, TABLE_POINTER_ALIGN, TABLE_POINTER_SIZE};
use crate::error::LayoutError;
use crate::member::Member;
use crate::schema::Schema;
use crate::token::TypeToken;

impl TypeLayout {
    /// Computes the layout of a type from its parent and schema.
    ///
    /// Offsets start where the parent ends. The dispatch table is inherited from
    /// a computed parent that has one; otherwise a table pointer is placed first
    /// if the type declares any slots. Members follow in declaration order, each
    /// aligned to its own requirement. The final size is rounded up to the
    /// overall alignment.
    ///
    /// Most callers go through the [`Registry`](crate::Registry), which also
    /// guarantees the computation runs once per type and gives the layout a
    /// `'static` lifetime.
    pub fn compute(
        name: impl Into<String>,
        parent: Option<&'static TypeLayout>,
        schema: Schema,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        let (mut members, mut slots) = schema.into_parts();
        check_unique_names(&name, &members, &slots)?;

        let mut offset = parent.map_or(0, |p| p.size());
        let mut align = parent.map_or(1, |p| p.align());

        let inherited = parent
            .and_then(|p| p.narrow::<ComputedLayout>())
            .and_then(|computed| Some((computed.displacement?, computed.table.as_ref()?)));
        let (displacement, table) = match inherited {
            Some((displacement, table)) => (Some(displacement), Some(DispatchTable::inherit(table))),
            None if !slots.is_empty() => {
                let displacement = align_offset(&name, offset, TABLE_POINTER_ALIGN)?;
                offset = advance(&name, displacement, TABLE_POINTER_SIZE)?;
                align = align.max(TABLE_POINTER_ALIGN);
                (Some(displacement), Some(DispatchTable::new()))
            }
            None => (None, None),
        };

        if let (Some(displacement), Some(table)) = (displacement, table.as_ref()) {
            for slot in &mut slots {
                let index = match table.index_of(slot.name()) {
                    Some(index) => index,
                    None => table.push(slot.name(), Binding::default_for(slot.is_optional())),
                };
                slot.resolve(displacement, index);
                tracing::trace!(type_name = %name, slot = slot.name(), displacement, index, "resolved slot");
            }
        }

        for member in &mut members {
            let member_align = member.value().align();
            let span = member.span().ok_or_else(|| LayoutError::SizeOverflow {
                type_name: name.clone(),
            })?;
            offset = align_offset(&name, offset, member_align)?;
            member.resolve(offset);
            tracing::trace!(type_name = %name, member = member.name(), offset, span, "resolved member");
            offset = advance(&name, offset, span)?;
            align = align.max(member_align);
        }

        let size = align_offset(&name, offset, align)?;
        if core::alloc::Layout::from_size_align(size, align).is_err() {
            return Err(LayoutError::SizeOverflow { type_name: name });
        }

        tracing::debug!(
            type_name = %name,
            parent = parent.map(|p| p.name()),
            size,
            align,
            table_displacement = displacement,
            "computed layout"
        );

        Ok(TypeLayout {
            name,
            token: TypeToken::next(),
            parent,
            members,
            slots,
            size,
            align,
            strategy: Strategy::Computed(ComputedLayout {
                displacement,
                table,
            }),
        })
    }
}

/// Rejects member or slot names declared twice by the same type.
pub(super) fn check_unique_names(
    type_name: &str,
    members: &[Member],
    slots: &[DispatchSlot],
) -> Result<(), LayoutError> {
    let mut seen = HashSet::with_capacity(members.len());
    for member in members {
        if !seen.insert(member.name()) {
            return Err(LayoutError::DuplicateMember {
                type_name: type_name.into(),
                member: member.name().into(),
            });
        }
    }
    seen.clear();
    for slot in slots {
        if !seen.insert(slot.name()) {
            return Err(LayoutError::DuplicateSlot {
                type_name: type_name.into(),
                slot: slot.name().into(),
            });
        }
    }
    Ok(())
}
