//! Type layouts: the computed shape of a dynamic type and the raw operations
//! that create, copy and destroy its instances.
//!
//! A layout is built once, either by the sequential algorithm in [`compute`] or
//! from an externally imposed offset table in [`external`]. Both produce the same
//! [`TypeLayout`] struct and differ only in their [`Strategy`]. Single inheritance
//! is prefix composition: a derived instance starts with a complete parent
//! instance, followed by the derived type's own table pointer (if it needs one)
//! and members.
//!
//! ```text
//! Derived: [ Parent (parent.size bytes) | pad | *table | pad | m0 | pad | m1 | tail pad ]
//! ```

#![allow(unsafe_code)]

mod compute;
mod external;


use core::fmt;
use core::ptr::NonNull;

use alloc::string::String;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::dispatch::{Binding, DispatchSlot, DispatchTable};
use crate::error::{LayoutError, OverrideMismatch};
use crate::member::Member;
use crate::token::{StrategyToken, TypeToken};

pub use external::{ExternalOps, ExternalSpec};

/// The computed shape of one dynamic type.
///
/// Layouts are immutable once built. The only state that changes afterwards is
/// the set of dispatch bindings, through [`register_override`](Self::register_override).
pub struct TypeLayout {
    name: String,
    token: TypeToken,
    parent: Option<&'static TypeLayout>,
    members: Vec<Member>,
    slots: Vec<DispatchSlot>,
    size: usize,
    align: usize,
    strategy: Strategy,
}

/// How a layout's offsets were obtained.
#[derive(Debug)]
pub enum Strategy {
    Computed(ComputedLayout),
    External(ExternalLayout),
}

/// State owned by sequentially computed layouts.
#[derive(Debug)]
pub struct ComputedLayout {
    displacement: Option<usize>,
    table: Option<DispatchTable>,
}

impl ComputedLayout {
    /// Offset of the dispatch-table pointer inside an instance.
    pub fn table_displacement(&self) -> Option<usize> {
        self.displacement
    }

    pub fn table(&self) -> Option<&DispatchTable> {
        self.table.as_ref()
    }

    fn placement(&self) -> Option<(usize, &DispatchTable)> {
        Some((self.displacement?, self.table.as_ref()?))
    }
}

/// State owned by layouts registered with external offsets.
#[derive(Debug)]
pub struct ExternalLayout {
    ops: Option<ExternalOps>,
}

impl ExternalLayout {
    /// Instance operations supplied at registration, if any.
    pub fn ops(&self) -> Option<&ExternalOps> {
        self.ops.as_ref()
    }
}

/// A layout strategy that a generic [`TypeLayout`] can be narrowed to.
pub trait LayoutStrategy: Sized + 'static {
    const TOKEN: StrategyToken;

    fn narrow(strategy: &Strategy) -> Option<&Self>;
}

impl LayoutStrategy for ComputedLayout {
    const TOKEN: StrategyToken = StrategyToken::COMPUTED;

    fn narrow(strategy: &Strategy) -> Option<&Self> {
        match strategy {
            Strategy::Computed(computed) => Some(computed),
            Strategy::External(_) => None,
        }
    }
}

impl LayoutStrategy for ExternalLayout {
    const TOKEN: StrategyToken = StrategyToken::EXTERNAL;

    fn narrow(strategy: &Strategy) -> Option<&Self> {
        match strategy {
            Strategy::External(external) => Some(external),
            Strategy::Computed(_) => None,
        }
    }
}

impl Strategy {
    pub fn token(&self) -> StrategyToken {
        match self {
            Strategy::Computed(_) => ComputedLayout::TOKEN,
            Strategy::External(_) => ExternalLayout::TOKEN,
        }
    }
}

impl TypeLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> TypeToken {
        self.token
    }

    pub fn parent(&self) -> Option<&'static TypeLayout> {
        self.parent
    }

    /// Total instance size in bytes, always a multiple of [`align`](Self::align).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// This type's own members, in declaration order. Inherited members are not included.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// This type's own dispatch slots, in declaration order.
    pub fn slots(&self) -> &[DispatchSlot] {
        &self.slots
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn strategy_token(&self) -> StrategyToken {
        self.strategy.token()
    }

    /// Narrows this layout to a concrete strategy.
    pub fn narrow<S: LayoutStrategy>(&self) -> Option<&S> {
        if self.strategy_token() != S::TOKEN {
            return None;
        }
        S::narrow(&self.strategy)
    }

    pub fn table_displacement(&self) -> Option<usize> {
        self.narrow::<ComputedLayout>()?.displacement
    }

    pub fn dispatch_table(&self) -> Option<&DispatchTable> {
        self.narrow::<ComputedLayout>()?.table.as_ref()
    }

    /// Allocation layout for one instance.
    ///
    /// Zero-sized types still get a one-byte block so every instance has a
    /// unique, non-dangling address.
    pub fn alloc_layout(&self) -> Result<core::alloc::Layout, LayoutError> {
        core::alloc::Layout::from_size_align(self.size.max(1), self.align).map_err(|_| {
            LayoutError::SizeOverflow {
                type_name: self.name.clone(),
            }
        })
    }

    /// Finds one of this type's own members. Parents are not searched.
    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name() == name)
    }

    /// Finds a member on this type or the closest ancestor declaring it.
    pub fn find_member_in_hierarchy(&self, name: &str) -> Option<&Member> {
        self.find_member_with_owner(name).map(|(_, member)| member)
    }

    /// Like [`find_member_in_hierarchy`](Self::find_member_in_hierarchy), also
    /// returning the layout that declares the member.
    pub fn find_member_with_owner(&self, name: &str) -> Option<(&TypeLayout, &Member)> {
        self.ancestors()
            .find_map(|layout| layout.find_member(name).map(|member| (layout, member)))
    }

    /// Whether [`initialize`](Self::initialize) gives this type's own members
    /// defined values.
    ///
    /// External layouts registered without ops leave their storage untouched.
    pub fn initializes_members(&self) -> bool {
        match &self.strategy {
            Strategy::Computed(_) => true,
            Strategy::External(external) => external.ops.is_some(),
        }
    }

    /// Finds one of this type's own dispatch slots. Parents are not searched.
    pub fn find_slot(&self, name: &str) -> Option<&DispatchSlot> {
        self.slots.iter().find(|s| s.name() == name)
    }

    pub fn find_slot_in_hierarchy(&self, name: &str) -> Option<&DispatchSlot> {
        self.ancestors().find_map(|layout| layout.find_slot(name))
    }

    /// This layout followed by its parent, grandparent, and so on.
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeLayout> {
        core::iter::successors(Some(self), |layout| layout.parent.map(|p| p as &TypeLayout))
    }

    /// The inheritance chain from the root type down to this one.
    pub fn lineage(&self) -> SmallVec<[&TypeLayout; 4]> {
        let mut chain: SmallVec<[&TypeLayout; 4]> = self.ancestors().collect();
        chain.reverse();
        chain
    }

    /// True if `token` identifies this layout or one of its ancestors.
    pub fn is_same_or_descendant_of(&self, token: TypeToken) -> bool {
        self.ancestors().any(|layout| layout.token == token)
    }

    /// Binds `binding` to `slot` in this type's dispatch table.
    ///
    /// The slot must belong to this type's table: its displacement must match the
    /// table displacement and its index must be in range. Slots declared by an
    /// ancestor are accepted when the table was inherited from it. Overrides only
    /// affect this type's table; derived types computed earlier keep the bindings
    /// they inherited.
    pub fn register_override(&self, slot: &DispatchSlot, binding: Binding) -> Result<(), LayoutError> {
        let invalid = |reason| LayoutError::InvalidOverride {
            type_name: self.name.clone(),
            slot: slot.name().into(),
            reason,
        };

        let Some((displacement, table)) = self
            .narrow::<ComputedLayout>()
            .and_then(ComputedLayout::placement)
        else {
            return Err(invalid(OverrideMismatch::NoTable));
        };
        if slot.displacement() != Some(displacement) {
            return Err(invalid(OverrideMismatch::Displacement {
                slot: slot.displacement(),
                table: displacement,
            }));
        }
        let Some(index) = slot.index() else {
            return Err(invalid(OverrideMismatch::Index {
                index: None,
                len: table.len(),
            }));
        };
        table.rebind(index, binding).map_err(|len| {
            invalid(OverrideMismatch::Index {
                index: Some(index),
                len,
            })
        })?;

        tracing::debug!(type_name = %self.name, slot = slot.name(), index, "registered override");
        Ok(())
    }

    /// Looks up a slot by name in this type's hierarchy and overrides it.
    pub fn override_method(&self, name: &str, binding: Binding) -> Result<(), LayoutError> {
        let slot = self
            .find_slot_in_hierarchy(name)
            .ok_or_else(|| LayoutError::UnknownSlot {
                type_name: self.name.clone(),
                slot: name.into(),
            })?;
        self.register_override(slot, binding)
    }

    /// Default-initializes an instance in place.
    ///
    /// The parent segment is initialized first, then the table pointer is
    /// written, then this type's members in declaration order.
    ///
    /// # Safety
    ///
    /// `instance` must point to `size()` writable bytes aligned to `align()` that
    /// hold no live instance. For computed layouts with a dispatch table, `self`
    /// must outlive the instance (layouts from the registry live forever).
    pub unsafe fn initialize(&self, instance: NonNull<u8>) {
        if let Some(parent) = self.parent {
            // SAFETY: the parent occupies a prefix of this block.
            unsafe { parent.initialize(instance) };
        }
        match &self.strategy {
            Strategy::Computed(computed) => {
                if let Some((displacement, table)) = computed.placement() {
                    // SAFETY: the displacement is aligned for a pointer and inside the block.
                    unsafe { write_table_pointer(instance, displacement, table) };
                }
                for (member, address) in elements(&self.members, instance) {
                    // SAFETY: members of computed layouts are resolved and in bounds.
                    unsafe { member.value().initialize(address) };
                }
            }
            Strategy::External(external) => {
                if let Some(ops) = &external.ops {
                    // SAFETY: forwarded from the caller.
                    unsafe { (ops.initialize)(instance) };
                }
            }
        }
    }

    /// Finalizes an instance in place, leaving the memory uninitialized.
    ///
    /// Derived segments are finalized before their parents. Within a segment,
    /// members are finalized in declaration order. Before the parent segment is
    /// finalized the table pointer is switched back to the parent's table, so
    /// dispatch from a parent's members never reaches derived overrides.
    ///
    /// # Safety
    ///
    /// `instance` must point to an instance initialized with this layout.
    pub unsafe fn finalize(&self, instance: NonNull<u8>) {
        match &self.strategy {
            Strategy::Computed(computed) => {
                for (member, address) in elements(&self.members, instance) {
                    // SAFETY: members of computed layouts are resolved and in bounds.
                    unsafe { member.value().finalize(address) };
                }
                let parent_placement = self
                    .parent
                    .and_then(|p| p.narrow::<ComputedLayout>())
                    .and_then(ComputedLayout::placement);
                if let (Some(displacement), Some((parent_displacement, parent_table))) =
                    (computed.displacement, parent_placement)
                {
                    if displacement == parent_displacement {
                        // SAFETY: same slot as written by `initialize`.
                        unsafe { write_table_pointer(instance, displacement, parent_table) };
                    }
                }
            }
            Strategy::External(external) => {
                if let Some(ops) = &external.ops {
                    // SAFETY: forwarded from the caller.
                    unsafe { (ops.finalize)(instance) };
                }
            }
        }
        if let Some(parent) = self.parent {
            // SAFETY: the parent occupies a prefix of this block.
            unsafe { parent.finalize(instance) };
        }
    }

    /// Copy-assigns every member of `src` into `dest`, parent segment first.
    ///
    /// Table pointers are left alone: both instances already point to this
    /// type's table.
    ///
    /// # Safety
    ///
    /// Both pointers must point to instances initialized with this layout. This
    /// is an assignment, `dest` is not a placement target.
    pub unsafe fn copy_assign(&self, dest: NonNull<u8>, src: NonNull<u8>) {
        if dest == src {
            return;
        }
        if let Some(parent) = self.parent {
            // SAFETY: the parent occupies a prefix of both blocks.
            unsafe { parent.copy_assign(dest, src) };
        }
        match &self.strategy {
            Strategy::Computed(_) => {
                let pairs = elements(&self.members, dest).zip(elements(&self.members, src));
                for ((member, d), (_, s)) in pairs {
                    // SAFETY: both addresses are inside initialized instances.
                    unsafe { member.value().copy_assign(d, s) };
                }
            }
            Strategy::External(external) => {
                if let Some(ops) = &external.ops {
                    // SAFETY: forwarded from the caller.
                    unsafe { (ops.copy_assign)(dest, src) };
                }
            }
        }
    }
}

unsafe fn write_table_pointer(instance: NonNull<u8>, displacement: usize, table: &DispatchTable) {
    // SAFETY: the caller guarantees `displacement` is a pointer-aligned slot in the block.
    unsafe {
        instance
            .add(displacement)
            .cast::<*const DispatchTable>()
            .write(table as *const DispatchTable);
    }
}

/// Every element address of every resolved member, in declaration order.
fn elements(
    members: &[Member],
    instance: NonNull<u8>,
) -> impl Iterator<Item = (&Member, NonNull<u8>)> {
    members.iter().flat_map(move |member| {
        (0..member.count()).filter_map(move |index| Some((member, member.address_in(instance, index)?)))
    })
}

impl fmt::Debug for TypeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeLayout")
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name()))
            .field("size", &self.size)
            .field("align", &self.align)
            .field("members", &self.members)
            .field("slots", &self.slots)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Renders the byte map of an instance, root type first.
impl fmt::Display for TypeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (size {}, align {})", self.name, self.size, self.align)?;
        for layout in self.lineage() {
            writeln!(f)?;
            write!(f, "  {}:", layout.name)?;
            if let (Some(displacement), Some(table)) =
                (layout.table_displacement(), layout.dispatch_table())
            {
                if layout.parent.and_then(|p| p.table_displacement()) != Some(displacement) {
                    write!(f, "\n    @{displacement}: dispatch table ({} slots)", table.len())?;
                }
            }
            for member in &layout.members {
                match member.offset() {
                    Some(offset) => write!(f, "\n    @{offset}: ")?,
                    None => write!(f, "\n    @?: ")?,
                }
                write!(f, "{}: {}", member.name(), member.value().type_name())?;
                if member.count() != 1 {
                    write!(f, "[{}]", member.count())?;
                }
            }
        }
        Ok(())
    }
}
