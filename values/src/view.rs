//! Typed access to the members and methods of an initialized instance.
//!
//! Views pair a raw instance pointer with the layout that governs it. All
//! lookups go through the layout by name, walking the parent chain, and every
//! typed accessor checks the member's descriptor against the requested type.

#![allow(unsafe_code)]

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use alloc::string::ToString;

use dynlayout_types::{LayoutError, Member, PrimitiveValue, TypeLayout};

/// Shared view of an initialized instance.
#[derive(Clone, Copy)]
pub struct InstanceRef<'a> {
    layout: &'static TypeLayout,
    ptr: NonNull<u8>,
    _marker: PhantomData<&'a ()>,
}

/// Exclusive view of an initialized instance.
pub struct InstanceMut<'a> {
    layout: &'static TypeLayout,
    ptr: NonNull<u8>,
    _marker: PhantomData<&'a mut ()>,
}

static_assertions::assert_impl_all!(InstanceRef<'static>: Copy);
static_assertions::assert_eq_size!(InstanceRef<'static>, [usize; 2]);

/// A member found by name, with the layout that declares it.
#[derive(Clone, Copy)]
struct Found {
    owner: &'static TypeLayout,
    member: &'static Member,
}

fn find_member(layout: &'static TypeLayout, name: &str) -> Result<Found, LayoutError> {
    layout
        .find_member_with_owner(name)
        .map(|(owner, member)| Found { owner, member })
        .ok_or_else(|| LayoutError::UnknownMember {
            type_name: layout.name().into(),
            member: name.into(),
        })
}

/// Finds `name` and checks that it holds `T`.
fn typed_member<T: PrimitiveValue>(
    layout: &'static TypeLayout,
    name: &str,
    count: Option<usize>,
) -> Result<Found, LayoutError> {
    let found = find_member(layout, name)?;
    let member = found.member;
    let count_matches = count.is_none_or(|count| member.count() == count);
    if !member.value().is::<T>() || !count_matches {
        let actual = if member.count() == 1 {
            member.value().type_name().to_string()
        } else {
            alloc::format!("{}[{}]", member.value().type_name(), member.count())
        };
        return Err(LayoutError::TypeMismatch {
            member: name.into(),
            expected: T::NAME,
            actual,
        });
    }
    Ok(found)
}

/// True for an optional member the layout never placed.
fn is_absent(found: Found) -> bool {
    found.member.is_optional() && !found.member.is_resolved()
}

/// Address of a member holding a defined value.
///
/// Members of external layouts without ops are never initialized, so they
/// cannot be viewed.
fn address(found: Found, ptr: NonNull<u8>) -> Result<NonNull<u8>, LayoutError> {
    let Found { owner, member } = found;
    let addr = member
        .address_in(ptr, 0)
        .ok_or_else(|| LayoutError::UnresolvedMember {
            member: member.name().into(),
        })?;
    if !owner.initializes_members() {
        return Err(LayoutError::UninitializedMember {
            type_name: owner.name().into(),
            member: member.name().into(),
        });
    }
    Ok(addr)
}

fn nested_layout(member: &Member) -> Result<&'static TypeLayout, LayoutError> {
    member
        .value()
        .nested_layout()
        .ok_or_else(|| LayoutError::TypeMismatch {
            member: member.name().into(),
            expected: "nested type",
            actual: member.value().type_name().into(),
        })
}

impl<'a> InstanceRef<'a> {
    /// # Safety
    ///
    /// `ptr` must point to an instance initialized with `layout` that stays
    /// alive and unmodified for `'a`.
    pub unsafe fn from_raw(layout: &'static TypeLayout, ptr: NonNull<u8>) -> Self {
        Self {
            layout,
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn layout(&self) -> &'static TypeLayout {
        self.layout
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Reads a scalar member of type `T`.
    pub fn get<T: PrimitiveValue>(&self, name: &str) -> Result<&'a T, LayoutError> {
        let found = typed_member::<T>(self.layout, name, Some(1))?;
        let addr = address(found, self.ptr)?;
        // SAFETY: the member holds an initialized `T` inside this instance.
        Ok(unsafe { addr.cast::<T>().as_ref() })
    }

    /// Like [`get`](Self::get), but an optional member the layout never placed
    /// reads as `None`.
    pub fn get_opt<T: PrimitiveValue>(&self, name: &str) -> Result<Option<&'a T>, LayoutError> {
        let found = typed_member::<T>(self.layout, name, Some(1))?;
        if is_absent(found) {
            return Ok(None);
        }
        let addr = address(found, self.ptr)?;
        // SAFETY: as in `get`.
        Ok(Some(unsafe { addr.cast::<T>().as_ref() }))
    }

    /// Reads every element of a member of type `T`, scalar or inline array.
    pub fn slice<T: PrimitiveValue>(&self, name: &str) -> Result<&'a [T], LayoutError> {
        let found = typed_member::<T>(self.layout, name, None)?;
        let addr = address(found, self.ptr)?;
        // SAFETY: `count` initialized `T`s are laid out contiguously at the member offset.
        Ok(unsafe { core::slice::from_raw_parts(addr.cast::<T>().as_ptr(), found.member.count()) })
    }

    /// A view of a nested member, governed by the nested type's layout.
    pub fn nested(&self, name: &str) -> Result<InstanceRef<'a>, LayoutError> {
        let found = find_member(self.layout, name)?;
        let layout = nested_layout(found.member)?;
        let addr = address(found, self.ptr)?;
        // SAFETY: nested members are initialized with their own layout.
        Ok(unsafe { InstanceRef::from_raw(layout, addr) })
    }

    /// Looks up the current binding of a dispatch slot.
    ///
    /// Returns `Ok(None)` for an optional slot with no override. A required slot
    /// with no override traps.
    pub fn method<F: Any + Clone>(&self, name: &str) -> Result<Option<F>, LayoutError> {
        let slot = self
            .layout
            .find_slot_in_hierarchy(name)
            .ok_or_else(|| LayoutError::UnknownSlot {
                type_name: self.layout.name().into(),
                slot: name.into(),
            })?;
        // SAFETY: the instance is initialized, so its table pointer is valid.
        unsafe { slot.lookup::<F>(self.ptr) }
    }

    /// Views this instance as one of its ancestors.
    ///
    /// Returns `None` if `ancestor` is not this instance's type or one of its
    /// parents.
    pub fn cast(&self, ancestor: &'static TypeLayout) -> Option<InstanceRef<'a>> {
        if !self.layout.is_same_or_descendant_of(ancestor.token()) {
            return None;
        }
        // SAFETY: a parent instance is a prefix of its descendants.
        Some(unsafe { InstanceRef::from_raw(ancestor, self.ptr) })
    }
}

impl<'a> InstanceMut<'a> {
    /// # Safety
    ///
    /// `ptr` must point to an instance initialized with `layout`, alive for `'a`
    /// and not accessed through any other pointer meanwhile.
    pub unsafe fn from_raw(layout: &'static TypeLayout, ptr: NonNull<u8>) -> Self {
        Self {
            layout,
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn layout(&self) -> &'static TypeLayout {
        self.layout
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Reborrows as a shared view.
    pub fn as_ref(&self) -> InstanceRef<'_> {
        // SAFETY: `&self` keeps the exclusive view from being used meanwhile.
        unsafe { InstanceRef::from_raw(self.layout, self.ptr) }
    }

    pub fn get<T: PrimitiveValue>(&self, name: &str) -> Result<&T, LayoutError> {
        self.as_ref().get(name)
    }

    pub fn get_mut<T: PrimitiveValue>(&mut self, name: &str) -> Result<&mut T, LayoutError> {
        let found = typed_member::<T>(self.layout, name, Some(1))?;
        let mut addr = address(found, self.ptr)?.cast::<T>();
        // SAFETY: the member holds an initialized `T` and `&mut self` is exclusive.
        Ok(unsafe { addr.as_mut() })
    }

    pub fn get_opt_mut<T: PrimitiveValue>(&mut self, name: &str) -> Result<Option<&mut T>, LayoutError> {
        let found = typed_member::<T>(self.layout, name, Some(1))?;
        if is_absent(found) {
            return Ok(None);
        }
        let mut addr = address(found, self.ptr)?.cast::<T>();
        // SAFETY: as in `get_mut`.
        Ok(Some(unsafe { addr.as_mut() }))
    }

    /// Replaces a scalar member, dropping the previous value.
    pub fn set<T: PrimitiveValue>(&mut self, name: &str, value: T) -> Result<(), LayoutError> {
        *self.get_mut::<T>(name)? = value;
        Ok(())
    }

    pub fn slice_mut<T: PrimitiveValue>(&mut self, name: &str) -> Result<&mut [T], LayoutError> {
        let found = typed_member::<T>(self.layout, name, None)?;
        let addr = address(found, self.ptr)?;
        // SAFETY: as in `InstanceRef::slice`, and `&mut self` is exclusive.
        Ok(unsafe { core::slice::from_raw_parts_mut(addr.cast::<T>().as_ptr(), found.member.count()) })
    }

    pub fn nested_mut(&mut self, name: &str) -> Result<InstanceMut<'_>, LayoutError> {
        let found = find_member(self.layout, name)?;
        let layout = nested_layout(found.member)?;
        let addr = address(found, self.ptr)?;
        // SAFETY: nested members are initialized with their own layout, and the
        // returned view borrows `self` exclusively.
        Ok(unsafe { InstanceMut::from_raw(layout, addr) })
    }

    /// Copy-assigns every member of `src` into this instance.
    ///
    /// Both instances must have exactly the same layout.
    pub fn copy_from(&mut self, src: InstanceRef<'_>) -> Result<(), LayoutError> {
        if src.layout().token() != self.layout.token() {
            return Err(LayoutError::TypeMismatch {
                member: self.layout.name().into(),
                expected: "an instance of the same type",
                actual: src.layout().name().into(),
            });
        }
        // SAFETY: both point to initialized instances of this layout.
        unsafe { self.layout.copy_assign(self.ptr, src.as_ptr()) };
        Ok(())
    }
}

impl fmt::Debug for InstanceRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRef")
            .field("type", &self.layout.name())
            .field("ptr", &self.ptr)
            .finish()
    }
}

impl fmt::Debug for InstanceMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMut")
            .field("type", &self.layout.name())
            .field("ptr", &self.ptr)
            .finish()
    }
}
