//! The instance handle: one block of memory bound to the layout that governs it.
//!
//! ```text
//! Empty ──new/in_arena/borrowed──▶ Owning | Borrowing ──release/take──▶ Empty
//! ```
//!
//! An owning handle allocates exactly `size` bytes aligned to `align` and frees
//! them on release. A borrowing handle initializes caller memory in place and
//! never allocates or frees; releasing it only finalizes the instance.

#![allow(unsafe_code)]

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use bumpalo::Bump;
use dynlayout_types::{LayoutError, TypeLayout};

use crate::view::{InstanceMut, InstanceRef};

enum State {
    Empty,
    Owning { ptr: NonNull<u8>, alloc: Layout },
    Borrowing(NonNull<u8>),
}

/// An instance of a dynamic type.
///
/// Dropping the handle is the same as calling [`release`](Self::release).
///
/// Cloning always produces an owning deep copy, including for a borrowing
/// handle. A clone of a borrowing handle does not alias the borrowed block:
/// both handles would finalize it when dropped. Shared access to the same
/// memory goes through [`view`](Self::view) instead.
pub struct Instance<'a> {
    layout: &'static TypeLayout,
    state: State,
    _marker: PhantomData<&'a mut [u8]>,
}

static_assertions::assert_not_impl_any!(Instance<'static>: Send, Sync);

fn allocate(layout: &'static TypeLayout, alloc: Layout) -> NonNull<u8> {
    // SAFETY: `alloc` has a non-zero size.
    let raw = unsafe { std::alloc::alloc(alloc) };
    let Some(ptr) = NonNull::new(raw) else {
        std::alloc::handle_alloc_error(alloc);
    };
    tracing::trace!(type_name = layout.name(), size = alloc.size(), "allocated instance");
    ptr
}

impl Instance<'static> {
    /// Allocates and default-initializes an owning instance.
    pub fn new(layout: &'static TypeLayout) -> Result<Self, LayoutError> {
        let alloc = layout.alloc_layout()?;
        let ptr = allocate(layout, alloc);
        // SAFETY: fresh block of the layout's size and alignment.
        unsafe { layout.initialize(ptr) };
        Ok(Self {
            layout,
            state: State::Owning { ptr, alloc },
            _marker: PhantomData,
        })
    }

    /// Allocates an owning instance holding a copy of `src`.
    pub fn clone_from_ref(src: InstanceRef<'_>) -> Result<Self, LayoutError> {
        let mut instance = Self::new(src.layout())?;
        if let Some(mut view) = instance.view_mut() {
            view.copy_from(src)?;
        }
        Ok(instance)
    }
}

impl<'a> Instance<'a> {
    /// A handle with no memory.
    pub fn empty(layout: &'static TypeLayout) -> Self {
        Self {
            layout,
            state: State::Empty,
            _marker: PhantomData,
        }
    }

    /// Initializes an instance in caller-provided memory.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `layout.size()` writable bytes aligned to
    /// `layout.align()`, valid for `'a` and not used by anything else while the
    /// handle is alive.
    pub unsafe fn borrowed(layout: &'static TypeLayout, ptr: NonNull<u8>) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe { layout.initialize(ptr) };
        Self {
            layout,
            state: State::Borrowing(ptr),
            _marker: PhantomData,
        }
    }

    /// Initializes a borrowing instance in memory taken from `arena`.
    ///
    /// The arena never runs destructors, but the handle still finalizes the
    /// instance when it is released or dropped.
    pub fn in_arena(layout: &'static TypeLayout, arena: &'a Bump) -> Result<Self, LayoutError> {
        let ptr = arena.alloc_layout(layout.alloc_layout()?);
        // SAFETY: the arena block is sized and aligned for `layout` and lives for `'a`.
        Ok(unsafe { Self::borrowed(layout, ptr) })
    }

    pub fn layout(&self) -> &'static TypeLayout {
        self.layout
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.state, State::Empty)
    }

    pub fn is_owning(&self) -> bool {
        matches!(self.state, State::Owning { .. })
    }

    pub fn is_borrowing(&self) -> bool {
        matches!(self.state, State::Borrowing(_))
    }

    /// Address of the instance memory, `None` when empty.
    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        match self.state {
            State::Empty => None,
            State::Owning { ptr, .. } | State::Borrowing(ptr) => Some(ptr),
        }
    }

    /// Whether this instance is of type `layout` or of a type derived from it.
    pub fn is_instance_of(&self, layout: &TypeLayout) -> bool {
        self.layout.is_same_or_descendant_of(layout.token())
    }

    pub fn view(&self) -> Option<InstanceRef<'_>> {
        let ptr = self.as_ptr()?;
        // SAFETY: non-empty handles always hold an initialized instance.
        Some(unsafe { InstanceRef::from_raw(self.layout, ptr) })
    }

    pub fn view_mut(&mut self) -> Option<InstanceMut<'_>> {
        let ptr = self.as_ptr()?;
        // SAFETY: as in `view`, and `&mut self` makes the view exclusive.
        Some(unsafe { InstanceMut::from_raw(self.layout, ptr) })
    }

    /// Moves the instance out, leaving this handle empty.
    pub fn take(&mut self) -> Instance<'a> {
        core::mem::replace(self, Instance::empty(self.layout))
    }

    /// Finalizes the instance and, for owning handles, frees its memory.
    ///
    /// The handle is empty afterwards. Releasing an empty handle does nothing.
    pub fn release(&mut self) {
        match core::mem::replace(&mut self.state, State::Empty) {
            State::Empty => {}
            State::Owning { ptr, alloc } => {
                // SAFETY: the block holds an initialized instance and is ours to free.
                unsafe {
                    self.layout.finalize(ptr);
                    std::alloc::dealloc(ptr.as_ptr(), alloc);
                }
                tracing::trace!(type_name = self.layout.name(), "freed instance");
            }
            State::Borrowing(ptr) => {
                // SAFETY: the block holds an initialized instance.
                unsafe { self.layout.finalize(ptr) };
            }
        }
    }
}

impl Clone for Instance<'_> {
    fn clone(&self) -> Self {
        let (src, alloc) = match self.state {
            State::Empty => return Instance::empty(self.layout),
            State::Owning { ptr, alloc } => (ptr, alloc),
            State::Borrowing(ptr) => match self.layout.alloc_layout() {
                Ok(alloc) => (ptr, alloc),
                // The borrowed block was sized from this layout, so this cannot fail.
                Err(_) => return Instance::empty(self.layout),
            },
        };
        let ptr = allocate(self.layout, alloc);
        // SAFETY: `ptr` is a fresh block for this layout and `src` is initialized.
        unsafe {
            self.layout.initialize(ptr);
            self.layout.copy_assign(ptr, src);
        }
        Self {
            layout: self.layout,
            state: State::Owning { ptr, alloc },
            _marker: PhantomData,
        }
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Empty => "empty",
            State::Owning { .. } => "owning",
            State::Borrowing(_) => "borrowing",
        };
        f.debug_struct("Instance")
            .field("type", &self.layout.name())
            .field("state", &state)
            .field("ptr", &self.as_ptr())
            .finish()
    }
}
