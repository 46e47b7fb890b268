//! Type-erased value operations.
//!
//! A [`ValueDescriptor`] knows how big one value is, how it must be aligned, and
//! how to default-initialize, finalize and copy-assign it through raw pointers.
//! Layouts use descriptors to drive every member without knowing its Rust type.
//!
//! ```text
//! ValueDescriptor::Primitive ──▶ PrimitiveOps { size, align, fn ptrs }   (one Rust type)
//! ValueDescriptor::Nested    ──▶ TypeLayout                               (another record)
//! ```
//!
//! # Safety
//!
//! The raw operations take pointers to blocks of exactly [`size`](ValueDescriptor::size)
//! bytes aligned to [`align`](ValueDescriptor::align). Nothing is checked at runtime.

#![allow(unsafe_code)]

use core::any::TypeId;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use alloc::string::String;

use crate::layout::TypeLayout;

/// A Rust type that can be stored directly in a dynamic type.
///
/// `Default` provides the initial value, `Clone` drives copy-assignment and
/// `Drop` runs on finalization.
pub trait PrimitiveValue: Default + Clone + Send + Sync + 'static {
    /// Name reported by descriptors, e.g. `"i32"`.
    const NAME: &'static str;
}

macro_rules! impl_primitive_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl PrimitiveValue for $ty {
                const NAME: &'static str = stringify!($ty);
            }
        )*
    };
}

impl_primitive_value!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, String,
);

/// Monomorphized operations for one [`PrimitiveValue`].
#[derive(Clone, Copy)]
pub struct PrimitiveOps {
    name: &'static str,
    size: usize,
    align: usize,
    type_id: fn() -> TypeId,
    default_in_place: unsafe fn(NonNull<u8>),
    drop_in_place: unsafe fn(NonNull<u8>),
    clone_assign: unsafe fn(NonNull<u8>, NonNull<u8>),
}

unsafe fn default_in_place<T: Default>(ptr: NonNull<u8>) {
    // SAFETY: the caller hands us an uninitialized, aligned block for `T`.
    unsafe { ptr.cast::<T>().write(T::default()) }
}

unsafe fn drop_in_place<T>(ptr: NonNull<u8>) {
    // SAFETY: the caller hands us an initialized `T` that is not used afterwards.
    unsafe { ptr.cast::<T>().drop_in_place() }
}

unsafe fn clone_assign<T: Clone>(dest: NonNull<u8>, src: NonNull<u8>) {
    // SAFETY: both point to initialized, distinct `T`s.
    unsafe {
        let mut dest = dest.cast::<T>();
        dest.as_mut().clone_from(src.cast::<T>().as_ref());
    }
}

impl PrimitiveOps {
    pub const fn new<T: PrimitiveValue>() -> Self {
        Self {
            name: T::NAME,
            size: size_of::<T>(),
            align: align_of::<T>(),
            type_id: TypeId::of::<T>,
            default_in_place: default_in_place::<T>,
            drop_in_place: drop_in_place::<T>,
            clone_assign: clone_assign::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }
}

impl fmt::Debug for PrimitiveOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveOps")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Holds the shared descriptor of each primitive type.
struct OpsOf<T>(PhantomData<T>);

impl<T: PrimitiveValue> OpsOf<T> {
    const OPS: &'static PrimitiveOps = &PrimitiveOps::new::<T>();
}

/// Type-erased operations for one kind of value.
#[derive(Clone, Copy)]
pub enum ValueDescriptor {
    Primitive(&'static PrimitiveOps),
    Nested(&'static TypeLayout),
}

impl ValueDescriptor {
    /// Descriptor for a primitive Rust type.
    pub fn primitive<T: PrimitiveValue>() -> Self {
        ValueDescriptor::Primitive(OpsOf::<T>::OPS)
    }

    /// Descriptor for a member whose type is itself a dynamic type.
    pub fn nested(layout: &'static TypeLayout) -> Self {
        ValueDescriptor::Nested(layout)
    }

    pub fn type_name(&self) -> &str {
        match self {
            ValueDescriptor::Primitive(ops) => ops.name,
            ValueDescriptor::Nested(layout) => layout.name(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ValueDescriptor::Primitive(ops) => ops.size,
            ValueDescriptor::Nested(layout) => layout.size(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            ValueDescriptor::Primitive(ops) => ops.align,
            ValueDescriptor::Nested(layout) => layout.align(),
        }
    }

    /// The layout of a nested member, `None` for primitives.
    pub fn nested_layout(&self) -> Option<&'static TypeLayout> {
        match self {
            ValueDescriptor::Primitive(_) => None,
            ValueDescriptor::Nested(layout) => Some(layout),
        }
    }

    /// Whether values described by this descriptor are `T`s.
    pub fn is<T: PrimitiveValue>(&self) -> bool {
        match self {
            ValueDescriptor::Primitive(ops) => ops.type_id() == TypeId::of::<T>(),
            ValueDescriptor::Nested(_) => false,
        }
    }

    /// Default-initializes the value at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `size()` writable bytes aligned to `align()` that do
    /// not currently hold a live value.
    pub unsafe fn initialize(&self, ptr: NonNull<u8>) {
        match self {
            // SAFETY: forwarded from the caller.
            ValueDescriptor::Primitive(ops) => unsafe { (ops.default_in_place)(ptr) },
            ValueDescriptor::Nested(layout) => unsafe { layout.initialize(ptr) },
        }
    }

    /// Finalizes the value at `ptr`, leaving the memory uninitialized.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a value previously set up by [`initialize`](Self::initialize).
    pub unsafe fn finalize(&self, ptr: NonNull<u8>) {
        match self {
            // SAFETY: forwarded from the caller.
            ValueDescriptor::Primitive(ops) => unsafe { (ops.drop_in_place)(ptr) },
            ValueDescriptor::Nested(layout) => unsafe { layout.finalize(ptr) },
        }
    }

    /// Assigns a copy of the value at `src` to the value at `dest`.
    ///
    /// # Safety
    ///
    /// Both pointers must point to initialized values of this descriptor.
    pub unsafe fn copy_assign(&self, dest: NonNull<u8>, src: NonNull<u8>) {
        if ptr::eq(dest.as_ptr(), src.as_ptr()) {
            return;
        }
        match self {
            // SAFETY: forwarded from the caller, and `dest != src`.
            ValueDescriptor::Primitive(ops) => unsafe { (ops.clone_assign)(dest, src) },
            ValueDescriptor::Nested(layout) => unsafe { layout.copy_assign(dest, src) },
        }
    }
}

impl PartialEq for ValueDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueDescriptor::Primitive(a), ValueDescriptor::Primitive(b)) => {
                a.type_id() == b.type_id()
            }
            (ValueDescriptor::Nested(a), ValueDescriptor::Nested(b)) => a.token() == b.token(),
            _ => false,
        }
    }
}

impl Eq for ValueDescriptor {}

impl fmt::Debug for ValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDescriptor::Primitive(ops) => write!(f, "Primitive({})", ops.name),
            ValueDescriptor::Nested(layout) => write!(f, "Nested({})", layout.name()),
        }
    }
}
