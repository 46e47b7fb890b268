//! Dynamically dispatched methods.
//!
//! Every type that declares (or inherits) dispatch slots owns a [`DispatchTable`].
//! Instances store a pointer to their type's table at the table displacement, so
//! a slot is resolved by reading that pointer and indexing the table:
//!
//! ```text
//! instance: [ ..parent.. | *const DispatchTable | ..members.. ]
//!                          └──▶ [ Binding, Binding, ... ]
//!                                 index 0   index 1
//! ```
//!
//! Bindings start out as [`Binding::Trap`] (or [`Binding::Absent`] for optional
//! slots) until an override is registered on the layout.

#![allow(unsafe_code)]

use core::any::{Any, type_name};
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use parking_lot::RwLock;

use crate::error::LayoutError;

/// Bytes taken by the table pointer inside an instance.
pub const TABLE_POINTER_SIZE: usize = size_of::<*const DispatchTable>();
/// Alignment of the table pointer inside an instance.
pub const TABLE_POINTER_ALIGN: usize = align_of::<*const DispatchTable>();

static_assertions::assert_eq_size!(*const DispatchTable, usize);

static TRAP_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Called when a dispatch slot without an override is invoked.
///
/// Always panics. Reaching this means a type was used before all of its
/// required methods were provided.
#[cold]
#[inline(never)]
#[track_caller]
pub fn trap(slot: &str) -> ! {
    TRAP_COUNT.fetch_add(1, Ordering::SeqCst);
    tracing::error!(slot, "dispatch slot invoked without an override");
    panic!("dispatch slot `{slot}` invoked without an override");
}

/// How many times [`trap`] has fired in this process.
pub fn trap_count() -> usize {
    TRAP_COUNT.load(Ordering::SeqCst)
}

/// What a dispatch slot currently points to.
#[derive(Clone, Default)]
pub enum Binding {
    /// Required slot with no override yet. Calling it traps.
    #[default]
    Trap,
    /// Optional slot with no override. Calling it is a no-op for the caller.
    Absent,
    /// An override. Usually a plain `fn` pointer taking the receiver first.
    Bound(Arc<dyn Any + Send + Sync>),
}

impl Binding {
    pub fn new<F: Any + Send + Sync>(callable: F) -> Self {
        Binding::Bound(Arc::new(callable))
    }

    pub(crate) fn default_for(optional: bool) -> Self {
        if optional {
            Binding::Absent
        } else {
            Binding::Trap
        }
    }

    pub fn is_trap(&self) -> bool {
        matches!(self, Binding::Trap)
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound(_))
    }

    /// Returns the bound callable as an `F`.
    ///
    /// `Ok(None)` means the slot is optional and was left unbound. A trap
    /// binding never returns: it goes straight to [`trap`].
    pub fn get<F: Any>(&self, slot: &str) -> Result<Option<&F>, LayoutError> {
        match self {
            Binding::Trap => trap(slot),
            Binding::Absent => Ok(None),
            Binding::Bound(callable) => match callable.downcast_ref::<F>() {
                Some(callable) => Ok(Some(callable)),
                None => Err(LayoutError::SignatureMismatch {
                    slot: slot.into(),
                    expected: type_name::<F>(),
                }),
            },
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Trap => write!(f, "Trap"),
            Binding::Absent => write!(f, "Absent"),
            Binding::Bound(_) => write!(f, "Bound"),
        }
    }
}

/// A named, dynamically dispatched method of a dynamic type.
pub struct DispatchSlot {
    name: String,
    optional: bool,
    displacement: Option<usize>,
    index: Option<usize>,
}

impl DispatchSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            displacement: None,
            index: None,
        }
    }

    /// A slot that defaults to [`Binding::Absent`] instead of the trap.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Byte offset of the table pointer inside an instance.
    pub fn displacement(&self) -> Option<usize> {
        self.displacement
    }

    /// Index of this slot in the dispatch table.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_resolved(&self) -> bool {
        self.displacement.is_some() && self.index.is_some()
    }

    pub(crate) fn resolve(&mut self, displacement: usize, index: usize) {
        debug_assert!(!self.is_resolved(), "dispatch slot resolved twice");
        self.displacement = Some(displacement);
        self.index = Some(index);
    }

    /// Reads the current binding of this slot for the instance at `container`.
    ///
    /// Unresolved slots resolve to [`Binding::Trap`].
    ///
    /// # Safety
    ///
    /// `container` must point to an initialized instance of a layout that owns
    /// or inherits this slot.
    pub unsafe fn resolve_in(&self, container: NonNull<u8>) -> Binding {
        let (Some(displacement), Some(index)) = (self.displacement, self.index) else {
            return Binding::Trap;
        };
        // SAFETY: initialized instances hold a valid table pointer at the
        // displacement, and tables live as long as their layouts ('static).
        let table = unsafe {
            let slot = container.add(displacement).cast::<*const DispatchTable>();
            &*slot.read()
        };
        table.binding(index)
    }

    /// Looks up this slot for `container` and returns the bound callable.
    ///
    /// # Safety
    ///
    /// Same as [`resolve_in`](Self::resolve_in).
    pub unsafe fn lookup<F: Any + Clone>(
        &self,
        container: NonNull<u8>,
    ) -> Result<Option<F>, LayoutError> {
        // SAFETY: forwarded from the caller.
        let binding = unsafe { self.resolve_in(container) };
        Ok(binding.get::<F>(&self.name)?.cloned())
    }
}

impl fmt::Debug for DispatchSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSlot")
            .field("name", &self.name)
            .field("optional", &self.optional)
            .field("displacement", &self.displacement)
            .field("index", &self.index)
            .finish()
    }
}

struct Entry {
    name: String,
    binding: Binding,
}

/// The per-type array of slot bindings.
///
/// The number of entries is fixed once the owning layout is computed. Only the
/// bindings change afterwards, through override registration.
pub struct DispatchTable {
    entries: RwLock<Vec<Entry>>,
}

impl DispatchTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// A new table starting with a snapshot of `parent`'s entries.
    pub(crate) fn inherit(parent: &DispatchTable) -> Self {
        let entries = parent
            .entries
            .read()
            .iter()
            .map(|e| Entry {
                name: e.name.clone(),
                binding: e.binding.clone(),
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.read().iter().position(|e| e.name == name)
    }

    pub fn name_at(&self, index: usize) -> Option<String> {
        self.entries.read().get(index).map(|e| e.name.clone())
    }

    /// The binding at `index`, or the trap when out of range.
    pub fn binding(&self, index: usize) -> Binding {
        self.entries
            .read()
            .get(index)
            .map(|e| e.binding.clone())
            .unwrap_or(Binding::Trap)
    }

    pub(crate) fn push(&self, name: &str, binding: Binding) -> usize {
        let mut entries = self.entries.write();
        entries.push(Entry {
            name: name.into(),
            binding,
        });
        entries.len() - 1
    }

    /// Replaces the binding at `index`. Returns the table length when out of range.
    pub(crate) fn rebind(&self, index: usize, binding: Binding) -> Result<(), usize> {
        let mut entries = self.entries.write();
        let len = entries.len();
        match entries.get_mut(index) {
            Some(entry) => {
                entry.binding = binding;
                Ok(())
            }
            None => Err(len),
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|e| (&e.name, &e.binding)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_push_and_rebind() {
        let table = DispatchTable::new();
        assert!(table.is_empty());
        assert_eq!(table.push("a", Binding::Trap), 0);
        assert_eq!(table.push("b", Binding::Absent), 1);
        assert_eq!(table.index_of("b"), Some(1));
        assert!(table.binding(0).is_trap());

        table.rebind(0, Binding::new(7i32)).unwrap();
        assert!(table.binding(0).is_bound());
        assert_eq!(table.rebind(5, Binding::Absent), Err(2));
        assert!(table.binding(99).is_trap());
    }

    #[test]
    fn inherited_table_is_a_snapshot() {
        let parent = DispatchTable::new();
        parent.push("a", Binding::Trap);
        let child = DispatchTable::inherit(&parent);
        parent.rebind(0, Binding::new(1u8)).unwrap();

        assert!(parent.binding(0).is_bound());
        assert!(child.binding(0).is_trap());
        assert_eq!(child.name_at(0).as_deref(), Some("a"));
    }

    #[test]
    fn binding_downcast() {
        fn double(x: i32) -> i32 {
            x * 2
        }
        let binding = Binding::new(double as fn(i32) -> i32);
        let f = binding.get::<fn(i32) -> i32>("double").unwrap().unwrap();
        assert_eq!(f(21), 42);

        assert!(matches!(
            binding.get::<fn(u8) -> u8>("double"),
            Err(LayoutError::SignatureMismatch { .. })
        ));
        assert!(Binding::Absent.get::<fn()>("noop").unwrap().is_none());
    }

    #[test]
    fn unresolved_slot_resolves_to_trap() {
        let slot = DispatchSlot::new("update");
        let mut storage = 0usize;
        let base = NonNull::from(&mut storage).cast::<u8>();
        assert!(unsafe { slot.resolve_in(base) }.is_trap());
    }

    #[test]
    #[should_panic(expected = "invoked without an override")]
    fn trap_binding_panics() {
        let _ = Binding::Trap.get::<fn()>("update");
    }
}
