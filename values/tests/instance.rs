use std::cell::Cell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use bumpalo::Bump;
use dynlayout_types::{PrimitiveValue, Registry, RegistryOptions, TypeLayout};
use dynlayout_values::Instance;
use pretty_assertions::assert_eq;

// =============================================================================
// Helpers
// =============================================================================

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

/// Tracks how many values are alive on the current thread.
#[derive(Debug, PartialEq)]
struct Probe(u32);

impl Default for Probe {
    fn default() -> Self {
        LIVE.with(|c| c.set(c.get() + 1));
        Probe(0)
    }
}

impl Clone for Probe {
    fn clone(&self) -> Self {
        LIVE.with(|c| c.set(c.get() + 1));
        Probe(self.0)
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        LIVE.with(|c| c.set(c.get() - 1));
    }
}

impl PrimitiveValue for Probe {
    const NAME: &'static str = "Probe";
}

fn live() -> isize {
    LIVE.with(Cell::get)
}

fn leak_registry() -> &'static Registry {
    Box::leak(Box::new(Registry::new(RegistryOptions::default())))
}

fn player(registry: &'static Registry) -> &'static TypeLayout {
    registry
        .realize("Player", None, |s| {
            s.primitive::<String>("name")
                .primitive::<u32>("score")
                .primitive::<Probe>("probe");
        })
        .unwrap()
}

// =============================================================================
// Owning
// =============================================================================

#[test]
fn owning_instance_is_default_initialized() {
    let layout = player(leak_registry());
    let instance = Instance::new(layout).unwrap();

    assert!(instance.is_owning());
    let view = instance.view().unwrap();
    assert_eq!(view.get::<String>("name").unwrap(), "");
    assert_eq!(*view.get::<u32>("score").unwrap(), 0);

    let addr = instance.as_ptr().unwrap().as_ptr() as usize;
    assert_eq!(addr % layout.align(), 0);
}

#[test]
fn owning_instance_finalizes_on_drop() {
    let layout = player(leak_registry());
    let before = live();
    {
        let _instance = Instance::new(layout).unwrap();
        assert_eq!(live(), before + 1);
    }
    assert_eq!(live(), before);
}

#[test]
fn clone_of_owning_is_a_deep_copy() {
    let layout = player(leak_registry());
    let mut original = Instance::new(layout).unwrap();
    {
        let mut view = original.view_mut().unwrap();
        view.set("name", "ada".to_string()).unwrap();
        view.set("score", 99u32).unwrap();
        view.set("probe", Probe(7)).unwrap();
    }

    let mut copy = original.clone();
    assert_ne!(copy.as_ptr(), original.as_ptr());
    let view = copy.view().unwrap();
    assert_eq!(view.get::<String>("name").unwrap(), "ada");
    assert_eq!(*view.get::<u32>("score").unwrap(), 99);
    assert_eq!(*view.get::<Probe>("probe").unwrap(), Probe(7));

    // Mutating the copy leaves the original alone.
    copy.view_mut().unwrap().set("score", 1u32).unwrap();
    assert_eq!(*original.view().unwrap().get::<u32>("score").unwrap(), 99);
}

#[test]
fn clone_from_ref_copies_a_view() {
    let layout = player(leak_registry());
    let mut source = Instance::new(layout).unwrap();
    source.view_mut().unwrap().set("score", 12u32).unwrap();

    let copy = Instance::clone_from_ref(source.view().unwrap()).unwrap();
    assert!(copy.is_owning());
    assert_eq!(*copy.view().unwrap().get::<u32>("score").unwrap(), 12);
}

#[test]
fn take_moves_and_leaves_empty() {
    let layout = player(leak_registry());
    let before = live();
    let mut source = Instance::new(layout).unwrap();
    let ptr = source.as_ptr();

    let moved = source.take();
    assert!(source.is_empty());
    assert!(source.view().is_none());
    assert_eq!(moved.as_ptr(), ptr);
    assert_eq!(live(), before + 1);

    drop(source);
    assert_eq!(live(), before + 1);
    drop(moved);
    assert_eq!(live(), before);
}

#[test]
fn release_is_idempotent() {
    let layout = player(leak_registry());
    let before = live();
    let mut instance = Instance::new(layout).unwrap();
    instance.release();
    assert!(instance.is_empty());
    assert_eq!(live(), before);
    instance.release();
    assert_eq!(live(), before);

    let empty = Instance::empty(layout);
    assert!(empty.clone().is_empty());
}

#[test]
fn zero_sized_type_gets_distinct_blocks() {
    let registry = leak_registry();
    let layout = registry.realize("Nothing", None, |_| {}).unwrap();
    let a = Instance::new(layout).unwrap();
    let b = Instance::new(layout).unwrap();
    assert_eq!(layout.size(), 0);
    assert_ne!(a.as_ptr(), b.as_ptr());
}

// =============================================================================
// Borrowing
// =============================================================================

#[test]
fn borrowed_memory_is_initialized_in_place() {
    let registry = leak_registry();
    let layout = registry
        .realize("Pair", None, |s| {
            s.primitive::<u32>("a").primitive::<u32>("b");
        })
        .unwrap();
    assert_eq!(layout.size(), 8);

    let mut storage = MaybeUninit::<[u32; 2]>::uninit();
    let ptr = NonNull::new(storage.as_mut_ptr().cast::<u8>()).unwrap();
    let mut instance = unsafe { Instance::borrowed(layout, ptr) };
    assert!(instance.is_borrowing());
    assert_eq!(instance.as_ptr(), Some(ptr));

    instance.view_mut().unwrap().set("b", 5u32).unwrap();
    drop(instance);
    assert_eq!(unsafe { storage.assume_init() }, [0, 5]);
}

#[test]
fn arena_instance_finalizes_but_does_not_free() {
    let layout = player(leak_registry());
    let arena = Bump::new();
    let before = live();

    let mut instance = Instance::in_arena(layout, &arena).unwrap();
    assert!(instance.is_borrowing());
    assert_eq!(live(), before + 1);
    let ptr = instance.as_ptr().unwrap();
    assert!(arena.allocated_bytes() >= layout.size());

    instance.release();
    assert_eq!(live(), before);
    assert!(instance.is_empty());
    // The arena still owns the block.
    assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
}

#[test]
fn clone_of_borrowing_is_owning() {
    let layout = player(leak_registry());
    let arena = Bump::new();
    let mut borrowed = Instance::in_arena(layout, &arena).unwrap();
    borrowed.view_mut().unwrap().set("score", 3u32).unwrap();

    let copy = borrowed.clone();
    assert!(copy.is_owning());
    assert_ne!(copy.as_ptr(), borrowed.as_ptr());
    assert_eq!(*copy.view().unwrap().get::<u32>("score").unwrap(), 3);
}

// =============================================================================
// Inheritance
// =============================================================================

#[test]
fn three_level_chain_runs_every_member_once() {
    let registry = leak_registry();
    let grandparent = registry
        .realize("Entity", None, |s| {
            s.primitive::<Probe>("id");
        })
        .unwrap();
    let parent = registry
        .realize("Actor", Some(grandparent), |s| {
            s.method("tick");
        })
        .unwrap();
    let child = registry
        .realize("Pawn", Some(parent), |s| {
            s.primitive::<Probe>("controller");
        })
        .unwrap();

    let before = live();
    let instance = Instance::new(child).unwrap();
    assert_eq!(live(), before + 2);
    assert!(instance.is_instance_of(grandparent));
    assert!(instance.is_instance_of(parent));

    let as_entity = instance.view().unwrap().cast(grandparent).unwrap();
    assert_eq!(as_entity.layout().name(), "Entity");
    assert!(as_entity.get::<Probe>("id").is_ok());

    drop(instance);
    assert_eq!(live(), before);
}
