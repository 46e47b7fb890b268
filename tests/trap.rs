//! The trap counter is process-wide, so this binary holds a single test.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;

use dynlayout::prelude::*;
use dynlayout::types::{Member, RegistryOptions, ValueDescriptor, trap_count};

#[test]
fn unbound_slot_traps_exactly_once() {
    let registry = Registry::new(RegistryOptions::default());
    let layout = registry
        .realize("Sensor", None, |s| {
            s.primitive::<f64>("reading")
                .method("sample")
                .optional_method("calibrate");
        })
        .unwrap();
    let instance = Instance::new(layout).unwrap();
    let view = instance.view().unwrap();

    // An unresolved member has no address and does not touch the instance.
    let loose = Member::new("loose", ValueDescriptor::primitive::<u32>());
    assert_eq!(loose.address_in(view.as_ptr(), 0), None);

    let before = trap_count();

    // Optional slots without an override are simply absent.
    let calibrate = view.method::<fn(NonNull<u8>)>("calibrate").unwrap();
    assert!(calibrate.is_none());
    assert_eq!(trap_count(), before);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _ = view.method::<fn(NonNull<u8>)>("sample");
    }));
    assert!(result.is_err());
    assert_eq!(trap_count(), before + 1);
}
