//! Dynlayout - runtime layouts for record types described as data
//!
//! # Overview
//!
//! Dynlayout lets a program describe a record type at run time (an ordered set
//! of named members and dynamically dispatched methods, optionally extending a
//! single parent type), compute its memory layout exactly once, and then create,
//! copy and destroy instances in raw memory without compile-time knowledge of
//! their shape.
//!
//! # Quick Start
//!
//! ```
//! use dynlayout::prelude::*;
//!
//! struct Monster;
//!
//! impl DynamicType for Monster {
//!     const NAME: &'static str = "quickstart::Monster";
//!
//!     fn describe(schema: &mut Schema) -> Result<(), LayoutError> {
//!         schema
//!             .primitive::<String>("name")
//!             .primitive::<i32>("health")
//!             .method("roar");
//!         Ok(())
//!     }
//! }
//!
//! fn roar(_: std::ptr::NonNull<u8>) -> &'static str {
//!     "RAAAH"
//! }
//! type Roar = fn(std::ptr::NonNull<u8>) -> &'static str;
//!
//! let layout = Monster::layout().unwrap();
//! layout.override_method("roar", Binding::new(roar as Roar)).unwrap();
//!
//! let mut monster = Instance::new(layout).unwrap();
//! let mut view = monster.view_mut().unwrap();
//! view.set("name", String::from("grue")).unwrap();
//! view.set("health", 40).unwrap();
//!
//! let view = monster.view().unwrap();
//! assert_eq!(*view.get::<i32>("health").unwrap(), 40);
//! let roar = view.method::<Roar>("roar").unwrap().unwrap();
//! assert_eq!(roar(view.as_ptr()), "RAAAH");
//! ```
//!
//! # Crates
//!
//! - [`types`]: descriptors, layout computation, dispatch tables and the registry.
//! - [`values`]: instance handles and typed views.

pub use dynlayout_types as types;
pub use dynlayout_values as values;

pub use bumpalo::Bump;
pub use dynlayout_types::{
    Binding, DispatchSlot, DynamicType, ExternalOps, ExternalSpec, LayoutError, Member, Registry,
    RegistryOptions, Schema, TypeLayout, ValueDescriptor,
};
pub use dynlayout_values::{Instance, InstanceMut, InstanceRef};

/// The names most programs need.
pub mod prelude {
    pub use dynlayout_types::{
        Binding, DynamicType, LayoutError, PrimitiveValue, Registry, Schema, TypeLayout,
    };
    pub use dynlayout_values::{Instance, InstanceMut, InstanceRef};
}
