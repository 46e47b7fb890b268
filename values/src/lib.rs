//! Instances of dynamic types.
//!
//! [`Instance`] owns or borrows the memory of one instance and drives its
//! lifecycle through the governing [`TypeLayout`](dynlayout_types::TypeLayout).
//! [`InstanceRef`] and [`InstanceMut`] give typed, name-based access to the
//! members and dispatch slots of an initialized instance.
//!
//! # Example
//!
//! ```
//! use dynlayout_types::{Registry, RegistryOptions};
//! use dynlayout_values::Instance;
//!
//! let registry = Registry::new(RegistryOptions::default());
//! let layout = registry
//!     .realize("Counter", None, |schema| {
//!         schema.primitive::<u64>("hits");
//!     })
//!     .unwrap();
//!
//! let mut counter = Instance::new(layout).unwrap();
//! counter.view_mut().unwrap().set("hits", 3u64).unwrap();
//!
//! let copy = counter.clone();
//! assert_eq!(copy.view().unwrap().get::<u64>("hits"), Ok(&3));
//! ```

#![deny(unsafe_code)]

extern crate alloc;

pub mod instance;
pub mod view;

pub use instance::Instance;
pub use view::{InstanceMut, InstanceRef};
