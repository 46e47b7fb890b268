//! Runtime layout engine for dynamic types.
//!
//! A dynamic type is described at run time as an ordered list of members and
//! dispatch slots, optionally on top of a parent type. This crate turns such a
//! description into a [`TypeLayout`]: byte offsets for every member, a dispatch
//! table for every slot, and the raw operations that create, copy and destroy
//! instances in a caller-provided block of memory.
//!
//! # Example
//!
//! ```
//! use dynlayout_types::{Registry, RegistryOptions};
//!
//! let registry = Registry::new(RegistryOptions::default());
//! let layout = registry
//!     .realize("Point", None, |schema| {
//!         schema.primitive::<i32>("x").primitive::<i32>("y");
//!     })
//!     .unwrap();
//!
//! assert_eq!(layout.size(), 8);
//! assert_eq!(layout.find_member("y").unwrap().offset(), Some(4));
//! ```

#![deny(unsafe_code)]

extern crate alloc;

pub mod align;
pub mod dispatch;
pub mod dynamic;
pub mod error;
pub mod layout;
pub mod member;
pub mod registry;
pub mod schema;
pub mod token;
pub mod value;

pub use dispatch::{Binding, DispatchSlot, DispatchTable, trap, trap_count};
pub use dynamic::DynamicType;
pub use error::{LayoutError, OverrideMismatch};
pub use layout::{
    ComputedLayout, ExternalLayout, ExternalOps, ExternalSpec, LayoutStrategy, Strategy,
    TypeLayout,
};
pub use member::Member;
pub use registry::{Registry, RegistryOptions};
pub use schema::{CollectFn, Schema};
pub use token::{StrategyToken, TypeToken};
pub use value::{PrimitiveOps, PrimitiveValue, ValueDescriptor};

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level.
    /// Call this at the start of tests where you want to see logging output.
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Try to initialize, ignore error if already initialized
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
