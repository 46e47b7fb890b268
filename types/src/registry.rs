//! Process-wide cache of realized layouts.
//!
//! Each type name maps to a cell that is filled exactly once. Concurrent callers
//! asking for the same type block until the first one has finished computing it,
//! then all observe the same `&'static TypeLayout`. Computation runs outside the
//! map lock, so realizing one type can realize the types it depends on.

use core::cell::RefCell;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::align::check_alignment;
use crate::error::LayoutError;
use crate::layout::{ExternalSpec, TypeLayout};
use crate::schema::Schema;

/// Tunables for a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Largest alignment a realized type may require.
    pub max_alignment: usize,
    /// Whether [`Registry::register_external`] may replace a type that is
    /// already registered under the same name.
    pub allow_external_replace: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_alignment: 4096,
            allow_external_replace: false,
        }
    }
}

type Slot = Arc<OnceCell<&'static TypeLayout>>;

/// Realizes and caches type layouts by name.
///
/// Layouts are leaked on realization and live for the rest of the process.
pub struct Registry {
    options: RegistryOptions,
    types: RwLock<HashMap<String, Slot>>,
}

lazy_static! {
    static ref GLOBAL: Registry = Registry::new(RegistryOptions::default());
}

std::thread_local! {
    /// Types currently being realized on this thread, innermost last.
    static REALIZING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Pops the realizing stack when a realization finishes, even by panic.
struct RealizingGuard;

impl RealizingGuard {
    fn enter(registry: &Registry, name: &str) -> Result<Self, LayoutError> {
        let key = registry as *const Registry as usize;
        REALIZING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(r, n)| *r == key && n == name) {
                return Err(LayoutError::RecursiveType {
                    type_name: name.into(),
                });
            }
            stack.push((key, name.into()));
            Ok(RealizingGuard)
        })
    }
}

impl Drop for RealizingGuard {
    fn drop(&mut self) {
        REALIZING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            options,
            types: RwLock::new(HashMap::new()),
        }
    }

    /// The registry used by [`DynamicType::layout`](crate::DynamicType::layout).
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// The layout registered under `name`, if it has been realized.
    pub fn get(&self, name: &str) -> Option<&'static TypeLayout> {
        self.types.read().get(name)?.get().copied()
    }

    /// Number of realized types.
    pub fn len(&self) -> usize {
        self.types.read().values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Realizes the computed layout of `name` on first use and returns the cached
    /// one afterwards.
    ///
    /// `describe` runs at most once per name, and only if no layout has been
    /// realized yet. If a type with this name was already realized (computed or
    /// external), it is returned unchanged.
    pub fn realize(
        &self,
        name: &str,
        parent: Option<&'static TypeLayout>,
        describe: impl FnOnce(&mut Schema),
    ) -> Result<&'static TypeLayout, LayoutError> {
        self.realize_with(name, || {
            let mut schema = Schema::new();
            describe(&mut schema);
            TypeLayout::compute(name, parent, schema)
        })
    }

    /// Like [`realize`](Self::realize), with full control over how the layout
    /// is built. `build` may itself realize other types, for example the parent
    /// or the types of nested members.
    ///
    /// Returns [`LayoutError::RecursiveType`] if building `name` requires `name`.
    /// A failed build leaves the type unrealized, so a later call retries it.
    pub fn realize_with(
        &self,
        name: &str,
        build: impl FnOnce() -> Result<TypeLayout, LayoutError>,
    ) -> Result<&'static TypeLayout, LayoutError> {
        let cell = self.slot(name);
        if let Some(layout) = cell.get() {
            return Ok(*layout);
        }

        let _guard = RealizingGuard::enter(self, name)?;
        let layout = cell.get_or_try_init(|| {
            tracing::debug!(type_name = name, "realizing type");
            let layout = build()?;
            check_alignment(layout.name(), layout.align(), self.options.max_alignment)?;
            Ok::<_, LayoutError>(&*Box::leak(Box::new(layout)))
        })?;
        Ok(*layout)
    }

    /// Registers a layout with externally supplied offsets.
    ///
    /// Fails with [`LayoutError::DuplicateType`] if the name is taken, unless the
    /// registry allows replacement. Replacing only affects later lookups:
    /// layouts handed out before stay valid.
    pub fn register_external(&self, spec: ExternalSpec) -> Result<&'static TypeLayout, LayoutError> {
        let layout = TypeLayout::external(spec)?;
        check_alignment(layout.name(), layout.align(), self.options.max_alignment)?;

        let mut types = self.types.write();
        let existing = types.get(layout.name()).and_then(|cell| cell.get().copied());
        if let Some(existing) = existing {
            if !self.options.allow_external_replace {
                return Err(LayoutError::DuplicateType {
                    type_name: existing.name().into(),
                });
            }
            tracing::warn!(type_name = existing.name(), "replacing registered type");
        }

        let layout: &'static TypeLayout = Box::leak(Box::new(layout));
        let cell = OnceCell::with_value(layout);
        types.insert(layout.name().into(), Arc::new(cell));
        Ok(layout)
    }

    fn slot(&self, name: &str) -> Slot {
        if let Some(cell) = self.types.read().get(name) {
            return cell.clone();
        }
        self.types
            .write()
            .entry(String::from(name))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let types = self.types.read();
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("types", &types.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
