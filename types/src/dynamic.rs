use crate::error::LayoutError;
use crate::layout::TypeLayout;
use crate::registry::Registry;
use crate::schema::Schema;

/// A Rust marker type standing for one dynamic type.
///
/// Implementors describe the type once; [`layout`](Self::layout) realizes it
/// through the global [`Registry`] on first use.
///
/// # Example
///
/// ```
/// use dynlayout_types::{DynamicType, LayoutError, Schema, TypeLayout};
///
/// struct Particle;
///
/// impl DynamicType for Particle {
///     const NAME: &'static str = "Particle";
///
///     fn describe(schema: &mut Schema) -> Result<(), LayoutError> {
///         schema.primitive::<f32>("x").primitive::<f32>("y").method("step");
///         Ok(())
///     }
/// }
///
/// let layout = Particle::layout().unwrap();
/// assert_eq!(layout.name(), "Particle");
/// assert!(std::ptr::eq(layout, Particle::layout().unwrap()));
/// ```
pub trait DynamicType {
    /// Registry key. Must be unique across the process.
    const NAME: &'static str;

    /// Layout of the parent type, `None` for root types.
    fn parent() -> Result<Option<&'static TypeLayout>, LayoutError> {
        Ok(None)
    }

    /// Declares this type's own members and dispatch slots, in order.
    fn describe(schema: &mut Schema) -> Result<(), LayoutError>;

    fn layout() -> Result<&'static TypeLayout, LayoutError> {
        Registry::global().realize_with(Self::NAME, || {
            let parent = Self::parent()?;
            let mut schema = Schema::new();
            Self::describe(&mut schema)?;
            TypeLayout::compute(Self::NAME, parent, schema)
        })
    }
}
