//! The ordered member and dispatch-slot lists a layout is computed from.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dispatch::DispatchSlot;
use crate::layout::TypeLayout;
use crate::member::Member;
use crate::value::{PrimitiveValue, ValueDescriptor};

/// Describes one dynamic type before its layout is computed.
///
/// Declaration order is preserved and determines offsets and slot indices.
///
/// # Example
///
/// ```
/// use dynlayout_types::Schema;
///
/// let mut schema = Schema::new();
/// schema
///     .primitive::<i32>("health")
///     .optional_primitive::<f32>("armor")
///     .method("on_hit");
/// assert_eq!(schema.members().len(), 2);
/// assert_eq!(schema.slots().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Schema {
    members: Vec<Member>,
    slots: Vec<DispatchSlot>,
}

/// Signature of the function that fills in a type's schema.
///
/// It receives the two empty output lists and is invoked once per type.
pub type CollectFn = fn(&mut Vec<Member>, &mut Vec<DispatchSlot>);

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema by running a collector over the two output lists.
    pub fn collect(collect: CollectFn) -> Self {
        let mut schema = Schema::new();
        collect(&mut schema.members, &mut schema.slots);
        schema
    }

    pub fn member(&mut self, member: Member) -> &mut Self {
        self.members.push(member);
        self
    }

    pub fn primitive<T: PrimitiveValue>(&mut self, name: impl Into<String>) -> &mut Self {
        self.member(Member::new(name, ValueDescriptor::primitive::<T>()))
    }

    pub fn optional_primitive<T: PrimitiveValue>(&mut self, name: impl Into<String>) -> &mut Self {
        self.member(Member::optional(name, ValueDescriptor::primitive::<T>()))
    }

    pub fn array<T: PrimitiveValue>(&mut self, name: impl Into<String>, count: usize) -> &mut Self {
        self.member(Member::array(name, ValueDescriptor::primitive::<T>(), count))
    }

    pub fn nested(&mut self, name: impl Into<String>, layout: &'static TypeLayout) -> &mut Self {
        self.member(Member::new(name, ValueDescriptor::nested(layout)))
    }

    pub fn optional_nested(
        &mut self,
        name: impl Into<String>,
        layout: &'static TypeLayout,
    ) -> &mut Self {
        self.member(Member::optional(name, ValueDescriptor::nested(layout)))
    }

    pub fn slot(&mut self, slot: DispatchSlot) -> &mut Self {
        self.slots.push(slot);
        self
    }

    pub fn method(&mut self, name: impl Into<String>) -> &mut Self {
        self.slot(DispatchSlot::new(name))
    }

    pub fn optional_method(&mut self, name: impl Into<String>) -> &mut Self {
        self.slot(DispatchSlot::optional(name))
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn slots(&self) -> &[DispatchSlot] {
        &self.slots
    }

    pub(crate) fn into_parts(self) -> (Vec<Member>, Vec<DispatchSlot>) {
        (self.members, self.slots)
    }
}
