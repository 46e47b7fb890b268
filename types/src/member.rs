use core::fmt;
use core::ptr::NonNull;

use alloc::string::String;

use crate::value::ValueDescriptor;

/// A named field of a dynamic type.
///
/// The offset starts out unresolved and is assigned exactly once, when the
/// owning layout is computed (or registered, for external layouts).
pub struct Member {
    name: String,
    value: ValueDescriptor,
    optional: bool,
    count: usize,
    offset: Option<usize>,
}

impl Member {
    pub fn new(name: impl Into<String>, value: ValueDescriptor) -> Self {
        Self {
            name: name.into(),
            value,
            optional: false,
            count: 1,
            offset: None,
        }
    }

    /// A member whose absence is a valid state for accessors.
    ///
    /// Being optional does not change the layout: the storage is always there.
    pub fn optional(name: impl Into<String>, value: ValueDescriptor) -> Self {
        Self {
            optional: true,
            ..Self::new(name, value)
        }
    }

    /// A fixed-size inline array of `count` values.
    pub fn array(name: impl Into<String>, value: ValueDescriptor, count: usize) -> Self {
        Self {
            count,
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ValueDescriptor {
        &self.value
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Number of inline elements (1 for scalar members).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Resolved byte offset inside an instance, `None` until resolved.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn is_resolved(&self) -> bool {
        self.offset.is_some()
    }

    /// Total bytes occupied by this member, `None` on overflow.
    pub fn span(&self) -> Option<usize> {
        self.value.size().checked_mul(self.count)
    }

    pub(crate) fn resolve(&mut self, offset: usize) {
        debug_assert!(self.offset.is_none(), "member offset resolved twice");
        self.offset = Some(offset);
    }

    /// Address of element `index` of this member inside the instance at `container`.
    ///
    /// Returns `None` when the member was never resolved. The returned pointer is
    /// only valid to dereference if `container` points to a live instance of the
    /// layout owning this member and `index < count()`.
    pub fn address_in(&self, container: NonNull<u8>, index: usize) -> Option<NonNull<u8>> {
        let offset = self.offset?;
        let byte = offset.wrapping_add(index.wrapping_mul(self.value.size()));
        NonNull::new(container.as_ptr().wrapping_add(byte))
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Member");
        s.field("name", &self.name)
            .field("value", &self.value)
            .field("offset", &self.offset);
        if self.optional {
            s.field("optional", &true);
        }
        if self.count != 1 {
            s.field("count", &self.count);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_member_has_no_address() {
        let member = Member::new("x", ValueDescriptor::primitive::<u32>());
        let mut storage = [0u64; 2];
        let base = NonNull::new(storage.as_mut_ptr().cast::<u8>()).unwrap();

        assert!(!member.is_resolved());
        assert_eq!(member.address_in(base, 0), None);
    }

    #[test]
    fn resolved_member_address() {
        let mut member = Member::array("xs", ValueDescriptor::primitive::<u32>(), 3);
        member.resolve(4);
        let mut storage = [0u64; 4];
        let base = NonNull::new(storage.as_mut_ptr().cast::<u8>()).unwrap();

        let addr = member.address_in(base, 0).unwrap();
        assert_eq!(addr.as_ptr() as usize - base.as_ptr() as usize, 4);
        let addr = member.address_in(base, 2).unwrap();
        assert_eq!(addr.as_ptr() as usize - base.as_ptr() as usize, 12);
        assert_eq!(member.span(), Some(12));
    }

    #[test]
    fn optional_flag() {
        let member = Member::optional("maybe", ValueDescriptor::primitive::<i64>());
        assert!(member.is_optional());
        assert_eq!(member.count(), 1);
    }
}
