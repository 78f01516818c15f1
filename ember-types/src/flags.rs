use bitflags::bitflags;

bitflags! {
    /// Flag bits of an object descriptor, stored between the type nibble
    /// and the reference counter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ObjectFlags: u16 {
        /// Built-in object, or lexical environment when combined with a
        /// type value of 13 or above.
        const BUILT_IN_OR_LEXICAL_ENV = 0x10;
        /// New properties may be added (`[[Extensible]]`). For lexical
        /// environments the same bit marks a declarative block with data.
        const EXTENSIBLE = 0x20;
    }
}

bitflags! {
    /// Flag bits of a property type byte. The two bits above
    /// [`PropertyFlags::DATA`] hold the property name kind and are not
    /// part of this set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct PropertyFlags: u8 {
        /// Property may be deleted or reconfigured.
        const CONFIGURABLE = 1 << 0;
        /// Property shows up in enumeration.
        const ENUMERABLE = 1 << 1;
        /// Property value may be overwritten.
        const WRITABLE = 1 << 2;
        /// Slot has been deleted and may be reused.
        const DELETED = 1 << 3;
        /// Property is referenced from the lookup cache.
        const LCACHED = 1 << 4;
        /// Slot holds a data value rather than an accessor pair.
        const DATA = 1 << 5;
    }
}

impl PropertyFlags {
    /// `configurable | enumerable | writable`, the default for properties
    /// created by assignment.
    pub const DEFAULT_DATA: PropertyFlags = PropertyFlags::CONFIGURABLE
        .union(PropertyFlags::ENUMERABLE)
        .union(PropertyFlags::WRITABLE)
        .union(PropertyFlags::DATA);

    /// Non-writable, non-enumerable, non-configurable.
    pub const FIXED: PropertyFlags = PropertyFlags::empty();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_bits_stay_below_name_kind_bits() {
        assert_eq!(PropertyFlags::all().bits() & 0xc0, 0);
    }
}
