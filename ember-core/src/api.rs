//! Embedding surface.
//!
//! Handles are the value words themselves; ownership is by reference
//! count. Every value returned to the host carries one reference and
//! must be released through [`Engine::release`], except direct-encoded
//! values, on which `release` is a harmless no-op and may be called
//! unconditionally.

use ember_types::{ErrorKind, PropertyFlags};

use crate::context::Engine;
use crate::object::ClassId;
use crate::string::{magic_string_value, MagicString, StringBuilder};
use crate::value::{PrimitiveKind, Value};

impl Engine {
    /// Take an additional reference on a value.
    pub fn acquire(&mut self, v: Value) -> Value {
        self.copy_value(v)
    }

    /// Release one reference. A no-op on direct-encoded values.
    pub fn release(&mut self, v: Value) {
        self.free_value(v);
    }

    /// Value of an own data property, with a fresh reference. `None`
    /// for missing properties and for accessors (invoking getters is
    /// the interpreter's business).
    pub fn get_own_property(&mut self, obj: Value, name: Value) -> Option<Value> {
        let prop = self.find_own_property(obj, name)?;
        let flags = self.pair_type(prop.pair, prop.index);
        if !crate::object::property::prop_is_raw_data(flags) {
            return None;
        }
        let value = self.property_value(prop);
        Some(self.copy_value(value))
    }

    /// Create or overwrite a data property with default attributes.
    pub fn set_property(&mut self, obj: Value, name: Value, value: Value) {
        self.define_data_property(obj, name, value, PropertyFlags::DEFAULT_DATA);
    }

    /// Create or overwrite a data property with explicit attributes.
    /// Attribute enforcement (writability checks and the like) belongs
    /// to the interpreter; this entry implements the raw store.
    pub fn define_data_property(
        &mut self,
        obj: Value,
        name: Value,
        value: Value,
        flags: PropertyFlags,
    ) {
        use crate::object::property::prop_is_raw_data;

        let prop = match self.find_own_property(obj, name) {
            Some(prop) if prop_is_raw_data(self.pair_type(prop.pair, prop.index)) => prop,
            Some(accessor) => {
                // Reconfiguring an accessor into a data property.
                self.delete_property(obj, accessor);
                self.create_named_data_property(obj, name, flags)
            }
            None => self.create_named_data_property(obj, name, flags),
        };
        self.set_property_value(prop, value);
    }

    /// Delete an own property. Returns whether one existed.
    pub fn delete_own_property(&mut self, obj: Value, name: Value) -> bool {
        match self.find_own_property(obj, name) {
            Some(prop) => {
                self.delete_property(obj, prop);
                true
            }
            None => false,
        }
    }

    /// Whether an own property with this name exists.
    pub fn has_own_property(&self, obj: Value, name: Value) -> bool {
        self.find_own_property(obj, name).is_some()
    }

    // Error construction. Script-level exceptions are values; the core
    // only builds them.

    /// Create an error object of the given kind with a `message`
    /// property.
    pub fn new_error_object(&mut self, kind: ErrorKind, message: &str) -> Value {
        let error = self.new_class_object(ClassId::Error, Value::NULL);
        self.set_class_extra_byte(error.cp(), kind as u8);

        let message_value = self.new_string(message);
        let name = magic_string_value(MagicString::Message);
        self.define_data_property(
            error,
            name,
            message_value,
            PropertyFlags::CONFIGURABLE | PropertyFlags::WRITABLE,
        );
        self.free_value(message_value);
        error
    }

    /// Error kind of an error object.
    pub fn error_object_kind(&self, error: Value) -> ErrorKind {
        debug_assert!(self.class_id(error) == ClassId::Error);
        ErrorKind::from(self.class_extra_byte(error.cp()))
    }

    /// Wrap a thrown value in an exception carrier. Takes ownership of
    /// the caller's reference on `value`.
    pub fn create_exception(&mut self, value: Value) -> Value {
        let cp = self.alloc_primitive(PrimitiveKind::Error, value.raw());
        Value::pointer(ember_types::ValueTag::Error, cp)
    }

    /// Wrap a thrown value in an abort carrier: the unwinder must pass
    /// every handler without matching.
    pub fn create_abort(&mut self, value: Value) -> Value {
        let cp = self.alloc_primitive(PrimitiveKind::Abort, value.raw());
        Value::pointer(ember_types::ValueTag::Error, cp)
    }

    /// Whether an exception carrier has the abort flag.
    pub fn is_abort(&self, carrier: Value) -> bool {
        carrier.is_error_reference() && self.primitive_kind(carrier.cp()) == PrimitiveKind::Abort
    }

    /// The value carried by an exception, with a fresh reference.
    pub fn exception_value(&mut self, carrier: Value) -> Value {
        debug_assert!(carrier.is_error_reference());
        let value = Value::from_raw(self.primitive_payload(carrier.cp()));
        self.copy_value(value)
    }

    /// `"Name: message"` for an error object (or the bare name when the
    /// message is empty), as a string value.
    pub fn error_to_string(&mut self, error: Value) -> Value {
        let kind = self.error_object_kind(error);

        let mut builder = StringBuilder::new(self);
        builder.append_str(self, kind.constructor_name());

        let name = magic_string_value(MagicString::Message);
        if let Some(prop) = self.find_own_property(error, name) {
            let message = self.property_value(prop);
            if message.is_string() && !self.string_is_empty(message) {
                builder.append_cesu8(self, b": ");
                builder.append_value(self, message);
            }
        }
        builder.finalize(self)
    }

    /// Shorthand: build an error object and wrap it for throwing.
    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let error = self.new_error_object(kind, message);
        self.create_exception(error)
    }
}
