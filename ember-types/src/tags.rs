use core::fmt;

/// Type tag stored in the low three bits of a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ValueTag {
    /// Directly encoded value: a 28-bit signed integer or a simple constant.
    Direct = 0,
    /// Pointer to a string descriptor.
    String = 1,
    /// Pointer to a boxed 64-bit float.
    Float = 2,
    /// Pointer to an object descriptor.
    Object = 3,
    /// Pointer to a symbol descriptor.
    Symbol = 4,
    /// Directly encoded string: a magic-string id or a small unsigned int.
    DirectString = 5,
    /// Pointer to a bigint primitive.
    BigInt = 6,
    /// Pointer to an exception carrier.
    Error = 7,
}

impl From<u8> for ValueTag {
    fn from(bits: u8) -> Self {
        match bits & 0x7 {
            0 => ValueTag::Direct,
            1 => ValueTag::String,
            2 => ValueTag::Float,
            3 => ValueTag::Object,
            4 => ValueTag::Symbol,
            5 => ValueTag::DirectString,
            6 => ValueTag::BigInt,
            _ => ValueTag::Error,
        }
    }
}

/// Simple constants encodable in the payload of a direct value.
///
/// `False` and `True` are adjacent so that they differ only in the lowest
/// payload bit; the value layer relies on this for its boolean predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SimpleValue {
    /// Uninitialized value slot.
    Empty = 0,
    /// Marker returned while an exception is being thrown.
    ErrorMarker = 1,
    /// Boolean `false`.
    False = 2,
    /// Boolean `true`.
    True = 3,
    /// The `undefined` value.
    Undefined = 4,
    /// The `null` value.
    Null = 5,
    /// A `let`/`const` binding before initialization.
    Uninitialized = 6,
    /// Lookup miss marker returned by property search.
    NotFound = 7,
    /// Hole in a sparse array literal.
    ArrayHole = 8,
    /// Reference to an interpreter register.
    RegisterRef = 9,
}

impl From<u8> for SimpleValue {
    fn from(bits: u8) -> Self {
        match bits {
            0 => SimpleValue::Empty,
            1 => SimpleValue::ErrorMarker,
            2 => SimpleValue::False,
            3 => SimpleValue::True,
            4 => SimpleValue::Undefined,
            5 => SimpleValue::Null,
            6 => SimpleValue::Uninitialized,
            7 => SimpleValue::NotFound,
            8 => SimpleValue::ArrayHole,
            _ => SimpleValue::RegisterRef,
        }
    }
}

/// Subtype of a directly encoded string, stored in the two bits above the
/// value tag. The same two-bit code doubles as the name-kind discriminator
/// of a property, where `Ptr` refers to a heap string descriptor and
/// `Special` marks internal (non-ECMA-visible) properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DirectStringKind {
    /// Heap string descriptor pointer (property names only).
    Ptr = 0,
    /// Magic string table index.
    Magic = 1,
    /// Small unsigned integer in canonical decimal form.
    Uint = 2,
    /// Reserved: internal property name id.
    Special = 3,
}

impl From<u8> for DirectStringKind {
    fn from(bits: u8) -> Self {
        match bits & 0x3 {
            0 => DirectStringKind::Ptr,
            1 => DirectStringKind::Magic,
            2 => DirectStringKind::Uint,
            _ => DirectStringKind::Special,
        }
    }
}

/// Physical layout of a heap string descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StringContainer {
    /// CESU-8 payload on the heap, size and code-unit length both ≤ 64 Ki.
    HeapUtf8 = 0,
    /// CESU-8 payload on the heap with 32-bit size and length fields.
    HeapLongUtf8 = 1,
    /// Canonical decimal form of a `u32`, value held in the descriptor.
    Uint32InDesc = 2,
    /// ASCII payload on the heap; size equals code-unit length.
    HeapAscii = 3,
    /// External magic string; descriptor holds the table id only.
    MagicEx = 4,
    /// Symbol; descriptor holds the description value.
    Symbol = 5,
    /// Host-owned bytes reached through an engine registry slot.
    External = 6,
}

impl From<u8> for StringContainer {
    fn from(bits: u8) -> Self {
        match bits & 0x7 {
            0 => StringContainer::HeapUtf8,
            1 => StringContainer::HeapLongUtf8,
            2 => StringContainer::Uint32InDesc,
            3 => StringContainer::HeapAscii,
            4 => StringContainer::MagicEx,
            5 => StringContainer::Symbol,
            _ => StringContainer::External,
        }
    }
}

/// Internal object types, stored in the low four bits of the descriptor.
///
/// Values 13–15 are reserved for [`LexicalEnvKind`]; the two enums share
/// the same field, discriminated by the lexical-environment flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ObjectKind {
    /// Plain object.
    General = 0,
    /// Object carrying a class payload (boxed primitive, date, …).
    Class = 1,
    /// Array exotic object.
    Array = 2,
    /// Proxy exotic object.
    Proxy = 4,
    /// Script function with scope and bytecode.
    Function = 5,
    /// Function produced by `Function.prototype.bind`.
    BoundFunction = 6,
    /// Function backed by a host callback.
    NativeFunction = 7,
}

impl From<u8> for ObjectKind {
    fn from(bits: u8) -> Self {
        match bits & 0xf {
            1 => ObjectKind::Class,
            2 => ObjectKind::Array,
            4 => ObjectKind::Proxy,
            5 => ObjectKind::Function,
            6 => ObjectKind::BoundFunction,
            7 => ObjectKind::NativeFunction,
            _ => ObjectKind::General,
        }
    }
}

/// Lexical environment types, sharing the object type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LexicalEnvKind {
    /// Declarative environment holding bindings as properties.
    Declarative = 13,
    /// Environment bound to an object (`with`, global scope).
    ObjectBound = 14,
}

/// Error kinds carried by an exception reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ErrorKind {
    /// Plain `Error`.
    Common = 0,
    /// `EvalError`.
    Eval = 1,
    /// `RangeError`.
    Range = 2,
    /// `ReferenceError`.
    Reference = 3,
    /// `SyntaxError`.
    Syntax = 4,
    /// `TypeError`.
    Type = 5,
    /// `URIError`.
    Uri = 6,
    /// `AggregateError`.
    Aggregate = 7,
}

impl ErrorKind {
    /// Constructor name used by `toString` output.
    pub const fn constructor_name(self) -> &'static str {
        match self {
            ErrorKind::Common => "Error",
            ErrorKind::Eval => "EvalError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Uri => "URIError",
            ErrorKind::Aggregate => "AggregateError",
        }
    }
}

impl From<u8> for ErrorKind {
    fn from(bits: u8) -> Self {
        match bits & 0x7 {
            1 => ErrorKind::Eval,
            2 => ErrorKind::Range,
            3 => ErrorKind::Reference,
            4 => ErrorKind::Syntax,
            5 => ErrorKind::Type,
            6 => ErrorKind::Uri,
            7 => ErrorKind::Aggregate,
            _ => ErrorKind::Common,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constructor_name())
    }
}

/// Path separator style reported by the host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathStyle {
    /// `/`-separated paths.
    Unix,
    /// `\`-separated paths with drive letters.
    Windows,
}
