//! Engine-wide constants: heap geometry, reference-counter layout and
//! number-codec limits.

use ember_types::Cp;

/// Default heap size; the full compressed-pointer range in 16-bit builds.
pub const DEFAULT_HEAP_SIZE: usize = Cp::MAX_HEAP_SIZE;

/// Smallest heap an engine can be constructed with. Below this even the
/// global object and its property list will not fit.
pub const MIN_HEAP_SIZE: usize = 1024;

/// Shift of the reference counter inside an object descriptor; the bits
/// below hold the type nibble and two flag bits.
pub const OBJECT_REF_SHIFT: u32 = 6;

/// One object reference.
pub const OBJECT_REF_ONE: u32 = 1 << OBJECT_REF_SHIFT;

/// Width of the object reference counter in bits.
#[cfg(not(feature = "cp32"))]
pub const OBJECT_REF_BITS: u32 = 10;

/// Width of the object reference counter in bits.
#[cfg(feature = "cp32")]
pub const OBJECT_REF_BITS: u32 = 26;

/// Mask of the reference counter field within the descriptor word.
pub const OBJECT_REF_MASK: u32 = ((1 << OBJECT_REF_BITS) - 1) << OBJECT_REF_SHIFT;

/// Reserved refcount-field pattern marking an object not yet visited by
/// the current mark phase. Never a legal reference count.
pub const OBJECT_NON_VISITED: u32 = OBJECT_REF_MASK;

/// Largest legal reference-counter value; crossing it is fatal.
pub const OBJECT_MAX_REF: u32 = OBJECT_NON_VISITED - OBJECT_REF_ONE;

/// One string reference; the bits below hold the container and the
/// static-string flag.
pub const STRING_REF_ONE: u32 = 1 << 4;

/// Saturation bound of the string reference counter.
pub const STRING_MAX_REF: u32 = 0xffff_fff0;

/// Marks a string stored in a static table; never refcounted.
pub const STRING_STATIC_FLAG: u32 = 1 << 3;

/// Mask of the container field in a string descriptor header.
pub const STRING_CONTAINER_MASK: u32 = 0x7;

/// One reference on an extended primitive (error carrier, bigint);
/// the low three bits hold the primitive type.
pub const PRIMITIVE_REF_ONE: u32 = 1 << 3;

/// Saturation bound of the extended-primitive reference counter.
pub const PRIMITIVE_MAX_REF: u32 = u32::MAX - (PRIMITIVE_REF_ONE - 1);

/// Named property count at which an object gets a hashmap accelerator.
pub const HASHMAP_MINIMUM_PROPERTY_COUNT: u32 = 8;

/// Smallest hashmap capacity; always a power of two.
pub const HASHMAP_MINIMUM_CAPACITY: u32 = 8;

/// Capacities above this bound spread entries by shifting the 16-bit
/// string hash left, so small hashes do not cluster at the low entries.
pub const STRING_HASH_LIMIT: u32 = 1 << 16;

/// Significant decimal digits accumulated while parsing a number.
pub const NUMBER_MAX_DIGITS: u32 = 19;

/// `u32::MAX` prints as ten characters.
pub const MAX_CHARS_IN_STRINGIFIED_UINT32: usize = 10;

/// Digits plus sign, decimal dot and `e±NNN` never exceed this many bytes
/// for any finite double.
pub const NUMBER_MAX_PRINT_SIZE: usize = 32;

/// Number of context-data value slots owned by the engine on behalf of
/// external collaborators (module registry, debugger, …).
pub const CONTEXT_DATA_SLOTS: usize = 8;
