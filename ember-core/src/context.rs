//! Engine context.
//!
//! The engine is a plain value the host owns and threads through every
//! call; there is no global state and no interior mutability. One engine
//! means one heap, one GC object chain, and one set of registries for
//! the host-facing attachments that cannot live inside the compressed
//! arena (native data words, external string buffers, native function
//! callbacks).

use ember_types::Cp;

use crate::consts::{CONTEXT_DATA_SLOTS, DEFAULT_HEAP_SIZE};
use crate::error::{EngineError, FatalReason};
use crate::gc::GcPressure;
use crate::heap::Heap;
use crate::host::{DefaultHost, HostPort};
use crate::object::{NativeFunction, NativeSlot};
use crate::string::ExternalStringSlot;
use crate::value::Value;

/// Construction-time engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Heap arena size in bytes; must be cell-aligned and within the
    /// compressed-pointer range.
    pub heap_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            heap_size: DEFAULT_HEAP_SIZE,
        }
    }
}

/// One engine instance: the managed heap and everything rooted in it.
pub struct Engine {
    pub(crate) heap: Heap,
    /// Head of the GC object chain.
    pub(crate) gc_objects: Cp,
    /// Value slots reserved for external collaborators (module
    /// registry, debugger, …). GC roots.
    pub(crate) context_data: [Value; CONTEXT_DATA_SLOTS],
    /// Host-registered secondary magic string table.
    pub(crate) ext_magic: &'static [&'static str],
    /// Registry backing external string descriptors.
    pub(crate) externals: Vec<Option<ExternalStringSlot>>,
    pub(crate) external_free: Vec<u32>,
    /// Registry backing native data attachments.
    pub(crate) natives: Vec<Option<NativeSlot>>,
    pub(crate) natives_free: Vec<u32>,
    /// Callbacks behind native function objects.
    pub(crate) native_fns: Vec<NativeFunction>,
    host: Box<dyn HostPort>,
}

impl Engine {
    /// Create an engine with the default host port.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_host(config, Box::new(DefaultHost))
    }

    /// Create an engine with a custom host port.
    pub fn with_host(
        config: EngineConfig,
        host: Box<dyn HostPort>,
    ) -> Result<Self, EngineError> {
        Ok(Engine {
            heap: Heap::new(config.heap_size)?,
            gc_objects: Cp::NULL,
            context_data: [Value::UNDEFINED; CONTEXT_DATA_SLOTS],
            ext_magic: &[],
            externals: Vec::new(),
            external_free: Vec::new(),
            natives: Vec::new(),
            natives_free: Vec::new(),
            native_fns: Vec::new(),
            host,
        })
    }

    /// Total heap size in bytes.
    pub fn heap_size(&self) -> usize {
        self.heap.size()
    }

    /// Bytes currently allocated from the heap.
    pub fn allocated_bytes(&self) -> usize {
        self.heap.allocated_bytes()
    }

    /// High-water mark of [`Engine::allocated_bytes`].
    pub fn peak_allocated_bytes(&self) -> usize {
        self.heap.peak_allocated_bytes()
    }

    /// Value stored in a context-data slot. The returned value stays
    /// owned by the slot; acquire it to keep it past the next store.
    pub fn context_data(&self, slot: usize) -> Result<Value, EngineError> {
        self.context_data
            .get(slot)
            .copied()
            .ok_or(EngineError::ContextSlotOutOfRange { slot })
    }

    /// Store a value in a context-data slot, releasing the previous
    /// occupant. Slots are GC roots.
    pub fn set_context_data(&mut self, slot: usize, value: Value) -> Result<(), EngineError> {
        if slot >= CONTEXT_DATA_SLOTS {
            return Err(EngineError::ContextSlotOutOfRange { slot });
        }
        let old = self.context_data[slot];
        self.free_value_if_not_object(old);
        self.context_data[slot] = self.copy_value_if_not_object(value);
        Ok(())
    }

    /// Allocate with the retry protocol: on exhaustion run a
    /// high-pressure collection and try once more; a second failure is
    /// fatal. Callers that must not collect use the heap's allocator
    /// directly.
    pub(crate) fn alloc_with_retry(&mut self, size: usize) -> Cp {
        if let Some(cp) = self.heap.alloc(size) {
            return cp;
        }
        self.gc(GcPressure::High);
        match self.heap.alloc(size) {
            Some(cp) => cp,
            None => self.fatal(FatalReason::OutOfMemory),
        }
    }

    /// Grow a block with the retry protocol; see
    /// [`Engine::alloc_with_retry`].
    pub(crate) fn realloc_with_retry(&mut self, cp: Cp, old_size: usize, new_size: usize) -> Cp {
        if let Some(moved) = self.heap.realloc(cp, old_size, new_size) {
            return moved;
        }
        self.gc(GcPressure::High);
        match self.heap.realloc(cp, old_size, new_size) {
            Some(moved) => moved,
            None => self.fatal(FatalReason::OutOfMemory),
        }
    }

    /// Escalate to the host fatal callback.
    pub(crate) fn fatal(&mut self, reason: FatalReason) -> ! {
        self.host.fatal(reason)
    }

    /// Access the host port.
    pub fn host_mut(&mut self) -> &mut dyn HostPort {
        &mut *self.host
    }
}

impl Drop for Engine {
    /// Release host-side resources still attached at teardown: native
    /// free callbacks fire once, external string buffers are handed
    /// back. Heap memory goes away with the arena.
    fn drop(&mut self) {
        for slot in self.natives.iter_mut().filter_map(Option::take) {
            if let Some(free_cb) = slot.info.free_cb {
                free_cb(slot.data);
            }
        }
        for slot in self.externals.iter_mut().filter_map(Option::take) {
            if let Some(free_cb) = slot.free_cb {
                free_cb(slot.bytes);
            }
        }
    }
}
