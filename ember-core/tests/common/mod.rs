use ember_core::prelude::*;

/// Host port for tests: fatal conditions panic (so a test fails loudly
/// instead of aborting the process), console output is discarded.
pub struct TestHost;

impl HostPort for TestHost {
    fn current_time_ms(&mut self) -> f64 {
        0.0
    }

    fn fatal(&mut self, reason: FatalReason) -> ! {
        panic!("fatal engine error in test: {reason}");
    }

    fn console_out(&mut self, _bytes: &[u8]) {}

    fn read_line(&mut self) -> Option<String> {
        None
    }
}

#[allow(dead_code)]
pub fn engine_with_heap(heap_size: usize) -> Engine {
    Engine::with_host(EngineConfig { heap_size }, Box::new(TestHost)).unwrap()
}

#[allow(dead_code)]
pub fn engine() -> Engine {
    engine_with_heap(64 * 1024)
}
