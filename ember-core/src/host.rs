//! Host port.
//!
//! Everything the engine needs from its embedder: wall-clock time, a
//! fatal-exit path, console and line I/O, and the optional source-file
//! access the (external) module resolver builds on. Hosts on unusual
//! platforms implement this trait; [`DefaultHost`] covers ordinary
//! processes with std I/O.

use std::io::{BufRead, Read, Write};

use ember_types::PathStyle;

use crate::error::FatalReason;

/// Services provided by the embedding host.
pub trait HostPort {
    /// Milliseconds since the Unix epoch.
    fn current_time_ms(&mut self) -> f64;

    /// Terminate after an unrecoverable engine failure. Must not return.
    fn fatal(&mut self, reason: FatalReason) -> !;

    /// Byte sink behind `print`-style output.
    fn console_out(&mut self, bytes: &[u8]);

    /// Read one line of input, without the trailing newline. `None` on
    /// end of input.
    fn read_line(&mut self) -> Option<String>;

    /// Read a source file for the module loader. `None` when the host
    /// has no file access or the file is missing.
    fn source_read(&mut self, _path: &str) -> Option<Vec<u8>> {
        None
    }

    /// Current working directory, for resolving relative specifiers.
    fn cwd(&mut self) -> Option<String> {
        None
    }

    /// Path separator convention of this host.
    fn path_style(&self) -> PathStyle {
        PathStyle::Unix
    }
}

/// Host port backed by std: system clock, stdout/stderr, stdin, the
/// local filesystem.
#[derive(Debug, Default)]
pub struct DefaultHost;

impl HostPort for DefaultHost {
    fn current_time_ms(&mut self) -> f64 {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs_f64() * 1000.0,
            Err(_) => 0.0,
        }
    }

    fn fatal(&mut self, reason: FatalReason) -> ! {
        eprintln!("ember: fatal: {reason}");
        std::process::abort();
    }

    fn console_out(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some(line)
            }
        }
    }

    fn source_read(&mut self, path: &str) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .ok()?;
        Some(bytes)
    }

    fn cwd(&mut self) -> Option<String> {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.into_os_string().into_string().ok())
    }

    fn path_style(&self) -> PathStyle {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Unix
        }
    }
}
