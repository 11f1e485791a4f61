//! Operator-facing reporter: console plus durable log file.
//!
//! Every message goes to the console stream and, once attached, to an
//! append-mode log file. A stack of unit/check ids prefixes messages emitted
//! while a context is active, and warnings are counted for the final summary.
//! Each message is mirrored as a `tracing` event at debug level.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        };
        // Honour width/alignment so `{:<8}` pads the level.
        f.pad(name)
    }
}

struct LogFile {
    path: PathBuf,
    file: File,
}

/// Dual-destination reporter shared by the executor, checks and procedures.
pub struct Reporter {
    console: Mutex<Box<dyn Write + Send>>,
    log_file: Mutex<Option<LogFile>>,
    contexts: Mutex<Vec<String>>,
    warnings: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    /// Reporter writing to stdout.
    pub fn new() -> Self {
        Self::with_console(Box::new(io::stdout()))
    }

    /// Reporter writing to an arbitrary console stream.
    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            console: Mutex::new(console),
            log_file: Mutex::new(None),
            contexts: Mutex::new(Vec::new()),
            warnings: AtomicUsize::new(0),
        }
    }

    /// Reporter capturing console output in memory.
    pub fn buffered() -> (Self, ConsoleBuffer) {
        let buffer = ConsoleBuffer::default();
        (Self::with_console(Box::new(buffer.clone())), buffer)
    }

    /// Append every subsequent message to `path`.
    ///
    /// Attaching the file that is already attached is a no-op, so repeated
    /// calls never duplicate output.
    pub fn attach_log_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut slot = lock(&self.log_file);
        if slot.as_ref().is_some_and(|current| current.path == path) {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *slot = Some(LogFile {
            path: path.to_path_buf(),
            file,
        });
        Ok(())
    }

    /// Path of the attached log file, if any.
    pub fn log_file(&self) -> Option<PathBuf> {
        lock(&self.log_file).as_ref().map(|l| l.path.clone())
    }

    /// Push `id` as the current context until the guard drops.
    pub fn context(&self, id: impl Into<String>) -> ContextGuard<'_> {
        lock(&self.contexts).push(id.into());
        ContextGuard { reporter: self }
    }

    /// Innermost active context id.
    pub fn current_context(&self) -> Option<String> {
        lock(&self.contexts).last().cloned()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Level::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.emit(Level::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(Level::Error, message.as_ref());
    }

    fn emit(&self, level: Level, message: &str) {
        let context = self.current_context();
        let prefix = context
            .as_deref()
            .map(|id| format!("{id}: "))
            .unwrap_or_default();

        let console_line = match level {
            Level::Info => format!(">>> {prefix}{message}\n"),
            _ => format!(">>> {prefix}{level}: {message}\n"),
        };
        {
            let mut console = lock(&self.console);
            console.write_all(console_line.as_bytes()).ok();
            console.flush().ok();
        }

        if let Some(log) = lock(&self.log_file).as_mut() {
            let marker = if context.is_some() { '*' } else { ' ' };
            let line = format!(
                "*{marker} {} {level:<8} {prefix}{message}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
            );
            log.file.write_all(line.as_bytes()).ok();
        }

        tracing::debug!(
            level = %level,
            context = context.as_deref().unwrap_or(""),
            "{message}"
        );
    }
}

/// Pops the reporter context on drop.
pub struct ContextGuard<'a> {
    reporter: &'a Reporter,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        lock(&self.reporter.contexts).pop();
    }
}

/// Shared in-memory console stream.
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffer(Arc<Mutex<Vec<u8>>>);

impl ConsoleBuffer {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for ConsoleBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
