use std::sync::{Arc, Mutex};

use thiserror::Error;

pub type LibraryError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to load native library {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: LibraryError,
    },
    #[error("native runtime has been shut down")]
    ShutDown,
}

/// A process-wide native library with explicit load and unload.
pub trait NativeLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Loads global state. Called once, before any job runs.
    fn load(&self) -> Result<(), LibraryError>;

    /// Frees global state. Called once, at shutdown.
    fn unload(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    ShutDown,
}

struct Inner {
    phase: Phase,
    libraries: Vec<Arc<dyn NativeLibrary>>,
    loaded: usize,
}

/// Owns the lifecycle of every native library the stages depend on.
///
/// Libraries are loaded in registration order by [`init`](Self::init) and
/// unloaded in reverse by [`shutdown`](Self::shutdown) (or on drop). A
/// runtime that has been shut down cannot be re-initialized.
pub struct NativeRuntime {
    inner: Mutex<Inner>,
}

impl NativeRuntime {
    pub fn new(libraries: Vec<Arc<dyn NativeLibrary>>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                libraries,
                loaded: 0,
            }),
        })
    }

    /// Loads every library. Idempotent once ready; a failed load unloads
    /// whatever had already been loaded.
    pub fn init(&self) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Ready => return Ok(()),
            Phase::ShutDown => return Err(RuntimeError::ShutDown),
            Phase::Uninitialized => {}
        }

        for idx in 0..inner.libraries.len() {
            let library = inner.libraries[idx].clone();
            if let Err(source) = library.load() {
                log::error!("Failed to load {}: {source}", library.name());
                unload_loaded(&mut inner);
                return Err(RuntimeError::Load {
                    name: library.name().to_string(),
                    source,
                });
            }
            log::info!("Loaded native library {}", library.name());
            inner.loaded = idx + 1;
        }

        inner.phase = Phase::Ready;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.lock().phase == Phase::Ready
    }

    /// Unloads every library in reverse order. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.phase == Phase::ShutDown {
            return;
        }
        unload_loaded(&mut inner);
        inner.phase = Phase::ShutDown;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for NativeRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unload_loaded(inner: &mut Inner) {
    for library in inner.libraries[..inner.loaded].iter().rev() {
        library.unload();
        log::info!("Unloaded native library {}", library.name());
    }
    inner.loaded = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingLibrary {
        name: String,
        fail: bool,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl NativeLibrary for RecordingLibrary {
        fn name(&self) -> &str {
            &self.name
        }

        fn load(&self) -> Result<(), LibraryError> {
            if self.fail {
                return Err("boom".into());
            }
            self.events.lock().unwrap().push(format!("load {}", self.name));
            Ok(())
        }

        fn unload(&self) {
            self.events.lock().unwrap().push(format!("unload {}", self.name));
        }
    }

    fn library(
        name: &str,
        fail: bool,
        events: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn NativeLibrary> {
        Arc::new(RecordingLibrary {
            name: name.to_string(),
            fail,
            events: events.clone(),
        })
    }

    #[test]
    fn test_not_ready_before_init() {
        let runtime = NativeRuntime::new(Vec::new());
        assert!(!runtime.is_ready());
        runtime.init().unwrap();
        assert!(runtime.is_ready());
    }

    #[test]
    fn test_loads_in_order_and_unloads_in_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let runtime = NativeRuntime::new(vec![
            library("ffmpeg", false, &events),
            library("whisper", false, &events),
        ]);
        runtime.init().unwrap();
        runtime.init().unwrap();
        runtime.shutdown();
        runtime.shutdown();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["load ffmpeg", "load whisper", "unload whisper", "unload ffmpeg"]
        );
        assert!(!runtime.is_ready());
    }

    #[test]
    fn test_failed_load_unwinds_loaded_libraries() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let runtime = NativeRuntime::new(vec![
            library("ffmpeg", false, &events),
            library("whisper", true, &events),
        ]);
        let err = runtime.init().unwrap_err();

        assert!(matches!(err, RuntimeError::Load { ref name, .. } if name == "whisper"));
        assert_eq!(*events.lock().unwrap(), vec!["load ffmpeg", "unload ffmpeg"]);
        assert!(!runtime.is_ready());
    }

    #[test]
    fn test_cannot_init_after_shutdown() {
        let runtime = NativeRuntime::new(Vec::new());
        runtime.shutdown();
        assert!(matches!(runtime.init(), Err(RuntimeError::ShutDown)));
    }

    #[test]
    fn test_drop_unloads() {
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let runtime = NativeRuntime::new(vec![library("ffmpeg", false, &events)]);
            runtime.init().unwrap();
        }
        assert_eq!(*events.lock().unwrap(), vec!["load ffmpeg", "unload ffmpeg"]);
    }
}
