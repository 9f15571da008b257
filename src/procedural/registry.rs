use crate::procedural::engine::RendererEngine;
use crate::rendering::native::NativeRenderer;
use crate::scene::provider::SceneProvider;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The scene source is empty")]
    EmptySource,
    #[error("Can't open {source_id}: {reason}")]
    OpenFailed { source_id: String, reason: String },
    #[error("{node} is not a valid procedural: {reason}")]
    InvalidProcedural { node: String, reason: String },
    #[error(transparent)]
    StageError(#[from] stage_files::StageError),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Opens a scene source, composing the override documents on top of it, strongest first.
pub trait StageOpener: Send + Sync {
    fn open(&self, source_id: &str, overrides: &[String]) -> Result<Arc<dyn SceneProvider>, SessionError>;
}

/// (scene source, override documents)
pub type SessionKey = (String, Vec<String>);

/// The engines of all scenes opened in this process. Procedurals sharing the scene and the overrides
/// share the engine and thereby everything that has already been expanded.
pub struct SessionRegistry {
    engines: Mutex<HashMap<SessionKey, Arc<RendererEngine>>>,
}

static GLOBAL_REGISTRY: LazyLock<SessionRegistry> = LazyLock::new(SessionRegistry::new);

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static SessionRegistry {
        &GLOBAL_REGISTRY
    }

    fn engines(&self) -> MutexGuard<'_, HashMap<SessionKey, Arc<RendererEngine>>> {
        // The map stays consistent even if a thread panicked while holding the lock.
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The engine of `source_id` with `overrides`, opening the scene on first use. Procedurals may
    /// ask for the same engine at the same time, so the lookup and the insert are one step.
    pub fn get_or_create(
        &self,
        source_id: &str,
        overrides: &[String],
        opener: &dyn StageOpener,
        renderer: Arc<dyn NativeRenderer>,
    ) -> Result<Arc<RendererEngine>, SessionError> {
        if source_id.is_empty() {
            return Err(SessionError::EmptySource);
        }

        let key = (source_id.to_string(), overrides.to_vec());
        let mut engines = self.engines();
        if let Some(engine) = engines.get(&key) {
            return Ok(engine.clone());
        }

        info!("Opening {source_id} with {} override layers", overrides.len());
        let stage = opener.open(source_id, overrides)?;
        let engine = Arc::new(RendererEngine::new(stage, renderer));
        engines.insert(key, engine.clone());
        Ok(engine)
    }

    pub fn len(&self) -> usize {
        self.engines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines().is_empty()
    }

    pub fn clear(&self) {
        debug!("Dropping {} cached sessions", self.len());
        self.engines().clear();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
