use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

use crate::fetch::{Fetch, FetchError, HttpFetcher};
use crate::{
    default_model_dir, default_sources, model_digest, ManifestError, ModelKind, ModelSource,
    WeightsManifest, MODELS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("no model sources configured")]
    NoSources,

    #[error("could not load face models from any of {attempts} source(s)")]
    Exhausted { attempts: usize },

    #[error("model loader task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{name}: {source}")]
    Manifest {
        name: &'static str,
        #[source]
        source: ManifestError,
    },
}

/// Why one source was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: ModelSource,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub kind: ModelKind,
    pub name: &'static str,
    pub manifest_name: &'static str,
    pub manifest_bytes: Vec<u8>,
    pub manifest: WeightsManifest,
    /// `(path, bytes)` in manifest order.
    pub shards: Vec<(String, Vec<u8>)>,
    /// Digest over the manifest and every shard, see [`crate::model_digest`].
    pub sha256: String,
}

/// Every model, all served by the same source.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub source: ModelSource,
    /// Position of `source` in the loader's source list.
    pub source_index: usize,
    pub models: Vec<LoadedModel>,
    /// Sources tried and rejected before `source`.
    pub failed_sources: Vec<SourceFailure>,
}

impl ModelBundle {
    pub fn model(&self, kind: ModelKind) -> Option<&LoadedModel> {
        self.models.iter().find(|m| m.kind == kind)
    }

    /// Write every manifest and shard into `dir`. Each file lands under a
    /// `.part` name first and is renamed into place once complete.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        for model in &self.models {
            write_atomic(dir, model.manifest_name, &model.manifest_bytes)?;
            for (path, bytes) in &model.shards {
                write_atomic(dir, path, bytes)?;
            }
        }
        Ok(())
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let dest = dir.join(name);
    let tmp = dir.join(format!("{name}.part"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, &dest)
}

#[derive(Debug)]
struct Progress {
    state: LoadState,
    last_error: Option<LoadError>,
}

/// Loads the model bundle at most once per process.
///
/// Concurrent callers share the attempt in flight. A failed attempt is not
/// cached: the next caller after it finished starts a fresh one.
pub struct ModelLoader {
    sources: Vec<ModelSource>,
    fetcher: Arc<dyn Fetch>,
    ready: OnceLock<Arc<ModelBundle>>,
    gate: tokio::sync::Mutex<()>,
    finished: AtomicU64,
    progress: Mutex<Progress>,
}

impl ModelLoader {
    pub fn new(sources: Vec<ModelSource>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            sources,
            fetcher,
            ready: OnceLock::new(),
            gate: tokio::sync::Mutex::new(()),
            finished: AtomicU64::new(0),
            progress: Mutex::new(Progress {
                state: LoadState::Uninitialized,
                last_error: None,
            }),
        }
    }

    pub fn with_default_sources() -> Self {
        Self::new(default_sources(default_model_dir()), Arc::new(HttpFetcher))
    }

    /// Process-wide loader over the default sources.
    pub fn global() -> &'static ModelLoader {
        static GLOBAL: OnceLock<ModelLoader> = OnceLock::new();
        GLOBAL.get_or_init(ModelLoader::with_default_sources)
    }

    pub fn sources(&self) -> &[ModelSource] {
        &self.sources
    }

    pub fn state(&self) -> LoadState {
        self.progress_lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// `true` once every model is loaded. Failures are logged, never raised.
    pub async fn ensure_ready(&self) -> bool {
        match self.bundle().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "face models unavailable");
                false
            }
        }
    }

    pub async fn bundle(&self) -> Result<Arc<ModelBundle>, LoadError> {
        if let Some(bundle) = self.ready.get() {
            return Ok(bundle.clone());
        }

        let ticket = self.finished.load(Ordering::SeqCst);
        let _gate = self.gate.lock().await;

        if let Some(bundle) = self.ready.get() {
            return Ok(bundle.clone());
        }
        if self.finished.load(Ordering::SeqCst) != ticket {
            // An attempt that was already running when we arrived has failed.
            let progress = self.progress_lock();
            return Err(progress
                .last_error
                .clone()
                .unwrap_or(LoadError::Exhausted { attempts: 0 }));
        }

        self.set_state(LoadState::Loading, None);
        let sources = self.sources.clone();
        let fetcher = self.fetcher.clone();
        let result =
            tokio::task::spawn_blocking(move || load_from_sources(&sources, fetcher.as_ref()))
                .await
                .map_err(|e| LoadError::Task(e.to_string()))
                .and_then(|r| r);

        let outcome = match result {
            Ok(bundle) => {
                let bundle = self.ready.get_or_init(|| Arc::new(bundle)).clone();
                self.set_state(LoadState::Ready, None);
                Ok(bundle)
            }
            Err(e) => {
                self.set_state(LoadState::Failed, Some(e.clone()));
                Err(e)
            }
        };
        self.finished.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn progress_lock(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: LoadState, last_error: Option<LoadError>) {
        let mut progress = self.progress_lock();
        progress.state = state;
        progress.last_error = last_error;
    }
}

/// Load through the process-wide loader.
pub async fn ensure_models_ready() -> bool {
    ModelLoader::global().ensure_ready().await
}

fn load_from_sources(sources: &[ModelSource], fetcher: &dyn Fetch) -> Result<ModelBundle, LoadError> {
    if sources.is_empty() {
        return Err(LoadError::NoSources);
    }

    let mut failed_sources = Vec::new();
    for (index, source) in sources.iter().enumerate() {
        tracing::info!(%source, "loading face models");
        match load_source(source, fetcher) {
            Ok(models) => {
                tracing::info!(%source, models = models.len(), "face models loaded");
                return Ok(ModelBundle {
                    source: source.clone(),
                    source_index: index,
                    models,
                    failed_sources,
                });
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "model source failed, trying next");
                failed_sources.push(SourceFailure {
                    source: source.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::error!(attempts = failed_sources.len(), "no model source succeeded");
    Err(LoadError::Exhausted {
        attempts: failed_sources.len(),
    })
}

fn load_source(source: &ModelSource, fetcher: &dyn Fetch) -> Result<Vec<LoadedModel>, SourceError> {
    let mut models = Vec::with_capacity(MODELS.len());
    for model in MODELS {
        let manifest_bytes = fetcher.fetch(source, model.manifest)?;
        let manifest = WeightsManifest::parse(&manifest_bytes).map_err(|source| {
            SourceError::Manifest {
                name: model.manifest,
                source,
            }
        })?;

        let mut shards = Vec::new();
        for path in manifest.shard_paths() {
            let bytes = fetcher.fetch(source, path)?;
            shards.push((path.to_string(), bytes));
        }

        let sha256 = model_digest(&manifest_bytes, shards.iter().map(|(_, b)| b.as_slice()));
        tracing::debug!(model = model.name, %sha256, shards = shards.len(), "model fetched");

        models.push(LoadedModel {
            kind: model.kind,
            name: model.name,
            manifest_name: model.manifest,
            manifest_bytes,
            manifest,
            shards,
            sha256,
        });
    }
    Ok(models)
}
