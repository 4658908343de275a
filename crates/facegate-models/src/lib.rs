//! Face model manifest, source fallback loading and integrity digests.
//!
//! The three networks the pipeline needs ship as face-api weight manifests
//! (`*-weights_manifest.json`) plus the binary shards each manifest lists.
//! [`ModelLoader`] tries each [`ModelSource`] in order and keeps the first
//! one that serves every model.

mod fetch;
mod loader;

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use fetch::{Fetch, FetchError, HttpFetcher};
pub use loader::{
    ensure_models_ready, LoadError, LoadState, LoadedModel, ModelBundle, ModelLoader,
    SourceFailure,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    FaceDetector,
    LandmarkPredictor,
    DescriptorEncoder,
}

/// One network in the bundle: its weights manifest name and approximate size.
#[derive(Debug)]
pub struct ModelFile {
    pub kind: ModelKind,
    pub name: &'static str,
    pub manifest: &'static str,
    pub size_display: &'static str,
}

pub const MODELS: &[ModelFile] = &[
    ModelFile {
        kind: ModelKind::FaceDetector,
        name: "ssd_mobilenetv1",
        manifest: "ssd_mobilenetv1_model-weights_manifest.json",
        size_display: "5.4 MB",
    },
    ModelFile {
        kind: ModelKind::LandmarkPredictor,
        name: "face_landmark_68",
        manifest: "face_landmark_68_model-weights_manifest.json",
        size_display: "350 KB",
    },
    ModelFile {
        kind: ModelKind::DescriptorEncoder,
        name: "face_recognition",
        manifest: "face_recognition_model-weights_manifest.json",
        size_display: "6.2 MB",
    },
];

/// Public mirrors tried after the local model directory.
pub const MIRRORS: &[&str] = &[
    "https://justadudewhohacks.github.io/face-api.js/models",
    "https://raw.githubusercontent.com/justadudewhohacks/face-api.js/master/weights",
];

/// Where a model bundle can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Remote(String),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Remote(url) => f.write_str(url),
        }
    }
}

/// The local model directory followed by the public mirrors.
pub fn default_sources(local: impl Into<PathBuf>) -> Vec<ModelSource> {
    std::iter::once(ModelSource::Local(local.into()))
        .chain(MIRRORS.iter().map(|url| ModelSource::Remote((*url).to_string())))
        .collect()
}

/// Determine the model directory.
///
/// `FACEGATE_MODEL_DIR` wins when set. Otherwise root gets
/// `/var/lib/facegate/models` and everyone else
/// `$XDG_DATA_HOME/facegate/models` (~/.local/share/facegate/models).
pub fn default_model_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FACEGATE_MODEL_DIR") {
        return PathBuf::from(dir);
    }
    if is_root() {
        PathBuf::from("/var/lib/facegate/models")
    } else {
        let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.local/share")
        });
        PathBuf::from(data_home).join("facegate/models")
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid is always safe to call.
    unsafe { libc::geteuid() == 0 }
}

/// One group of a face-api weights manifest. Only `paths` is interpreted;
/// the tensor specs are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    #[serde(default)]
    pub weights: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightsManifest {
    pub groups: Vec<WeightGroup>,
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("malformed weights manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("weights manifest lists no shards")]
    Empty,

    #[error("unsafe shard path in weights manifest: {0:?}")]
    UnsafePath(String),
}

impl WeightsManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let groups: Vec<WeightGroup> = serde_json::from_slice(bytes)?;
        let manifest = Self { groups };

        let mut any = false;
        for path in manifest.shard_paths() {
            any = true;
            // Shards are written next to the manifest; reject anything that
            // could escape the model directory.
            if path.is_empty() || path.contains('/') || path.contains('\\') || path == ".." {
                return Err(ManifestError::UnsafePath(path.to_string()));
            }
        }
        if !any {
            return Err(ManifestError::Empty);
        }
        Ok(manifest)
    }

    pub fn shard_paths(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.paths.iter().map(String::as_str))
    }
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: String, path: PathBuf },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid weights manifest: {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Combined digest of a model: its manifest followed by every shard in
/// manifest order.
pub fn model_digest<'a>(manifest: &[u8], shards: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest);
    for shard in shards {
        hasher.update(shard);
    }
    format!("{:x}", hasher.finalize())
}

fn read_model_file(name: &str, path: &Path) -> Result<Vec<u8>, ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }
    let mut buf = Vec::new();
    fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|source| ModelIntegrityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buf)
}

/// Recompute the digest of a model stored in `model_dir` and compare it
/// with `expected`.
pub fn verify_model(
    model: &ModelFile,
    model_dir: &Path,
    expected: &str,
) -> Result<(), ModelIntegrityError> {
    let manifest_path = model_dir.join(model.manifest);
    let manifest_bytes = read_model_file(model.manifest, &manifest_path)?;
    let manifest =
        WeightsManifest::parse(&manifest_bytes).map_err(|source| ModelIntegrityError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;

    let mut shards = Vec::new();
    for path in manifest.shard_paths() {
        shards.push(read_model_file(path, &model_dir.join(path))?);
    }

    let got = model_digest(&manifest_bytes, shards.iter().map(Vec::as_slice));
    if got != expected {
        return Err(ModelIntegrityError::ChecksumMismatch {
            name: model.name,
            path: manifest_path,
            expected: expected.to_string(),
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    pub fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "facegate-models-test-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }
}
