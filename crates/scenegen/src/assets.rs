use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const ASSET_ROOT_PREFIX: &str = "Assets/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset path '{path}' is invalid: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("asset '{path}' not found (tried {tried:?})")]
    NotFound { path: String, tried: Vec<String> },
    #[error("asset '{path}' could not be read: {message}")]
    Unreadable { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetOrigin {
    Project,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetCandidate<'a> {
    /// Canonical project-relative path, e.g. `Assets/asset_library/player.png`.
    Project(&'a str),
    /// File name looked up once under the secondary root.
    Secondary(&'a str),
}

/// Blocking lookups against wherever the host keeps its assets.
pub trait AssetStore {
    /// Pixel size of the image at `candidate`, `Ok(None)` when nothing exists there.
    fn probe(&self, candidate: &AssetCandidate<'_>) -> Result<Option<(u32, u32)>, AssetError>;

    fn describe(&self, candidate: &AssetCandidate<'_>) -> String {
        match candidate {
            AssetCandidate::Project(path) => (*path).to_string(),
            AssetCandidate::Secondary(name) => format!("<secondary>/{name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsAssetStore {
    project_root: PathBuf,
    secondary_root: Option<PathBuf>,
}

impl FsAssetStore {
    pub fn new(project_root: impl Into<PathBuf>, secondary_root: Option<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            secondary_root,
        }
    }

    fn candidate_path(&self, candidate: &AssetCandidate<'_>) -> Option<PathBuf> {
        match candidate {
            AssetCandidate::Project(path) => Some(self.project_root.join(path)),
            AssetCandidate::Secondary(name) => {
                self.secondary_root.as_ref().map(|root| root.join(name))
            }
        }
    }
}

impl AssetStore for FsAssetStore {
    fn probe(&self, candidate: &AssetCandidate<'_>) -> Result<Option<(u32, u32)>, AssetError> {
        let Some(path) = self.candidate_path(candidate) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        image::image_dimensions(&path)
            .map(Some)
            .map_err(|error| AssetError::Unreadable {
                path: path.display().to_string(),
                message: error.to_string(),
            })
    }

    fn describe(&self, candidate: &AssetCandidate<'_>) -> String {
        self.candidate_path(candidate)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<no secondary root>".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedAsset {
    pub canonical_path: String,
    pub origin: AssetOrigin,
    pub pixel_size: (u32, u32),
}

/// Per-run import dedupe: each canonical path is imported at most once.
#[derive(Debug, Default, Clone)]
pub struct ImportCache {
    imported: HashMap<String, ImportedAsset>,
    import_count: usize,
}

impl ImportCache {
    pub fn import(
        &mut self,
        store: &dyn AssetStore,
        raw_path: &str,
    ) -> Result<ImportedAsset, AssetError> {
        let canonical = canonical_asset_path(raw_path)?;
        if let Some(existing) = self.imported.get(&canonical) {
            return Ok(existing.clone());
        }

        let primary = AssetCandidate::Project(&canonical);
        let file_name = canonical.rsplit('/').next().unwrap_or(canonical.as_str());
        let secondary = AssetCandidate::Secondary(file_name);

        let (origin, pixel_size) = match store.probe(&primary)? {
            Some(size) => (AssetOrigin::Project, size),
            None => match store.probe(&secondary)? {
                Some(size) => (AssetOrigin::Secondary, size),
                None => {
                    return Err(AssetError::NotFound {
                        path: raw_path.to_string(),
                        tried: vec![store.describe(&primary), store.describe(&secondary)],
                    })
                }
            },
        };

        let asset = ImportedAsset {
            canonical_path: canonical.clone(),
            origin,
            pixel_size,
        };
        self.import_count += 1;
        debug!(
            canonical_path = %canonical,
            origin = ?origin,
            width = pixel_size.0,
            height = pixel_size.1,
            "asset_imported"
        );
        self.imported.insert(canonical, asset.clone());
        Ok(asset)
    }

    pub fn import_count(&self) -> usize {
        self.import_count
    }

    pub fn is_imported(&self, canonical_path: &str) -> bool {
        self.imported.contains_key(canonical_path)
    }
}

/// Normalizes an authored path into the project-relative `Assets/...` form.
pub fn canonical_asset_path(raw: &str) -> Result<String, AssetError> {
    let invalid = |reason| AssetError::InvalidPath {
        path: raw.to_string(),
        reason,
    };
    let unified = raw.trim().replace('\\', "/");
    let segments = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>();
    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }
    if segments.iter().any(|segment| *segment == "..") {
        return Err(invalid("path must not contain '..'"));
    }
    if segments[0].contains(':') {
        return Err(invalid("path must be relative"));
    }
    let joined = segments.join("/");
    if joined.starts_with(ASSET_ROOT_PREFIX) || joined == "Assets" {
        Ok(joined)
    } else {
        Ok(format!("{ASSET_ROOT_PREFIX}{joined}"))
    }
}
