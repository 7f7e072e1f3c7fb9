mod atomic_io;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::registries::ProjectRegistries;
use crate::scene::SceneArtifact;

use self::atomic_io::write_bytes_atomic;

pub const ASSETS_DIR: &str = "Assets";
pub const SCENES_DIR: &str = "Scenes";
pub const SETTINGS_DIR: &str = "ProjectSettings";
pub const BUILD_SETTINGS_FILE: &str = "EditorBuildSettings.json";
pub const TAG_MANAGER_FILE: &str = "TagManager.json";
pub const SCENE_FILE_SUFFIX: &str = ".scene.json";
const FALLBACK_SCENE_FILE_NAME: &str = "Scene";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a run reads project state from and writes its artifacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub scenes_dir: PathBuf,
    pub settings_dir: PathBuf,
    pub build_settings_path: PathBuf,
    pub tag_manager_path: PathBuf,
}

impl ProjectPaths {
    pub fn from_root(root: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let root = root.into();
        let assets_dir = root.join(ASSETS_DIR);
        let scenes_dir = assets_dir.join(SCENES_DIR);
        let settings_dir = root.join(SETTINGS_DIR);

        for dir in [&scenes_dir, &settings_dir] {
            fs::create_dir_all(dir).map_err(|source| OutputError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            build_settings_path: settings_dir.join(BUILD_SETTINGS_FILE),
            tag_manager_path: settings_dir.join(TAG_MANAGER_FILE),
            root,
            assets_dir,
            scenes_dir,
            settings_dir,
        })
    }

    pub fn scene_path(&self, scene_name: &str) -> PathBuf {
        self.scenes_dir.join(scene_file_name(scene_name))
    }

    /// Project-relative path with forward slashes, as listed in the build settings.
    pub fn scene_relative_path(&self, scene_name: &str) -> String {
        format!("{ASSETS_DIR}/{SCENES_DIR}/{}", scene_file_name(scene_name))
    }
}

fn scene_file_name(scene_name: &str) -> String {
    format!("{}{SCENE_FILE_SUFFIX}", sanitize_scene_name(scene_name))
}

/// Keeps ASCII letters, digits, space, `_` and `-`; everything else becomes `_`.
pub fn sanitize_scene_name(name: &str) -> String {
    let sanitized = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, ' ' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() || sanitized.chars().all(|ch| ch == '_') {
        FALLBACK_SCENE_FILE_NAME.to_string()
    } else {
        sanitized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedScene {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: String,
    pub added_to_build: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSceneEntry {
    pub path: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSceneList {
    #[serde(default)]
    pub scenes: Vec<BuildSceneEntry>,
}

fn read_json_or_default<T>(path: &Path) -> Result<T, OutputError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(OutputError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw).map_err(|source| OutputError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| OutputError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_build_scenes(paths: &ProjectPaths) -> Result<BuildSceneList, OutputError> {
    read_json_or_default(&paths.build_settings_path)
}

/// Adds a scene to the build list unless its path is already listed.
pub fn register_build_scene(paths: &ProjectPaths, relative_path: &str) -> Result<bool, OutputError> {
    let mut list = load_build_scenes(paths)?;
    if list.scenes.iter().any(|entry| entry.path == relative_path) {
        return Ok(false);
    }
    list.scenes.push(BuildSceneEntry {
        path: relative_path.to_string(),
        enabled: true,
    });
    write_json_pretty(&paths.build_settings_path, &list)?;
    Ok(true)
}

/// A missing file yields the built-in registries.
pub fn load_registries(paths: &ProjectPaths) -> Result<ProjectRegistries, OutputError> {
    read_json_or_default::<ProjectRegistries>(&paths.tag_manager_path).map(ProjectRegistries::normalized)
}

pub fn save_registries(paths: &ProjectPaths, registries: &ProjectRegistries) -> Result<(), OutputError> {
    write_json_pretty(&paths.tag_manager_path, registries)
}

/// Writes the artifact atomically and makes sure it appears in the build list.
pub fn save_scene(paths: &ProjectPaths, artifact: &SceneArtifact) -> Result<SavedScene, OutputError> {
    let path = paths.scene_path(&artifact.name);
    let relative_path = paths.scene_relative_path(&artifact.name);
    write_json_pretty(&path, artifact)?;
    let added_to_build = register_build_scene(paths, &relative_path)?;
    info!(
        scene = %artifact.name,
        path = %path.display(),
        entities = artifact.graph.len(),
        added_to_build,
        "scene_saved"
    );
    Ok(SavedScene {
        name: artifact.name.clone(),
        path,
        relative_path,
        added_to_build,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn sanitizing_keeps_case_and_replaces_unsafe_chars() {
        assert_eq!(sanitize_scene_name("Level 1"), "Level 1");
        assert_eq!(sanitize_scene_name("Boss/Fight:Final?"), "Boss_Fight_Final_");
        assert_eq!(sanitize_scene_name("../.."), "Scene");
        assert_eq!(sanitize_scene_name("   "), "Scene");
        assert_eq!(sanitize_scene_name("Über"), "_ber");
    }

    #[test]
    fn from_root_creates_output_directories() {
        let temp = TempDir::new().expect("tempdir");
        let paths = ProjectPaths::from_root(temp.path()).expect("paths");
        assert!(paths.scenes_dir.is_dir());
        assert!(paths.settings_dir.is_dir());
        assert_eq!(paths.scene_relative_path("Menu"), "Assets/Scenes/Menu.scene.json");
    }

    #[test]
    fn build_list_never_duplicates_a_path() {
        let temp = TempDir::new().expect("tempdir");
        let paths = ProjectPaths::from_root(temp.path()).expect("paths");
        assert!(register_build_scene(&paths, "Assets/Scenes/A.scene.json").expect("first"));
        assert!(!register_build_scene(&paths, "Assets/Scenes/A.scene.json").expect("again"));
        assert!(register_build_scene(&paths, "Assets/Scenes/B.scene.json").expect("second"));
        let list = load_build_scenes(&paths).expect("list");
        assert_eq!(list.scenes.len(), 2);
    }

    #[test]
    fn saved_scene_is_written_and_listed() {
        let temp = TempDir::new().expect("tempdir");
        let paths = ProjectPaths::from_root(temp.path()).expect("paths");
        let artifact = SceneArtifact::empty("Level:1", "test", "abc");
        let saved = save_scene(&paths, &artifact).expect("save");
        assert!(saved.added_to_build);
        assert!(saved.path.ends_with("Level_1.scene.json"));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&saved.path).expect("read")).expect("json");
        assert_eq!(written["name"], "Level:1");
        assert!(!save_scene(&paths, &artifact).expect("resave").added_to_build);
    }

    #[test]
    fn registries_round_trip_and_missing_file_is_default() {
        let temp = TempDir::new().expect("tempdir");
        let paths = ProjectPaths::from_root(temp.path()).expect("paths");
        assert_eq!(load_registries(&paths).expect("default"), ProjectRegistries::default());

        let mut registries = ProjectRegistries::default();
        registries.tags.register("Coin");
        registries.layers.register("Ground").expect("ground");
        save_registries(&paths, &registries).expect("save");
        assert_eq!(load_registries(&paths).expect("load"), registries);
    }

    #[test]
    fn corrupt_registry_file_is_a_decode_error() {
        let temp = TempDir::new().expect("tempdir");
        let paths = ProjectPaths::from_root(temp.path()).expect("paths");
        fs::write(&paths.tag_manager_path, "{not json").expect("write");
        assert!(matches!(
            load_registries(&paths),
            Err(OutputError::Decode { .. })
        ));
    }
}
