pub mod assets;
pub mod behavior;
pub mod compiler;
pub mod context;
pub mod diagnostics;
pub mod entity;
mod hashing;
pub mod math;
pub mod output;
pub mod placement;
pub mod registries;
pub mod resolve;
pub mod scene;
pub mod spec;
pub mod tilemap;
pub mod ui;

pub use assets::{AssetError, AssetStore, FsAssetStore, ImportedAsset};
pub use behavior::{
    BehaviorCatalog, BehaviorDescriptor, BehaviorInstance, BehaviorRegistry, CommandTable,
    FieldKind, FieldSchema, FieldValue,
};
pub use compiler::{
    compile_game, compile_game_file, compile_scene, AbortedScene, CompileError, CompileOptions,
    CompileReport, SceneStage, COMPILER_VERSION,
};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use hashing::hash_spec_source;
pub use output::{sanitize_scene_name, OutputError, ProjectPaths, SavedScene};
pub use registries::ProjectRegistries;
pub use scene::{EntityId, SceneArtifact, SceneGraph};
pub use spec::{parse_game_spec, GameSpec, SpecParseError};

/// Environment variable naming the project root when `--project` is not given.
pub const PROJECT_ROOT_ENV_VAR: &str = "SCENEGEN_PROJECT_ROOT";
