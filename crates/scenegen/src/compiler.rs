use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::assets::{AssetStore, FsAssetStore};
use crate::behavior::{builtin_catalog, builtin_commands, BehaviorCatalog, BehaviorRegistry};
use crate::context::BuildContext;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};
use crate::entity::build_entity;
use crate::hashing::hash_spec_source;
use crate::math::Vec3;
use crate::output::{load_registries, save_registries, save_scene, OutputError, ProjectPaths, SavedScene};
use crate::placement::{align_to_ground, GROUND_MARKER};
use crate::scene::{CameraComponent, Color, SceneArtifact, MAIN_CAMERA_TAG};
use crate::spec::{
    parse_game_spec, SceneEntry, SceneSpec, SpecParseError, TilesetSpec, DEFAULT_CAMERA_SIZE,
};
use crate::tilemap::build_tilemap;
use crate::ui::{build_ui_element, create_ui_roots, prepare_ui_actions, PreparedActions};

pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MAIN_CAMERA_NAME: &str = "Main Camera";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("spec rejected: {0}")]
    Parse(#[from] SpecParseError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("failed to read spec file {path}: {source}")]
    ReadSpec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub project_root: PathBuf,
    pub secondary_asset_root: Option<PathBuf>,
    /// Module names, most preferred first, used to settle behavior-name collisions.
    pub precedence: Vec<String>,
    /// Host catalogs indexed next to the built-in one.
    pub catalogs: Vec<BehaviorCatalog>,
    pub cancel: Option<Arc<AtomicBool>>,
    pub compiler_version: String,
}

impl CompileOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            secondary_asset_root: None,
            precedence: Vec::new(),
            catalogs: Vec::new(),
            cancel: None,
            compiler_version: COMPILER_VERSION.to_string(),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortedScene {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub title: String,
    pub saved: Vec<SavedScene>,
    pub aborted: Vec<AbortedScene>,
    pub diagnostics: Vec<Diagnostic>,
    pub cancelled: bool,
}

impl CompileReport {
    pub fn diagnostics_with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |entry| entry.code == code)
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|entry| entry.severity == Severity::Error)
            .count()
    }
}

/// Strictly ordered phases of one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneStage {
    Init,
    CameraApplied,
    BackgroundApplied,
    UiRootApplied,
    EntitiesPlaced,
    PostAligned,
    TilemapsBuilt,
    UiCompiled,
    Saved,
    Aborted,
}

impl SceneStage {
    pub fn successor(self) -> Option<SceneStage> {
        use SceneStage::*;
        match self {
            Init => Some(CameraApplied),
            CameraApplied => Some(BackgroundApplied),
            BackgroundApplied => Some(UiRootApplied),
            UiRootApplied => Some(EntitiesPlaced),
            EntitiesPlaced => Some(PostAligned),
            PostAligned => Some(TilemapsBuilt),
            TilemapsBuilt => Some(UiCompiled),
            UiCompiled => Some(Saved),
            Saved | Aborted => None,
        }
    }
}

pub fn compile_game_file(spec_path: &Path, options: &CompileOptions) -> Result<CompileReport, CompileError> {
    let raw = fs::read_to_string(spec_path).map_err(|source| CompileError::ReadSpec {
        path: spec_path.to_path_buf(),
        source,
    })?;
    let store = FsAssetStore::new(&options.project_root, options.secondary_asset_root.clone());
    compile_game(&raw, options, &store)
}

/// Compiles every scene of `raw` into the project at `options.project_root`.
/// Fatal faults return `Err` before any scene is written; per-scene faults, including
/// a scene file that cannot be written, and per-feature faults end up in the report.
pub fn compile_game(
    raw: &str,
    options: &CompileOptions,
    store: &dyn AssetStore,
) -> Result<CompileReport, CompileError> {
    let parsed = parse_game_spec(raw).map_err(|error| {
        error!(error = %error, "spec_rejected");
        error
    })?;
    let spec = parsed.spec;

    let paths = ProjectPaths::from_root(&options.project_root)?;
    let registries = load_registries(&paths)?;
    let mut catalogs = vec![builtin_catalog()];
    catalogs.extend(options.catalogs.iter().cloned());
    let behaviors = BehaviorRegistry::build(&catalogs, &options.precedence);

    let mut ctx = BuildContext::new(
        registries,
        behaviors,
        builtin_commands(),
        store,
        spec.settings.pixels_per_unit(),
    );
    ctx.apply_settings(&spec.settings);
    for fault in &parsed.section_faults {
        ctx.diagnostics.push(
            Diagnostic::warning(DiagnosticCode::MalformedSection, fault.message.clone())
                .field(fault.path.as_str()),
        );
    }

    let source_hash = hash_spec_source(raw);
    let actions = prepare_ui_actions(&mut ctx, &spec);
    info!(
        title = %spec.title,
        scenes = spec.scenes.len(),
        source_hash = %source_hash,
        "compile_run_start"
    );

    let mut saved = Vec::new();
    let mut aborted = Vec::new();
    let mut seen_outputs = BTreeSet::new();
    let mut cancelled = false;

    for (index, entry) in spec.scenes.iter().enumerate() {
        if options.cancelled() {
            warn!(next_scene = index, saved = saved.len(), "compile_cancelled");
            cancelled = true;
            break;
        }

        let scene = match entry {
            SceneEntry::Parsed(scene) => scene,
            SceneEntry::Malformed(fault) => {
                aborted.push(abort_scene(&mut ctx, index, &fault.name, fault.to_string()));
                continue;
            }
        };
        if !seen_outputs.insert(paths.scene_relative_path(&scene.name)) {
            ctx.diagnostics.enter_scene(&scene.name);
            ctx.diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::DuplicateSceneName,
                    "an earlier scene already writes to the same output file",
                )
                .value(scene.name.as_str()),
            );
            ctx.diagnostics.leave_scene();
            aborted.push(abort_scene(
                &mut ctx,
                index,
                &scene.name,
                "duplicate scene name".to_string(),
            ));
            continue;
        }

        let artifact = compile_scene(
            &mut ctx,
            scene,
            index,
            &spec.tilesets,
            &actions,
            &options.compiler_version,
            &source_hash,
        );
        match save_scene(&paths, &artifact) {
            Ok(scene) => saved.push(scene),
            Err(err) => {
                record_output_failure(&mut ctx, &scene.name, &err);
                aborted.push(abort_scene(
                    &mut ctx,
                    index,
                    &scene.name,
                    format!("failed to write scene: {err}"),
                ));
                continue;
            }
        }
        if let Err(err) = save_registries(&paths, &ctx.registries) {
            record_output_failure(&mut ctx, &scene.name, &err);
        }
    }

    let report = CompileReport {
        title: spec.title,
        saved,
        aborted,
        diagnostics: ctx.diagnostics.into_entries(),
        cancelled,
    };
    info!(
        saved = report.saved.len(),
        aborted = report.aborted.len(),
        warnings = report.warning_count(),
        errors = report.error_count(),
        cancelled = report.cancelled,
        imports = ctx.imports.import_count(),
        "compile_run_summary"
    );
    Ok(report)
}

fn record_output_failure(ctx: &mut BuildContext<'_>, scene: &str, err: &OutputError) {
    error!(scene = %scene, error = %err, "scene_output_failed");
    ctx.diagnostics.enter_scene(scene);
    ctx.diagnostics
        .push(Diagnostic::error(DiagnosticCode::OutputFailed, err.to_string()).value(scene));
    ctx.diagnostics.leave_scene();
}

fn abort_scene(ctx: &mut BuildContext<'_>, index: usize, name: &str, reason: String) -> AbortedScene {
    error!(scene = %name, index, stage = ?SceneStage::Aborted, reason = %reason, "scene_aborted");
    ctx.diagnostics.enter_scene(name);
    ctx.diagnostics
        .push(Diagnostic::error(DiagnosticCode::SceneAborted, reason.clone()).value(name));
    ctx.diagnostics.leave_scene();
    AbortedScene {
        index,
        name: name.to_string(),
        reason,
    }
}

/// Builds one scene artifact in memory. Every phase runs, in order; faults inside a
/// phase are diagnostics, never aborts.
pub fn compile_scene(
    ctx: &mut BuildContext<'_>,
    scene: &SceneSpec,
    index: usize,
    game_tilesets: &[TilesetSpec],
    actions: &PreparedActions,
    compiler_version: &str,
    source_hash: &str,
) -> SceneArtifact {
    ctx.diagnostics.enter_scene(&scene.name);
    info!(scene = %scene.name, index, "scene_compile_start");
    let mut compiler = SceneCompiler {
        artifact: SceneArtifact::empty(&scene.name, compiler_version, source_hash),
        stage: SceneStage::Init,
        ctx: &mut *ctx,
        scene,
        index,
    };
    compiler.apply_camera();
    compiler.apply_background();
    compiler.apply_ui_root();
    compiler.place_entities();
    compiler.align();
    compiler.build_tilemaps(game_tilesets);
    compiler.compile_ui(actions);
    let artifact = compiler.finish();
    ctx.diagnostics.leave_scene();
    artifact
}

struct SceneCompiler<'c, 'a> {
    ctx: &'c mut BuildContext<'a>,
    scene: &'c SceneSpec,
    index: usize,
    artifact: SceneArtifact,
    stage: SceneStage,
}

impl SceneCompiler<'_, '_> {
    fn advance(&mut self, next: SceneStage) {
        debug_assert_eq!(self.stage.successor(), Some(next));
        self.stage = next;
        debug!(
            scene = %self.scene.name,
            stage = ?next,
            entities = self.artifact.graph.len(),
            "scene_stage"
        );
    }

    fn apply_camera(&mut self) {
        let spec = self.scene.camera;
        let existing = self.artifact.camera.or_else(|| self.artifact.primary_camera());
        let graph = &mut self.artifact.graph;
        let camera = existing.unwrap_or_else(|| {
            let id = graph.spawn(MAIN_CAMERA_NAME, None);
            if let Some(entity) = graph.get_mut(id) {
                entity.tag = MAIN_CAMERA_TAG.to_string();
            }
            id
        });
        if let Some(entity) = graph.get_mut(camera) {
            entity.transform.position = Vec3::new(spec.position.x, spec.position.y, spec.position.z);
            let size = if spec.size.is_finite() && spec.size > 0.0 {
                spec.size
            } else {
                DEFAULT_CAMERA_SIZE
            };
            let clear_color = entity
                .components
                .camera
                .as_ref()
                .and_then(|current| current.clear_color);
            entity.components.camera = Some(CameraComponent {
                orthographic: spec.orthographic,
                size,
                clear_color,
                primary: true,
            });
        }
        self.artifact.camera = Some(camera);
        self.advance(SceneStage::CameraApplied);
    }

    fn apply_background(&mut self) {
        if let Some(raw) = self.scene.background_color.as_deref() {
            match Color::parse_hex(raw) {
                Some(color) => {
                    let camera = self
                        .artifact
                        .camera
                        .and_then(|id| self.artifact.graph.get_mut(id))
                        .and_then(|entity| entity.components.camera.as_mut());
                    if let Some(camera) = camera {
                        camera.clear_color = Some(color);
                    }
                }
                None => self.ctx.diagnostics.push(
                    Diagnostic::warning(DiagnosticCode::InvalidColor, "expected #RRGGBB or #RRGGBBAA")
                        .subject(MAIN_CAMERA_NAME)
                        .field("backgroundColor")
                        .value(raw),
                ),
            }
        }
        self.advance(SceneStage::BackgroundApplied);
    }

    fn apply_ui_root(&mut self) {
        if self.artifact.ui_roots.is_none() {
            let roots = create_ui_roots(&mut self.artifact.graph, &self.scene.ui_settings);
            self.artifact.ui_roots = Some(roots);
        }
        self.advance(SceneStage::UiRootApplied);
    }

    fn place_entities(&mut self) {
        for entity in &self.scene.game_objects {
            build_entity(self.ctx, &mut self.artifact.graph, entity);
        }
        self.advance(SceneStage::EntitiesPlaced);
    }

    fn align(&mut self) {
        let ground_layer = self.ctx.registries.layers.index_of(GROUND_MARKER);
        align_to_ground(&mut self.artifact.graph, ground_layer);
        self.advance(SceneStage::PostAligned);
    }

    fn build_tilemaps(&mut self, game_tilesets: &[TilesetSpec]) {
        // Scene-local tilesets shadow document-level ones with the same name.
        let tilesets = self
            .scene
            .tilesets
            .iter()
            .chain(game_tilesets.iter())
            .collect::<Vec<_>>();
        let mut grid_root = None;
        for (index, tilemap) in self.scene.tilemaps.iter().enumerate() {
            build_tilemap(
                self.ctx,
                &mut self.artifact.graph,
                &mut grid_root,
                tilemap,
                index,
                &tilesets,
            );
        }
        self.advance(SceneStage::TilemapsBuilt);
    }

    fn compile_ui(&mut self, actions: &PreparedActions) {
        if let Some(roots) = self.artifact.ui_roots.clone() {
            for (element_index, element) in self.scene.ui.iter().enumerate() {
                let action = actions.get(&(self.index, element_index)).cloned();
                build_ui_element(self.ctx, &mut self.artifact.graph, &roots, element, action);
            }
        }
        self.advance(SceneStage::UiCompiled);
    }

    fn finish(mut self) -> SceneArtifact {
        self.advance(SceneStage::Saved);
        info!(
            scene = %self.scene.name,
            entities = self.artifact.graph.len(),
            "scene_compiled"
        );
        self.artifact
    }
}
