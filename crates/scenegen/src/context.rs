use tracing::info;

use crate::assets::{AssetError, AssetStore, ImportCache, ImportedAsset};
use crate::behavior::{BehaviorRegistry, CommandTable};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::registries::{ProjectRegistries, Registration, DEFAULT_SORTING_LAYER};
use crate::spec::SettingsSpec;

/// Mutable state for exactly one compilation run. Created by the compiler at run start
/// and dropped at run end.
pub struct BuildContext<'a> {
    pub registries: ProjectRegistries,
    pub imports: ImportCache,
    pub behaviors: BehaviorRegistry,
    pub commands: CommandTable,
    pub diagnostics: Diagnostics,
    pub pixels_per_unit: f32,
    assets: &'a dyn AssetStore,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        registries: ProjectRegistries,
        behaviors: BehaviorRegistry,
        commands: CommandTable,
        assets: &'a dyn AssetStore,
        pixels_per_unit: f32,
    ) -> Self {
        Self {
            registries,
            imports: ImportCache::default(),
            behaviors,
            commands,
            diagnostics: Diagnostics::default(),
            pixels_per_unit,
            assets,
        }
    }

    /// Registers the document-level tags, layers and sorting layers up front.
    pub fn apply_settings(&mut self, settings: &SettingsSpec) {
        self.pixels_per_unit = settings.pixels_per_unit();
        let named = |name: &&String| !name.trim().is_empty();
        for tag in settings.tags.iter().filter(named) {
            self.register_tag(tag);
        }
        for layer in settings.layers.iter().filter(named) {
            self.register_layer(layer, "settings");
        }
        for sorting_layer in settings.sorting_layers.iter().filter(named) {
            self.register_sorting_layer(sorting_layer);
        }
    }

    pub fn register_tag(&mut self, tag: &str) -> String {
        let tag = tag.trim();
        if self.registries.tags.register(tag) == Registration::Added {
            info!(tag, "tag_registered");
        }
        tag.to_string()
    }

    /// Returns the layer index, or `None` after recording a capacity diagnostic.
    pub fn register_layer(&mut self, layer: &str, subject: &str) -> Option<u32> {
        let layer = layer.trim();
        match self.registries.layers.register(layer) {
            Ok((index, Registration::Added)) => {
                info!(layer, index, "layer_registered");
                Some(index)
            }
            Ok((index, Registration::Existing)) => Some(index),
            Err(error) => {
                self.diagnostics.push(
                    Diagnostic::warning(DiagnosticCode::LayerCapacityExceeded, error.to_string())
                        .subject(subject)
                        .field("layer")
                        .value(layer),
                );
                None
            }
        }
    }

    /// Empty names fall back to the default sorting layer.
    pub fn register_sorting_layer(&mut self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            return DEFAULT_SORTING_LAYER.to_string();
        }
        if self.registries.sorting_layers.register(name) == Registration::Added {
            info!(sorting_layer = name, "sorting_layer_registered");
        }
        name.to_string()
    }

    /// Imports through the run's dedupe cache; failures become diagnostics.
    pub fn import_asset(&mut self, raw_path: &str, subject: &str, field: &str) -> Option<ImportedAsset> {
        match self.imports.import(self.assets, raw_path) {
            Ok(asset) => Some(asset),
            Err(error) => {
                let code = match error {
                    AssetError::Unreadable { .. } => DiagnosticCode::AssetUnreadable,
                    AssetError::NotFound { .. } | AssetError::InvalidPath { .. } => {
                        DiagnosticCode::AssetNotFound
                    }
                };
                self.diagnostics.push(
                    Diagnostic::warning(code, error.to_string())
                        .subject(subject)
                        .field(field)
                        .value(raw_path),
                );
                None
            }
        }
    }
}
