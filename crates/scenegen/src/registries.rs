use serde::{Deserialize, Serialize};

pub const LAYER_SLOT_COUNT: usize = 32;
pub const FIRST_USER_LAYER: usize = 8;
pub const DEFAULT_SORTING_LAYER: &str = "Default";
pub const UI_LAYER_NAME: &str = "UI";
/// Built-in slot of the `UI` layer; always present, never reassigned.
pub const UI_LAYER_INDEX: u32 = 5;

const BUILTIN_TAGS: [&str; 7] = [
    "Untagged",
    "Respawn",
    "Finish",
    "EditorOnly",
    "MainCamera",
    "Player",
    "GameController",
];

const BUILTIN_LAYERS: [(usize, &str); 5] = [
    (0, "Default"),
    (1, "TransparentFX"),
    (2, "Ignore Raycast"),
    (4, "Water"),
    (UI_LAYER_INDEX as usize, UI_LAYER_NAME),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Existing,
    Added,
}

/// Append-only, case-sensitive tag list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTable {
    tags: Vec<String>,
}

impl Default for TagTable {
    fn default() -> Self {
        Self {
            tags: BUILTIN_TAGS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl TagTable {
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|known| known == tag)
    }

    pub fn register(&mut self, tag: &str) -> Registration {
        if self.contains(tag) {
            Registration::Existing
        } else {
            self.tags.push(tag.to_string());
            Registration::Added
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("all {user_slots} user layer slots are taken; cannot add '{layer}'")]
pub struct LayerCapacityExceeded {
    pub layer: String,
    pub user_slots: usize,
}

/// Fixed 32-slot layer table. Slots below `FIRST_USER_LAYER` are reserved for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTable {
    slots: Vec<Option<String>>,
}

impl Default for LayerTable {
    fn default() -> Self {
        let mut slots = vec![None; LAYER_SLOT_COUNT];
        for (index, name) in BUILTIN_LAYERS {
            slots[index] = Some(name.to_string());
        }
        Self { slots }
    }
}

impl LayerTable {
    pub fn index_of(&self, layer: &str) -> Option<u32> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(layer))
            .map(|index| index as u32)
    }

    pub fn register(&mut self, layer: &str) -> Result<(u32, Registration), LayerCapacityExceeded> {
        if let Some(index) = self.index_of(layer) {
            return Ok((index, Registration::Existing));
        }
        let free = self
            .slots
            .iter()
            .enumerate()
            .skip(FIRST_USER_LAYER)
            .find(|(_, slot)| slot.is_none())
            .map(|(index, _)| index);
        match free {
            Some(index) => {
                self.slots[index] = Some(layer.to_string());
                Ok((index as u32, Registration::Added))
            }
            None => Err(LayerCapacityExceeded {
                layer: layer.to_string(),
                user_slots: LAYER_SLOT_COUNT - FIRST_USER_LAYER,
            }),
        }
    }

    pub fn mask_for(&self, layer: &str) -> Option<u32> {
        self.index_of(layer).map(|index| 1u32 << index)
    }

    pub fn named_slots(&self) -> impl Iterator<Item = (u32, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_deref().map(|name| (index as u32, name)))
    }

    fn normalized(mut self) -> Self {
        self.slots.resize(LAYER_SLOT_COUNT, None);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingLayer {
    pub name: String,
    pub unique_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingLayerTable {
    layers: Vec<SortingLayer>,
}

impl Default for SortingLayerTable {
    fn default() -> Self {
        Self {
            layers: vec![SortingLayer {
                name: DEFAULT_SORTING_LAYER.to_string(),
                unique_id: 0,
            }],
        }
    }
}

impl SortingLayerTable {
    pub fn get(&self, name: &str) -> Option<&SortingLayer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Appends a layer with a fresh random identifier unless the name is already present.
    pub fn register(&mut self, name: &str) -> Registration {
        if self.get(name).is_some() {
            return Registration::Existing;
        }
        let mut unique_id = rand::random::<u32>();
        while unique_id == 0 || self.layers.iter().any(|layer| layer.unique_id == unique_id) {
            unique_id = rand::random::<u32>();
        }
        self.layers.push(SortingLayer {
            name: name.to_string(),
            unique_id,
        });
        Registration::Added
    }

    pub fn layers(&self) -> &[SortingLayer] {
        &self.layers
    }
}

/// On-disk form of the three registries, written to the project settings directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRegistries {
    #[serde(default)]
    pub tags: TagTable,
    #[serde(default)]
    pub layers: LayerTable,
    #[serde(default)]
    pub sorting_layers: SortingLayerTable,
}

impl ProjectRegistries {
    pub fn normalized(self) -> Self {
        Self {
            layers: self.layers.normalized(),
            ..self
        }
    }
}
