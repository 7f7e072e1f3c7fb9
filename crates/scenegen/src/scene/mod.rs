mod components;

use serde::Serialize;

use crate::math::{Affine2, Rect, Vec2};

pub use components::{
    CameraComponent, CanvasComponent, Collider, ColliderShape, Color, Components, LocalTransform,
    PhysicsBody, RectTransform, SpriteVisual, UiAction, UiComponent, DEFAULT_BOX_SIZE,
    DEFAULT_CIRCLE_RADIUS,
};

pub const UNTAGGED: &str = "Untagged";
pub const MAIN_CAMERA_TAG: &str = "MainCamera";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Authored `id`, kept so references can name an entity by it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub tag: String,
    pub layer: u32,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub transform: LocalTransform,
    pub components: Components,
}

/// Flat arena of entities in creation order. Parent/child links are ids into the arena.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneGraph {
    entities: Vec<Entity>,
}

impl SceneGraph {
    pub fn spawn(&mut self, name: &str, parent: Option<EntityId>) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity {
            id,
            name: name.to_string(),
            source_id: None,
            tag: UNTAGGED.to_string(),
            layer: 0,
            parent: None,
            children: Vec::new(),
            transform: LocalTransform::default(),
            components: Components::default(),
        });
        if let Some(parent) = parent {
            self.set_parent(id, parent);
        }
        id
    }

    /// Re-parents `child` under `parent`, keeping its local transform. Ignored when it
    /// would create a cycle.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> bool {
        if child == parent || self.is_ancestor(child, parent) || self.get(parent).is_none() {
            return false;
        }
        let previous = match self.get(child) {
            Some(entity) => entity.parent,
            None => return false,
        };
        if let Some(previous) = previous.and_then(|id| self.get_mut(id)) {
            previous.children.retain(|id| *id != child);
        }
        if let Some(entity) = self.get_mut(child) {
            entity.parent = Some(parent);
        }
        if let Some(entity) = self.get_mut(parent) {
            entity.children.push(child);
        }
        true
    }

    fn is_ancestor(&self, ancestor: EntityId, of: EntityId) -> bool {
        let mut cursor = self.get(of).and_then(|entity| entity.parent);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(|entity| entity.parent);
        }
        false
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0 as usize)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.get(id)
            .map(|entity| entity.children.as_slice())
            .unwrap_or_default()
    }

    /// Depth-first, pre-order descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = self.children(id).iter().rev().copied().collect::<Vec<_>>();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| entity.name == name)
            .map(|entity| entity.id)
    }

    pub fn find_by_source_id(&self, source_id: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| entity.source_id.as_deref() == Some(source_id))
            .map(|entity| entity.id)
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| entity.tag == tag)
            .map(|entity| entity.id)
    }

    pub fn world_transform(&self, id: EntityId) -> Affine2 {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(entity) = self.get(current) else {
                break;
            };
            chain.push(local_affine(&entity.transform));
            cursor = entity.parent;
        }
        chain
            .iter()
            .rev()
            .fold(Affine2::IDENTITY, |world, local| world.then_local(local))
    }

    pub fn world_visual_bounds(&self, id: EntityId) -> Option<Rect> {
        let visual = self.get(id)?.components.visual.as_ref()?;
        Some(self.world_transform(id).transform_rect(&visual.local_bounds))
    }

    pub fn world_collider_bounds(&self, id: EntityId) -> Option<Rect> {
        let entity = self.get(id)?;
        let world = self.world_transform(id);
        entity
            .components
            .colliders
            .iter()
            .map(|collider| world.transform_rect(&collider.local_bounds()))
            .reduce(|acc, rect| acc.union(&rect))
    }

    /// Moves an entity by a world-space displacement, converting through its parent.
    pub fn translate_world(&mut self, id: EntityId, delta: Vec2) {
        let parent = self.get(id).and_then(|entity| entity.parent);
        let local_delta = match parent {
            Some(parent) => self.world_transform(parent).inverse_transform_vector(delta),
            None => delta,
        };
        if let Some(entity) = self.get_mut(id) {
            entity.transform.position.x += local_delta.x;
            entity.transform.position.y += local_delta.y;
        }
    }
}

fn local_affine(transform: &LocalTransform) -> Affine2 {
    Affine2 {
        translation: transform.position.xy(),
        rotation_degrees: transform.rotation_z_degrees,
        scale: Vec2::new(transform.scale.x, transform.scale.y),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiRoots {
    pub canvas: EntityId,
    pub event_system: EntityId,
}

/// Output of compiling one scene; this is what gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneArtifact {
    pub format_version: u16,
    pub name: String,
    pub compiler_version: String,
    pub source_hash_sha256_hex: String,
    pub graph: SceneGraph,
    pub camera: Option<EntityId>,
    pub ui_roots: Option<UiRoots>,
}

pub const SCENE_FORMAT_VERSION: u16 = 1;

impl SceneArtifact {
    pub fn empty(name: &str, compiler_version: &str, source_hash_sha256_hex: &str) -> Self {
        Self {
            format_version: SCENE_FORMAT_VERSION,
            name: name.to_string(),
            compiler_version: compiler_version.to_string(),
            source_hash_sha256_hex: source_hash_sha256_hex.to_string(),
            graph: SceneGraph::default(),
            camera: None,
            ui_roots: None,
        }
    }

    pub fn primary_camera(&self) -> Option<EntityId> {
        self.graph
            .entities()
            .iter()
            .find(|entity| {
                entity
                    .components
                    .camera
                    .as_ref()
                    .is_some_and(|camera| camera.primary)
            })
            .map(|entity| entity.id)
    }
}
