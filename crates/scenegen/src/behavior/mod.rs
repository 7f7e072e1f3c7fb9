mod binding;
mod builtin;
mod commands;
mod registry;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::math::{Vec2, Vec3};
use crate::scene::{Color, EntityId};

pub use binding::{
    attach_behaviors, coerce_parameter, CoerceError, GROUND_CHECK_FALLBACK_OFFSET,
    GROUND_CHECK_MARGIN, GROUND_CHECK_NAME, GROUND_LAYER,
};
pub use builtin::{builtin_catalog, BUILTIN_MODULE};
pub use commands::{
    builtin_commands, CommandCheck, CommandContext, CommandDescriptor, CommandError, CommandTable,
};
pub use registry::{BehaviorCatalog, BehaviorLookupError, BehaviorRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentKind {
    Transform,
    Body,
    Visual,
    Collider,
    Ui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    Vector2,
    Vector3,
    Color,
    LayerMask,
    EntityRef,
    ComponentRef(ComponentKind),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Vector2(Vec2),
    Vector3(Vec3),
    Color(Color),
    LayerMask(u32),
    Entity(EntityId),
    Component { entity: EntityId, kind: ComponentKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingSource {
    Explicit,
    AutoWired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldBinding {
    pub value: FieldValue,
    pub source: BindingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Stores an already-coerced value, or rejects it with a reason.
pub type BindFn = fn(&mut BehaviorInstance, &FieldSchema, FieldValue) -> Result<(), String>;

#[derive(Debug, Clone)]
pub struct BehaviorDescriptor {
    pub name: &'static str,
    pub fields: Vec<FieldSchema>,
    pub bind: BindFn,
}

impl BehaviorDescriptor {
    pub fn new(name: &'static str, fields: Vec<FieldSchema>) -> Self {
        Self {
            name,
            fields,
            bind: store_field,
        }
    }

    pub fn with_binder(mut self, bind: BindFn) -> Self {
        self.bind = bind;
        self
    }

    /// Exact field name first, then a case-insensitive match.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|field| field.name.eq_ignore_ascii_case(name))
            })
    }
}

pub fn store_field(
    instance: &mut BehaviorInstance,
    schema: &FieldSchema,
    value: FieldValue,
) -> Result<(), String> {
    instance.set(schema.name, value, BindingSource::Explicit);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorInstance {
    pub module: String,
    pub name: String,
    pub fields: BTreeMap<String, FieldBinding>,
}

impl BehaviorInstance {
    pub fn new(module: &str, descriptor: &BehaviorDescriptor) -> Self {
        Self {
            module: module.to_string(),
            name: descriptor.name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, field: &str, value: FieldValue, source: BindingSource) {
        self.fields
            .insert(field.to_string(), FieldBinding { value, source });
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).map(|binding| &binding.value)
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn source(&self, field: &str) -> Option<BindingSource> {
        self.fields.get(field).map(|binding| binding.source)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}
