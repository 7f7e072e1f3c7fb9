use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use super::{coerce_parameter, FieldKind, FieldSchema, FieldValue};
use crate::registries::LayerTable;
use crate::scene::{SceneGraph, UiAction};
use crate::spec::UiActionSpec;

/// Document-level facts a command may check its arguments against.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub scene_names: &'a [String],
}

pub type CommandCheck = fn(&BTreeMap<String, FieldValue>, &CommandContext<'_>) -> Result<(), String>;

#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub params: Vec<FieldSchema>,
    pub check: CommandCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("no UI command named '{command}' is registered")]
    Unknown { command: String },
    #[error("UI command '{command}' has no parameter '{param}'")]
    UnknownParameter { command: String, param: String },
    #[error("UI command '{command}' is missing parameter '{param}'")]
    MissingParameter { command: String, param: String },
    #[error("UI command '{command}' parameter '{param}': {message}")]
    InvalidArgument {
        command: String,
        param: String,
        message: String,
    },
    #[error("UI command '{command}' rejected its arguments: {message}")]
    Rejected { command: String, message: String },
}

/// Symbolic UI actions a button may trigger. Lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: Vec<CommandDescriptor>,
}

impl CommandTable {
    pub fn register(&mut self, descriptor: CommandDescriptor) {
        self.commands
            .retain(|existing| !existing.name.eq_ignore_ascii_case(descriptor.name));
        self.commands.push(descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        let name = name.trim();
        self.commands
            .iter()
            .find(|command| command.name == name)
            .or_else(|| {
                self.commands
                    .iter()
                    .find(|command| command.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Turns an authored action into a typed one. Every declared parameter is required.
    pub fn prepare(
        &self,
        action: &UiActionSpec,
        context: &CommandContext<'_>,
    ) -> Result<UiAction, CommandError> {
        let descriptor = self.get(&action.command).ok_or_else(|| CommandError::Unknown {
            command: action.command.clone(),
        })?;
        let command = descriptor.name.to_string();

        if let Some(extra) = action
            .args
            .keys()
            .find(|key| !descriptor.params.iter().any(|param| param.name.eq_ignore_ascii_case(key)))
        {
            return Err(CommandError::UnknownParameter {
                command,
                param: extra.clone(),
            });
        }

        let empty_graph = SceneGraph::default();
        let layers = LayerTable::default();
        let mut values = BTreeMap::new();
        for param in &descriptor.params {
            let raw = action
                .args
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(param.name))
                .map(|(_, value)| value)
                .filter(|value| !value.is_null());
            let Some(raw) = raw else {
                return Err(CommandError::MissingParameter {
                    command,
                    param: param.name.to_string(),
                });
            };
            let value = coerce_parameter(param.kind, raw, &empty_graph, &layers, None).map_err(
                |error| CommandError::InvalidArgument {
                    command: command.clone(),
                    param: param.name.to_string(),
                    message: error.to_string(),
                },
            )?;
            values.insert(param.name.to_string(), value);
        }

        (descriptor.check)(&values, context).map_err(|message| CommandError::Rejected {
            command: command.clone(),
            message,
        })?;

        Ok(UiAction {
            command,
            args: values.into_iter().collect(),
        })
    }
}

fn accept_any(_: &BTreeMap<String, FieldValue>, _: &CommandContext<'_>) -> Result<(), String> {
    Ok(())
}

fn scene_exists(args: &BTreeMap<String, FieldValue>, context: &CommandContext<'_>) -> Result<(), String> {
    match args.get("scene") {
        Some(FieldValue::Text(scene)) if context.scene_names.iter().any(|name| name == scene) => Ok(()),
        Some(FieldValue::Text(scene)) => Err(format!("scene '{scene}' is not defined in this document")),
        _ => Err("scene must be text".to_string()),
    }
}

pub fn builtin_commands() -> CommandTable {
    let mut table = CommandTable::default();
    table.register(CommandDescriptor {
        name: "LoadScene",
        params: vec![FieldSchema::new("scene", FieldKind::Text)],
        check: scene_exists,
    });
    table.register(CommandDescriptor {
        name: "ReloadScene",
        params: Vec::new(),
        check: accept_any,
    });
    table.register(CommandDescriptor {
        name: "Quit",
        params: Vec::new(),
        check: accept_any,
    });
    table.register(CommandDescriptor {
        name: "SetPaused",
        params: vec![FieldSchema::new("paused", FieldKind::Bool)],
        check: accept_any,
    });
    table
}
