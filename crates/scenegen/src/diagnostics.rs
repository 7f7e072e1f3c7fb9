use std::fmt;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCode {
    UnknownBehavior,
    AmbiguousBehavior,
    UnknownParameter,
    CoercionFailed,
    UnresolvedReference,
    AssetNotFound,
    AssetUnreadable,
    UnknownTileName,
    TileOutOfAtlas,
    UnknownTileset,
    InvalidTileset,
    LayerCapacityExceeded,
    UnknownLayer,
    InvalidColor,
    UnknownCommand,
    UnknownParent,
    SceneAborted,
    DuplicateSceneName,
    MalformedSection,
    InvalidLegendKey,
    OutputFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// One per-feature fault. Carries enough context to locate the document fragment
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub scene: Option<String>,
    pub subject: Option<String>,
    pub field: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            scene: None,
            subject: None,
            field: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(code, message)
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)?;
        if let Some(scene) = &self.scene {
            write!(f, " (scene={scene}")?;
        } else {
            write!(f, " (scene=<none>")?;
        }
        if let Some(subject) = &self.subject {
            write!(f, ", subject={subject}")?;
        }
        if let Some(field) = &self.field {
            write!(f, ", field={field}")?;
        }
        if let Some(value) = &self.value {
            write!(f, ", value={value}")?;
        }
        write!(f, ")")
    }
}

/// Append-only list of per-feature faults for one compilation run.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    current_scene: Option<String>,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn enter_scene(&mut self, scene: &str) {
        self.current_scene = Some(scene.to_string());
    }

    pub fn leave_scene(&mut self) {
        self.current_scene = None;
    }

    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.scene.is_none() {
            diagnostic.scene = self.current_scene.clone();
        }
        warn!(
            code = ?diagnostic.code,
            scene = diagnostic.scene.as_deref().unwrap_or("<none>"),
            subject = diagnostic.subject.as_deref().unwrap_or(""),
            field = diagnostic.field.as_deref().unwrap_or(""),
            value = diagnostic.value.as_deref().unwrap_or(""),
            message = %diagnostic.message,
            "compile_diagnostic"
        );
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |entry| entry.code == code)
    }

    pub fn count_code(&self, code: DiagnosticCode) -> usize {
        self.with_code(code).count()
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
