//! Raw workspace tree — the serde-facing shorthand form plus schema checks.
//!
//! Workspace files allow heavy shorthand: a pane may be a bare command
//! string, a list of commands, a full mapping, or nothing at all;
//! `shell_command_before` may be a string, a list, or `{cmd}` records.
//! This module deserializes that surface, validates the invariants the rest
//! of the pipeline relies on, and converts to the explicit `WorkspaceSpec`
//! tree. Parsing itself is serde's job; nothing here reimplements a reader.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::workspace::{CommandRecord, PaneSpec, WindowSpec, WorkspaceSpec};

/// Pane content values that mean "a pane with no command".
const NOOP_SENTINELS: [&str; 2] = ["blank", "pane"];


/// Top-level raw workspace mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkspace {
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub start_directory: Option<String>,
    #[serde(default)]
    pub before_script: Option<String>,
    #[serde(default)]
    pub shell_command_before: Option<CommandShorthand>,
    #[serde(default)]
    pub environment: BTreeMap<String, ScalarValue>,
    #[serde(default)]
    pub global_options: BTreeMap<String, ScalarValue>,
    #[serde(default)]
    pub options: BTreeMap<String, ScalarValue>,
    #[serde(default)]
    pub suppress_history: Option<bool>,
    /// Kept loose so "plugins is not a list" is a validation error, not a
    /// parse error.
    #[serde(default)]
    pub plugins: Option<serde_yaml::Value>,
    #[serde(default)]
    pub windows: Option<Vec<RawWindow>>,
}


/// One raw window mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWindow {
    #[serde(default)]
    pub window_name: Option<String>,
    #[serde(default)]
    pub start_directory: Option<String>,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, ScalarValue>,
    #[serde(default)]
    pub suppress_history: Option<bool>,
    #[serde(default)]
    pub shell_command_before: Option<CommandShorthand>,
    #[serde(default)]
    pub focus: Option<bool>,
    #[serde(default)]
    pub panes: Option<Vec<RawPane>>,
}


/// One raw pane entry: string, list, mapping, or null.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPane {
    Text(String),
    Commands(Vec<String>),
    Mapping(RawPaneMapping),
    Blank,
}


/// The full mapping form of a pane entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPaneMapping {
    #[serde(default)]
    pub shell_command: Option<CommandShorthand>,
    #[serde(default)]
    pub shell_command_before: Option<CommandShorthand>,
    #[serde(default)]
    pub start_directory: Option<String>,
    #[serde(default)]
    pub focus: Option<bool>,
}


/// Shorthand for command sequences: a bare string or a list of entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandShorthand {
    Single(String),
    Many(Vec<CommandEntry>),
}

/// One entry of a command list: a string or a `{cmd}` record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandEntry {
    Text(String),
    Record(RawCommandRecord),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommandRecord {
    pub cmd: String,
}


// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML workspace document.
pub fn from_yaml(text: &str) -> Result<RawWorkspace> {
    if text.trim().is_empty() {
        return Err(Error::EmptyWorkspace("workspace file has no content".into()));
    }
    let value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| Error::validation(format!("workspace parse error: {}", e)))?;
    if value.is_null() {
        return Err(Error::EmptyWorkspace("workspace file has no content".into()));
    }
    serde_yaml::from_value(value)
        .map_err(|e| Error::validation(format!("workspace parse error: {}", e)))
}

/// Parse a JSON workspace document.
pub fn from_json(text: &str) -> Result<RawWorkspace> {
    if text.trim().is_empty() {
        return Err(Error::EmptyWorkspace("workspace file has no content".into()));
    }
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::validation(format!("workspace parse error: {}", e)))?;
    if value.is_null() {
        return Err(Error::EmptyWorkspace("workspace file has no content".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| Error::validation(format!("workspace parse error: {}", e)))
}


// ---------------------------------------------------------------------------
// Scalar values
// ---------------------------------------------------------------------------

/// An option or environment value: string, number, or boolean.
///
/// tmux only consumes strings on the wire, so everything is stringified at
/// this boundary; booleans become the `on`/`off` forms tmux options use.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    fn into_string(self) -> String {
        match self {
            ScalarValue::Bool(true) => "on".to_string(),
            ScalarValue::Bool(false) => "off".to_string(),
            ScalarValue::Int(n) => n.to_string(),
            ScalarValue::Float(n) => n.to_string(),
            ScalarValue::Text(s) => s,
        }
    }
}

fn stringify_map(map: BTreeMap<String, ScalarValue>) -> BTreeMap<String, String> {
    map.into_iter().map(|(k, v)| (k, v.into_string())).collect()
}


// ---------------------------------------------------------------------------
// Validation + conversion
// ---------------------------------------------------------------------------

impl RawWorkspace {
    /// Validate the structural invariants and convert to the explicit tree.
    ///
    /// Checks, in order: session_name present, plugins (if present) a list of
    /// strings, windows present and non-empty, and every window carrying (or
    /// deriving) a window_name. All checks run before any external side
    /// effect anywhere in the pipeline.
    pub fn into_spec(self) -> Result<WorkspaceSpec> {
        let session_name = match self.session_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(Error::validation("session_name is required")),
        };
        let plugins = plugin_refs(self.plugins)?;
        let raw_windows = match self.windows {
            Some(windows) if !windows.is_empty() => windows,
            _ => return Err(Error::validation("windows is required and must not be empty")),
        };

        let mut windows = Vec::with_capacity(raw_windows.len());
        for (index, window) in raw_windows.into_iter().enumerate() {
            windows.push(convert_window(window, index)?);
        }

        Ok(WorkspaceSpec {
            session_name,
            start_directory: self.start_directory,
            before_script: self.before_script,
            shell_command_before: into_records(self.shell_command_before),
            environment: stringify_map(self.environment),
            global_options: stringify_map(self.global_options),
            options: stringify_map(self.options),
            suppress_history: self.suppress_history,
            plugins,
            windows,
        })
    }
}


fn plugin_refs(value: Option<serde_yaml::Value>) -> Result<Vec<String>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let serde_yaml::Value::Sequence(entries) = value else {
        return Err(Error::validation("plugins must be a list"));
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            serde_yaml::Value::String(name) => Ok(name),
            other => Err(Error::validation(format!(
                "plugins entries must be strings, got {:?}",
                other
            ))),
        })
        .collect()
}


fn convert_window(raw: RawWindow, index: usize) -> Result<WindowSpec> {
    let panes = match raw.panes {
        Some(entries) => Some(entries.into_iter().map(convert_pane).collect()),
        None => None,
    };

    let window_name = match raw.window_name {
        Some(name) => name,
        None => derive_window_name(panes.as_deref().unwrap_or_default()).ok_or_else(|| {
            Error::validation(format!("window {} is missing window_name", index + 1))
        })?,
    };

    Ok(WindowSpec {
        window_name,
        start_directory: raw.start_directory,
        layout: raw.layout,
        options: stringify_map(raw.options),
        suppress_history: raw.suppress_history,
        shell_command_before: into_records(raw.shell_command_before),
        focus: raw.focus.unwrap_or(false),
        panes,
    })
}


fn convert_pane(raw: RawPane) -> PaneSpec {
    match raw {
        RawPane::Blank => PaneSpec::default(),
        RawPane::Text(text) => PaneSpec::with_commands(text_commands(vec![text])),
        RawPane::Commands(list) => PaneSpec::with_commands(text_commands(list)),
        RawPane::Mapping(mapping) => PaneSpec {
            shell_command: text_commands(
                into_records(mapping.shell_command)
                    .into_iter()
                    .map(|record| record.cmd)
                    .collect(),
            ),
            shell_command_before: into_records(mapping.shell_command_before),
            start_directory: mapping.start_directory,
            focus: mapping.focus.unwrap_or(false),
        },
    }
}


/// A window with no name takes the first word of its first pane command.
fn derive_window_name(panes: &[PaneSpec]) -> Option<String> {
    panes
        .iter()
        .flat_map(|pane| pane.shell_command.first())
        .next()
        .and_then(|command| command.split_whitespace().next())
        .map(str::to_string)
}


/// Normalize command shorthand to canonical `{cmd}` records.
///
/// A sequence whose sole element is a no-op sentinel (empty, `blank`, or
/// `pane`) collapses to the empty sequence.
fn into_records(shorthand: Option<CommandShorthand>) -> Vec<CommandRecord> {
    let records: Vec<CommandRecord> = match shorthand {
        None => Vec::new(),
        Some(CommandShorthand::Single(text)) => vec![CommandRecord::new(text)],
        Some(CommandShorthand::Many(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                CommandEntry::Text(text) => CommandRecord::new(text),
                CommandEntry::Record(record) => CommandRecord::new(record.cmd),
            })
            .collect(),
    };
    if records.len() == 1 && is_noop(&records[0].cmd) {
        return Vec::new();
    }
    records
}


fn text_commands(list: Vec<String>) -> Vec<String> {
    if list.len() == 1 && is_noop(&list[0]) {
        return Vec::new();
    }
    list
}

fn is_noop(text: &str) -> bool {
    text.trim().is_empty() || NOOP_SENTINELS.contains(&text.trim())
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
