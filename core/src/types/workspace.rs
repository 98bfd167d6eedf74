//! Workspace tree — the explicit, fully-typed session/window/pane description.
//!
//! This is the form every transform operates on: the raw reader output is
//! normalized into it (`types::raw`), the expander resolves shell syntax and
//! relative paths over it, and the trickler flattens inheritance through it.
//! Each phase returns a new tree; nothing mutates a shared structure.

use std::collections::BTreeMap;

use serde::Serialize;


/// A canonical before-command record.
///
/// `shell_command_before` shorthand (bare string, list of strings, list of
/// `{cmd}` mappings) always normalizes to a sequence of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    pub cmd: String,
}

impl CommandRecord {
    pub fn new(cmd: impl Into<String>) -> CommandRecord {
        CommandRecord { cmd: cmd.into() }
    }
}


/// The top-level workspace description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceSpec {
    pub session_name: String,
    pub start_directory: Option<String>,
    pub before_script: Option<String>,
    pub shell_command_before: Vec<CommandRecord>,
    pub environment: BTreeMap<String, String>,
    pub global_options: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
    pub suppress_history: Option<bool>,
    /// Ordered plugin references; resolution to constructible objects is the
    /// registry's concern (see `plugin`).
    pub plugins: Vec<String>,
    pub windows: Vec<WindowSpec>,
}


/// One window of the workspace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSpec {
    pub window_name: String,
    pub start_directory: Option<String>,
    pub layout: Option<String>,
    pub options: BTreeMap<String, String>,
    pub suppress_history: Option<bool>,
    pub shell_command_before: Vec<CommandRecord>,
    pub focus: bool,
    /// `None` means the window had no `panes` field at all; the trickler
    /// replaces that with exactly one blank pane.
    pub panes: Option<Vec<PaneSpec>>,
}

impl WindowSpec {
    /// The window's panes, empty when the field is still absent.
    pub fn panes(&self) -> &[PaneSpec] {
        self.panes.as_deref().unwrap_or_default()
    }
}


/// One pane of a window.
///
/// Before trickling, `shell_command` holds only the pane's own commands.
/// After trickling it is the full resolved sequence: every applicable
/// ancestor before-command followed by the pane's own commands, in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PaneSpec {
    pub shell_command: Vec<String>,
    pub shell_command_before: Vec<CommandRecord>,
    pub start_directory: Option<String>,
    pub focus: bool,
}

impl PaneSpec {
    /// A pane that only runs the given commands.
    pub fn with_commands(commands: Vec<String>) -> PaneSpec {
        PaneSpec {
            shell_command: commands,
            ..PaneSpec::default()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panes_accessor_defaults_to_empty() {
        let window = WindowSpec {
            window_name: "w1".into(),
            start_directory: None,
            layout: None,
            options: BTreeMap::new(),
            suppress_history: None,
            shell_command_before: Vec::new(),
            focus: false,
            panes: None,
        };
        assert!(window.panes().is_empty());
    }

    #[test]
    fn pane_with_commands() {
        let pane = PaneSpec::with_commands(vec!["vim".into()]);
        assert_eq!(pane.shell_command, vec!["vim"]);
        assert!(pane.shell_command_before.is_empty());
    }
}
