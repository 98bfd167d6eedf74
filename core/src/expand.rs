//! Expander — resolves shell syntax and relative paths in a workspace tree.
//!
//! Takes the explicit tree produced by `types::raw` and returns a new tree
//! with `$VAR` / `~` syntax resolved against the process environment and
//! `.`-prefixed paths anchored to their base directory. Directories chain:
//! a window's relative path resolves against the session's resolved
//! directory, and a pane's against its window's, not the top-level base.
//!
//! Expansion is idempotent: a tree with no remaining shell syntax and no
//! `.`-prefixed paths passes through unchanged. It raises no errors;
//! malformed shapes are a validation concern handled upstream.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::types::workspace::{PaneSpec, WindowSpec, WorkspaceSpec};


/// Expand a whole workspace against `cwd`, the directory containing the
/// workspace file (or the caller's directory for trees built in code).
pub fn expand(spec: &WorkspaceSpec, cwd: &Path) -> WorkspaceSpec {
    let _span = tracing::debug_span!("expand", session = %spec.session_name).entered();

    let start_directory = spec
        .start_directory
        .as_deref()
        .map(|dir| resolve_directory(dir, None, cwd));

    WorkspaceSpec {
        session_name: expand_shell(&spec.session_name),
        start_directory: start_directory.clone(),
        before_script: spec
            .before_script
            .as_deref()
            .map(|script| resolve_directory(script, None, cwd)),
        shell_command_before: spec.shell_command_before.clone(),
        environment: expand_values(&spec.environment, cwd),
        global_options: expand_values(&spec.global_options, cwd),
        options: expand_values(&spec.options, cwd),
        suppress_history: spec.suppress_history,
        plugins: spec.plugins.clone(),
        windows: spec
            .windows
            .iter()
            .map(|window| expand_window(window, cwd, start_directory.as_deref()))
            .collect(),
    }
}


/// Expand one window, chaining its directory through the session's.
fn expand_window(window: &WindowSpec, cwd: &Path, parent_dir: Option<&str>) -> WindowSpec {
    let start_directory = window
        .start_directory
        .as_deref()
        .map(|dir| resolve_directory(dir, parent_dir, cwd));

    WindowSpec {
        window_name: expand_shell(&window.window_name),
        start_directory: start_directory.clone(),
        layout: window.layout.clone(),
        options: expand_values(&window.options, cwd),
        suppress_history: window.suppress_history,
        shell_command_before: window.shell_command_before.clone(),
        focus: window.focus,
        panes: window.panes.as_ref().map(|panes| {
            panes
                .iter()
                .map(|pane| expand_pane(pane, cwd, start_directory.as_deref()))
                .collect()
        }),
    }
}


/// Expand one pane, chaining its directory through the window's.
fn expand_pane(pane: &PaneSpec, cwd: &Path, parent_dir: Option<&str>) -> PaneSpec {
    PaneSpec {
        shell_command: pane.shell_command.clone(),
        shell_command_before: pane.shell_command_before.clone(),
        start_directory: pane
            .start_directory
            .as_deref()
            .map(|dir| resolve_directory(dir, parent_dir, cwd)),
        focus: pane.focus,
    }
}


/// Resolve `$VAR` and `~` against the process environment, leaving
/// unresolvable variables verbatim.
pub fn expand_shell(input: &str) -> String {
    match shellexpand::full_with_context_no_errors(input, home_dir, |name| {
        std::env::var(name).ok()
    }) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    }
}

fn home_dir() -> Option<String> {
    std::env::var("HOME").ok()
}


/// Shell-expand a directory-like value and anchor `.`-prefixed paths.
///
/// The base is the parent's resolved start_directory when one exists,
/// otherwise `cwd`; the joined result is lexically normalized.
fn resolve_directory(value: &str, parent_dir: Option<&str>, cwd: &Path) -> String {
    let expanded = expand_shell(value);
    if !expanded.starts_with('.') {
        return expanded;
    }
    let base = parent_dir.map(Path::new).unwrap_or(cwd);
    normalize_path(&base.join(&expanded))
        .to_string_lossy()
        .into_owned()
}


/// Expand map values; `.`-prefixed values become absolute paths under `cwd`.
fn expand_values(map: &BTreeMap<String, String>, cwd: &Path) -> BTreeMap<String, String> {
    map.iter()
        .map(|(key, value)| {
            let expanded = expand_shell(value);
            let resolved = if expanded.starts_with('.') {
                normalize_path(&cwd.join(&expanded))
                    .to_string_lossy()
                    .into_owned()
            } else {
                expanded
            };
            (key.clone(), resolved)
        })
        .collect()
}


/// Lexically normalize a path: drop `.` components, fold `..` into their
/// parent. No filesystem access.
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
