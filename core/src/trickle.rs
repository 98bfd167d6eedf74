//! Trickler — propagates inherited attributes and flattens command prefixes.
//!
//! Operates on Expander output only. After this pass every pane's
//! `shell_command` is self-contained: session, window, and pane
//! before-commands followed by the pane's own commands, in that order, so
//! the builder never has to look up ancestors again.

use std::path::Path;

use crate::types::workspace::{CommandRecord, PaneSpec, WindowSpec, WorkspaceSpec};


/// Apply trickle-down inheritance, returning the flattened tree.
pub fn trickle(mut spec: WorkspaceSpec) -> WorkspaceSpec {
    let _span = tracing::debug_span!("trickle", session = %spec.session_name).entered();

    let session_dir = spec.start_directory.clone();
    let session_suppress = spec.suppress_history;
    let session_before = spec.shell_command_before.clone();

    spec.windows = spec
        .windows
        .into_iter()
        .map(|window| {
            trickle_window(window, session_dir.as_deref(), session_suppress, &session_before)
        })
        .collect();
    spec
}


fn trickle_window(
    mut window: WindowSpec,
    session_dir: Option<&str>,
    session_suppress: Option<bool>,
    session_before: &[CommandRecord],
) -> WindowSpec {
    // A window without a directory inherits the session's; a relative one
    // (not ~ or / prefixed) is joined onto it rather than replacing it.
    window.start_directory = match (window.start_directory.take(), session_dir) {
        (None, Some(inherited)) => Some(inherited.to_string()),
        (Some(own), Some(inherited)) if !own.starts_with('~') && !own.starts_with('/') => {
            Some(Path::new(inherited).join(own).to_string_lossy().into_owned())
        }
        (own, _) => own,
    };

    // suppress_history trickles one level only: session to window, never
    // further down to panes.
    window.suppress_history = window.suppress_history.or(session_suppress);

    // A window with no panes field gets exactly one blank pane.
    let mut panes = window.panes.take().unwrap_or_default();
    if panes.is_empty() {
        panes.push(PaneSpec::default());
    }
    window.panes = Some(
        panes
            .into_iter()
            .map(|pane| trickle_pane(pane, session_before, &window.shell_command_before))
            .collect(),
    );
    window
}


fn trickle_pane(
    mut pane: PaneSpec,
    session_before: &[CommandRecord],
    window_before: &[CommandRecord],
) -> PaneSpec {
    let own = std::mem::take(&mut pane.shell_command);
    let mut commands =
        Vec::with_capacity(session_before.len() + window_before.len() + pane.shell_command_before.len() + own.len());
    commands.extend(session_before.iter().map(|record| record.cmd.clone()));
    commands.extend(window_before.iter().map(|record| record.cmd.clone()));
    commands.extend(pane.shell_command_before.iter().map(|record| record.cmd.clone()));
    commands.extend(own);

    pane.shell_command = commands;
    pane
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
