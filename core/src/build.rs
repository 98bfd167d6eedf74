//! Session builder — materializes a trickled workspace as a live session.
//!
//! Drives the control channel strictly in file order: session, then each
//! window, then each window's panes, then each pane's commands. Plugin hooks
//! fire at fixed points along the way. Because layout selection against a
//! window no client has ever displayed is silently ineffective, builds
//! against servers at or above the quirk threshold install one-shot
//! layout-correction hooks that fire on first client visibility.
//!
//! Failure leaves partial construction in place; the builder reports the
//! phase reached and the partial handle and never attempts recovery itself.

use std::process::Command;

use crate::error::{Error, Result};
use crate::infrastructure::channel::ControlChannel;
use crate::plugin::Plugin;
use crate::types::session::{PaneHandle, SessionHandle, WindowHandle};
use crate::types::workspace::{PaneSpec, WindowSpec, WorkspaceSpec};
use crate::version::Version;

/// Servers at or above this version need the layout-correction hooks.
pub fn layout_hook_threshold() -> Version {
    Version::from_parts(vec![2, 6])
}

/// The one-shot triggers that mean "a client can now see this session".
const LAYOUT_HOOKS: [&str; 2] = ["client-attached", "client-session-changed"];


/// Progress of one build. Any non-terminal phase may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    NotStarted,
    CreatingWindows,
    ApplyingOptions,
    InstallingHooks,
    Complete,
    Failed,
}


/// A failed build: the phase the error occurred in, whatever was already
/// constructed, and the underlying error. Recovery is the caller's decision.
#[derive(Debug)]
pub struct BuildFailure {
    pub phase: BuildPhase,
    pub session: Option<SessionHandle>,
    pub error: Error,
}


/// Sequences one build against one control channel.
pub struct SessionBuilder<'a> {
    channel: &'a mut dyn ControlChannel,
    plugins: &'a [Box<dyn Plugin>],
    phase: BuildPhase,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(channel: &'a mut dyn ControlChannel, plugins: &'a [Box<dyn Plugin>]) -> SessionBuilder<'a> {
        SessionBuilder {
            channel,
            plugins,
            phase: BuildPhase::NotStarted,
        }
    }

    /// Build the workspace. With `append`, new windows go into
    /// `existing_session` instead of a fresh session.
    pub fn build(
        mut self,
        spec: &WorkspaceSpec,
        existing_session: Option<SessionHandle>,
        append: bool,
    ) -> std::result::Result<SessionHandle, BuildFailure> {
        let _span = tracing::info_span!("build", session = %spec.session_name, append).entered();
        let mut partial: Option<SessionHandle> = None;
        match self.run(spec, existing_session, append, &mut partial) {
            Ok(session) => Ok(session),
            Err(error) => {
                let phase = self.phase;
                self.phase = BuildPhase::Failed;
                tracing::error!(?phase, %error, "build failed");
                Err(BuildFailure {
                    phase,
                    session: partial,
                    error,
                })
            }
        }
    }

    fn run(
        &mut self,
        spec: &WorkspaceSpec,
        existing_session: Option<SessionHandle>,
        append: bool,
        partial: &mut Option<SessionHandle>,
    ) -> Result<SessionHandle> {
        // 1. Target session.
        let (mut session, default_window) = if append {
            let existing = existing_session
                .ok_or_else(|| Error::validation("append requires an existing session"))?;
            (SessionHandle { windows: Vec::new(), ..existing }, None)
        } else {
            let created = self
                .channel
                .new_session(&spec.session_name, spec.start_directory.as_deref())?;
            let session = SessionHandle {
                id: created.session_id,
                name: spec.session_name.clone(),
                windows: Vec::new(),
            };
            *partial = Some(session.clone());
            for (name, value) in &spec.environment {
                self.channel.set_environment(&session.id, name, value)?;
            }
            (session, Some((created.window_id, created.pane_id)))
        };

        // 2. before_script, with its plugin hook; a failing script tears the
        //    fresh session down again.
        if let Some(script) = &spec.before_script {
            for plugin in self.plugins {
                plugin.before_script(&session, self.channel)?;
            }
            if let Err(err) = run_before_script(script, spec.start_directory.as_deref()) {
                if !append {
                    self.channel.kill_session(&session.id)?;
                    *partial = None;
                }
                return Err(err);
            }
        }

        // 3. Builder hooks before any window exists.
        for plugin in self.plugins {
            plugin.before_workspace_builder(&session, self.channel)?;
        }

        // 4. Windows and panes, in file order.
        self.phase = BuildPhase::CreatingWindows;
        let mut default_window = default_window;
        for window_spec in &spec.windows {
            let window = self.build_window(&session, window_spec, default_window.take())?;
            session.windows.push(window);
            *partial = Some(session.clone());
        }

        // 5. Session-level options.
        self.phase = BuildPhase::ApplyingOptions;
        for (name, value) in &spec.global_options {
            self.channel.set_option(&session.id, name, value, true)?;
        }
        for (name, value) in &spec.options {
            self.channel.set_option(&session.id, name, value, false)?;
        }

        // 6. Layout-correction hooks where the quirk applies.
        self.phase = BuildPhase::InstallingHooks;
        if self.channel.server_version()? >= layout_hook_threshold() {
            install_layout_hooks(self.channel, &session, spec)?;
        }

        // 7. Focus.
        if let Some(index) = spec.windows.iter().position(|w| w.focus) {
            if let Some(window) = session.windows.get(index) {
                self.channel.select_window(&window.id)?;
            }
        }

        self.phase = BuildPhase::Complete;
        Ok(session)
    }

    /// Create (or adopt) one window and fill in its panes.
    ///
    /// `default_window` carries the session's implicit first window; when
    /// present it is renamed instead of creating a new window, so a fresh
    /// build never leaves an orphaned extra window behind.
    fn build_window(
        &mut self,
        session: &SessionHandle,
        spec: &WindowSpec,
        default_window: Option<(String, String)>,
    ) -> Result<WindowHandle> {
        let (window_id, first_pane_id) = match default_window {
            Some((window_id, pane_id)) => {
                self.channel.rename_window(&window_id, &spec.window_name)?;
                (window_id, pane_id)
            }
            None => {
                let created = self.channel.new_window(
                    &session.id,
                    &spec.window_name,
                    spec.start_directory.as_deref(),
                )?;
                (created.window_id, created.pane_id)
            }
        };

        let mut window = WindowHandle {
            id: window_id,
            name: spec.window_name.clone(),
            layout: spec.layout.clone(),
            panes: Vec::new(),
        };
        for plugin in self.plugins {
            plugin.on_window_create(&window, self.channel)?;
        }

        for (index, pane) in spec.panes().iter().enumerate() {
            let pane_id = if index == 0 {
                first_pane_id.clone()
            } else {
                let directory = pane
                    .start_directory
                    .as_deref()
                    .or(spec.start_directory.as_deref());
                let pane_id = self.channel.split_window(&window.id, directory)?;
                // Re-apply the layout after every split so later splits
                // never run out of space.
                if spec.layout.is_some() {
                    self.channel.select_layout(&window.id, spec.layout.as_deref())?;
                }
                pane_id
            };
            self.send_pane_commands(&pane_id, pane, spec)?;
            window.panes.push(PaneHandle { id: pane_id });
        }

        for (name, value) in &spec.options {
            self.channel.set_window_option(&window.id, name, value)?;
        }
        if spec.layout.is_some() {
            self.channel.select_layout(&window.id, spec.layout.as_deref())?;
        }
        if let Some(index) = spec.panes().iter().position(|p| p.focus) {
            if let Some(pane) = window.panes.get(index) {
                self.channel.select_pane(&pane.id)?;
            }
        }

        for plugin in self.plugins {
            plugin.after_window_finished(&window, self.channel)?;
        }
        Ok(window)
    }

    /// One send-keys call per resolved command, in order. A window with
    /// suppress_history set gets each command space-prefixed so interactive
    /// shells keep it out of history.
    fn send_pane_commands(&mut self, pane_id: &str, pane: &PaneSpec, window: &WindowSpec) -> Result<()> {
        for command in &pane.shell_command {
            let keys = if window.suppress_history == Some(true) {
                format!(" {}", command)
            } else {
                command.clone()
            };
            self.channel.send_keys(pane_id, &keys)?;
        }
        Ok(())
    }
}


/// Register the one-shot layout-correction hooks.
///
/// Both trigger variants are installed up front because the eventual caller
/// may attach a new client or switch an existing one; each fires once, walks
/// every window re-applying its declared layout, deregisters itself, and
/// restores the active window.
pub fn install_layout_hooks(
    channel: &mut dyn ControlChannel,
    session: &SessionHandle,
    spec: &WorkspaceSpec,
) -> Result<()> {
    let Some(active) = active_window(session, spec) else {
        return Ok(());
    };
    for hook in LAYOUT_HOOKS {
        let command = layout_hook_command(session, spec, &active, hook);
        channel.set_hook(&session.id, hook, &command)?;
    }
    Ok(())
}

fn active_window(session: &SessionHandle, spec: &WorkspaceSpec) -> Option<String> {
    let focused = spec
        .windows
        .iter()
        .position(|w| w.focus)
        .and_then(|index| session.windows.get(index));
    focused
        .or_else(|| session.windows.first())
        .map(|window| window.id.clone())
}

fn layout_hook_command(
    session: &SessionHandle,
    spec: &WorkspaceSpec,
    active: &str,
    hook: &str,
) -> String {
    let mut steps = Vec::new();
    for (index, window) in session.windows.iter().enumerate() {
        steps.push(format!("select-window -t {}", window.id));
        match spec.windows.get(index).and_then(|w| w.layout.as_deref()) {
            Some(layout) => steps.push(format!("select-layout {}", layout)),
            None => steps.push("select-layout".to_string()),
        }
    }
    steps.push(format!("set-hook -u -t {} {}", session.id, hook));
    steps.push(format!("select-window -t {}", active));
    steps.join("; ")
}


/// Run the workspace's before_script and map a non-zero exit to an error.
fn run_before_script(script: &str, cwd: Option<&str>) -> Result<()> {
    let mut command = Command::new(script);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let output = command.output().map_err(|e| Error::BeforeScript {
        script: script.to_string(),
        code: -1,
        stderr: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::BeforeScript {
            script: script.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::channel::MemoryChannel;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn window(name: &str, panes: Vec<PaneSpec>) -> WindowSpec {
        WindowSpec {
            window_name: name.into(),
            start_directory: None,
            layout: None,
            options: BTreeMap::new(),
            suppress_history: None,
            shell_command_before: Vec::new(),
            focus: false,
            panes: Some(panes),
        }
    }

    fn pane(command: &str) -> PaneSpec {
        PaneSpec::with_commands(vec![command.into()])
    }

    fn spec(windows: Vec<WindowSpec>) -> WorkspaceSpec {
        WorkspaceSpec {
            session_name: "demo".into(),
            start_directory: None,
            before_script: None,
            shell_command_before: Vec::new(),
            environment: BTreeMap::new(),
            global_options: BTreeMap::new(),
            options: BTreeMap::new(),
            suppress_history: None,
            plugins: Vec::new(),
            windows,
        }
    }

    fn old_server() -> MemoryChannel {
        MemoryChannel::with_version(Version::from_parts(vec![2, 5]))
    }

    #[test]
    fn calls_follow_file_order() {
        // Two windows, three panes total: all of one pane's commands are sent
        // before the next pane begins, windows in file order.
        let mut channel = old_server();
        let workspace = spec(vec![
            window("w1", vec![pane("vim"), pane("htop")]),
            window("w2", vec![pane("tail -f log")]),
        ]);
        SessionBuilder::new(&mut channel, &[]).build(&workspace, None, false).unwrap();
        assert_eq!(
            channel.calls,
            vec![
                "new-session -d -s demo",
                "rename-window -t @1 w1",
                "send-keys -t %1 vim",
                "split-window -t @1",
                "send-keys -t %2 htop",
                "new-window -t $1 -n w2",
                "send-keys -t %3 tail -f log",
            ]
        );
    }

    #[test]
    fn first_window_renames_the_default() {
        let mut channel = old_server();
        let workspace = spec(vec![window("main", vec![pane("vim")])]);
        let session = SessionBuilder::new(&mut channel, &[]).build(&workspace, None, false).unwrap();
        assert_eq!(channel.calls_of("rename-window").len(), 1);
        assert!(channel.calls_of("new-window").is_empty());
        assert_eq!(session.windows[0].id, "@1");
    }

    #[test]
    fn append_only_creates_windows() {
        let mut channel = old_server();
        channel.sessions.push("big".into());
        let mut workspace = spec(vec![window("extra", vec![pane("vim")])]);
        workspace.environment.insert("KEY".into(), "val".into());
        let session = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, Some(SessionHandle::named("big")), true)
            .unwrap();
        assert!(channel.calls_of("new-session").is_empty());
        assert!(channel.calls_of("rename-window").is_empty());
        assert!(channel.calls_of("set-environment").is_empty());
        assert_eq!(channel.calls_of("new-window"), vec!["new-window -t big -n extra"]);
        assert_eq!(session.name, "big");
    }

    #[test]
    fn append_without_existing_session_is_an_error() {
        let mut channel = old_server();
        let workspace = spec(vec![window("w", vec![pane("vim")])]);
        let failure = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, None, true)
            .unwrap_err();
        assert!(matches!(failure.error, Error::Validation(_)));
        assert!(channel.calls.is_empty());
    }

    #[test]
    fn environment_applies_to_fresh_sessions() {
        let mut channel = old_server();
        let mut workspace = spec(vec![window("w", vec![pane("vim")])]);
        workspace.environment.insert("VENV".into(), "/proj/.venv".into());
        SessionBuilder::new(&mut channel, &[]).build(&workspace, None, false).unwrap();
        assert_eq!(
            channel.calls_of("set-environment"),
            vec!["set-environment -t $1 VENV /proj/.venv"]
        );
    }

    #[test]
    fn layout_reapplied_after_each_split() {
        let mut channel = old_server();
        let mut w = window("w", vec![pane("a"), pane("b"), pane("c")]);
        w.layout = Some("tiled".into());
        SessionBuilder::new(&mut channel, &[]).build(&spec(vec![w]), None, false).unwrap();
        // Once per split plus the final application.
        assert_eq!(
            channel.calls_of("select-layout"),
            vec![
                "select-layout -t @1 tiled",
                "select-layout -t @1 tiled",
                "select-layout -t @1 tiled",
            ]
        );
    }

    #[test]
    fn suppress_history_space_prefixes_commands() {
        let mut channel = old_server();
        let mut w = window("w", vec![pane("secret-cmd")]);
        w.suppress_history = Some(true);
        SessionBuilder::new(&mut channel, &[]).build(&spec(vec![w]), None, false).unwrap();
        assert_eq!(channel.calls_of("send-keys"), vec!["send-keys -t %1  secret-cmd"]);
    }

    #[test]
    fn pane_directory_falls_back_to_window() {
        let mut channel = old_server();
        let mut w = window(
            "w",
            vec![
                pane("first"),
                PaneSpec {
                    start_directory: Some("/pane/dir".into()),
                    ..pane("second")
                },
                pane("third"),
            ],
        );
        w.start_directory = Some("/win/dir".into());
        SessionBuilder::new(&mut channel, &[]).build(&spec(vec![w]), None, false).unwrap();
        assert_eq!(
            channel.calls_of("split-window"),
            vec!["split-window -t @1 -c /pane/dir", "split-window -t @1 -c /win/dir"]
        );
    }

    #[test]
    fn options_applied_per_level() {
        let mut channel = old_server();
        let mut w = window("w", vec![pane("vim")]);
        w.options.insert("automatic-rename".into(), "off".into());
        let mut workspace = spec(vec![w]);
        workspace.global_options.insert("status".into(), "on".into());
        workspace.options.insert("base-index".into(), "1".into());
        SessionBuilder::new(&mut channel, &[]).build(&workspace, None, false).unwrap();
        assert_eq!(channel.calls_of("set-option -g"), vec!["set-option -g status on"]);
        assert_eq!(
            channel.calls_of("set-option -t"),
            vec!["set-option -t $1 base-index 1"]
        );
        assert_eq!(
            channel.calls_of("set-window-option"),
            vec!["set-window-option -t @1 automatic-rename off"]
        );
    }

    #[test]
    fn layout_hooks_installed_at_threshold() {
        let mut channel = MemoryChannel::with_version(Version::from_parts(vec![2, 6]));
        let mut w = window("w", vec![pane("vim")]);
        w.layout = Some("main-vertical".into());
        SessionBuilder::new(&mut channel, &[]).build(&spec(vec![w]), None, false).unwrap();
        let hooks = channel.calls_of("set-hook");
        assert_eq!(hooks.len(), 2);
        assert!(hooks[0].contains("client-attached"));
        assert!(hooks[1].contains("client-session-changed"));
        // Each hook re-selects the window, re-applies its layout, and
        // deregisters itself.
        assert!(hooks[0].contains("select-window -t @1"));
        assert!(hooks[0].contains("select-layout main-vertical"));
        assert!(hooks[0].contains("set-hook -u -t $1 client-attached"));
    }

    #[test]
    fn layout_hooks_skipped_below_threshold() {
        let mut channel = old_server();
        SessionBuilder::new(&mut channel, &[])
            .build(&spec(vec![window("w", vec![pane("vim")])]), None, false)
            .unwrap();
        assert!(channel.calls_of("set-hook").is_empty());
    }

    #[test]
    fn before_script_failure_kills_fresh_session() {
        let mut channel = old_server();
        let mut workspace = spec(vec![window("w", vec![pane("vim")])]);
        workspace.before_script = Some("false".into());
        let failure = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, None, false)
            .unwrap_err();
        assert!(matches!(failure.error, Error::BeforeScript { .. }));
        assert_eq!(failure.phase, BuildPhase::NotStarted);
        assert_eq!(channel.calls_of("kill-session"), vec!["kill-session -t $1"]);
        assert!(channel.calls_of("rename-window").is_empty());
    }

    #[test]
    fn before_script_success_continues() {
        let mut channel = old_server();
        let mut workspace = spec(vec![window("w", vec![pane("vim")])]);
        workspace.before_script = Some("true".into());
        SessionBuilder::new(&mut channel, &[]).build(&workspace, None, false).unwrap();
        assert!(channel.calls_of("kill-session").is_empty());
    }

    #[test]
    fn mid_build_failure_reports_phase_and_partial() {
        let mut channel = old_server();
        channel.fail_on = Some("new-window".into());
        let workspace = spec(vec![
            window("w1", vec![pane("vim")]),
            window("w2", vec![pane("htop")]),
        ]);
        let failure = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, None, false)
            .unwrap_err();
        assert_eq!(failure.phase, BuildPhase::CreatingWindows);
        let partial = failure.session.expect("partial session");
        assert_eq!(partial.windows.len(), 1);
        assert_eq!(partial.windows[0].name, "w1");
        assert!(matches!(failure.error, Error::Channel { .. }));
    }

    #[test]
    fn option_failure_reports_applying_options_phase() {
        let mut channel = old_server();
        channel.fail_on = Some("set-option".into());
        let mut workspace = spec(vec![window("w", vec![pane("vim")])]);
        workspace.options.insert("base-index".into(), "1".into());
        let failure = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, None, false)
            .unwrap_err();
        assert_eq!(failure.phase, BuildPhase::ApplyingOptions);
    }

    #[test]
    fn hook_failure_reports_installing_hooks_phase() {
        let mut channel = MemoryChannel::new();
        channel.fail_on = Some("set-hook".into());
        let workspace = spec(vec![window("w", vec![pane("vim")])]);
        let failure = SessionBuilder::new(&mut channel, &[])
            .build(&workspace, None, false)
            .unwrap_err();
        assert_eq!(failure.phase, BuildPhase::InstallingHooks);
    }

    #[test]
    fn focus_selects_window_and_pane() {
        let mut channel = old_server();
        let mut w1 = window("w1", vec![pane("vim")]);
        let mut w2 = window(
            "w2",
            vec![
                pane("a"),
                PaneSpec {
                    focus: true,
                    ..pane("b")
                },
            ],
        );
        w1.focus = false;
        w2.focus = true;
        SessionBuilder::new(&mut channel, &[]).build(&spec(vec![w1, w2]), None, false).unwrap();
        assert_eq!(channel.calls_of("select-pane"), vec!["select-pane -t %3"]);
        assert_eq!(channel.calls_of("select-window"), vec!["select-window -t @2"]);
    }

    // -------------------------------------------------------------------
    // Plugin hook ordering
    // -------------------------------------------------------------------

    #[derive(Debug)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn before_script(&self, _s: &SessionHandle, _c: &mut dyn ControlChannel) -> Result<()> {
            self.events.borrow_mut().push("before_script".into());
            Ok(())
        }

        fn before_workspace_builder(
            &self,
            _s: &SessionHandle,
            _c: &mut dyn ControlChannel,
        ) -> Result<()> {
            self.events.borrow_mut().push("before_workspace_builder".into());
            Ok(())
        }

        fn on_window_create(&self, window: &WindowHandle, _c: &mut dyn ControlChannel) -> Result<()> {
            self.events
                .borrow_mut()
                .push(format!("on_window_create {}", window.name));
            Ok(())
        }

        fn after_window_finished(
            &self,
            window: &WindowHandle,
            _c: &mut dyn ControlChannel,
        ) -> Result<()> {
            self.events
                .borrow_mut()
                .push(format!("after_window_finished {}", window.name));
            Ok(())
        }
    }

    #[test]
    fn plugin_hooks_fire_in_order() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(Recorder {
            events: Rc::clone(&events),
        })];
        let mut channel = old_server();
        let mut workspace = spec(vec![
            window("w1", vec![pane("vim")]),
            window("w2", vec![pane("htop")]),
        ]);
        workspace.before_script = Some("true".into());
        SessionBuilder::new(&mut channel, &plugins).build(&workspace, None, false).unwrap();
        assert_eq!(
            *events.borrow(),
            vec![
                "before_script",
                "before_workspace_builder",
                "on_window_create w1",
                "after_window_finished w1",
                "on_window_create w2",
                "after_window_finished w2",
            ]
        );
    }

    #[test]
    fn failing_hook_aborts_the_build() {
        #[derive(Debug)]
        struct Failing;
        impl Plugin for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn before_workspace_builder(
                &self,
                _s: &SessionHandle,
                _c: &mut dyn ControlChannel,
            ) -> Result<()> {
                Err(Error::Hook {
                    plugin: "failing".into(),
                    message: "boom".into(),
                })
            }
        }
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(Failing)];
        let mut channel = old_server();
        let failure = SessionBuilder::new(&mut channel, &plugins)
            .build(&spec(vec![window("w", vec![pane("vim")])]), None, false)
            .unwrap_err();
        assert!(matches!(failure.error, Error::Hook { .. }));
        assert_eq!(failure.phase, BuildPhase::NotStarted);
        assert!(channel.calls_of("rename-window").is_empty());
    }
}
