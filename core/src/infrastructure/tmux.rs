//! tmux adapter — drives the tmux binary, one subprocess call per operation.
//!
//! Implements `ControlChannel` by shelling out to `tmux`, honoring `-L`
//! (socket name) and `-S` (socket path) selection. Attach inherits the
//! calling terminal; everything else captures output and maps a non-zero
//! exit to a channel error carrying stderr.

use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::infrastructure::channel::{ControlChannel, CreatedSession, CreatedWindow};
use crate::version::Version;


/// A connection to one tmux server, addressed by binary and socket.
#[derive(Debug, Clone, Default)]
pub struct TmuxClient {
    socket_name: Option<String>,
    socket_path: Option<String>,
    cached_version: Option<Version>,
}

impl TmuxClient {
    pub fn new() -> TmuxClient {
        TmuxClient::default()
    }

    pub fn with_socket_name(mut self, name: Option<String>) -> TmuxClient {
        self.socket_name = name;
        self
    }

    pub fn with_socket_path(mut self, path: Option<String>) -> TmuxClient {
        self.socket_path = path;
        self
    }

    /// True when this process runs inside an attached tmux client.
    pub fn inside_client() -> bool {
        std::env::var_os("TMUX").is_some()
    }

    /// Socket-selection arguments prepended to every invocation.
    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = &self.socket_name {
            args.push("-L".to_string());
            args.push(name.clone());
        }
        if let Some(path) = &self.socket_path {
            args.push("-S".to_string());
            args.push(path.clone());
        }
        args
    }

    /// Run one tmux command, capturing output. Non-zero exit becomes a
    /// channel error with the trimmed stderr.
    fn run(&self, args: &[&str]) -> Result<String> {
        let cmd_str = args.join(" ");
        tracing::debug!(command = %cmd_str, "tmux");
        let output = Command::new("tmux")
            .args(self.base_args())
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::channel(cmd_str.clone(), e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::channel(cmd_str, stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run one tmux command with the terminal attached (for attach-session).
    fn run_inherited(&self, args: &[&str]) -> Result<()> {
        let display = args.join(" ");
        let status = Command::new("tmux")
            .args(self.base_args())
            .args(args)
            .status()
            .map_err(|e| Error::channel(display.clone(), e.to_string()))?;
        if !status.success() {
            return Err(Error::channel(display, format!("exit status {}", status)));
        }
        Ok(())
    }

    /// Session names currently on the server; an unreachable server counts
    /// as no sessions.
    pub fn list_sessions(&self) -> Vec<String> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(output) => parse_list_sessions(&output),
            Err(_) => Vec::new(),
        }
    }
}


/// Parse `list-sessions -F '#{session_name}'` output into names.
pub fn parse_list_sessions(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `tmux -V` output (e.g. `tmux 3.4`, `tmux next-3.5`).
pub fn parse_version_output(output: &str) -> Result<Version> {
    let text = output.trim();
    let body = text.strip_prefix("tmux").unwrap_or(text).trim();
    Version::parse(body).map_err(|e| Error::channel("-V", e))
}


impl ControlChannel for TmuxClient {
    fn server_version(&mut self) -> Result<Version> {
        if let Some(version) = &self.cached_version {
            return Ok(version.clone());
        }
        let version = parse_version_output(&self.run(&["-V"])?)?;
        self.cached_version = Some(version.clone());
        Ok(version)
    }

    fn has_session(&mut self, name: &str) -> Result<bool> {
        // has-session reports absence through its exit status, so a failure
        // here is an answer, not an error.
        let target = format!("={}", name);
        Ok(self.run(&["has-session", "-t", target.as_str()]).is_ok())
    }

    fn attached_session(&mut self) -> Result<Option<String>> {
        if !TmuxClient::inside_client() {
            return Ok(None);
        }
        let name = self.run(&["display-message", "-p", "#{session_name}"])?;
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    fn new_session(&mut self, name: &str, start_directory: Option<&str>) -> Result<CreatedSession> {
        let mut args = vec!["new-session", "-d", "-s", name];
        if let Some(dir) = start_directory {
            args.push("-c");
            args.push(dir);
        }
        args.extend(["-P", "-F", "#{session_id}|#{window_id}|#{pane_id}"]);
        let output = self.run(&args)?;
        let mut parts = output.split('|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(session_id), Some(window_id), Some(pane_id)) => Ok(CreatedSession {
                session_id: session_id.to_string(),
                window_id: window_id.to_string(),
                pane_id: pane_id.to_string(),
            }),
            _ => Err(Error::channel("new-session", format!("unexpected output '{}'", output))),
        }
    }

    fn rename_window(&mut self, window: &str, name: &str) -> Result<()> {
        self.run(&["rename-window", "-t", window, name]).map(|_| ())
    }

    fn new_window(
        &mut self,
        session: &str,
        name: &str,
        start_directory: Option<&str>,
    ) -> Result<CreatedWindow> {
        let target = format!("{}:", session);
        let mut args = vec!["new-window", "-t", target.as_str(), "-n", name];
        if let Some(dir) = start_directory {
            args.push("-c");
            args.push(dir);
        }
        args.extend(["-P", "-F", "#{window_id}|#{pane_id}"]);
        let output = self.run(&args)?;
        let mut parts = output.split('|');
        match (parts.next(), parts.next()) {
            (Some(window_id), Some(pane_id)) => Ok(CreatedWindow {
                window_id: window_id.to_string(),
                pane_id: pane_id.to_string(),
            }),
            _ => Err(Error::channel("new-window", format!("unexpected output '{}'", output))),
        }
    }

    fn split_window(&mut self, window: &str, start_directory: Option<&str>) -> Result<String> {
        let mut args = vec!["split-window", "-t", window];
        if let Some(dir) = start_directory {
            args.push("-c");
            args.push(dir);
        }
        args.extend(["-P", "-F", "#{pane_id}"]);
        self.run(&args)
    }

    fn select_layout(&mut self, window: &str, layout: Option<&str>) -> Result<()> {
        let mut args = vec!["select-layout", "-t", window];
        if let Some(layout) = layout {
            args.push(layout);
        }
        self.run(&args).map(|_| ())
    }

    fn select_window(&mut self, window: &str) -> Result<()> {
        self.run(&["select-window", "-t", window]).map(|_| ())
    }

    fn select_pane(&mut self, pane: &str) -> Result<()> {
        self.run(&["select-pane", "-t", pane]).map(|_| ())
    }

    fn send_keys(&mut self, pane: &str, keys: &str) -> Result<()> {
        // Literal text first, then the Enter key name; a single invocation
        // would let tmux interpret command text as key names.
        self.run(&["send-keys", "-t", pane, "-l", "--", keys])?;
        self.run(&["send-keys", "-t", pane, "Enter"]).map(|_| ())
    }

    fn set_environment(&mut self, session: &str, name: &str, value: &str) -> Result<()> {
        self.run(&["set-environment", "-t", session, name, value])
            .map(|_| ())
    }

    fn set_option(&mut self, session: &str, name: &str, value: &str, global: bool) -> Result<()> {
        if global {
            self.run(&["set-option", "-g", name, value]).map(|_| ())
        } else {
            self.run(&["set-option", "-t", session, name, value]).map(|_| ())
        }
    }

    fn set_window_option(&mut self, window: &str, name: &str, value: &str) -> Result<()> {
        self.run(&["set-window-option", "-t", window, name, value])
            .map(|_| ())
    }

    fn set_hook(&mut self, session: &str, hook: &str, command: &str) -> Result<()> {
        self.run(&["set-hook", "-t", session, hook, command]).map(|_| ())
    }

    fn switch_client(&mut self, session: &str) -> Result<()> {
        self.run(&["switch-client", "-t", session]).map(|_| ())
    }

    fn attach_session(&mut self, session: &str) -> Result<()> {
        self.run_inherited(&["attach-session", "-t", session])
    }

    fn kill_session(&mut self, session: &str) -> Result<()> {
        self.run(&["kill-session", "-t", session]).map(|_| ())
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
