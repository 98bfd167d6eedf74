//! Control channel — the opaque command surface of the tmux server.
//!
//! The builder and the attach engine only ever talk to this trait. The real
//! implementation (`infrastructure::tmux`) drives the tmux binary one
//! subprocess per call; `MemoryChannel` records the same calls in memory so
//! call ordering can be asserted without a server.

use crate::error::{Error, Result};
use crate::version::Version;


/// Ids handed back by `new_session`: the session plus the implicit default
/// window and pane tmux creates with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub window_id: String,
    pub pane_id: String,
}

/// Ids handed back by `new_window`: the window plus its default pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWindow {
    pub window_id: String,
    pub pane_id: String,
}


/// One blocking call per operation, issued strictly in build order; the
/// server's documented ordering guarantees are what make the builder correct.
pub trait ControlChannel {
    fn server_version(&mut self) -> Result<Version>;
    fn has_session(&mut self, name: &str) -> Result<bool>;
    /// The session the current client is attached to, if the process runs
    /// inside one.
    fn attached_session(&mut self) -> Result<Option<String>>;

    fn new_session(&mut self, name: &str, start_directory: Option<&str>) -> Result<CreatedSession>;
    fn rename_window(&mut self, window: &str, name: &str) -> Result<()>;
    fn new_window(
        &mut self,
        session: &str,
        name: &str,
        start_directory: Option<&str>,
    ) -> Result<CreatedWindow>;
    fn split_window(&mut self, window: &str, start_directory: Option<&str>) -> Result<String>;
    fn select_layout(&mut self, window: &str, layout: Option<&str>) -> Result<()>;
    fn select_window(&mut self, window: &str) -> Result<()>;
    fn select_pane(&mut self, pane: &str) -> Result<()>;
    fn send_keys(&mut self, pane: &str, keys: &str) -> Result<()>;
    fn set_environment(&mut self, session: &str, name: &str, value: &str) -> Result<()>;
    fn set_option(&mut self, session: &str, name: &str, value: &str, global: bool) -> Result<()>;
    fn set_window_option(&mut self, window: &str, name: &str, value: &str) -> Result<()>;
    fn set_hook(&mut self, session: &str, hook: &str, command: &str) -> Result<()>;
    fn switch_client(&mut self, session: &str) -> Result<()>;
    fn attach_session(&mut self, session: &str) -> Result<()>;
    fn kill_session(&mut self, session: &str) -> Result<()>;
}


// ---------------------------------------------------------------------------
// In-memory channel
// ---------------------------------------------------------------------------

/// An in-memory control channel.
///
/// Records every mutating call in tmux command syntax (queries are not
/// recorded) and hands out incrementing `$n`/`@n`/`%n` ids, so tests can
/// assert exact call sequences. `fail_on` injects a failure into the first
/// call whose formatted form contains the pattern.
pub struct MemoryChannel {
    pub version: Version,
    pub sessions: Vec<String>,
    pub attached: Option<String>,
    pub calls: Vec<String>,
    pub fail_on: Option<String>,
    next_session: u32,
    next_window: u32,
    next_pane: u32,
}

impl MemoryChannel {
    pub fn new() -> MemoryChannel {
        MemoryChannel::with_version(Version::from_parts(vec![3, 4]))
    }

    pub fn with_version(version: Version) -> MemoryChannel {
        MemoryChannel {
            version,
            sessions: Vec::new(),
            attached: None,
            calls: Vec::new(),
            fail_on: None,
            next_session: 0,
            next_window: 0,
            next_pane: 0,
        }
    }

    /// Calls whose formatted form starts with the given command word.
    pub fn calls_of(&self, command: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|call| call.starts_with(command))
            .map(|call| call.as_str())
            .collect()
    }

    fn record(&mut self, call: String) -> Result<()> {
        if let Some(pattern) = &self.fail_on {
            if call.contains(pattern.as_str()) {
                return Err(Error::channel(call, "injected failure"));
            }
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Default for MemoryChannel {
    fn default() -> MemoryChannel {
        MemoryChannel::new()
    }
}


impl ControlChannel for MemoryChannel {
    fn server_version(&mut self) -> Result<Version> {
        Ok(self.version.clone())
    }

    fn has_session(&mut self, name: &str) -> Result<bool> {
        Ok(self.sessions.iter().any(|s| s == name))
    }

    fn attached_session(&mut self) -> Result<Option<String>> {
        Ok(self.attached.clone())
    }

    fn new_session(&mut self, name: &str, start_directory: Option<&str>) -> Result<CreatedSession> {
        let mut call = format!("new-session -d -s {}", name);
        if let Some(dir) = start_directory {
            call.push_str(&format!(" -c {}", dir));
        }
        self.record(call)?;
        self.sessions.push(name.to_string());
        self.next_session += 1;
        self.next_window += 1;
        self.next_pane += 1;
        Ok(CreatedSession {
            session_id: format!("${}", self.next_session),
            window_id: format!("@{}", self.next_window),
            pane_id: format!("%{}", self.next_pane),
        })
    }

    fn rename_window(&mut self, window: &str, name: &str) -> Result<()> {
        self.record(format!("rename-window -t {} {}", window, name))
    }

    fn new_window(
        &mut self,
        session: &str,
        name: &str,
        start_directory: Option<&str>,
    ) -> Result<CreatedWindow> {
        let mut call = format!("new-window -t {} -n {}", session, name);
        if let Some(dir) = start_directory {
            call.push_str(&format!(" -c {}", dir));
        }
        self.record(call)?;
        self.next_window += 1;
        self.next_pane += 1;
        Ok(CreatedWindow {
            window_id: format!("@{}", self.next_window),
            pane_id: format!("%{}", self.next_pane),
        })
    }

    fn split_window(&mut self, window: &str, start_directory: Option<&str>) -> Result<String> {
        let mut call = format!("split-window -t {}", window);
        if let Some(dir) = start_directory {
            call.push_str(&format!(" -c {}", dir));
        }
        self.record(call)?;
        self.next_pane += 1;
        Ok(format!("%{}", self.next_pane))
    }

    fn select_layout(&mut self, window: &str, layout: Option<&str>) -> Result<()> {
        match layout {
            Some(layout) => self.record(format!("select-layout -t {} {}", window, layout)),
            None => self.record(format!("select-layout -t {}", window)),
        }
    }

    fn select_window(&mut self, window: &str) -> Result<()> {
        self.record(format!("select-window -t {}", window))
    }

    fn select_pane(&mut self, pane: &str) -> Result<()> {
        self.record(format!("select-pane -t {}", pane))
    }

    fn send_keys(&mut self, pane: &str, keys: &str) -> Result<()> {
        self.record(format!("send-keys -t {} {}", pane, keys))
    }

    fn set_environment(&mut self, session: &str, name: &str, value: &str) -> Result<()> {
        self.record(format!("set-environment -t {} {} {}", session, name, value))
    }

    fn set_option(&mut self, session: &str, name: &str, value: &str, global: bool) -> Result<()> {
        if global {
            self.record(format!("set-option -g {} {}", name, value))
        } else {
            self.record(format!("set-option -t {} {} {}", session, name, value))
        }
    }

    fn set_window_option(&mut self, window: &str, name: &str, value: &str) -> Result<()> {
        self.record(format!("set-window-option -t {} {} {}", window, name, value))
    }

    fn set_hook(&mut self, session: &str, hook: &str, command: &str) -> Result<()> {
        self.record(format!("set-hook -t {} {} [{}]", session, hook, command))
    }

    fn switch_client(&mut self, session: &str) -> Result<()> {
        self.record(format!("switch-client -t {}", session))
    }

    fn attach_session(&mut self, session: &str) -> Result<()> {
        self.record(format!("attach-session -t {}", session))
    }

    fn kill_session(&mut self, session: &str) -> Result<()> {
        self.record(format!("kill-session -t {}", session))?;
        self.sessions.retain(|s| s != session);
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increment_per_kind() {
        let mut channel = MemoryChannel::new();
        let created = channel.new_session("demo", None).unwrap();
        assert_eq!(created.session_id, "$1");
        assert_eq!(created.window_id, "@1");
        assert_eq!(created.pane_id, "%1");
        let window = channel.new_window("$1", "w2", None).unwrap();
        assert_eq!(window.window_id, "@2");
        let pane = channel.split_window("@2", None).unwrap();
        assert_eq!(pane, "%3");
    }

    #[test]
    fn mutating_calls_are_recorded_in_order() {
        let mut channel = MemoryChannel::new();
        channel.new_session("demo", Some("/proj")).unwrap();
        channel.send_keys("%1", "vim").unwrap();
        assert_eq!(
            channel.calls,
            vec!["new-session -d -s demo -c /proj", "send-keys -t %1 vim"]
        );
    }

    #[test]
    fn queries_are_not_recorded() {
        let mut channel = MemoryChannel::new();
        channel.new_session("demo", None).unwrap();
        assert!(channel.has_session("demo").unwrap());
        assert!(!channel.has_session("other").unwrap());
        channel.server_version().unwrap();
        channel.attached_session().unwrap();
        assert_eq!(channel.calls.len(), 1);
    }

    #[test]
    fn kill_session_forgets_the_session() {
        let mut channel = MemoryChannel::new();
        channel.new_session("demo", None).unwrap();
        channel.kill_session("demo").unwrap();
        assert!(!channel.has_session("demo").unwrap());
    }

    #[test]
    fn fail_on_injects_channel_error() {
        let mut channel = MemoryChannel::new();
        channel.fail_on = Some("split-window".into());
        channel.new_session("demo", None).unwrap();
        let err = channel.split_window("@1", None).unwrap_err();
        assert!(matches!(err, Error::Channel { ref command, .. } if command.contains("split-window")));
        // The failed call is not recorded.
        assert_eq!(channel.calls.len(), 1);
    }
}
