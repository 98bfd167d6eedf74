//! Session handles — runtime references to live tmux objects.
//!
//! A handle is only a name/id pair plus the child handles created alongside
//! it; the session itself lives in the tmux server and outlives this
//! process. Handles are what plugin hooks and the attach engine see.

use serde::Serialize;


/// A live session created (or appended to) by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    /// tmux session id (`$0`) or, for sessions adopted by name, the name.
    pub id: String,
    pub name: String,
    pub windows: Vec<WindowHandle>,
}

impl SessionHandle {
    /// A windowless handle addressing an existing session by name.
    pub fn named(name: impl Into<String>) -> SessionHandle {
        let name = name.into();
        SessionHandle {
            id: name.clone(),
            name,
            windows: Vec::new(),
        }
    }
}


/// A live window within a built session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowHandle {
    /// tmux window id (`@1`).
    pub id: String,
    pub name: String,
    pub layout: Option<String>,
    pub panes: Vec<PaneHandle>,
}


/// A live pane within a built window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaneHandle {
    /// tmux pane id (`%1`).
    pub id: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_handle_uses_name_as_id() {
        let handle = SessionHandle::named("demo");
        assert_eq!(handle.id, "demo");
        assert_eq!(handle.name, "demo");
        assert!(handle.windows.is_empty());
    }
}
