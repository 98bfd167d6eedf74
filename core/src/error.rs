//! Error types for muxup.
//!
//! Validation and plugin errors surface before any command reaches the tmux
//! server. Channel and hook errors can occur mid-build; the builder wraps
//! them into a `BuildFailure` (see `build`) so the caller also sees the phase
//! reached and the partially constructed session.

use thiserror::Error;

/// Shared result type for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;


#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The workspace tree is structurally invalid.
    #[error("invalid workspace: {0}")]
    Validation(String),

    /// The workspace file parsed to nothing usable.
    #[error("empty workspace: {0}")]
    EmptyWorkspace(String),

    /// A plugin's declared dependency violated one of its version bounds.
    #[error("incompatible plugin '{plugin}': dependency '{dependency}' observed {observed}, {violation}")]
    IncompatiblePlugin {
        plugin: String,
        dependency: String,
        observed: String,
        violation: String,
    },

    /// A plugin reference was not found in the registry.
    #[error("unknown plugin: '{0}'")]
    UnknownPlugin(String),

    /// A plugin lifecycle hook reported a failure.
    #[error("plugin '{plugin}' failed: {message}")]
    Hook { plugin: String, message: String },

    /// A control-channel command failed.
    #[error("tmux command failed: {command}: {message}")]
    Channel { command: String, message: String },

    /// The workspace's before_script exited non-zero.
    #[error("before_script '{script}' exited with status {code}: {stderr}")]
    BeforeScript {
        script: String,
        code: i32,
        stderr: String,
    },
}


impl Error {
    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Error {
        Error::Validation(msg.into())
    }

    /// Shorthand for a control-channel error.
    pub fn channel(command: impl Into<String>, message: impl Into<String>) -> Error {
        Error::Channel {
            command: command.into(),
            message: message.into(),
        }
    }
}
