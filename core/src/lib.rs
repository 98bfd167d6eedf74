//! muxup-core — builds live tmux sessions from declarative workspace files.
//!
//! The pipeline: a raw workspace tree (`types::raw`) is normalized into the
//! explicit form (`types::workspace`), resolved by the expander (`expand`),
//! flattened by the trickler (`trickle`), and then materialized against a
//! control channel (`build`). The attach engine (`attach`) decides what the
//! terminal outcome of a load request is. Plugins (`plugin`) extend the
//! build at five fixed lifecycle points.

pub mod attach;
pub mod build;
pub mod error;
pub mod expand;
pub mod infrastructure;
pub mod plugin;
pub mod trickle;
pub mod types;
pub mod version;

pub use error::{Error, Result};
