//! CJT Helper: native messaging host that keeps the browser extension
//! up to date.
//!
//! The extension talks to this process over stdin/stdout using
//! length-prefixed JSON frames and can ask it to:
//! - download an update archive and unpack it into the install directory,
//!   reporting progress as it goes;
//! - cancel the update in flight;
//! - check whether a directory is a usable install location.
//!
//! # Architecture
//!
//! - **Framing** (`host::frame`): 4-byte little-endian length + UTF-8 JSON
//! - **Session** (`host::session`): reads commands, dispatches them, queues
//!   status frames for a single writer
//! - **Update manager** (`update::manager`): owns the one background update
//!   and its cancellation token
//! - **Pipeline** (`update::download`, `update::guard`, `update::extract`):
//!   download to a temp dir, clean the target, extract

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod helper_dirs;
pub mod host;
pub mod update;

pub use config::HelperConfig;
pub use error::{HelperError, Result};
