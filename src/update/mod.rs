//! Self-update pipeline for the browser extension.
//!
//! Downloads an update archive, clears the previous install when it is safe
//! to do so, and extracts the archive in its place. Runs one update at a
//! time, in the background, with cooperative cancellation.

pub mod download;
pub mod extract;
pub mod guard;
pub mod manager;
pub mod transport;

pub use manager::{UpdateManager, UpdateRequest};
pub use transport::{HttpTransport, Transport};
