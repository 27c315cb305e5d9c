//! Host-facing native messaging channel.

pub mod contract;
pub mod frame;
pub mod session;
pub mod status;
