pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod rib;
pub mod server;
mod session;
pub mod utils;
