// Sleep-tracking screen state
// Shared between the library surface and the CLI binary

pub mod config;
pub mod format;
pub mod night;
pub mod state;
pub mod store;
