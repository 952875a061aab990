mod handler;
mod types;

pub use handler::{AppState, handle_diagnostics, handle_generate, handle_health, handle_scenarios};
pub use types::*;
