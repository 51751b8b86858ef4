//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_store, build_pipeline) and the config command
//! - `process` - Receipt commands (process, parse-lines, normalize)
//! - `store` - Normalization store inspection

pub mod core;
pub mod process;
pub mod store;

// Re-export command functions for main.rs
pub use core::*;
pub use process::*;
pub use store::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
