//! Markdown artifact rendering. Both renderers are pure functions of the
//! structures the runner persists, so `report`/`diff` commands can rebuild
//! them from disk later.

pub mod diff;
pub mod markdown;

pub use diff::render_diff;
pub use markdown::render_report;

/// First `max` characters, for long validator messages in bullet lists.
pub(crate) fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
