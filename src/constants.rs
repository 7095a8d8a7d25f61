//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available —
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Remote endpoints
  pub default_api_url: String,
  pub default_asset_url: String,

  // Authentication
  pub credential_header: String,

  // Search
  pub search_debounce_ms: u64,

  // Search highlighting
  pub highlight_open: String,
  pub highlight_close: String,

  // Data model
  pub unknown_author: String,

  // Layout
  pub list_pane_width: u16,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
