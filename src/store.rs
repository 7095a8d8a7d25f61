//! The two persisted client-side stores: credential and session state.
//!
//! Each store is an independent TOML file under the config dir. IO is
//! best-effort — a missing or corrupt file yields the default state and a
//! failed save is ignored, never fatal.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

use crate::model::BhajanKey;

fn store_path(file: &str) -> Option<PathBuf> {
  ProjectDirs::from("", "", "bb").map(|dirs| dirs.config_dir().join(file))
}

fn load_store<T: Default + DeserializeOwned>(file: &str) -> T {
  if let Some(path) = store_path(file)
    && let Ok(content) = std::fs::read_to_string(path)
    && let Ok(value) = toml::from_str(&content)
  {
    return value;
  }
  T::default()
}

fn save_store<T: Serialize>(file: &str, value: &T) {
  let Some(path) = store_path(file) else { return };
  if let Some(dir) = path.parent()
    && std::fs::create_dir_all(dir).is_ok()
    && let Ok(content) = toml::to_string(value)
  {
    let _ = std::fs::write(path, content);
  }
}

// --- Credential store ---

/// Holds the write-credential hash. Presence gates all mutating UI;
/// clearing it reverts the app to the login prompt.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthStore {
  pub write_token_hash: Option<String>,
}

impl AuthStore {
  pub fn load() -> Self {
    load_store("auth.toml")
  }

  pub fn save(&self) {
    save_store("auth.toml", self);
  }

  pub fn to_toml(&self) -> String {
    toml::to_string(self).unwrap_or_default()
  }

  pub fn from_toml(content: &str) -> Self {
    toml::from_str(content).unwrap_or_default()
  }
}

// --- Session store ---

/// Selection, search term, and view-scroll state, surviving reloads.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStore {
  pub search: String,
  pub selection: Option<BhajanKey>,
  pub list_offset: usize,
  pub theme_name: Option<String>,
}

impl SessionStore {
  pub fn load() -> Self {
    load_store("session.toml")
  }

  pub fn save(&self) {
    save_store("session.toml", self);
  }

  pub fn to_toml(&self) -> String {
    toml::to_string(self).unwrap_or_default()
  }

  pub fn from_toml(content: &str) -> Self {
    toml::from_str(content).unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn auth_store_survives_a_reload() {
    let store = AuthStore { write_token_hash: Some("abc123".into()) };
    let reloaded = AuthStore::from_toml(&store.to_toml());
    assert_eq!(reloaded, store);
  }

  #[test]
  fn auth_store_defaults_on_corrupt_content() {
    let reloaded = AuthStore::from_toml("not toml {{{");
    assert_eq!(reloaded, AuthStore::default());
  }

  #[test]
  fn session_store_survives_a_reload() {
    let store = SessionStore {
      search: "gopala".into(),
      selection: Some(BhajanKey::new("Morning Song", "Mira")),
      list_offset: 7,
      theme_name: Some("dusk".into()),
    };
    let reloaded = SessionStore::from_toml(&store.to_toml());
    assert_eq!(reloaded, store);
  }

  #[test]
  fn session_store_tolerates_missing_fields() {
    let reloaded = SessionStore::from_toml("search = \"x\"\n");
    assert_eq!(reloaded.search, "x");
    assert_eq!(reloaded.selection, None);
    assert_eq!(reloaded.list_offset, 0);
  }
}
