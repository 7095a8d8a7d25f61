use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::constants;

// --- Keys ---

/// The natural key of a bhajan: the (title, author) pair. There is no
/// separate numeric identifier — the server keys records by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BhajanKey {
  pub title: String,
  pub author: String,
}

impl BhajanKey {
  pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
    Self { title: title.into(), author: author.into() }
  }

  /// Trim the title and substitute the author sentinel for a blank author.
  /// The server identifies records by this normalized form.
  pub fn normalized(&self) -> Self {
    let title = self.title.trim().to_string();
    let author = self.author.trim();
    let author = if author.is_empty() { constants().unknown_author.clone() } else { author.to_string() };
    Self { title, author }
  }
}

// --- Records ---

/// A full bhajan record as served by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bhajan {
  pub title: String,
  pub author: String,
  pub text: Option<String>,
  pub translation: Option<String>,
  pub chords: Option<String>,
  pub lessons: Option<String>,
  pub options: Option<String>,
  pub audio_path: Option<String>,
  pub review_path: Option<String>,
  pub last_modified: Option<f64>,
}

impl Bhajan {
  pub fn key(&self) -> BhajanKey {
    BhajanKey::new(&self.title, &self.author)
  }

  /// Look up a field value by its wire name. Used by the schema-driven
  /// form loader and renderer. `lastModified` is not a text field and is
  /// rendered separately.
  pub fn field_text(&self, name: &str) -> &str {
    fn opt(v: &Option<String>) -> &str {
      v.as_deref().unwrap_or("")
    }
    match name {
      "title" => &self.title,
      "author" => &self.author,
      "text" => opt(&self.text),
      "translation" => opt(&self.translation),
      "chords" => opt(&self.chords),
      "lessons" => opt(&self.lessons),
      "options" => opt(&self.options),
      "audioPath" => opt(&self.audio_path),
      "reviewPath" => opt(&self.review_path),
      _ => "",
    }
  }
}

/// One row of a search listing: the record's key plus the server-produced
/// highlight markup for title and author.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
  pub key: BhajanKey,
  pub highlight_title: String,
  pub highlight_author: String,
}

/// Counts returned by a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportStats {
  pub number_added: i64,
  pub number_replaced: i64,
  pub number_skipped: i64,
}

// --- Field schema ---

/// How a field is edited and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  /// Single-line text input.
  ShortText,
  /// Multi-line text area.
  LongText,
  /// Binary asset slot (current path + staged attach/delete).
  Asset,
}

/// One entry of the statically declared form schema. Consumed uniformly by
/// the GraphQL query builder and the form renderer.
pub struct FieldSpec {
  /// Wire name, as it appears in the GraphQL schema.
  pub name: &'static str,
  pub label: &'static str,
  pub kind: FieldKind,
  pub editable: bool,
}

/// Ordered form layout. The order matches the record as users expect to
/// read it: key fields first, then the body, then attachments and notes.
pub const FIELD_SCHEMA: &[FieldSpec] = &[
  FieldSpec { name: "title", label: "Title", kind: FieldKind::ShortText, editable: true },
  FieldSpec { name: "author", label: "Author", kind: FieldKind::ShortText, editable: true },
  FieldSpec { name: "text", label: "Text", kind: FieldKind::LongText, editable: true },
  FieldSpec { name: "translation", label: "Translation", kind: FieldKind::LongText, editable: true },
  FieldSpec { name: "audioPath", label: "Audio", kind: FieldKind::Asset, editable: true },
  FieldSpec { name: "chords", label: "Chords", kind: FieldKind::ShortText, editable: true },
  FieldSpec { name: "reviewPath", label: "Review", kind: FieldKind::Asset, editable: true },
  FieldSpec { name: "lessons", label: "Lessons", kind: FieldKind::ShortText, editable: true },
  FieldSpec { name: "options", label: "Options", kind: FieldKind::ShortText, editable: true },
  FieldSpec { name: "lastModified", label: "Last modified", kind: FieldKind::ShortText, editable: false },
];

// --- Upsert input ---

/// Everything the upsert mutation takes: the submitted fields, the optional
/// previous key (rename-safe updates), staged asset deletions, and pending
/// file attachments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertInput {
  pub title: String,
  pub author: String,
  pub text: String,
  pub translation: String,
  pub chords: String,
  pub lessons: String,
  pub options: String,
  pub old_key: Option<BhajanKey>,
  pub delete_audio: bool,
  pub delete_review: bool,
  pub audio_file: Option<PathBuf>,
  pub review_file: Option<PathBuf>,
}

impl UpsertInput {
  /// The key the record will have after the upsert succeeds.
  pub fn new_key(&self) -> BhajanKey {
    BhajanKey::new(&self.title, &self.author).normalized()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_normalization_trims_title() {
    let key = BhajanKey::new("  Morning Song  ", "Mira").normalized();
    assert_eq!(key.title, "Morning Song");
    assert_eq!(key.author, "Mira");
  }

  #[test]
  fn key_normalization_defaults_blank_author() {
    let key = BhajanKey::new("Song", "   ").normalized();
    assert_eq!(key.author, "Unknown");
  }

  #[test]
  fn bhajan_deserializes_camel_case_wire_names() {
    let b: Bhajan = serde_json::from_str(
      r#"{"title":"T","author":"A","audioPath":"audio/t.mp3","lastModified":1700000000000.0}"#,
    )
    .unwrap();
    assert_eq!(b.audio_path.as_deref(), Some("audio/t.mp3"));
    assert_eq!(b.last_modified, Some(1_700_000_000_000.0));
    assert_eq!(b.text, None);
  }

  #[test]
  fn field_text_resolves_schema_names() {
    let b = Bhajan { title: "T".into(), chords: Some("Am G".into()), ..Default::default() };
    assert_eq!(b.field_text("title"), "T");
    assert_eq!(b.field_text("chords"), "Am G");
    assert_eq!(b.field_text("translation"), "");
  }

  #[test]
  fn schema_has_unique_wire_names() {
    for (i, a) in FIELD_SCHEMA.iter().enumerate() {
      for b in &FIELD_SCHEMA[i + 1..] {
        assert_ne!(a.name, b.name);
      }
    }
  }

  #[test]
  fn upsert_new_key_is_normalized() {
    let input = UpsertInput { title: " T ".into(), author: "".into(), ..Default::default() };
    assert_eq!(input.new_key(), BhajanKey::new("T", "Unknown"));
  }

  #[test]
  fn import_stats_deserializes_counts() {
    let s: ImportStats = serde_json::from_str(r#"{"numberAdded":2,"numberReplaced":1,"numberSkipped":0}"#).unwrap();
    assert_eq!(s, ImportStats { number_added: 2, number_replaced: 1, number_skipped: 0 });
  }
}
