//! Transient edit state for the detail view.
//!
//! Unsaved changes live only here — there is no auto-save and no optimistic
//! local mutation. Asset deletions are staged (a pending flag) and only take
//! effect when the record is saved; "revert" rebuilds everything from the
//! last-fetched record.

use std::path::PathBuf;

use crate::model::{Bhajan, BhajanKey, FIELD_SCHEMA, FieldKind, UpsertInput};

/// A single editable text buffer with a char-index cursor, plus a scroll
/// offset (horizontal for single-line fields, vertical for text areas).
#[derive(Debug, Clone, Default)]
pub struct FieldBuf {
  pub value: String,
  pub cursor: usize,
  pub scroll: usize,
}

impl FieldBuf {
  fn with_value(value: &str) -> Self {
    Self { value: value.to_string(), cursor: 0, scroll: 0 }
  }
}

/// Per-field edit buffers (parallel to `FIELD_SCHEMA`), focus, staged asset
/// operations, and validation state.
#[derive(Debug, Clone, Default)]
pub struct FormState {
  pub fields: Vec<FieldBuf>,
  /// Index into `FIELD_SCHEMA` of the focused field.
  pub focus: usize,
  /// First field rendered in the detail pane (field-granular scrolling).
  pub scroll_top: usize,
  /// The key the record currently has on the server; `None` for a new item.
  pub old_key: Option<BhajanKey>,
  pub delete_audio: bool,
  pub delete_review: bool,
  pub attach_audio: Option<PathBuf>,
  pub attach_review: Option<PathBuf>,
  pub dirty: bool,
  /// Client-side validation message, shown inline; blocks submission.
  pub validation: Option<String>,
  pub last_modified: Option<f64>,
}

impl FormState {
  /// The synthetic "new item" state: all fields blank, no previous key.
  pub fn new_blank() -> Self {
    Self { fields: FIELD_SCHEMA.iter().map(|_| FieldBuf::default()).collect(), ..Self::default() }
  }

  /// Build the form from a fetched record.
  pub fn load_from(record: &Bhajan) -> Self {
    Self {
      fields: FIELD_SCHEMA.iter().map(|spec| FieldBuf::with_value(record.field_text(spec.name))).collect(),
      old_key: Some(record.key()),
      last_modified: record.last_modified,
      ..Self::default()
    }
  }

  /// Discard transient state and rebuild from the record, keeping focus.
  /// Staged asset deletions and pending attachments are dropped.
  pub fn revert(&mut self, record: &Bhajan) {
    let focus = self.focus;
    let scroll_top = self.scroll_top;
    *self = Self::load_from(record);
    self.focus = focus.min(FIELD_SCHEMA.len().saturating_sub(1));
    self.scroll_top = scroll_top;
  }

  pub fn value(&self, name: &str) -> &str {
    FIELD_SCHEMA
      .iter()
      .position(|spec| spec.name == name)
      .and_then(|i| self.fields.get(i))
      .map(|buf| buf.value.as_str())
      .unwrap_or("")
  }

  /// The focused field's buffer, but only when it is a text field.
  pub fn focused_text_buf(&mut self) -> Option<&mut FieldBuf> {
    let spec = FIELD_SCHEMA.get(self.focus)?;
    if !spec.editable || spec.kind == FieldKind::Asset {
      return None;
    }
    self.fields.get_mut(self.focus)
  }

  pub fn focused_kind(&self) -> Option<FieldKind> {
    FIELD_SCHEMA.get(self.focus).map(|spec| spec.kind)
  }

  pub fn focus_next(&mut self) {
    self.focus = step_editable(self.focus, 1);
  }

  pub fn focus_prev(&mut self) {
    self.focus = step_editable(self.focus, FIELD_SCHEMA.len() - 1);
  }

  /// Toggle the staged "delete this asset on save" flag for the focused
  /// asset slot. A pending attachment replaces a staged deletion.
  pub fn toggle_staged_delete(&mut self) {
    match FIELD_SCHEMA.get(self.focus).map(|spec| spec.name) {
      Some("audioPath") => {
        self.delete_audio = !self.delete_audio;
        if self.delete_audio {
          self.attach_audio = None;
        }
        self.dirty = true;
      }
      Some("reviewPath") => {
        self.delete_review = !self.delete_review;
        if self.delete_review {
          self.attach_review = None;
        }
        self.dirty = true;
      }
      _ => {}
    }
  }

  /// Stage a file attachment for the focused asset slot.
  pub fn attach(&mut self, path: PathBuf) {
    match FIELD_SCHEMA.get(self.focus).map(|spec| spec.name) {
      Some("audioPath") => {
        self.attach_audio = Some(path);
        self.delete_audio = false;
        self.dirty = true;
      }
      Some("reviewPath") => {
        self.attach_review = Some(path);
        self.delete_review = false;
        self.dirty = true;
      }
      _ => {}
    }
  }

  /// Reset staged flags and pending attachments after a successful save.
  pub fn clear_staged(&mut self) {
    self.delete_audio = false;
    self.delete_review = false;
    self.attach_audio = None;
    self.attach_review = None;
    self.dirty = false;
  }

  /// Title must be non-empty after trimming. Checked client-side before
  /// any network round trip; the failure message renders inline.
  pub fn validate(&mut self) -> bool {
    if self.value("title").trim().is_empty() {
      self.validation = Some("Title must not be empty.".to_string());
      false
    } else {
      self.validation = None;
      true
    }
  }

  /// Produce the upsert input from the current buffers and staged state.
  pub fn to_input(&self) -> UpsertInput {
    let key = BhajanKey::new(self.value("title"), self.value("author")).normalized();
    UpsertInput {
      title: key.title,
      author: key.author,
      text: self.value("text").to_string(),
      translation: self.value("translation").to_string(),
      chords: self.value("chords").to_string(),
      lessons: self.value("lessons").to_string(),
      options: self.value("options").to_string(),
      old_key: self.old_key.clone(),
      delete_audio: self.delete_audio,
      delete_review: self.delete_review,
      audio_file: self.attach_audio.clone(),
      review_file: self.attach_review.clone(),
    }
  }
}

/// Advance `focus` by `step` (mod schema length), skipping non-editable
/// entries. `step` of `len - 1` walks backwards.
fn step_editable(focus: usize, step: usize) -> usize {
  let len = FIELD_SCHEMA.len();
  let mut i = focus;
  for _ in 0..len {
    i = (i + step) % len;
    if FIELD_SCHEMA[i].editable {
      return i;
    }
  }
  focus
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record_with_audio() -> Bhajan {
    Bhajan {
      title: "Morning Song".into(),
      author: "Mira".into(),
      text: Some("verse".into()),
      audio_path: Some("audio/morning.mp3".into()),
      ..Default::default()
    }
  }

  #[test]
  fn load_from_fills_buffers_from_the_record() {
    let form = FormState::load_from(&record_with_audio());
    assert_eq!(form.value("title"), "Morning Song");
    assert_eq!(form.value("text"), "verse");
    assert_eq!(form.value("audioPath"), "audio/morning.mp3");
    assert_eq!(form.old_key, Some(BhajanKey::new("Morning Song", "Mira")));
  }

  #[test]
  fn blank_form_has_no_previous_key() {
    let form = FormState::new_blank();
    assert_eq!(form.old_key, None);
    assert_eq!(form.value("title"), "");
  }

  #[test]
  fn empty_title_fails_validation_with_inline_message() {
    let mut form = FormState::new_blank();
    form.fields[0].value = "   ".into();
    assert!(!form.validate());
    assert!(form.validation.is_some());
  }

  #[test]
  fn valid_title_clears_a_previous_validation_message() {
    let mut form = FormState::new_blank();
    assert!(!form.validate());
    form.fields[0].value = "T".into();
    assert!(form.validate());
    assert_eq!(form.validation, None);
  }

  #[test]
  fn staged_audio_deletion_is_discarded_by_revert() {
    let record = record_with_audio();
    let mut form = FormState::load_from(&record);
    form.focus = FIELD_SCHEMA.iter().position(|s| s.name == "audioPath").unwrap();
    form.toggle_staged_delete();
    assert!(form.delete_audio);

    form.revert(&record);
    assert!(!form.delete_audio);
    assert_eq!(form.value("audioPath"), "audio/morning.mp3");
  }

  #[test]
  fn attaching_replaces_a_staged_deletion() {
    let mut form = FormState::load_from(&record_with_audio());
    form.focus = FIELD_SCHEMA.iter().position(|s| s.name == "audioPath").unwrap();
    form.toggle_staged_delete();
    form.attach(PathBuf::from("/tmp/new.mp3"));
    assert!(!form.delete_audio);
    assert_eq!(form.attach_audio, Some(PathBuf::from("/tmp/new.mp3")));
  }

  #[test]
  fn to_input_normalizes_the_key_and_carries_staged_flags() {
    let mut form = FormState::load_from(&record_with_audio());
    form.fields[0].value = "  Renamed  ".into();
    form.fields[1].value = "".into();
    form.delete_review = true;
    let input = form.to_input();
    assert_eq!(input.new_key(), BhajanKey::new("Renamed", "Unknown"));
    assert_eq!(input.old_key, Some(BhajanKey::new("Morning Song", "Mira")));
    assert!(input.delete_review);
  }

  #[test]
  fn focus_skips_non_editable_fields() {
    let mut form = FormState::new_blank();
    form.focus = FIELD_SCHEMA.len() - 2;
    form.focus_next();
    // lastModified (the last entry) is not editable, so focus wraps to title.
    assert_eq!(form.focus, 0);
    form.focus_prev();
    assert_eq!(form.focus, FIELD_SCHEMA.len() - 2);
  }
}
