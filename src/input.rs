use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use std::path::PathBuf;

use crate::app::{App, AppMode, Modal, PromptPurpose, open_in_browser};
use crate::model::FieldKind;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Apply a single-line editing key to a (value, cursor) pair. The cursor is
/// a char index. Returns true when the text itself changed.
pub fn edit_line(value: &mut String, cursor: &mut usize, key: &event::KeyEvent) -> bool {
  match key.code {
    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
      let byte_idx = char_to_byte_index(value, *cursor);
      value.insert(byte_idx, c);
      *cursor += 1;
      true
    }
    KeyCode::Backspace => {
      if *cursor > 0 {
        *cursor -= 1;
        let byte_idx = char_to_byte_index(value, *cursor);
        value.remove(byte_idx);
        true
      } else {
        false
      }
    }
    KeyCode::Delete => {
      if *cursor < value.chars().count() {
        let byte_idx = char_to_byte_index(value, *cursor);
        value.remove(byte_idx);
        true
      } else {
        false
      }
    }
    KeyCode::Left => {
      *cursor = cursor.saturating_sub(1);
      false
    }
    KeyCode::Right => {
      if *cursor < value.chars().count() {
        *cursor += 1;
      }
      false
    }
    KeyCode::Home => {
      *cursor = 0;
      false
    }
    KeyCode::End => {
      *cursor = value.chars().count();
      false
    }
    _ => false,
  }
}

/// (line, column) of a char-index cursor in multi-line text.
fn cursor_line_col(value: &str, cursor: usize) -> (usize, usize) {
  let mut line = 0;
  let mut col = 0;
  for c in value.chars().take(cursor) {
    if c == '\n' {
      line += 1;
      col = 0;
    } else {
      col += 1;
    }
  }
  (line, col)
}

/// Char-index cursor for a (line, column) position, clamped to line ends.
fn cursor_from_line_col(value: &str, line: usize, col: usize) -> usize {
  let mut idx = 0;
  for (i, text) in value.split('\n').enumerate() {
    let len = text.chars().count();
    if i == line {
      return idx + col.min(len);
    }
    idx += len + 1;
  }
  value.chars().count()
}

// --- Event handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  // An open modal captures everything else.
  if app.modal != Modal::None {
    handle_modal_key(app, key);
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('n') => app.new_record(),
      KeyCode::Char('s') => app.trigger_save(),
      KeyCode::Char('u') => app.revert_form(),
      KeyCode::Char('e') => app.trigger_export(),
      KeyCode::Char('r') => app.trigger_reindex(),
      KeyCode::Char('d') => app.request_delete_all(),
      KeyCode::Char('l') => app.logout(),
      KeyCode::Char('i') => {
        app.modal = Modal::PathPrompt { purpose: PromptPurpose::ImportFile, input: String::new(), cursor: 0 };
      }
      _ => {}
    }
    return Ok(());
  }

  match app.mode {
    AppMode::Search => handle_search_key(app, key),
    AppMode::List => handle_list_key(app, key),
    AppMode::Edit => handle_edit_key(app, key),
  }
  Ok(())
}

fn handle_search_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter | KeyCode::Down | KeyCode::Tab => {
      if !app.search_results.is_empty() {
        app.mode = AppMode::List;
      }
    }
    KeyCode::Esc => {
      if !app.session.search.is_empty() {
        app.session.search.clear();
        app.search_cursor = 0;
        app.search_scroll = 0;
        app.trigger_search(false);
      } else if !app.search_results.is_empty() {
        app.mode = AppMode::List;
      } else {
        app.should_quit = true;
      }
    }
    _ => {
      let mut term = std::mem::take(&mut app.session.search);
      let changed = edit_line(&mut term, &mut app.search_cursor, &key);
      app.session.search = term;
      if changed {
        // Debounced; a stale in-flight response for a previous term is
        // discarded on receipt.
        app.queue_search();
      }
    }
  }
}

fn handle_list_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      if let Some(key) = app.hovered_key() {
        app.select_record(key);
        app.mode = AppMode::Edit;
      }
    }
    KeyCode::Down | KeyCode::Char('j') => {
      let count = app.search_results.len();
      if count > 0 {
        let i = app.list_state.selected().map_or(0, |i| (i + 1) % count);
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      let count = app.search_results.len();
      if count > 0 {
        let i =
          app.list_state.selected().map_or(0, |i| if i == 0 { count.saturating_sub(1) } else { i.saturating_sub(1) });
        app.list_state.select(Some(i));
      }
    }
    KeyCode::Char('x') | KeyCode::Delete => {
      if let Some(key) = app.hovered_key() {
        app.request_delete(key);
      }
    }
    KeyCode::Tab | KeyCode::Right => {
      if app.form.is_some() {
        app.mode = AppMode::Edit;
      }
    }
    KeyCode::Esc | KeyCode::Char('/') => {
      app.mode = AppMode::Search;
    }
    _ => {}
  }
}

fn handle_edit_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  let Some(form) = app.form.as_mut() else {
    if key.code == KeyCode::Esc {
      app.mode = AppMode::List;
    }
    return;
  };

  match key.code {
    KeyCode::Esc => {
      app.mode = AppMode::List;
      return;
    }
    KeyCode::Tab => {
      form.focus_next();
      return;
    }
    KeyCode::BackTab => {
      form.focus_prev();
      return;
    }
    _ => {}
  }

  match form.focused_kind() {
    Some(FieldKind::Asset) => {
      let field_name = crate::model::FIELD_SCHEMA[form.focus].name;
      match key.code {
        KeyCode::Char('d') => form.toggle_staged_delete(),
        KeyCode::Char('a') => {
          let purpose =
            if field_name == "audioPath" { PromptPurpose::AttachAudio } else { PromptPurpose::AttachReview };
          app.modal = Modal::PathPrompt { purpose, input: String::new(), cursor: 0 };
        }
        KeyCode::Enter => {
          // Open the stored asset in the browser.
          let path = form.value(field_name).to_string();
          if !path.is_empty() {
            let url = app.remote.asset_url_for(&path);
            if let Err(e) = open_in_browser(&url) {
              app.set_error(format!("Failed to open browser: {}", e));
            }
          }
        }
        KeyCode::Up => form.focus_prev(),
        KeyCode::Down => form.focus_next(),
        _ => {}
      }
    }
    Some(FieldKind::LongText) => {
      let Some(buf) = form.focused_text_buf() else { return };
      match key.code {
        KeyCode::Enter => {
          let byte_idx = char_to_byte_index(&buf.value, buf.cursor);
          buf.value.insert(byte_idx, '\n');
          buf.cursor += 1;
          form.dirty = true;
        }
        KeyCode::Up => {
          let (line, col) = cursor_line_col(&buf.value, buf.cursor);
          if line > 0 {
            buf.cursor = cursor_from_line_col(&buf.value, line - 1, col);
          } else {
            form.focus_prev();
          }
        }
        KeyCode::Down => {
          let (line, col) = cursor_line_col(&buf.value, buf.cursor);
          if line + 1 < buf.value.split('\n').count() {
            buf.cursor = cursor_from_line_col(&buf.value, line + 1, col);
          } else {
            form.focus_next();
          }
        }
        _ => {
          if edit_line(&mut buf.value, &mut buf.cursor, &key) {
            form.dirty = true;
          }
        }
      }
    }
    Some(FieldKind::ShortText) => match key.code {
      KeyCode::Up => form.focus_prev(),
      KeyCode::Down | KeyCode::Enter => form.focus_next(),
      _ => {
        if let Some(buf) = form.focused_text_buf()
          && edit_line(&mut buf.value, &mut buf.cursor, &key)
        {
          form.dirty = true;
        }
      }
    },
    None => {}
  }
}

// --- Modals ---

fn handle_modal_key(app: &mut App, key: event::KeyEvent) {
  match std::mem::take(&mut app.modal) {
    Modal::Login { mut input, mut cursor, error } => match key.code {
      KeyCode::Enter => {
        let token = input.clone();
        app.modal = Modal::Login { input, cursor, error: None };
        if !token.is_empty() {
          app.submit_login(&token);
        }
      }
      KeyCode::Esc => {
        app.modal = Modal::Login { input: String::new(), cursor: 0, error };
      }
      _ => {
        edit_line(&mut input, &mut cursor, &key);
        app.modal = Modal::Login { input, cursor, error };
      }
    },
    Modal::ConfirmDelete { key: record_key } => match key.code {
      KeyCode::Char('y') | KeyCode::Enter => {
        app.modal = Modal::ConfirmDelete { key: record_key };
        app.confirm_delete();
      }
      KeyCode::Char('n') | KeyCode::Esc => {}
      _ => app.modal = Modal::ConfirmDelete { key: record_key },
    },
    Modal::ConfirmDeleteAll => match key.code {
      KeyCode::Char('y') | KeyCode::Enter => app.confirm_delete_all(),
      KeyCode::Char('n') | KeyCode::Esc => {}
      _ => app.modal = Modal::ConfirmDeleteAll,
    },
    Modal::ImportStats { .. } => {}
    Modal::PathPrompt { purpose, mut input, mut cursor } => match key.code {
      KeyCode::Enter => {
        let path = PathBuf::from(input.trim());
        if input.trim().is_empty() {
          app.modal = Modal::PathPrompt { purpose, input, cursor };
        } else {
          match purpose {
            PromptPurpose::ImportFile => app.trigger_import(path),
            PromptPurpose::AttachAudio | PromptPurpose::AttachReview => {
              // Focus is still on the asset slot that opened the prompt.
              if let Some(form) = app.form.as_mut() {
                form.attach(path);
              }
            }
          }
        }
      }
      KeyCode::Esc => {}
      _ => {
        edit_line(&mut input, &mut cursor, &key);
        app.modal = Modal::PathPrompt { purpose, input, cursor };
      }
    },
    Modal::None => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ratatui::crossterm::event::KeyEvent;

  fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  // --- edit_line ---

  #[test]
  fn edit_line_inserts_at_the_cursor() {
    let mut value = "abd".to_string();
    let mut cursor = 2;
    assert!(edit_line(&mut value, &mut cursor, &press(KeyCode::Char('c'))));
    assert_eq!(value, "abcd");
    assert_eq!(cursor, 3);
  }

  #[test]
  fn edit_line_backspace_removes_before_the_cursor() {
    let mut value = "naïve".to_string();
    let mut cursor = 3;
    assert!(edit_line(&mut value, &mut cursor, &press(KeyCode::Backspace)));
    assert_eq!(value, "nave");
    assert_eq!(cursor, 2);
  }

  #[test]
  fn edit_line_movement_does_not_report_a_change() {
    let mut value = "abc".to_string();
    let mut cursor = 1;
    assert!(!edit_line(&mut value, &mut cursor, &press(KeyCode::Right)));
    assert_eq!(cursor, 2);
    assert!(!edit_line(&mut value, &mut cursor, &press(KeyCode::End)));
    assert_eq!(cursor, 3);
    assert!(!edit_line(&mut value, &mut cursor, &press(KeyCode::Home)));
    assert_eq!(cursor, 0);
  }

  #[test]
  fn edit_line_backspace_at_start_is_a_noop() {
    let mut value = "abc".to_string();
    let mut cursor = 0;
    assert!(!edit_line(&mut value, &mut cursor, &press(KeyCode::Backspace)));
    assert_eq!(value, "abc");
  }

  // --- line/col math ---

  #[test]
  fn line_col_roundtrip_in_multiline_text() {
    let text = "first\nsecond line\nthird";
    assert_eq!(cursor_line_col(text, 0), (0, 0));
    assert_eq!(cursor_line_col(text, 6), (1, 0));
    assert_eq!(cursor_line_col(text, 9), (1, 3));
    assert_eq!(cursor_from_line_col(text, 1, 3), 9);
  }

  #[test]
  fn line_col_clamps_to_the_target_line_end() {
    let text = "long first line\nab";
    // Column 10 does not exist on line 1; clamp to its end.
    assert_eq!(cursor_from_line_col(text, 1, 10), text.chars().count());
  }

  #[test]
  fn line_col_past_last_line_lands_at_the_end() {
    let text = "one\ntwo";
    assert_eq!(cursor_from_line_col(text, 5, 0), text.chars().count());
  }
}
