use chrono::TimeZone;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, Clear, List, ListItem, Padding, Paragraph},
};

use crate::app::{App, AppMode, Modal, PromptPurpose};
use crate::constants::constants;
use crate::form::FormState;
use crate::model::{FIELD_SCHEMA, FieldKind};
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Split server-side highlight markup into (text, highlighted) segments.
fn split_highlight(markup: &str) -> Vec<(String, bool)> {
  let open = constants().highlight_open.as_str();
  let close = constants().highlight_close.as_str();
  let mut segments = Vec::new();
  let mut rest = markup;
  while let Some(start) = rest.find(open) {
    if start > 0 {
      segments.push((rest[..start].to_string(), false));
    }
    rest = &rest[start + open.len()..];
    match rest.find(close) {
      Some(end) => {
        segments.push((rest[..end].to_string(), true));
        rest = &rest[end + close.len()..];
      }
      None => {
        // Unclosed marker: treat the tail as highlighted.
        segments.push((rest.to_string(), true));
        rest = "";
      }
    }
  }
  if !rest.is_empty() {
    segments.push((rest.to_string(), false));
  }
  segments
}

fn highlight_spans(markup: &str, base: Style, highlight: Style) -> Vec<Span<'static>> {
  split_highlight(markup)
    .into_iter()
    .map(|(text, hl)| Span::styled(text, if hl { highlight } else { base }))
    .collect()
}

fn field_height(kind: FieldKind) -> u16 {
  match kind {
    FieldKind::LongText => 7,
    FieldKind::ShortText | FieldKind::Asset => 3,
  }
}

/// Adjust `scroll_top` so the focused field block fits inside `height` rows.
fn ensure_focus_visible(form: &mut FormState, height: u16) {
  if form.focus < form.scroll_top {
    form.scroll_top = form.focus;
  }
  loop {
    let used: u16 = (form.scroll_top..=form.focus).map(|i| field_height(FIELD_SCHEMA[i].kind)).sum();
    if used <= height || form.scroll_top >= form.focus {
      break;
    }
    form.scroll_top += 1;
  }
}

/// Centered popup rect of the given size, clamped to the frame.
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect {
    x: area.x + (area.width - width) / 2,
    y: area.y + (area.height - height) / 2,
    width,
    height,
  }
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(6), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());

  render_header(frame, theme, header_area);

  let [left_area, detail_area] =
    Layout::horizontal([Constraint::Length(constants().list_pane_width), Constraint::Min(20)]).areas(main_area);
  let [search_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).areas(left_area);

  render_search(frame, app, search_area);
  render_list(frame, app, list_area);
  render_detail(frame, app, detail_area);
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
  render_modal(frame, app);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ♪ bb ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_search(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Search { theme.accent } else { theme.border };
  let block = Block::bordered()
    .title(" Search ")
    .title_style(Style::default().fg(border_color))
    .border_type(ratatui::widgets::BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.session.search, app.search_cursor);

  if cursor_col < app.search_scroll {
    app.search_scroll = cursor_col;
  } else if cursor_col >= app.search_scroll + inner_w {
    app.search_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible = clip_line(&app.session.search, app.search_scroll, inner_w);
  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Search && app.modal == Modal::None {
    let cursor_x = area.x + 2 + (cursor_col - app.search_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

/// Drop chars left of `scroll` display columns and clip to `width` columns.
fn clip_line(s: &str, scroll: usize, width: usize) -> String {
  s.chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= scroll)
    .take_while(|(start, _, _)| *start < scroll + width)
    .map(|(_, _, c)| c)
    .collect()
}

fn render_list(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let inner_w = area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = app
    .search_results
    .iter()
    .enumerate()
    .map(|(i, hit)| {
      let is_selected = Some(i) == app.list_state.selected();
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let base = Style::default().fg(fg);
      let hl = Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD);
      let mut spans = highlight_spans(&hit.highlight_title, base, hl);
      spans.push(Span::styled(" — ".to_string(), Style::default().fg(theme.muted)));
      spans.extend(highlight_spans(&hit.highlight_author, Style::default().fg(theme.muted), hl));

      // Clip by cumulative char count; highlight segments are short.
      let mut used = 0;
      let clipped: Vec<Span> = spans
        .into_iter()
        .filter_map(|span| {
          if used >= inner_w {
            return None;
          }
          let remaining = inner_w - used;
          let content = truncate_str(&span.content, remaining);
          used += content.chars().count();
          Some(Span::styled(content, span.style))
        })
        .collect();

      ListItem::new(Line::from(clipped)).bg(bg)
    })
    .collect();

  let title = format!(" Bhajans — {} ", app.search_results.len());
  let border_color = if app.mode == AppMode::List { theme.accent } else { theme.border };
  let list = List::new(items)
    .block(
      Block::bordered()
        .title(title)
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(border_color)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_detail(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Edit { theme.accent } else { theme.border };
  let outer = Block::bordered()
    .title(" Detail ")
    .title_style(Style::default().fg(border_color))
    .border_type(ratatui::widgets::BorderType::Rounded)
    .border_style(Style::default().fg(border_color));
  let inner = outer.inner(area);
  frame.render_widget(outer, area);

  if let Some(err) = app.detail_error.clone() {
    let text = vec![
      Line::from(""),
      Line::from(Span::styled("Could not load the record:", Style::default().fg(theme.error))),
      Line::from(""),
      Line::from(Span::styled(err, Style::default().fg(theme.fg))),
    ];
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), inner);
    return;
  }

  if app.form.is_none() {
    let msg = if app.detail_loading { "Loading…" } else { "Select a bhajan, or press ^n for a new one." };
    let text = vec![Line::from(""), Line::from(Span::styled(msg, Style::default().fg(theme.muted)))];
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), inner);
    return;
  }

  let in_edit = app.mode == AppMode::Edit && app.modal == Modal::None;
  let validation = app.form.as_ref().and_then(|f| f.validation.clone());
  let mut body = inner;
  if let Some(msg) = validation {
    let warn_area = Rect { height: 1, ..body };
    frame.render_widget(
      Paragraph::new(Span::styled(format!(" ⚠ {}", msg), Style::default().fg(theme.error))),
      warn_area,
    );
    body = Rect { y: body.y + 1, height: body.height.saturating_sub(1), ..body };
  }

  let Some(form) = app.form.as_mut() else { return };
  ensure_focus_visible(form, body.height);

  let mut y = body.y;
  for (i, spec) in FIELD_SCHEMA.iter().enumerate().skip(form.scroll_top) {
    let height = field_height(spec.kind);
    if y + height > body.y + body.height {
      break;
    }
    let field_area = Rect { x: body.x, y, width: body.width, height };
    y += height;

    let focused = i == form.focus;
    let border = if focused && in_edit { theme.accent } else { theme.border };
    let block = Block::bordered()
      .title(format!(" {} ", spec.label))
      .title_style(Style::default().fg(if focused { theme.accent } else { theme.muted }))
      .border_style(Style::default().fg(border))
      .padding(Padding::horizontal(1));
    let field_inner_w = field_area.width.saturating_sub(4) as usize;

    match spec.kind {
      FieldKind::Asset => {
        let line = asset_line(form, spec.name, theme, field_inner_w);
        frame.render_widget(Paragraph::new(line).block(block), field_area);
      }
      FieldKind::ShortText if !spec.editable => {
        // lastModified: server timestamp in ms, rendered read-only.
        let text = form
          .last_modified
          .and_then(|ms| chrono::Local.timestamp_millis_opt(ms as i64).single())
          .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
          .unwrap_or_default();
        frame.render_widget(Paragraph::new(text).style(Style::default().fg(theme.muted)).block(block), field_area);
      }
      FieldKind::ShortText => {
        let buf = &mut form.fields[i];
        let cursor_col = display_width(&buf.value, buf.cursor);
        if cursor_col < buf.scroll {
          buf.scroll = cursor_col;
        } else if cursor_col >= buf.scroll + field_inner_w {
          buf.scroll = cursor_col.saturating_sub(field_inner_w) + 1;
        }
        let visible = clip_line(&buf.value, buf.scroll, field_inner_w);
        frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), field_area);
        if focused && in_edit {
          frame.set_cursor_position((field_area.x + 2 + (cursor_col - buf.scroll) as u16, field_area.y + 1));
        }
      }
      FieldKind::LongText => {
        let visible_h = height.saturating_sub(2) as usize;
        let buf = &mut form.fields[i];
        let (line, col) = multiline_cursor(&buf.value, buf.cursor);
        if line < buf.scroll {
          buf.scroll = line;
        } else if line >= buf.scroll + visible_h {
          buf.scroll = line + 1 - visible_h;
        }
        let lines: Vec<Line> = buf
          .value
          .split('\n')
          .skip(buf.scroll)
          .take(visible_h)
          .map(|l| Line::from(clip_line(l, 0, field_inner_w)))
          .collect();
        frame.render_widget(Paragraph::new(lines).style(Style::default().fg(theme.fg)).block(block), field_area);
        if focused && in_edit {
          let col = col.min(field_inner_w.saturating_sub(1));
          frame.set_cursor_position((field_area.x + 2 + col as u16, field_area.y + 1 + (line - buf.scroll) as u16));
        }
      }
    }
  }
}

/// (line index, display column) of a char-index cursor in multi-line text.
fn multiline_cursor(value: &str, cursor: usize) -> (usize, usize) {
  let mut line = 0;
  let mut col = 0;
  for c in value.chars().take(cursor) {
    if c == '\n' {
      line += 1;
      col = 0;
    } else {
      col += unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
    }
  }
  (line, col)
}

/// Render an asset slot: the stored path plus any staged operation.
fn asset_line(form: &FormState, name: &str, theme: &Theme, width: usize) -> Line<'static> {
  let stored = form.value(name);
  let (staged_delete, attach) = match name {
    "audioPath" => (form.delete_audio, form.attach_audio.as_ref()),
    _ => (form.delete_review, form.attach_review.as_ref()),
  };

  if let Some(path) = attach {
    return Line::from(vec![
      Span::styled("attach on save: ".to_string(), Style::default().fg(theme.status)),
      Span::styled(truncate_str(&path.display().to_string(), width.saturating_sub(16)), Style::default().fg(theme.fg)),
    ]);
  }
  if staged_delete {
    return Line::from(vec![
      Span::styled(truncate_str(stored, width.saturating_sub(18)), Style::default().fg(theme.muted).crossed_out()),
      Span::styled("  delete on save".to_string(), Style::default().fg(theme.error)),
    ]);
  }
  if stored.is_empty() {
    Line::from(Span::styled("none — press a to attach".to_string(), Style::default().fg(theme.muted)))
  } else {
    Line::from(Span::styled(truncate_str(stored, width), Style::default().fg(theme.fg)))
  }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let busy = app.busy.labels();
  let (text, style) = if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if !busy.is_empty() {
    (format!(" ⏳ {}", busy.join("  ")), Style::default().fg(theme.status))
  } else if let Some(msg) = &app.status_message {
    (format!(" ✓ {}", msg), Style::default().fg(theme.status))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = match app.modal {
    Modal::Login { .. } => vec![("Enter", "Unlock"), ("^c", "Quit")],
    Modal::ConfirmDelete { .. } | Modal::ConfirmDeleteAll => vec![("y", "Confirm"), ("n", "Cancel")],
    Modal::ImportStats { .. } => vec![("Any key", "Close")],
    Modal::PathPrompt { .. } => vec![("Enter", "Confirm"), ("Esc", "Cancel")],
    Modal::None => match app.mode {
      AppMode::Search => vec![("↓", "List"), ("^n", "New"), ("^i", "Import"), ("^e", "Export"), ("^t", "Theme")],
      AppMode::List => {
        vec![("Enter", "Open"), ("j/k", "Navigate"), ("x", "Delete"), ("^d", "Delete all"), ("Esc", "Search")]
      }
      AppMode::Edit => vec![("^s", "Save"), ("^u", "Revert"), ("Tab", "Next field"), ("Esc", "List")],
    },
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

// --- Modals ---

fn render_modal(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  match &app.modal {
    Modal::None => {}
    Modal::Login { input, cursor, error } => {
      let area = popup_area(frame.area(), 52, 8);
      frame.render_widget(Clear, area);
      let block = Block::bordered()
        .title(" Unlock ")
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent))
        .padding(Padding::horizontal(1));
      let inner = block.inner(area);
      // The token renders masked.
      let masked: String = input.chars().map(|_| '•').collect();
      let mut lines = vec![
        Line::from(Span::styled("Enter the write token:", Style::default().fg(theme.fg))),
        Line::from(""),
        Line::from(Span::styled(masked, Style::default().fg(theme.fg))),
        Line::from(""),
      ];
      if app.login_in_flight() {
        lines.push(Line::from(Span::styled("Checking…", Style::default().fg(theme.status))));
      } else if let Some(err) = error {
        lines.push(Line::from(Span::styled(err.clone(), Style::default().fg(theme.error))));
      }
      frame.render_widget(Paragraph::new(lines).block(block), area);
      frame.set_cursor_position((inner.x + *cursor as u16, inner.y + 2));
    }
    Modal::ConfirmDelete { key } => {
      let text = vec![
        Line::from(Span::styled(
          format!("Delete \"{}\" by {}?", key.title, key.author),
          Style::default().fg(theme.fg),
        )),
        Line::from(""),
        Line::from(Span::styled("This cannot be undone.", Style::default().fg(theme.muted))),
      ];
      render_confirm(frame, theme, " Delete bhajan ", text);
    }
    Modal::ConfirmDeleteAll => {
      let text = vec![
        Line::from(Span::styled("Delete every bhajan on the server?", Style::default().fg(theme.fg))),
        Line::from(""),
        Line::from(Span::styled("This cannot be undone.", Style::default().fg(theme.error))),
      ];
      render_confirm(frame, theme, " Delete ALL ", text);
    }
    Modal::ImportStats { stats } => {
      let text = vec![
        Line::from(Span::styled(format!("Added: {} bhajans", stats.number_added), Style::default().fg(theme.fg))),
        Line::from(Span::styled(format!("Replaced: {} bhajans", stats.number_replaced), Style::default().fg(theme.fg))),
        Line::from(Span::styled(format!("Skipped: {} bhajans", stats.number_skipped), Style::default().fg(theme.fg))),
      ];
      render_confirm(frame, theme, " Import finished ", text);
    }
    Modal::PathPrompt { purpose, input, cursor } => {
      let title = match purpose {
        PromptPurpose::ImportFile => " Import file ",
        PromptPurpose::AttachAudio => " Attach audio ",
        PromptPurpose::AttachReview => " Attach review ",
      };
      let area = popup_area(frame.area(), 60, 7);
      frame.render_widget(Clear, area);
      let block = Block::bordered()
        .title(title)
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .border_type(ratatui::widgets::BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent))
        .padding(Padding::horizontal(1));
      let inner = block.inner(area);
      let inner_w = inner.width.saturating_sub(2) as usize;
      let cursor_col = display_width(input, *cursor);
      let scroll = cursor_col.saturating_sub(inner_w.saturating_sub(1));
      let lines = vec![
        Line::from(Span::styled("File path:", Style::default().fg(theme.fg))),
        Line::from(""),
        Line::from(Span::styled(clip_line(input, scroll, inner_w), Style::default().fg(theme.fg))),
      ];
      frame.render_widget(Paragraph::new(lines).block(block), area);
      frame.set_cursor_position((inner.x + (cursor_col - scroll) as u16, inner.y + 2));
    }
  }
}

fn render_confirm(frame: &mut Frame, theme: &Theme, title: &str, text: Vec<Line>) {
  let height = text.len() as u16 + 2;
  let area = popup_area(frame.area(), 48, height);
  frame.render_widget(Clear, area);
  let block = Block::bordered()
    .title(title.to_string())
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(ratatui::widgets::BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1));
  frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
}

#[cfg(test)]
mod tests {
  use super::*;

  // --- split_highlight ---

  #[test]
  fn highlight_markup_splits_into_segments() {
    let segments = split_highlight("go<em>pal</em>a");
    assert_eq!(
      segments,
      vec![("go".to_string(), false), ("pal".to_string(), true), ("a".to_string(), false)]
    );
  }

  #[test]
  fn plain_text_is_one_unhighlighted_segment() {
    assert_eq!(split_highlight("gopala"), vec![("gopala".to_string(), false)]);
  }

  #[test]
  fn multiple_highlights_in_one_string() {
    let segments = split_highlight("<em>go</em>pa<em>la</em>");
    assert_eq!(
      segments,
      vec![("go".to_string(), true), ("pa".to_string(), false), ("la".to_string(), true)]
    );
  }

  #[test]
  fn unclosed_marker_highlights_the_tail() {
    assert_eq!(split_highlight("go<em>pala"), vec![("go".to_string(), false), ("pala".to_string(), true)]);
  }

  // --- truncate / clip ---

  #[test]
  fn truncate_appends_ellipsis() {
    assert_eq!(truncate_str("hello world", 5), "hell…");
    assert_eq!(truncate_str("hi", 5), "hi");
  }

  #[test]
  fn clip_line_skips_scrolled_columns() {
    assert_eq!(clip_line("abcdef", 2, 3), "cde");
    assert_eq!(clip_line("abc", 0, 10), "abc");
  }

  // --- form scrolling ---

  #[test]
  fn focus_above_the_viewport_scrolls_up() {
    let mut form = FormState::new_blank();
    form.scroll_top = 4;
    form.focus = 1;
    ensure_focus_visible(&mut form, 20);
    assert_eq!(form.scroll_top, 1);
  }

  #[test]
  fn focus_below_the_viewport_scrolls_down() {
    let mut form = FormState::new_blank();
    form.focus = FIELD_SCHEMA.len() - 1;
    // Too short to fit everything above the focus.
    ensure_focus_visible(&mut form, 10);
    let used: u16 = (form.scroll_top..=form.focus).map(|i| field_height(FIELD_SCHEMA[i].kind)).sum();
    assert!(used <= 10);
  }

  // --- multiline cursor ---

  #[test]
  fn multiline_cursor_tracks_lines_and_columns() {
    assert_eq!(multiline_cursor("ab\ncd", 0), (0, 0));
    assert_eq!(multiline_cursor("ab\ncd", 3), (1, 0));
    assert_eq!(multiline_cursor("ab\ncd", 5), (1, 2));
  }
}
