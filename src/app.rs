use anyhow::Result;
use ratatui::widgets::ListState;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cache::{RefreshPlan, ResultCache};
use crate::constants::constants;
use crate::form::FormState;
use crate::gateway::Remote;
use crate::model::{Bhajan, BhajanKey, ImportStats, SearchHit};
use crate::store::{AuthStore, SessionStore};
use crate::theme::{THEMES, Theme};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Typing in the search box.
  Search,
  /// Navigating the result list.
  List,
  /// Editing the detail form.
  Edit,
}

/// Modal overlays. While one is open it captures all input.
#[derive(Debug, Default, PartialEq)]
pub enum Modal {
  #[default]
  None,
  Login {
    input: String,
    cursor: usize,
    error: Option<String>,
  },
  ConfirmDelete {
    key: BhajanKey,
  },
  ConfirmDeleteAll,
  ImportStats {
    stats: ImportStats,
  },
  PathPrompt {
    purpose: PromptPurpose,
    input: String,
    cursor: usize,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPurpose {
  ImportFile,
  AttachAudio,
  AttachReview,
}

/// Per-operation busy flags. Each disables only its own trigger control —
/// the rest of the UI stays responsive.
#[derive(Debug, Default, Clone, Copy)]
pub struct BulkOps {
  pub saving: bool,
  pub deleting: bool,
  pub importing: bool,
  pub exporting: bool,
  pub reindexing: bool,
  pub deleting_all: bool,
}

impl BulkOps {
  pub fn labels(&self) -> Vec<&'static str> {
    let mut labels = Vec::new();
    if self.saving {
      labels.push("Saving…");
    }
    if self.deleting {
      labels.push("Deleting…");
    }
    if self.importing {
      labels.push("Importing…");
    }
    if self.exporting {
      labels.push("Exporting…");
    }
    if self.reindexing {
      labels.push("Reindexing…");
    }
    if self.deleting_all {
      labels.push("Deleting all…");
    }
    labels
  }
}

/// In-flight async task receivers. Replacing a receiver drops the previous
/// one, so a superseded request's late response is simply discarded.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) search_rx: Option<oneshot::Receiver<(String, Result<Vec<SearchHit>>)>>,
  pub(crate) detail_rx: Option<oneshot::Receiver<(BhajanKey, Result<Option<Bhajan>>)>>,
  pub(crate) login_rx: Option<oneshot::Receiver<(String, Result<bool>)>>,
  pub(crate) save_rx: Option<oneshot::Receiver<(BhajanKey, Result<bool>)>>,
  pub(crate) delete_rx: Option<oneshot::Receiver<(BhajanKey, Result<bool>)>>,
  pub(crate) delete_all_rx: Option<oneshot::Receiver<Result<bool>>>,
  pub(crate) import_rx: Option<oneshot::Receiver<Result<ImportStats>>>,
  pub(crate) export_rx: Option<oneshot::Receiver<Result<String>>>,
  pub(crate) reindex_rx: Option<oneshot::Receiver<Result<bool>>>,
}

// --- Helpers ---

/// SHA-256 hex digest of the write token, matching what the server stores.
pub fn hash_token(token: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  hex::encode(hasher.finalize())
}

/// Open a URL in the default browser, reaping the child in the background.
pub fn open_in_browser(url: &str) -> Result<()> {
  #[cfg(target_os = "macos")]
  let cmd = "open";
  #[cfg(not(target_os = "macos"))]
  let cmd = "xdg-open";
  let mut child = std::process::Command::new(cmd)
    .arg(url)
    .stdin(std::process::Stdio::null())
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .spawn()?;
  std::thread::spawn(move || {
    let _ = child.wait();
  });
  Ok(())
}

// --- App ---

pub struct App {
  pub remote: Remote,
  pub cache: ResultCache,
  pub auth: AuthStore,
  pub session: SessionStore,
  pub mode: AppMode,
  pub modal: Modal,
  pub theme_index: usize,
  /// Cursor/scroll for the search box (the term itself lives in the session store).
  pub search_cursor: usize,
  pub search_scroll: usize,
  pub search_results: Vec<SearchHit>,
  pub list_state: ListState,
  /// Edit state for the open record; `None` shows the empty-selection placeholder.
  pub form: Option<FormState>,
  /// The last-fetched record backing the form; "revert" rebuilds from it.
  pub current: Option<Bhajan>,
  /// Detail query failure, rendered inline in place of the form.
  pub detail_error: Option<String>,
  pub detail_loading: bool,
  pub status_message: Option<String>,
  pub last_error: Option<String>,
  error_time: Option<Instant>,
  pub should_quit: bool,
  pub busy: BulkOps,
  pub(crate) tasks: AsyncTasks,
  /// Set by `apply_plan`; consumed at the end of `check_pending` so pure
  /// state transitions stay free of task spawning.
  pub(crate) refresh_search_queued: bool,
  pub(crate) refresh_detail_queued: bool,
  /// Last search-box keystroke; the query fires once typing pauses.
  pub(crate) search_pending_since: Option<Instant>,
}

impl App {
  pub fn new(remote: Remote, auth: AuthStore, session: SessionStore) -> Self {
    let theme_index = session
      .theme_name
      .as_deref()
      .and_then(|name| THEMES.iter().position(|t| t.name == name))
      .unwrap_or(0);
    let modal = if auth.write_token_hash.is_some() {
      Modal::None
    } else {
      Modal::Login { input: String::new(), cursor: 0, error: None }
    };
    let remote = remote.with_token(auth.write_token_hash.clone());
    let search_cursor = session.search.chars().count();
    let list_state = ListState::default().with_offset(session.list_offset);

    Self {
      remote,
      cache: ResultCache::default(),
      auth,
      session,
      mode: AppMode::Search,
      modal,
      theme_index,
      search_cursor,
      search_scroll: 0,
      search_results: Vec::new(),
      list_state,
      form: None,
      current: None,
      detail_error: None,
      detail_loading: false,
      status_message: None,
      last_error: None,
      error_time: None,
      should_quit: false,
      busy: BulkOps::default(),
      tasks: AsyncTasks::default(),
      refresh_search_queued: false,
      refresh_detail_queued: false,
      search_pending_since: None,
    }
  }

  /// Populate the list (empty term lists the whole corpus) and restore the
  /// persisted selection. Called once unlocked.
  pub fn bootstrap(&mut self) {
    self.trigger_search(true);
    if let Some(key) = self.session.selection.clone() {
      self.trigger_detail(key, false);
    }
  }

  pub fn is_locked(&self) -> bool {
    self.auth.write_token_hash.is_none()
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.session.theme_name = Some(self.theme().name.to_string());
    self.session.save();
  }

  /// Write the session store on the way out (scroll offset included).
  pub fn save_session(&mut self) {
    self.session.list_offset = self.list_state.offset();
    self.session.theme_name = Some(self.theme().name.to_string());
    self.session.save();
  }

  // --- Errors / status ---

  pub fn set_error(&mut self, msg: String) {
    warn!(err = %msg, "surfacing error");
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
    self.status_message = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  pub fn login_in_flight(&self) -> bool {
    self.tasks.login_rx.is_some()
  }

  // --- Authentication ---

  pub fn submit_login(&mut self, token: &str) {
    if self.tasks.login_rx.is_some() {
      return;
    }
    let hash = hash_token(token);
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = remote.check_write_token(&hash).await;
      let _ = tx.send((hash, result));
    });
    self.tasks.login_rx = Some(rx);
  }

  /// Pure part of the unlock transition. Returns true when the credential
  /// was accepted; the caller persists the store and bootstraps.
  pub(crate) fn apply_login_result(&mut self, hash: String, result: Result<bool>) -> bool {
    match result {
      Ok(true) => {
        info!("write token accepted");
        self.auth.write_token_hash = Some(hash.clone());
        self.remote = self.remote.with_token(Some(hash));
        self.modal = Modal::None;
        true
      }
      Ok(false) => {
        self.login_error("Invalid token".to_string());
        false
      }
      Err(e) => {
        self.login_error(format!("{:#}", e));
        false
      }
    }
  }

  fn login_error(&mut self, msg: String) {
    if let Modal::Login { error, .. } = &mut self.modal {
      *error = Some(msg);
    }
  }

  /// Locking is a pure local action: the credential is discarded, the UI
  /// reverts to the login prompt, no server round trip.
  pub fn logout(&mut self) {
    info!("credential discarded, locking UI");
    self.auth.write_token_hash = None;
    self.auth.save();
    self.remote = self.remote.with_token(None);
    self.modal = Modal::Login { input: String::new(), cursor: 0, error: None };
  }

  // --- Search / selection ---

  /// Note a search-box edit. Cached terms render immediately; anything else
  /// waits out the debounce window before hitting the network.
  pub fn queue_search(&mut self) {
    if self.cache.search(&self.session.search).is_some() {
      self.search_pending_since = None;
      self.trigger_search(false);
    } else {
      self.search_pending_since = Some(Instant::now());
    }
  }

  /// Issue the search for the current term. `force` bypasses the cache
  /// (used by refetches after mutations).
  pub fn trigger_search(&mut self, force: bool) {
    let term = self.session.search.clone();
    if force {
      self.cache.invalidate_search(&term);
    }
    if let Some(hits) = self.cache.search(&term) {
      self.search_results = hits.clone();
      self.clamp_list_selection();
      return;
    }
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = remote.search_bhajans(&term).await;
      let _ = tx.send((term, result));
    });
    self.tasks.search_rx = Some(rx);
  }

  fn clamp_list_selection(&mut self) {
    if self.search_results.is_empty() {
      self.list_state.select(None);
    } else {
      let sel = self.list_state.selected().unwrap_or(0);
      self.list_state.select(Some(sel.min(self.search_results.len() - 1)));
    }
  }

  /// The key under the list cursor, if any.
  pub fn hovered_key(&self) -> Option<BhajanKey> {
    let selected = self.list_state.selected()?;
    self.search_results.get(selected).map(|hit| hit.key.clone())
  }

  /// Select a record from the list: the detail view subscribes to its key.
  pub fn select_record(&mut self, key: BhajanKey) {
    self.session.selection = Some(key.clone());
    self.form = None;
    self.current = None;
    self.trigger_detail(key, false);
  }

  pub fn trigger_detail(&mut self, key: BhajanKey, force: bool) {
    self.detail_error = None;
    if force {
      self.cache.remove_record(&key);
    }
    if let Some(record) = self.cache.record(&key) {
      self.current = Some(record.clone());
      self.form = Some(FormState::load_from(record));
      self.detail_loading = false;
      return;
    }
    self.detail_loading = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = remote.get_bhajan(&key).await;
      let _ = tx.send((key, result));
    });
    self.tasks.detail_rx = Some(rx);
  }

  /// Start a new blank record (the synthetic "empty" selection).
  pub fn new_record(&mut self) {
    self.session.selection = None;
    self.current = None;
    self.detail_error = None;
    self.form = Some(FormState::new_blank());
    self.mode = AppMode::Edit;
  }

  /// Discard transient form state: rebuild from the last-fetched record,
  /// or refetch if it is no longer at hand. Staged asset operations drop.
  /// With no form open there is nothing to revert.
  pub fn revert_form(&mut self) {
    if self.form.is_none() {
      return;
    }
    if let Some(current) = self.current.clone() {
      if let Some(form) = self.form.as_mut() {
        form.revert(&current);
      }
    } else if self.session.selection.is_none() {
      self.form = Some(FormState::new_blank());
    } else if let Some(key) = self.session.selection.clone() {
      self.trigger_detail(key, true);
    }
  }

  // --- Mutations ---

  pub fn trigger_save(&mut self) {
    if self.busy.saving {
      return;
    }
    let Some(form) = self.form.as_mut() else { return };
    // Client-side validation: no network call on failure.
    if !form.validate() {
      return;
    }
    let input = form.to_input();
    let new_key = input.new_key();
    info!(title = %new_key.title, author = %new_key.author, renamed = input.old_key.as_ref() != Some(&new_key), "saving record");
    self.busy.saving = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = remote.create_bhajan(&input).await;
      let _ = tx.send((new_key, result));
    });
    self.tasks.save_rx = Some(rx);
  }

  /// Per-row or in-form delete goes through the central confirmation modal.
  pub fn request_delete(&mut self, key: BhajanKey) {
    if !self.busy.deleting {
      self.modal = Modal::ConfirmDelete { key };
    }
  }

  pub fn confirm_delete(&mut self) {
    let Modal::ConfirmDelete { key } = std::mem::take(&mut self.modal) else { return };
    // A confirm while one delete is still in flight must not replace its
    // receiver, or the pending result's refresh plan would be lost.
    if self.busy.deleting {
      return;
    }
    info!(title = %key.title, author = %key.author, "deleting record");
    self.busy.deleting = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = remote.delete_bhajan(&key).await;
      let _ = tx.send((key, result));
    });
    self.tasks.delete_rx = Some(rx);
  }

  pub fn request_delete_all(&mut self) {
    if !self.busy.deleting_all {
      self.modal = Modal::ConfirmDeleteAll;
    }
  }

  pub fn confirm_delete_all(&mut self) {
    self.modal = Modal::None;
    if self.busy.deleting_all {
      return;
    }
    info!("deleting entire corpus");
    self.busy.deleting_all = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(remote.delete_all_bhajans().await);
    });
    self.tasks.delete_all_rx = Some(rx);
  }

  pub fn trigger_import(&mut self, file: PathBuf) {
    if self.busy.importing {
      return;
    }
    info!(file = %file.display(), "importing records");
    self.busy.importing = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(remote.import_bhajans(&file).await);
    });
    self.tasks.import_rx = Some(rx);
  }

  pub fn trigger_export(&mut self) {
    if self.busy.exporting {
      return;
    }
    info!("exporting corpus");
    self.busy.exporting = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(remote.export_bhajans().await);
    });
    self.tasks.export_rx = Some(rx);
  }

  pub fn trigger_reindex(&mut self) {
    if self.busy.reindexing {
      return;
    }
    info!("rebuilding search index");
    self.busy.reindexing = true;
    let remote = self.remote.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(remote.reindex_all().await);
    });
    self.tasks.reindex_rx = Some(rx);
  }

  // --- Consistency protocol (pure transitions) ---

  fn clear_selection(&mut self) {
    self.session.selection = None;
    self.form = None;
    self.current = None;
    self.detail_error = None;
  }

  /// Apply one mutation's declared refresh scope as a unit.
  pub(crate) fn apply_plan(&mut self, plan: RefreshPlan) {
    if plan.drop_cache {
      self.cache.clear();
    }
    if let Some(ref key) = plan.invalidate_record {
      self.cache.remove_record(key);
    }
    if plan.clear_selection {
      self.clear_selection();
    }
    if let Some(ref key) = plan.clear_selection_if
      && self.session.selection.as_ref() == Some(key)
    {
      self.clear_selection();
    }
    if let Some(key) = plan.select {
      self.session.selection = Some(key);
      self.refresh_detail_queued = true;
    }
    if plan.refetch_search {
      self.cache.invalidate_search(&self.session.search);
      self.refresh_search_queued = true;
    }
  }

  /// The detail view follows the record to its new key (rename-safe);
  /// staged asset operations are cleared now that they took effect.
  pub(crate) fn apply_upsert_success(&mut self, new_key: BhajanKey) {
    if let Some(form) = self.form.as_mut() {
      form.clear_staged();
      form.validation = None;
      form.old_key = Some(new_key.clone());
    }
    self.apply_plan(RefreshPlan::upsert(&new_key));
  }

  pub(crate) fn apply_delete_success(&mut self, key: BhajanKey) {
    self.apply_plan(RefreshPlan::delete(&key));
  }

  pub(crate) fn apply_delete_all_success(&mut self) {
    self.search_results.clear();
    self.list_state.select(None);
    self.apply_plan(RefreshPlan::delete_all());
  }

  pub(crate) fn apply_import_success(&mut self, stats: ImportStats) {
    info!(added = stats.number_added, replaced = stats.number_replaced, skipped = stats.number_skipped, "import done");
    self.modal = Modal::ImportStats { stats };
    self.apply_plan(RefreshPlan::import());
  }

  // --- Pending-task polling ---

  pub async fn check_pending(&mut self) -> Result<()> {
    if let Some(mut rx) = self.tasks.search_rx.take() {
      match rx.try_recv() {
        Ok((term, result)) => {
          // A response for a term the user has since typed past is stale.
          if term == self.session.search {
            match result {
              Ok(hits) => {
                self.cache.put_search(term, hits.clone());
                self.search_results = hits;
                self.clamp_list_selection();
              }
              Err(e) => self.set_error(format!("Search failed: {:#}", e)),
            }
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.search_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => self.set_error("Search task failed.".to_string()),
      }
    }

    if let Some(mut rx) = self.tasks.detail_rx.take() {
      match rx.try_recv() {
        Ok((key, result)) => {
          if self.session.selection.as_ref() == Some(&key) {
            self.detail_loading = false;
            match result {
              Ok(Some(record)) => {
                self.cache.put_record(record.clone());
                self.current = Some(record.clone());
                self.form = Some(FormState::load_from(&record));
              }
              Ok(None) => {
                self.form = None;
                self.current = None;
                self.detail_error = Some(format!("No record found for \"{}\" by \"{}\".", key.title, key.author));
              }
              Err(e) => {
                self.form = None;
                self.current = None;
                self.detail_error = Some(format!("{:#}", e));
              }
            }
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.detail_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.detail_loading = false;
          self.set_error("Detail fetch task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.login_rx.take() {
      match rx.try_recv() {
        Ok((hash, result)) => {
          if self.apply_login_result(hash, result) {
            self.auth.save();
            self.bootstrap();
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.login_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => self.login_error("Login task failed.".to_string()),
      }
    }

    if let Some(mut rx) = self.tasks.save_rx.take() {
      match rx.try_recv() {
        Ok((new_key, result)) => {
          self.busy.saving = false;
          match result {
            Ok(true) => self.apply_upsert_success(new_key),
            Ok(false) => self.set_error("Save failed: the server rejected the update.".to_string()),
            Err(e) => self.set_error(format!("Save failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.save_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.saving = false;
          self.set_error("Save task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.delete_rx.take() {
      match rx.try_recv() {
        Ok((key, result)) => {
          self.busy.deleting = false;
          match result {
            Ok(true) => self.apply_delete_success(key),
            Ok(false) => self.set_error("Delete failed: the server rejected the request.".to_string()),
            Err(e) => self.set_error(format!("Delete failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.delete_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.deleting = false;
          self.set_error("Delete task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.delete_all_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.busy.deleting_all = false;
          match result {
            Ok(true) => self.apply_delete_all_success(),
            Ok(false) => self.set_error("Delete-all failed: the server rejected the request.".to_string()),
            Err(e) => self.set_error(format!("Delete-all failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.delete_all_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.deleting_all = false;
          self.set_error("Delete-all task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.import_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.busy.importing = false;
          match result {
            Ok(stats) => self.apply_import_success(stats),
            Err(e) => self.set_error(format!("Import failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.import_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.importing = false;
          self.set_error("Import task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.export_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.busy.exporting = false;
          match result {
            Ok(path) => {
              let url = self.remote.asset_url_for(&path);
              if let Err(e) = open_in_browser(&url) {
                self.set_error(format!("Failed to open export: {}", e));
              }
              self.status_message = Some(format!("Export ready: {}", url));
            }
            Err(e) => self.set_error(format!("Export failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.export_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.exporting = false;
          self.set_error("Export task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.reindex_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.busy.reindexing = false;
          match result {
            Ok(true) => self.status_message = Some("Search index rebuilt.".to_string()),
            Ok(false) => self.set_error("Reindex failed: the server rejected the request.".to_string()),
            Err(e) => self.set_error(format!("Reindex failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => self.tasks.reindex_rx = Some(rx),
        Err(oneshot::error::TryRecvError::Closed) => {
          self.busy.reindexing = false;
          self.set_error("Reindex task failed.".to_string());
        }
      }
    }

    if let Some(t) = self.search_pending_since
      && t.elapsed() >= Duration::from_millis(constants().search_debounce_ms)
    {
      self.search_pending_since = None;
      self.trigger_search(false);
    }

    // Consume the refresh scope queued by applied plans.
    if self.refresh_search_queued {
      self.refresh_search_queued = false;
      self.trigger_search(true);
    }
    if self.refresh_detail_queued {
      self.refresh_detail_queued = false;
      if let Some(key) = self.session.selection.clone() {
        self.trigger_detail(key, true);
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FIELD_SCHEMA;

  fn unlocked_app() -> App {
    App::new(
      Remote::new("http://localhost:4000", "http://localhost:4000"),
      AuthStore { write_token_hash: Some("hash".into()) },
      SessionStore::default(),
    )
  }

  fn key(t: &str) -> BhajanKey {
    BhajanKey::new(t, "Author")
  }

  fn record(t: &str) -> Bhajan {
    Bhajan { title: t.into(), author: "Author".into(), ..Default::default() }
  }

  // --- hash_token ---

  #[test]
  fn hash_token_is_sha256_hex() {
    assert_eq!(hash_token("secret"), "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b");
    assert_eq!(hash_token(""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
  }

  // --- auth gate ---

  #[test]
  fn app_starts_locked_without_a_credential() {
    let app = App::new(
      Remote::new("http://localhost:4000", "http://localhost:4000"),
      AuthStore::default(),
      SessionStore::default(),
    );
    assert!(app.is_locked());
    assert!(matches!(app.modal, Modal::Login { .. }));
  }

  #[test]
  fn wrong_token_keeps_the_ui_locked_with_an_error() {
    let mut app = App::new(
      Remote::new("http://localhost:4000", "http://localhost:4000"),
      AuthStore::default(),
      SessionStore::default(),
    );
    let unlocked = app.apply_login_result("h".into(), Ok(false));
    assert!(!unlocked);
    assert!(app.is_locked());
    match &app.modal {
      Modal::Login { error, .. } => assert_eq!(error.as_deref(), Some("Invalid token")),
      other => panic!("expected login modal, got {:?}", other),
    }
  }

  #[test]
  fn correct_token_unlocks_and_stores_the_hash() {
    let mut app = App::new(
      Remote::new("http://localhost:4000", "http://localhost:4000"),
      AuthStore::default(),
      SessionStore::default(),
    );
    let unlocked = app.apply_login_result("h".into(), Ok(true));
    assert!(unlocked);
    assert!(!app.is_locked());
    assert_eq!(app.auth.write_token_hash.as_deref(), Some("h"));
    assert_eq!(app.modal, Modal::None);
  }

  #[test]
  fn server_error_during_login_shows_code_and_message() {
    let mut app = App::new(
      Remote::new("http://localhost:4000", "http://localhost:4000"),
      AuthStore::default(),
      SessionStore::default(),
    );
    let err = anyhow::anyhow!(crate::gateway::RemoteErrors(vec![crate::gateway::GqlError {
      code: "UNAUTHENTICATED".into(),
      message: "bad hash".into(),
    }]));
    app.apply_login_result("h".into(), Err(err));
    match &app.modal {
      Modal::Login { error, .. } => assert_eq!(error.as_deref(), Some("UNAUTHENTICATED: bad hash")),
      other => panic!("expected login modal, got {:?}", other),
    }
  }

  // --- consistency protocol ---

  #[test]
  fn deleting_the_open_record_clears_the_selection() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Open"));
    app.form = Some(FormState::load_from(&record("Open")));
    app.current = Some(record("Open"));

    app.apply_delete_success(key("Open"));
    assert_eq!(app.session.selection, None);
    assert!(app.form.is_none());
    assert!(app.refresh_search_queued);
  }

  #[test]
  fn deleting_another_record_keeps_the_selection() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Open"));
    app.form = Some(FormState::load_from(&record("Open")));

    app.apply_delete_success(key("Other"));
    assert_eq!(app.session.selection, Some(key("Open")));
    assert!(app.form.is_some());
    assert!(app.refresh_search_queued);
  }

  #[test]
  fn rename_switches_the_detail_subscription_to_the_new_key() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Old"));
    app.cache.put_record(record("New"));
    let mut form = FormState::load_from(&record("Old"));
    form.delete_audio = true;
    app.form = Some(form);

    app.apply_upsert_success(key("New"));
    assert_eq!(app.session.selection, Some(key("New")));
    assert!(app.refresh_detail_queued, "detail must refetch under the new key");
    assert!(app.refresh_search_queued);
    // A cached entry under the new key would mask the update.
    assert!(app.cache.record(&key("New")).is_none());
    // Staged asset operations took effect on the server; flags reset.
    assert!(!app.form.as_ref().unwrap().delete_audio);
  }

  #[tokio::test]
  async fn pending_delete_result_survives_a_second_confirm() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Open"));
    app.form = Some(FormState::load_from(&record("Open")));

    // First delete already resolved on the server, result not yet drained.
    let (tx, rx) = oneshot::channel();
    tx.send((key("Open"), Ok(true))).unwrap();
    app.tasks.delete_rx = Some(rx);
    app.busy.deleting = true;

    // A second delete attempt while one is in flight is refused outright.
    app.request_delete(key("Other"));
    assert_eq!(app.modal, Modal::None);
    app.modal = Modal::ConfirmDelete { key: key("Other") };
    app.confirm_delete();
    assert!(app.tasks.delete_rx.is_some(), "the pending receiver must not be replaced");

    app.check_pending().await.unwrap();
    assert_eq!(app.session.selection, None, "the first delete's plan must still apply");
    assert!(app.form.is_none());
    assert!(!app.busy.deleting);
  }

  #[test]
  fn revert_with_no_open_form_keeps_the_placeholder() {
    let mut app = unlocked_app();
    app.revert_form();
    assert!(app.form.is_none());
  }

  #[test]
  fn upsert_over_the_same_key_still_invalidates_it() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Same"));
    app.cache.put_record(record("Same"));
    app.form = Some(FormState::load_from(&record("Same")));

    app.apply_upsert_success(key("Same"));
    assert!(app.cache.record(&key("Same")).is_none());
    assert_eq!(app.session.selection, Some(key("Same")));
  }

  #[test]
  fn delete_all_clears_selection_results_and_cache() {
    let mut app = unlocked_app();
    app.session.selection = Some(key("Open"));
    app.form = Some(FormState::load_from(&record("Open")));
    app.cache.put_record(record("Open"));
    app.cache.put_search("term".into(), Vec::new());
    app.search_results =
      vec![SearchHit { key: key("Open"), highlight_title: "Open".into(), highlight_author: "Author".into() }];

    app.apply_delete_all_success();
    assert_eq!(app.session.selection, None);
    assert!(app.search_results.is_empty());
    assert!(app.cache.is_empty());
    assert!(app.refresh_search_queued);
  }

  #[test]
  fn import_shows_exact_counts_and_drops_the_cache() {
    let mut app = unlocked_app();
    app.cache.put_record(record("Old"));
    let stats = ImportStats { number_added: 2, number_replaced: 1, number_skipped: 0 };

    app.apply_import_success(stats);
    assert_eq!(app.modal, Modal::ImportStats { stats });
    assert!(app.cache.is_empty());
    assert!(app.refresh_search_queued);
  }

  // --- search debounce ---

  #[test]
  fn cached_search_terms_render_without_waiting() {
    let mut app = unlocked_app();
    app.session.search = "go".into();
    let hits = vec![SearchHit { key: key("Open"), highlight_title: "go".into(), highlight_author: "A".into() }];
    app.cache.put_search("go".into(), hits.clone());

    app.queue_search();
    assert_eq!(app.search_results, hits);
    assert!(app.search_pending_since.is_none());
  }

  #[test]
  fn uncached_search_terms_wait_out_the_debounce() {
    let mut app = unlocked_app();
    app.session.search = "go".into();

    app.queue_search();
    assert!(app.search_pending_since.is_some());
    assert!(app.tasks.search_rx.is_none(), "no request before the debounce expires");
  }

  // --- validation ---

  #[test]
  fn saving_an_empty_title_makes_no_network_call() {
    let mut app = unlocked_app();
    let mut form = FormState::new_blank();
    form.fields[0].value = "   ".into();
    app.form = Some(form);

    // No runtime is running: if trigger_save spawned a task this would panic.
    app.trigger_save();
    assert!(app.tasks.save_rx.is_none());
    assert!(!app.busy.saving);
    assert!(app.form.as_ref().unwrap().validation.is_some());
  }

  #[test]
  fn failed_save_leaves_the_form_untouched() {
    let mut app = unlocked_app();
    let mut form = FormState::load_from(&record("Open"));
    let text_idx = FIELD_SCHEMA.iter().position(|s| s.name == "text").unwrap();
    form.fields[text_idx].value = "unsaved edit".into();
    app.form = Some(form);
    app.busy.saving = true;

    // Simulate the failure arm of the save receiver.
    app.busy.saving = false;
    app.set_error("Save failed: network".to_string());
    assert_eq!(app.form.as_ref().unwrap().value("text"), "unsaved edit");
    assert!(app.last_error.is_some());
  }
}
