//! Client-side result cache and the per-mutation refresh policy.
//!
//! Every mutation declares up front which queries it refreshes and whether
//! it requires a full cache drop, instead of relying on implicit
//! invalidation. Single-record operations get targeted refreshes; corpus-
//! wide operations (import, delete-all) drop the whole cache because their
//! blast radius is unknown in advance.

use std::collections::HashMap;

use crate::model::{Bhajan, BhajanKey, SearchHit};

// --- Cache ---

/// Normalized cache of gateway results: full records by key and search
/// listings by term. Mutated only from the main thread.
#[derive(Debug, Default)]
pub struct ResultCache {
  records: HashMap<BhajanKey, Bhajan>,
  searches: HashMap<String, Vec<SearchHit>>,
}

impl ResultCache {
  pub fn record(&self, key: &BhajanKey) -> Option<&Bhajan> {
    self.records.get(key)
  }

  pub fn put_record(&mut self, record: Bhajan) {
    self.records.insert(record.key(), record);
  }

  pub fn remove_record(&mut self, key: &BhajanKey) {
    self.records.remove(key);
  }

  pub fn search(&self, term: &str) -> Option<&Vec<SearchHit>> {
    self.searches.get(term)
  }

  pub fn put_search(&mut self, term: String, hits: Vec<SearchHit>) {
    self.searches.insert(term, hits);
  }

  pub fn invalidate_search(&mut self, term: &str) {
    self.searches.remove(term);
  }

  pub fn clear(&mut self) {
    self.records.clear();
    self.searches.clear();
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty() && self.searches.is_empty()
  }
}

// --- Refresh policy ---

/// The refresh scope a successful mutation declares. Applied as one unit so
/// the list and the detail view can never disagree about the corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshPlan {
  /// Invalidate and refetch the search listing for the active term.
  pub refetch_search: bool,
  /// Drop the cached record under this key so the next read is fresh.
  pub invalidate_record: Option<BhajanKey>,
  /// Clear the selection iff it equals this key (the open record was deleted).
  pub clear_selection_if: Option<BhajanKey>,
  /// Clear the selection unconditionally (the whole corpus is gone).
  pub clear_selection: bool,
  /// Switch the detail subscription to this key and refetch it.
  pub select: Option<BhajanKey>,
  /// Drop the entire cache — the corpus identity space was invalidated.
  pub drop_cache: bool,
}

impl RefreshPlan {
  /// Create/update by old-key → new-key. The detail view follows the
  /// record to its new key; the new key's cache entry is dropped because
  /// it may coincide with the old key and mask the update.
  pub fn upsert(new_key: &BhajanKey) -> Self {
    Self {
      refetch_search: true,
      invalidate_record: Some(new_key.clone()),
      select: Some(new_key.clone()),
      ..Self::default()
    }
  }

  /// Delete by key. Closes the detail view only if that record was open.
  pub fn delete(key: &BhajanKey) -> Self {
    Self {
      refetch_search: true,
      invalidate_record: Some(key.clone()),
      clear_selection_if: Some(key.clone()),
      ..Self::default()
    }
  }

  /// Delete-all: every key is gone, so nothing cached can be trusted.
  pub fn delete_all() -> Self {
    Self { refetch_search: true, clear_selection: true, drop_cache: true, ..Self::default() }
  }

  /// Bulk import: an unbounded, unknown set of keys may have changed.
  pub fn import() -> Self {
    Self { refetch_search: true, drop_cache: true, ..Self::default() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(t: &str) -> BhajanKey {
    BhajanKey::new(t, "Author")
  }

  // --- ResultCache ---

  #[test]
  fn record_roundtrip_and_removal() {
    let mut cache = ResultCache::default();
    let record = Bhajan { title: "T".into(), author: "Author".into(), ..Default::default() };
    cache.put_record(record.clone());
    assert_eq!(cache.record(&key("T")), Some(&record));
    cache.remove_record(&key("T"));
    assert_eq!(cache.record(&key("T")), None);
  }

  #[test]
  fn search_listing_roundtrip() {
    let mut cache = ResultCache::default();
    let hits = vec![SearchHit { key: key("T"), highlight_title: "T".into(), highlight_author: "Author".into() }];
    cache.put_search("te".into(), hits.clone());
    assert_eq!(cache.search("te"), Some(&hits));
    cache.invalidate_search("te");
    assert_eq!(cache.search("te"), None);
  }

  #[test]
  fn clear_drops_everything() {
    let mut cache = ResultCache::default();
    cache.put_record(Bhajan { title: "T".into(), author: "A".into(), ..Default::default() });
    cache.put_search("".into(), Vec::new());
    cache.clear();
    assert!(cache.is_empty());
  }

  // --- RefreshPlan ---

  #[test]
  fn upsert_plan_targets_the_new_key() {
    let plan = RefreshPlan::upsert(&key("New"));
    assert!(plan.refetch_search);
    assert_eq!(plan.invalidate_record, Some(key("New")));
    assert_eq!(plan.select, Some(key("New")));
    assert!(!plan.drop_cache);
    assert!(!plan.clear_selection);
  }

  #[test]
  fn delete_plan_closes_only_the_deleted_record() {
    let plan = RefreshPlan::delete(&key("Gone"));
    assert_eq!(plan.clear_selection_if, Some(key("Gone")));
    assert_eq!(plan.select, None);
    assert!(plan.refetch_search);
    assert!(!plan.drop_cache);
  }

  #[test]
  fn corpus_wide_plans_drop_the_cache() {
    assert!(RefreshPlan::delete_all().drop_cache);
    assert!(RefreshPlan::delete_all().clear_selection);
    assert!(RefreshPlan::import().drop_cache);
    assert!(!RefreshPlan::import().clear_selection);
  }
}
