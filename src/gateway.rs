//! Remote data gateway: GraphQL queries and mutations over HTTP.
//!
//! Plain operations are POSTed as `{query, variables}` JSON; operations
//! carrying file uploads use the GraphQL multipart request protocol
//! (`operations` + `map` + numbered file parts). Once authenticated, every
//! request carries the credential hash in a custom header.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::constants::constants;
use crate::model::{Bhajan, BhajanKey, FIELD_SCHEMA, ImportStats, SearchHit, UpsertInput};

// --- Errors ---

/// One structured GraphQL error from the server's `errors[]` array.
#[derive(Debug, Clone)]
pub struct GqlError {
  pub code: String,
  pub message: String,
}

/// All GraphQL errors of one response, rendered as `CODE: message` lines.
#[derive(Debug, Clone)]
pub struct RemoteErrors(pub Vec<GqlError>);

impl fmt::Display for RemoteErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let lines: Vec<String> = self.0.iter().map(|e| format!("{}: {}", e.code, e.message)).collect();
    write!(f, "{}", lines.join("\n"))
  }
}

impl std::error::Error for RemoteErrors {}

// --- Operations ---

const CHECK_TOKEN: &str = "query CheckWriteToken($writeTokenHash: String!) {
  checkWriteToken(writeTokenHash: $writeTokenHash)
}";

const SEARCH_BHAJANS: &str = "query SearchBhajans($searchTerm: String!) {
  searchBhajans(searchTerm: $searchTerm) {
    highlight { title author }
    bhajan { title author }
  }
}";

const CREATE_BHAJAN: &str = "mutation CreateBhajan(
  $title: String!, $author: String!, $text: String, $translation: String,
  $chords: String, $lessons: String, $options: String,
  $oldTitle: String, $oldAuthor: String,
  $deleteAudio: Boolean, $deleteReview: Boolean,
  $audioFile: Upload, $reviewFile: Upload
) {
  createBhajan(
    title: $title, author: $author, text: $text, translation: $translation,
    chords: $chords, lessons: $lessons, options: $options,
    oldTitle: $oldTitle, oldAuthor: $oldAuthor,
    deleteAudio: $deleteAudio, deleteReview: $deleteReview,
    audioFile: $audioFile, reviewFile: $reviewFile
  )
}";

const DELETE_BHAJAN: &str = "mutation DeleteBhajan($title: String!, $author: String!) {
  deleteBhajan(title: $title, author: $author)
}";

const DELETE_ALL_BHAJANS: &str = "mutation DeleteAllBhajans { deleteAllBhajans }";

const REINDEX_ALL: &str = "mutation ReindexAll { reindexAll }";

const EXPORT_BHAJANS: &str = "mutation ExportBhajans { exportBhajans }";

const IMPORT_BHAJANS: &str = "mutation ImportBhajans($file: Upload!) {
  importBhajans(file: $file) { numberAdded numberReplaced numberSkipped }
}";

/// Build the single-record query from the static field schema, so the form
/// and the selection set can never drift apart.
fn get_bhajan_query() -> String {
  let fields: Vec<&str> = FIELD_SCHEMA.iter().map(|f| f.name).collect();
  format!(
    "query GetBhajan($title: String!, $author: String!) {{\n  getBhajan(title: $title, author: $author) {{ {} }}\n}}",
    fields.join(" ")
  )
}

// --- Response parsing ---

fn parse_errors(payload: &Value) -> Option<RemoteErrors> {
  let errors = payload.get("errors")?.as_array()?;
  if errors.is_empty() {
    return None;
  }
  let parsed = errors
    .iter()
    .map(|e| GqlError {
      code: e.pointer("/extensions/code").and_then(Value::as_str).unwrap_or("ERROR").to_string(),
      message: e.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
    })
    .collect();
  Some(RemoteErrors(parsed))
}

/// Split a GraphQL response into data or a structured error.
fn extract_data(payload: Value) -> Result<Value> {
  if let Some(errors) = parse_errors(&payload) {
    return Err(anyhow!(errors));
  }
  payload.into_object_field("data").ok_or_else(|| anyhow!("GraphQL response missing both data and errors"))
}

trait IntoObjectField {
  fn into_object_field(self, name: &str) -> Option<Value>;
}

impl IntoObjectField for Value {
  fn into_object_field(self, name: &str) -> Option<Value> {
    match self {
      Value::Object(mut map) => map.remove(name),
      _ => None,
    }
  }
}

/// The listing and its rows are both nullable on the wire: a null listing
/// is an empty corpus, null rows are skipped.
fn parse_search_hits(raw: Value) -> Result<Vec<SearchHit>> {
  #[derive(Deserialize)]
  struct WireKey {
    title: String,
    author: String,
  }
  #[derive(Deserialize)]
  struct WireHit {
    highlight: WireKey,
    bhajan: WireKey,
  }

  if raw.is_null() {
    return Ok(Vec::new());
  }
  let hits: Vec<Option<WireHit>> = serde_json::from_value(raw).context("Malformed searchBhajans payload")?;
  Ok(
    hits
      .into_iter()
      .flatten()
      .map(|hit| SearchHit {
        key: BhajanKey::new(hit.bhajan.title, hit.bhajan.author),
        highlight_title: hit.highlight.title,
        highlight_author: hit.highlight.author,
      })
      .collect(),
  )
}

// --- Remote ---

/// Cheap-to-clone handle on the remote API: HTTP client, endpoints, and the
/// credential hash attached to every request once authenticated.
#[derive(Clone)]
pub struct Remote {
  client: Client,
  api_url: String,
  asset_url: String,
  token_hash: Option<String>,
}

impl Remote {
  pub fn new(api_url: impl Into<String>, asset_url: impl Into<String>) -> Self {
    Self { client: Client::new(), api_url: api_url.into(), asset_url: asset_url.into(), token_hash: None }
  }

  /// The same remote with a different credential (or none, on logout).
  pub fn with_token(&self, token_hash: Option<String>) -> Self {
    Self { token_hash, ..self.clone() }
  }

  /// Resolve a server-side artifact path against the asset base URL.
  pub fn asset_url_for(&self, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
      return path.to_string();
    }
    format!("{}/{}", self.asset_url.trim_end_matches('/'), path.trim_start_matches('/'))
  }

  fn request(&self) -> reqwest::RequestBuilder {
    let mut builder = self.client.post(&self.api_url);
    if let Some(ref hash) = self.token_hash {
      builder = builder.header(constants().credential_header.as_str(), hash.as_str());
    }
    builder
  }

  async fn post_graphql(&self, query: &str, variables: Value) -> Result<Value> {
    let body = json!({ "query": query, "variables": variables });
    let response = self.request().json(&body).send().await.context("GraphQL request failed")?;
    let status = response.status();
    let payload: Value =
      response.json().await.with_context(|| format!("Invalid GraphQL response body (HTTP {})", status))?;
    extract_data(payload)
  }

  /// POST a mutation with file uploads per the GraphQL multipart request
  /// protocol: an `operations` part, a `map` part, then numbered file parts.
  async fn post_graphql_multipart(&self, query: &str, variables: Value, files: &[(&str, &Path)]) -> Result<Value> {
    let operations = json!({ "query": query, "variables": variables }).to_string();
    let mut map = serde_json::Map::new();
    for (i, (variable, _)) in files.iter().enumerate() {
      map.insert(i.to_string(), json!([format!("variables.{}", variable)]));
    }

    let mut form = reqwest::multipart::Form::new()
      .text("operations", operations)
      .text("map", Value::Object(map).to_string());
    for (i, (_, path)) in files.iter().enumerate() {
      let bytes =
        tokio::fs::read(path).await.with_context(|| format!("Failed to read upload file {}", path.display()))?;
      let file_name =
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "upload".to_string());
      form = form.part(i.to_string(), reqwest::multipart::Part::bytes(bytes).file_name(file_name));
    }

    let response = self.request().multipart(form).send().await.context("GraphQL upload request failed")?;
    let status = response.status();
    let payload: Value =
      response.json().await.with_context(|| format!("Invalid GraphQL response body (HTTP {})", status))?;
    extract_data(payload)
  }

  // --- Queries ---

  pub async fn check_write_token(&self, token_hash: &str) -> Result<bool> {
    let data = self.post_graphql(CHECK_TOKEN, json!({ "writeTokenHash": token_hash })).await?;
    Ok(data.get("checkWriteToken").and_then(Value::as_bool).unwrap_or(false))
  }

  pub async fn get_bhajan(&self, key: &BhajanKey) -> Result<Option<Bhajan>> {
    let data =
      self.post_graphql(&get_bhajan_query(), json!({ "title": key.title, "author": key.author })).await?;
    match data.into_object_field("getBhajan") {
      Some(Value::Null) | None => Ok(None),
      Some(value) => Ok(Some(serde_json::from_value(value).context("Malformed getBhajan payload")?)),
    }
  }

  /// Search the corpus. An empty term returns the full listing.
  pub async fn search_bhajans(&self, term: &str) -> Result<Vec<SearchHit>> {
    let data = self.post_graphql(SEARCH_BHAJANS, json!({ "searchTerm": term })).await?;
    let raw = data.into_object_field("searchBhajans").unwrap_or(Value::Null);
    let hits = parse_search_hits(raw)?;
    debug!(term = %term, count = hits.len(), "search results received");
    Ok(hits)
  }

  // --- Mutations ---

  /// Upsert one record, optionally renaming it (old key) and uploading or
  /// deleting its binary assets in the same round trip.
  pub async fn create_bhajan(&self, input: &UpsertInput) -> Result<bool> {
    let key = input.new_key();
    let mut variables = json!({
      "title": key.title,
      "author": key.author,
      "text": input.text,
      "translation": input.translation,
      "chords": input.chords,
      "lessons": input.lessons,
      "options": input.options,
      "deleteAudio": input.delete_audio,
      "deleteReview": input.delete_review,
      "audioFile": Value::Null,
      "reviewFile": Value::Null,
    });
    if let Some(ref old) = input.old_key {
      variables["oldTitle"] = json!(old.title);
      variables["oldAuthor"] = json!(old.author);
    }

    let mut files: Vec<(&str, &Path)> = Vec::new();
    if let Some(ref path) = input.audio_file {
      files.push(("audioFile", path));
    }
    if let Some(ref path) = input.review_file {
      files.push(("reviewFile", path));
    }

    let data = if files.is_empty() {
      self.post_graphql(CREATE_BHAJAN, variables).await?
    } else {
      self.post_graphql_multipart(CREATE_BHAJAN, variables, &files).await?
    };
    Ok(data.get("createBhajan").and_then(Value::as_bool).unwrap_or(false))
  }

  pub async fn delete_bhajan(&self, key: &BhajanKey) -> Result<bool> {
    let data = self.post_graphql(DELETE_BHAJAN, json!({ "title": key.title, "author": key.author })).await?;
    Ok(data.get("deleteBhajan").and_then(Value::as_bool).unwrap_or(false))
  }

  pub async fn delete_all_bhajans(&self) -> Result<bool> {
    let data = self.post_graphql(DELETE_ALL_BHAJANS, json!({})).await?;
    Ok(data.get("deleteAllBhajans").and_then(Value::as_bool).unwrap_or(false))
  }

  pub async fn reindex_all(&self) -> Result<bool> {
    let data = self.post_graphql(REINDEX_ALL, json!({})).await?;
    Ok(data.get("reindexAll").and_then(Value::as_bool).unwrap_or(false))
  }

  /// Generate a downloadable artifact server-side; returns its path.
  pub async fn export_bhajans(&self) -> Result<String> {
    let data = self.post_graphql(EXPORT_BHAJANS, json!({})).await?;
    data
      .get("exportBhajans")
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| anyhow!("Export produced no artifact path"))
  }

  /// Bulk upsert from an external file; returns added/replaced/skipped counts.
  pub async fn import_bhajans(&self, file: &Path) -> Result<ImportStats> {
    let data = self
      .post_graphql_multipart(IMPORT_BHAJANS, json!({ "file": Value::Null }), &[("file", file)])
      .await?;
    let raw = data.into_object_field("importBhajans").ok_or_else(|| anyhow!("Import returned no stats"))?;
    serde_json::from_value(raw).context("Malformed importBhajans payload")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_bhajan_query_carries_every_schema_field() {
    let query = get_bhajan_query();
    for spec in FIELD_SCHEMA {
      assert!(query.contains(spec.name), "query missing field {}", spec.name);
    }
    assert!(query.contains("getBhajan(title: $title, author: $author)"));
  }

  #[test]
  fn graphql_errors_render_as_code_message_lines() {
    let payload = json!({
      "errors": [
        { "message": "token mismatch", "extensions": { "code": "UNAUTHENTICATED" } },
        { "message": "try again" }
      ]
    });
    let err = extract_data(payload).unwrap_err();
    assert_eq!(err.to_string(), "UNAUTHENTICATED: token mismatch\nERROR: try again");
  }

  #[test]
  fn extract_data_returns_the_data_object() {
    let payload = json!({ "data": { "reindexAll": true } });
    let data = extract_data(payload).unwrap();
    assert_eq!(data.get("reindexAll"), Some(&Value::Bool(true)));
  }

  #[test]
  fn extract_data_rejects_empty_responses() {
    assert!(extract_data(json!({})).is_err());
  }

  #[test]
  fn null_search_listing_is_an_empty_corpus() {
    assert_eq!(parse_search_hits(Value::Null).unwrap(), Vec::new());
  }

  #[test]
  fn null_search_rows_are_skipped() {
    let raw = json!([
      { "highlight": { "title": "<em>Go</em>pala", "author": "Mira" },
        "bhajan": { "title": "Gopala", "author": "Mira" } },
      null
    ]);
    let hits = parse_search_hits(raw).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, BhajanKey::new("Gopala", "Mira"));
    assert_eq!(hits[0].highlight_title, "<em>Go</em>pala");
  }

  #[test]
  fn asset_url_joins_without_doubled_slashes() {
    let remote = Remote::new("https://api.example/api", "https://assets.example/");
    assert_eq!(remote.asset_url_for("/exports/all.zip"), "https://assets.example/exports/all.zip");
    assert_eq!(remote.asset_url_for("exports/all.zip"), "https://assets.example/exports/all.zip");
  }

  #[test]
  fn asset_url_passes_absolute_urls_through() {
    let remote = Remote::new("https://api.example/api", "https://assets.example");
    assert_eq!(remote.asset_url_for("https://cdn.example/x.zip"), "https://cdn.example/x.zip");
  }
}
