use crate::constants::constants;

/// Resolved remote endpoints: the GraphQL API and the asset-serving base.
#[derive(Debug, Clone)]
pub struct Endpoints {
  pub api_url: String,
  pub asset_url: String,
}

impl Endpoints {
  /// Resolve endpoints from (in priority order) CLI flags, environment
  /// variables, and the embedded defaults.
  pub fn resolve(cli_api: Option<String>, cli_asset: Option<String>) -> Self {
    Self {
      api_url: pick(cli_api, std::env::var("BB_API_URL").ok(), &constants().default_api_url),
      asset_url: pick(cli_asset, std::env::var("BB_ASSET_URL").ok(), &constants().default_asset_url),
    }
  }
}

fn pick(cli: Option<String>, env: Option<String>, default: &str) -> String {
  let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
  non_empty(cli).or_else(|| non_empty(env)).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pick_prefers_cli_over_env() {
    assert_eq!(pick(Some("a".into()), Some("b".into()), "c"), "a");
  }

  #[test]
  fn pick_falls_back_to_env() {
    assert_eq!(pick(None, Some("b".into()), "c"), "b");
  }

  #[test]
  fn pick_falls_back_to_default() {
    assert_eq!(pick(None, None, "c"), "c");
  }

  #[test]
  fn pick_ignores_empty_values() {
    assert_eq!(pick(Some("  ".into()), Some("".into()), "c"), "c");
    assert_eq!(pick(Some("".into()), Some("b".into()), "c"), "b");
  }
}
