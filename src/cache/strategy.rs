//! Static request classification.

use std::fmt;

/// How a GET request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Strategy::CacheFirst => "cache-first",
      Strategy::NetworkFirst => "network-first",
      Strategy::StaleWhileRevalidate => "stale-while-revalidate",
    })
  }
}

/// Pick a strategy from the request path alone. First match wins:
///
/// 1. pre-listed static asset → cache-first
/// 2. `.css` / `.js` → stale-while-revalidate
/// 3. anything under an `/images/` segment → cache-first
/// 4. everything else → network-first
pub fn classify(path: &str, static_assets: &[String]) -> Strategy {
  if is_static_asset(path, static_assets) {
    Strategy::CacheFirst
  } else if path.ends_with(".css") || path.ends_with(".js") {
    Strategy::StaleWhileRevalidate
  } else if path.contains("/images/") {
    Strategy::CacheFirst
  } else {
    Strategy::NetworkFirst
  }
}

fn is_static_asset(path: &str, static_assets: &[String]) -> bool {
  static_assets.iter().any(|asset| {
    if asset == "/" {
      // A bare "/" suffix would match every directory-style path
      path == "/"
    } else {
      path.ends_with(asset.as_str())
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assets() -> Vec<String> {
    ["/", "/index.html", "/new-style.css", "/manifest.json"]
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  #[test]
  fn test_classification() {
    let assets = assets();
    let cases = [
      ("/", Strategy::CacheFirst),
      ("/index.html", Strategy::CacheFirst),
      ("/new-style.css", Strategy::CacheFirst),
      ("/manifest.json", Strategy::CacheFirst),
      ("/js/app.js", Strategy::StaleWhileRevalidate),
      ("/css/extra.css", Strategy::StaleWhileRevalidate),
      ("/images/icon-192x192.png", Strategy::CacheFirst),
      ("/assets/images/logo.svg", Strategy::CacheFirst),
      ("/api/stats", Strategy::NetworkFirst),
      ("/gallery/", Strategy::NetworkFirst),
      ("/imagesque.png", Strategy::NetworkFirst),
    ];

    for (path, expected) in cases {
      assert_eq!(classify(path, &assets), expected, "{}", path);
    }
  }

  #[test]
  fn test_static_list_wins_over_suffix_rules() {
    let assets = vec!["/images/hero.js".to_string()];
    assert_eq!(classify("/images/hero.js", &assets), Strategy::CacheFirst);
    assert_eq!(
      classify("/images/other.js", &assets),
      Strategy::StaleWhileRevalidate
    );
  }
}
