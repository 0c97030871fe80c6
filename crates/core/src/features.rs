//! Experimental feature list parsing.
//!
//! The compiler lists its experimental features in `--help` output:
//!
//! ```text
//!   --enable arg                      enable experimental features (specify
//!                                     'all' for enabling all available features):
//!                                     manifold | lazy-union | roof | ...
//!                                     -
//! ```

use std::sync::LazyLock;

use regex::Regex;

static ENABLE_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--enable\s+arg\s+enable? experimental features[^:]*:(.*?) -")
        .expect("valid regex")
});
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s|]+").expect("valid regex"));

/// Extract the experimental feature names from compiler help text.
///
/// Returns an empty list when the section is missing.
pub fn parse_experimental_features(help: &str) -> Vec<String> {
    let flattened = help.replace('\n', " ");
    let Some(caps) = ENABLE_SECTION_RE.captures(&flattened) else {
        return Vec::new();
    };
    SEPARATOR_RE
        .split(caps.get(1).map_or("", |m| m.as_str()))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
