//! Shareable session state.
//!
//! A [`SessionState`] is the reproducible subset of what the user is looking
//! at: the source, enabled experimental features, model parameters, and view
//! flags. It round-trips through a URL-fragment-safe token ([`encode`] /
//! [`decode`]) and is compared in [`normalize`]d form to decide whether a
//! change is worth a new compiler run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::args::DEFAULT_INPUT_PATH;
use crate::error::CoreError;

/// Experimental features enabled in a fresh session.
pub const DEFAULT_FEATURES: &[&str] = &[
    "fast-csg",
    "fast-csg-trust-corefinement",
    "fast-csg-remesh",
    "fast-csg-exact-callbacks",
    "lazy-union",
];

/// Characters left unescaped in a token; the same set `encodeURIComponent`
/// leaves alone, so tokens can be pasted into a location fragment.
const TOKEN_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

/// Identity of the model source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub content: String,
}

/// Viewer camera, persisted only when the viewer opts in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: [f64; 3],
    pub target: [f64; 3],
    pub up: [f64; 3],
}

/// The reproducible subset of UI state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub source: SourceRef,
    #[serde(default)]
    pub features: Vec<String>,
    /// Model parameters passed to the compiler as `-D name=value`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorotate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_focused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraPose>,
}

impl SessionState {
    /// Default session for the given model source.
    pub fn default_with_source(content: impl Into<String>) -> Self {
        Self {
            source: SourceRef {
                name: DEFAULT_INPUT_PATH.to_string(),
                content: content.into(),
            },
            features: DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect(),
            parameters: BTreeMap::new(),
            autorotate: Some(true),
            viewer_focused: Some(false),
            camera: None,
        }
    }

    /// Source file name, falling back to the default input path.
    pub fn source_name(&self) -> &str {
        if self.source.name.is_empty() {
            DEFAULT_INPUT_PATH
        } else {
            &self.source.name
        }
    }

    /// Enable or disable an experimental feature, keeping insertion order.
    pub fn set_feature(&mut self, feature: &str, enabled: bool) {
        let present = self.features.iter().any(|f| f == feature);
        if enabled && !present {
            self.features.push(feature.to_string());
        } else if !enabled {
            self.features.retain(|f| f != feature);
        }
    }
}

// ---------------------------------------------------------------------------
// Token codec
// ---------------------------------------------------------------------------

/// Encode a state as a URL-fragment-safe token (percent-encoded JSON).
pub fn encode(state: &SessionState) -> Result<String, CoreError> {
    let json = serde_json::to_string(state).map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(utf8_percent_encode(&json, TOKEN_SAFE).to_string())
}

/// Decode a token, reporting why it is malformed.
pub fn try_decode(token: &str) -> Result<SessionState, CoreError> {
    let json = percent_decode_str(token)
        .decode_utf8()
        .map_err(|e| CoreError::MalformedToken(e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| CoreError::MalformedToken(e.to_string()))
}

/// Decode a token; malformed tokens are logged and yield `None`, which
/// callers treat as "use defaults".
pub fn decode(token: &str) -> Option<SessionState> {
    match try_decode(token) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode session token");
            None
        }
    }
}

/// Decode the state carried in a location fragment (`#<token>`).
///
/// An empty fragment is not an error and yields `None` silently.
pub fn read_fragment(fragment: &str) -> Option<SessionState> {
    let token = fragment.strip_prefix('#').unwrap_or(fragment);
    if token.is_empty() {
        return None;
    }
    decode(token)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

static COMMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("valid regex"));
static SPACE_AFTER_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,.({])\s+").expect("valid regex"));
static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.({])").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip comments and formatting-only whitespace from model source.
pub fn normalize_source(source: &str) -> String {
    let without_comments = COMMENTS_RE.replace_all(source, "");
    let tightened = SPACE_AFTER_PUNCT_RE.replace_all(&without_comments, "$1");
    let tightened = SPACE_BEFORE_PUNCT_RE.replace_all(&tightened, "$1");
    WHITESPACE_RE.replace_all(&tightened, " ").trim().to_string()
}

/// A [`SessionState`] with formatting noise removed, compared structurally.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedState(SessionState);

impl NormalizedState {
    pub fn as_state(&self) -> &SessionState {
        &self.0
    }
}

/// Normalize a state for change detection.
///
/// Source content is passed through [`normalize_source`] and the feature
/// list becomes a sorted, de-duplicated set.
pub fn normalize(state: &SessionState) -> NormalizedState {
    let features: BTreeSet<&str> = state.features.iter().map(String::as_str).collect();
    NormalizedState(SessionState {
        source: SourceRef {
            name: state.source.name.clone(),
            content: normalize_source(&state.source.content),
        },
        features: features.into_iter().map(str::to_string).collect(),
        ..state.clone()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
