pub mod chrome;
#[cfg(test)]
pub(crate) mod fake;

use crate::timeouts::ms;
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use chrome::ChromeRenderer;

/// Where a selector's value comes from once the element is found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Source {
    #[default]
    Text,
    Attr(String),
    Html,
}

impl Serialize for Source {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            other => match other.strip_prefix("attr:") {
                Some(name) if !name.is_empty() => Ok(Self::Attr(name.to_string())),
                _ => Err(format!(
                    "invalid source '{}': expected text, html or attr:<name>",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Html => write!(f, "html"),
            Self::Attr(name) => write!(f, "attr:{}", name),
        }
    }
}

/// A CSS selector scoped to a listing element. An empty `css` addresses the
/// listing element itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub source: Source,
}

impl Selector {
    pub fn text(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            source: Source::Text,
        }
    }

    pub fn attr(css: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            source: Source::Attr(name.into()),
        }
    }
}

/// Page conditions the engine waits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// At least one element matches.
    Present { selector: String },
    /// The first match is rendered and not hidden.
    Visible { selector: String },
    /// No match, or the first match is hidden.
    Hidden { selector: String },
    /// An element matches and its text contains `text`.
    TextContains { selector: String, text: String },
    /// The first match is disabled (attribute, aria or class).
    Disabled { selector: String },
    /// The document URL differs from `from`.
    UrlChanged { from: String },
    /// The element tagged with `token` has left the document.
    Stale { token: String },
    Any { of: Vec<Predicate> },
}

impl Predicate {
    pub fn present(selector: impl Into<String>) -> Self {
        Self::Present {
            selector: selector.into(),
        }
    }

    pub fn visible(selector: impl Into<String>) -> Self {
        Self::Visible {
            selector: selector.into(),
        }
    }

    pub fn hidden(selector: impl Into<String>) -> Self {
        Self::Hidden {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { selector } => write!(f, "present({})", selector),
            Self::Visible { selector } => write!(f, "visible({})", selector),
            Self::Hidden { selector } => write!(f, "hidden({})", selector),
            Self::TextContains { selector, text } => write!(f, "text({} ~ {})", selector, text),
            Self::Disabled { selector } => write!(f, "disabled({})", selector),
            Self::UrlChanged { from } => write!(f, "url != {}", from),
            Self::Stale { token } => write!(f, "stale({})", token),
            Self::Any { of } => {
                let parts: Vec<String> = of.iter().map(|p| p.to_string()).collect();
                write!(f, "any[{}]", parts.join(", "))
            }
        }
    }
}

/// Addresses the `index`-th match of `selector`. Holds no live reference:
/// every use re-queries the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

/// Opaque diagnostic capture of the rendered page.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub png: Vec<u8>,
    pub html: String,
}

/// The single browser session of a run.
///
/// All methods take `&mut self`: a session is never shared between
/// concurrent navigations.
#[async_trait::async_trait]
pub trait PageRenderer: Send {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Evaluates `predicate` once against the current document.
    async fn check(&mut self, predicate: &Predicate) -> Result<bool>;

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Reads `selector` inside `scope`. `Ok(None)` means nothing matched.
    async fn read(&mut self, scope: &ElementHandle, selector: &Selector) -> Result<Option<String>>;

    /// Clicks the first match. Returns false when nothing matched.
    async fn click(&mut self, selector: &str) -> Result<bool>;

    /// Replaces the value of the first matching input. Returns false when
    /// nothing matched.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<bool>;

    /// Tags the first match so [`Predicate::Stale`] can detect its removal.
    async fn tag(&mut self, selector: &str) -> Result<Option<String>>;

    /// Calls `code` (a function expression or name) with `args`, or
    /// evaluates it as an expression when it is not callable.
    async fn run_script(&mut self, code: &str, args: &[serde_json::Value]) -> Result<serde_json::Value>;

    async fn snapshot(&mut self) -> Result<Snapshot>;

    /// Polls `predicate` until it holds or `timeout` elapses. Evaluation
    /// errors count as "not yet".
    async fn wait_for(&mut self, predicate: &Predicate, timeout: Duration) -> Result<()> {
        let poll = Duration::from_millis(ms::POLL_INTERVAL);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.check(predicate).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => tracing::debug!("predicate {} errored: {}", predicate, e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarvestError::timeout(predicate.to_string(), timeout));
            }
            tokio::time::sleep(poll).await;
        }
    }
}
