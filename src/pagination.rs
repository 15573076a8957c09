use crate::config::{RunConfig, UrlPolicy};
use crate::ledger::{CategoryState, Journal, LedgerEvent};
use crate::model::{Fingerprint, PageState};
use crate::renderer::{PageRenderer, Predicate};
use crate::timeouts::ms;
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a category moves from one result page to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PaginationStrategy {
    /// Page N is loaded from `template` with `{page}` replaced by N. Page 1
    /// is always the seed URL.
    UrlTemplate { template: String },
    Click { next_selector: String },
    /// Calls the site's own pagination function with the next page number.
    /// When `next_selector` is set, its absence or disabled state ends
    /// pagination as for [`PaginationStrategy::Click`].
    Script {
        function: String,
        #[serde(default)]
        next_selector: Option<String>,
    },
    Single,
}

impl PaginationStrategy {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::UrlTemplate { template } if !template.contains("{page}") => Err(
                HarvestError::ProfileError(format!("url template '{}' lacks {{page}}", template)),
            ),
            Self::Click { next_selector } if next_selector.trim().is_empty() => Err(
                HarvestError::ProfileError("click pagination needs a next_selector".into()),
            ),
            Self::Script { function, .. } if function.trim().is_empty() => Err(
                HarvestError::ProfileError("script pagination needs a function".into()),
            ),
            _ => Ok(()),
        }
    }

    fn next_control(&self) -> Option<&str> {
        match self {
            Self::Click { next_selector } => Some(next_selector),
            Self::Script { next_selector, .. } => next_selector.as_deref(),
            _ => None,
        }
    }
}

/// Why pagination stopped. Everything except [`Termination::is_error`]
/// variants is a normal end of the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    PageCap,
    NoNextControl,
    NextDisabled,
    AdvanceTimeout,
    DuplicateContent,
    Disallowed(String),
    SinglePage,
    AdvanceFailed(String),
    Cancelled,
}

impl Termination {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::AdvanceFailed(_) | Self::Cancelled)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageCap => write!(f, "page cap reached"),
            Self::NoNextControl => write!(f, "no next control"),
            Self::NextDisabled => write!(f, "next control disabled"),
            Self::AdvanceTimeout => write!(f, "page did not change after advancing"),
            Self::DuplicateContent => write!(f, "page repeats the previous one"),
            Self::Disallowed(url) => write!(f, "next page {} rejected by policy", url),
            Self::SinglePage => write!(f, "single page category"),
            Self::AdvanceFailed(reason) => write!(f, "advance failed: {}", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Advanced { page: u32 },
    Stopped(Termination),
}

/// Loads `url`, retrying navigation failures with linear backoff. Every
/// attempt is journaled.
pub async fn navigate_with_retry<R: PageRenderer + ?Sized>(
    renderer: &mut R,
    url: &str,
    run: &RunConfig,
    journal: &mut Journal<'_>,
) -> Result<()> {
    let attempts = run.navigation_retries + 1;
    let mut attempt = 1;
    loop {
        match renderer.navigate(url, run.navigation_timeout()).await {
            Ok(()) => {
                journal.record(LedgerEvent::Navigation {
                    url: url.to_string(),
                    attempt,
                    error: None,
                });
                return Ok(());
            }
            Err(e) => {
                journal.record(LedgerEvent::Navigation {
                    url: url.to_string(),
                    attempt,
                    error: Some(e.to_string()),
                });
                if attempt >= attempts {
                    return Err(e);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(ms::NAVIGATION_BACKOFF) * attempt).await;
        attempt += 1;
    }
}

/// Tracks the pages of one category and advances between them.
pub struct PaginationDriver<'a> {
    strategy: &'a PaginationStrategy,
    container: &'a str,
    page_cap: u32,
    policy: &'a UrlPolicy,
    run: &'a RunConfig,
    current: u32,
    previous: Option<Fingerprint>,
    pages: Vec<PageState>,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        strategy: &'a PaginationStrategy,
        container: &'a str,
        page_cap: u32,
        policy: &'a UrlPolicy,
        run: &'a RunConfig,
    ) -> Self {
        Self {
            strategy,
            container,
            page_cap,
            policy,
            run,
            current: 1,
            previous: None,
            pages: Vec::new(),
        }
    }

    /// Index of the page currently loaded, starting at 1.
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn at_cap(&self) -> bool {
        self.current >= self.page_cap
    }

    /// Lowers the cap to a page count discovered on the site. Never raises it.
    pub fn limit_cap(&mut self, last_page: u32) {
        self.page_cap = self.page_cap.min(last_page.max(1));
    }

    pub fn pages(&self) -> &[PageState] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<PageState> {
        self.pages
    }

    /// Registers the extracted page. A page whose fingerprint equals the
    /// previous page's is rejected and not counted as traversed.
    pub fn admit(&mut self, state: PageState) -> Admission {
        if self.previous.as_ref() == Some(&state.fingerprint) {
            return Admission::Duplicate;
        }
        self.previous = Some(state.fingerprint.clone());
        self.pages.push(state);
        Admission::Accepted
    }

    /// Attempts to reach the next page. Termination conditions are checked
    /// in order: page cap, next control, advance confirmation.
    pub async fn advance<R: PageRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        journal: &mut Journal<'_>,
    ) -> Advance {
        journal.transition(CategoryState::Paginating);
        let outcome = self.try_advance(renderer, journal).await;

        let decision = match &outcome {
            Advance::Advanced { page } => {
                self.current = *page;
                format!("advanced to page {}", page)
            }
            Advance::Stopped(termination) => termination.to_string(),
        };
        journal.record(LedgerEvent::Pagination {
            page: self.current,
            decision,
        });

        if let Advance::Stopped(Termination::AdvanceFailed(_)) = &outcome {
            journal
                .capture(renderer, &format!("pagination_fail_page_{}", self.current))
                .await;
        }
        outcome
    }

    async fn try_advance<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        journal: &mut Journal<'_>,
    ) -> Advance {
        if self.at_cap() {
            return Advance::Stopped(Termination::PageCap);
        }
        let next = self.current + 1;

        if let Some(control) = self.strategy.next_control()
            && let Err(termination) = self.next_control_ready(renderer, control).await
        {
            return Advance::Stopped(termination);
        }

        let action = match self.strategy {
            PaginationStrategy::Single => return Advance::Stopped(Termination::SinglePage),
            PaginationStrategy::UrlTemplate { template } => {
                let url = template.replace("{page}", &next.to_string());
                if self.policy.check(&url).is_err() {
                    return Advance::Stopped(Termination::Disallowed(url));
                }
                return match navigate_with_retry(renderer, &url, self.run, journal).await {
                    Ok(()) => Advance::Advanced { page: next },
                    Err(e) => Advance::Stopped(Termination::AdvanceFailed(e.to_string())),
                };
            }
            _ => self.strategy,
        };

        let from = match renderer.current_url().await {
            Ok(url) => url,
            Err(e) => return Advance::Stopped(Termination::AdvanceFailed(e.to_string())),
        };
        let token = renderer.tag(self.container).await.ok().flatten();

        let triggered = match action {
            PaginationStrategy::Click { next_selector } => renderer.click(next_selector).await,
            PaginationStrategy::Script { function, .. } => renderer
                .run_script(function, &[serde_json::json!(next)])
                .await
                .map(|_| true),
            _ => Ok(false),
        };
        match triggered {
            Ok(true) => {}
            Ok(false) => return Advance::Stopped(Termination::NoNextControl),
            Err(e) => return Advance::Stopped(Termination::AdvanceFailed(e.to_string())),
        }

        let mut signals = vec![Predicate::UrlChanged { from }];
        if let Some(token) = token {
            signals.push(Predicate::Stale { token });
        }
        match renderer
            .wait_for(&Predicate::Any { of: signals }, self.run.advance_timeout())
            .await
        {
            Ok(()) => Advance::Advanced { page: next },
            Err(e) if e.is_timeout() => Advance::Stopped(Termination::AdvanceTimeout),
            Err(e) => Advance::Stopped(Termination::AdvanceFailed(e.to_string())),
        }
    }

    async fn next_control_ready<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        control: &str,
    ) -> std::result::Result<(), Termination> {
        if renderer
            .wait_for(&Predicate::visible(control), self.run.next_control_timeout())
            .await
            .is_err()
        {
            return Err(Termination::NoNextControl);
        }
        let disabled = Predicate::Disabled {
            selector: control.to_string(),
        };
        if renderer.check(&disabled).await.unwrap_or(false) {
            return Err(Termination::NextDisabled);
        }
        Ok(())
    }
}
