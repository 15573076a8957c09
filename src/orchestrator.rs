use crate::config::{Config, RunConfig, UrlPolicy};
use crate::diagnostics::DiagnosticsSink;
use crate::extractor::ListingExtractor;
use crate::ledger::{CategoryState, Journal, LedgerEvent, RunLedger};
use crate::model::{
    CategoryOutcome, CategoryReport, ExtractionWarning, FailureReason, PageState, Record, RunResult,
};
use crate::obstacle::{ObstacleResolver, ObstacleSpec};
use crate::pagination::{
    Admission, Advance, PaginationDriver, PaginationStrategy, Termination, navigate_with_retry,
};
use crate::profile::{Category, LazyLoad, SiteProfile};
use crate::renderer::{PageRenderer, Predicate, Selector};
use crate::{HarvestError, js_templates};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a run hands back: the records and outcomes, plus the event log.
#[derive(Debug)]
pub struct Harvest {
    pub result: RunResult,
    pub ledger: RunLedger,
}

/// Everything one category produced.
struct CategoryRun {
    report: CategoryReport,
    records: Vec<Record>,
    warnings: Vec<ExtractionWarning>,
}

impl CategoryRun {
    fn failed(reason: FailureReason) -> Self {
        Self {
            report: CategoryReport::failed(reason),
            records: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Runs categories one after another against a single renderer.
///
/// Holds only immutable run configuration; all per-run state lives in the
/// [`Harvest`] returned by [`Harvester::run`].
pub struct Harvester {
    run: RunConfig,
    policy: UrlPolicy,
    obstacles: Vec<ObstacleSpec>,
    base_url: Option<String>,
}

impl Harvester {
    pub fn new(
        run: RunConfig,
        policy: UrlPolicy,
        obstacles: Vec<ObstacleSpec>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            run,
            policy,
            obstacles,
            base_url,
        }
    }

    pub fn from_profile(config: &Config, profile: &SiteProfile) -> Self {
        Self::new(
            config.run.clone(),
            config.policy.clone(),
            profile.obstacles.clone(),
            profile.base_url.clone(),
        )
    }

    /// Always returns a result, even when every category failed. Categories
    /// never see each other's errors.
    pub async fn run<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        categories: &[Category],
        sink: &mut dyn DiagnosticsSink,
        cancel: &CancellationToken,
    ) -> Harvest {
        let mut result = RunResult::new();
        let mut ledger = RunLedger::new();
        tracing::info!(
            "run {} started with {} categories",
            result.run_id,
            categories.len()
        );

        {
            let mut journal = Journal::new(&mut ledger, sink);
            let mut cancelled = false;

            for (i, category) in categories.iter().enumerate() {
                if !cancelled && i > 0 && !pause(self.run.politeness_delay(), cancel).await {
                    cancelled = true;
                }
                if !cancelled && cancel.is_cancelled() {
                    cancelled = true;
                }
                if cancelled {
                    if !result.categories.values().any(is_cancel_marker) {
                        journal.record(LedgerEvent::RunCancelled);
                    }
                    result.categories.insert(
                        category.name.clone(),
                        CategoryReport::failed(FailureReason::Cancelled),
                    );
                    continue;
                }

                let mut scoped = journal.scoped(&category.name);
                let outcome = self.run_category(renderer, category, &mut scoped, cancel).await;

                scoped.record(LedgerEvent::CategoryRecords {
                    count: outcome.records.len(),
                    duplicates_dropped: outcome.report.duplicates_dropped,
                    outcome: outcome.report.outcome.label().to_string(),
                });
                scoped.transition(match outcome.report.outcome {
                    CategoryOutcome::Failed { .. } => CategoryState::Failed,
                    _ => CategoryState::Done,
                });

                result.records.extend(outcome.records);
                result.warnings.extend(outcome.warnings);
                result
                    .categories
                    .insert(category.name.clone(), outcome.report);
            }
        }

        result.finish();
        tracing::info!(
            "run {} finished: {} records, {}/{} categories completed",
            result.run_id,
            result.records.len(),
            result
                .categories
                .values()
                .filter(|r| r.outcome.is_completed())
                .count(),
            result.categories.len()
        );
        Harvest { result, ledger }
    }

    async fn run_category<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        category: &Category,
        journal: &mut Journal<'_>,
        cancel: &CancellationToken,
    ) -> CategoryRun {
        journal.transition(CategoryState::Pending);
        journal.transition(CategoryState::Navigating);

        if let Err(e) = self.policy.check(&category.seed_url) {
            tracing::warn!("{}: {}", category.name, e);
            return CategoryRun::failed(FailureReason::Disallowed {
                url: category.seed_url.clone(),
            });
        }

        if let Err(e) = navigate_with_retry(renderer, &category.seed_url, &self.run, journal).await {
            journal
                .capture(renderer, &format!("category_fail_{}", category.name))
                .await;
            let reason = match e {
                HarvestError::Navigation { url, reason } => FailureReason::Navigation { url, reason },
                other => FailureReason::Navigation {
                    url: category.seed_url.clone(),
                    reason: other.to_string(),
                },
            };
            return CategoryRun::failed(reason);
        }

        journal.transition(CategoryState::ResolvingObstacles);
        if let Err(spec) = self.clear_obstacles(renderer, journal).await {
            if !self.run.continue_on_obstacle_failure {
                return CategoryRun::failed(FailureReason::Obstacle { spec });
            }
            tracing::warn!(
                "{}: obstacle '{}' unresolved, continuing as configured",
                category.name,
                spec
            );
        }

        self.paginate(renderer, category, journal, cancel).await
    }

    async fn paginate<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        category: &Category,
        journal: &mut Journal<'_>,
        cancel: &CancellationToken,
    ) -> CategoryRun {
        let map = &category.selectors;
        let extractor = ListingExtractor::new(&self.policy, self.base_url.as_deref());
        let mut driver = PaginationDriver::new(
            &category.pagination,
            &map.container,
            category.effective_page_cap(self.run.page_cap),
            &self.policy,
            &self.run,
        );

        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut duplicates = 0;

        let termination = loop {
            journal.transition(CategoryState::Extracting);
            let page_index = driver.current();

            if let Some(lazy) = &category.lazy_load {
                load_lazy_listings(renderer, lazy).await;
            }
            if let Err(e) = renderer
                .wait_for(&Predicate::present(&map.container), self.run.content_timeout())
                .await
            {
                tracing::debug!("{} page {}: {}", category.name, page_index, e);
            }

            let page = match extractor
                .extract(renderer, map, &category.name, page_index)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    journal
                        .capture(renderer, &format!("extract_fail_{}_page_{}", category.name, page_index))
                        .await;
                    break Termination::AdvanceFailed(e.to_string());
                }
            };

            let state = PageState::new(page_index, &page.records);
            journal.record(LedgerEvent::PageExtracted {
                page: page_index,
                records: page.records.len(),
                skipped: page.skipped,
                fingerprint: state.fingerprint.short().to_string(),
            });

            if driver.admit(state) == Admission::Duplicate {
                journal.record(LedgerEvent::Pagination {
                    page: page_index,
                    decision: Termination::DuplicateContent.to_string(),
                });
                break Termination::DuplicateContent;
            }

            if page_index == 1
                && let Some(selector) = &category.last_page
                && let Some(last) = discover_last_page(renderer, selector).await
            {
                driver.limit_cap(last);
                journal.record(LedgerEvent::Pagination {
                    page: page_index,
                    decision: format!("site reports {} pages", last),
                });
            }

            skipped += page.skipped;
            warnings.extend(page.warnings);
            for record in page.records {
                if !record.is_sentinel(&map.identity_field)
                    && let Some(identity) = record.get(&map.identity_field)
                    && !seen.insert(identity.to_string())
                {
                    duplicates += 1;
                    continue;
                }
                records.push(record);
            }

            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            let single = matches!(category.pagination, PaginationStrategy::Single);
            if !single && !driver.at_cap() && !pause(self.run.politeness_delay(), cancel).await {
                break Termination::Cancelled;
            }

            match driver.advance(renderer, journal).await {
                Advance::Advanced { .. } => {
                    if self.run.recheck_obstacles_per_page
                        && let Err(spec) = self.clear_obstacles(renderer, journal).await
                        && !self.run.continue_on_obstacle_failure
                    {
                        break Termination::AdvanceFailed(format!("obstacle '{}' unresolved", spec));
                    }
                }
                Advance::Stopped(termination) => break termination,
            }
        };

        let pages_done = driver.pages().len() as u32;
        let outcome = if termination.is_error() {
            CategoryOutcome::PartiallyCompleted { pages_done }
        } else {
            CategoryOutcome::Completed
        };
        tracing::info!(
            "{}: {} pages, {} records, stopped: {}",
            category.name,
            pages_done,
            records.len(),
            termination
        );

        CategoryRun {
            report: CategoryReport {
                outcome,
                records: records.len(),
                pages: driver.into_pages(),
                skipped_listings: skipped,
                duplicates_dropped: duplicates,
                termination: Some(termination.to_string()),
            },
            records,
            warnings,
        }
    }

    /// Returns the name of the first obstacle that could not be cleared.
    async fn clear_obstacles<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        journal: &mut Journal<'_>,
    ) -> std::result::Result<(), String> {
        if self.obstacles.is_empty() {
            return Ok(());
        }
        let resolver = ObstacleResolver::new(Duration::from_millis(self.run.obstacle_backoff_ms));
        match resolver
            .resolve_all(renderer, &self.obstacles, self.run.max_obstacle_attempts, journal)
            .await
        {
            Ok(report) => {
                if report.actions_taken > 0 {
                    tracing::info!(
                        "cleared {:?} with {} actions",
                        report.resolved,
                        report.actions_taken
                    );
                }
                Ok(())
            }
            Err(HarvestError::Obstacle { spec }) => Err(spec),
            Err(other) => Err(other.to_string()),
        }
    }
}

/// Scrolls to the bottom `rounds` times, letting lazily loaded listings
/// render after each scroll.
async fn load_lazy_listings<R: PageRenderer + ?Sized>(renderer: &mut R, lazy: &LazyLoad) {
    for round in 1..=lazy.rounds {
        if let Err(e) = renderer.run_script(js_templates::SCROLL_TO_BOTTOM, &[]).await {
            tracing::debug!("scroll round {} failed: {}", round, e);
            return;
        }
        tokio::time::sleep(Duration::from_millis(lazy.settle_ms)).await;
    }
}

/// Reads the last page number from the final match of `selector`.
async fn discover_last_page<R: PageRenderer + ?Sized>(renderer: &mut R, selector: &Selector) -> Option<u32> {
    let links = renderer.query_all(&selector.css).await.ok()?;
    let last = links.last()?;
    let own_value = Selector {
        css: String::new(),
        source: selector.source.clone(),
    };
    let raw = renderer.read(last, &own_value).await.ok()??;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::debug!("last page marker '{}' is not a number", raw);
            None
        }
    }
}

fn is_cancel_marker(report: &CategoryReport) -> bool {
    matches!(
        report.outcome,
        CategoryOutcome::Failed {
            reason: FailureReason::Cancelled
        }
    )
}

/// Sleeps for `delay` unless cancelled first. Returns false on cancellation.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
