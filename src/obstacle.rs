use crate::ledger::{Journal, LedgerEvent};
use crate::renderer::{PageRenderer, Predicate};
use crate::timeouts::ms;
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a detected blocker is dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Resolution {
    Click {
        selector: String,
    },
    /// Types into an input, then optionally clicks a submit control.
    Fill {
        selector: String,
        text: String,
        #[serde(default)]
        submit: Option<String>,
    },
    /// Types into a picker and clicks the first suggestion that appears.
    SelectFirstOption {
        input: String,
        text: String,
        option: String,
    },
    Script {
        code: String,
    },
}

/// One dismissible blocker type, e.g. a consent dialog or a store picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleSpec {
    pub name: String,
    pub detection: Predicate,
    pub resolution: Resolution,
    pub confirmation: Predicate,
    /// Bound on waiting for `confirmation` after each attempt.
    #[serde(default = "default_confirm_timeout")]
    pub timeout_ms: u64,
    /// How long the blocker gets to show up before it is considered absent.
    #[serde(default = "default_detect_timeout")]
    pub detect_timeout_ms: u64,
}

fn default_confirm_timeout() -> u64 {
    ms::OBSTACLE_CONFIRM
}

fn default_detect_timeout() -> u64 {
    ms::OBSTACLE_DETECT
}

impl ObstacleSpec {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Resolution actions performed across all specs.
    pub actions_taken: u32,
    pub resolved: Vec<String>,
}

pub struct ObstacleResolver {
    backoff: Duration,
}

impl ObstacleResolver {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    /// Walks `specs` in order. Specs whose blocker never shows up are
    /// skipped; a blocker still present after `max_attempts` resolutions
    /// yields [`HarvestError::Obstacle`].
    pub async fn resolve_all<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        specs: &[ObstacleSpec],
        max_attempts: u32,
        journal: &mut Journal<'_>,
    ) -> Result<ResolveReport> {
        let mut report = ResolveReport::default();

        for spec in specs {
            if !self.detect(renderer, spec).await {
                tracing::debug!("obstacle '{}' not present", spec.name);
                continue;
            }

            tracing::info!("obstacle '{}' detected", spec.name);
            let mut resolved = false;

            for attempt in 1..=max_attempts.max(1) {
                report.actions_taken += 1;
                let outcome = self.attempt(renderer, spec).await;

                let detail = outcome.as_ref().err().map(|e| e.to_string());
                resolved = outcome.is_ok();
                journal.record(LedgerEvent::ObstacleAttempt {
                    spec: spec.name.clone(),
                    attempt,
                    resolved,
                    detail,
                });

                if resolved {
                    break;
                }

                journal
                    .capture(renderer, &format!("obstacle_{}_attempt_{}", spec.name, attempt))
                    .await;

                if attempt < max_attempts {
                    tokio::time::sleep(self.backoff * attempt).await;
                }
            }

            if !resolved {
                return Err(HarvestError::Obstacle {
                    spec: spec.name.clone(),
                });
            }
            report.resolved.push(spec.name.clone());
        }

        Ok(report)
    }

    async fn detect<R: PageRenderer + ?Sized>(&self, renderer: &mut R, spec: &ObstacleSpec) -> bool {
        if spec.detect_timeout_ms == 0 {
            return renderer.check(&spec.detection).await.unwrap_or(false);
        }
        renderer
            .wait_for(&spec.detection, spec.detect_timeout())
            .await
            .is_ok()
    }

    async fn attempt<R: PageRenderer + ?Sized>(&self, renderer: &mut R, spec: &ObstacleSpec) -> Result<()> {
        // Applying the action to a blocker that already went away is fine.
        if renderer.check(&spec.confirmation).await.unwrap_or(false) {
            return Ok(());
        }
        apply(renderer, &spec.resolution, spec.confirm_timeout()).await?;
        renderer
            .wait_for(&spec.confirmation, spec.confirm_timeout())
            .await
    }
}

async fn apply<R: PageRenderer + ?Sized>(
    renderer: &mut R,
    resolution: &Resolution,
    timeout: Duration,
) -> Result<()> {
    match resolution {
        Resolution::Click { selector } => click(renderer, selector).await,
        Resolution::Fill {
            selector,
            text,
            submit,
        } => {
            if !renderer.fill(selector, text).await? {
                return Err(HarvestError::ElementNotFound {
                    selector: selector.clone(),
                });
            }
            match submit {
                Some(submit) => click(renderer, submit).await,
                None => Ok(()),
            }
        }
        Resolution::SelectFirstOption {
            input,
            text,
            option,
        } => {
            if !renderer.fill(input, text).await? {
                return Err(HarvestError::ElementNotFound {
                    selector: input.clone(),
                });
            }
            renderer
                .wait_for(&Predicate::present(option.as_str()), timeout)
                .await?;
            click(renderer, option).await
        }
        Resolution::Script { code } => renderer.run_script(code, &[]).await.map(|_| ()),
    }
}

async fn click<R: PageRenderer + ?Sized>(renderer: &mut R, selector: &str) -> Result<()> {
    if renderer.click(selector).await? {
        Ok(())
    } else {
        Err(HarvestError::ElementNotFound {
            selector: selector.to_string(),
        })
    }
}
