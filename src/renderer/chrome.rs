use super::{ElementHandle, PageRenderer, Predicate, Selector, Snapshot};
use crate::{
    HarvestError, Result,
    config::BrowserConfig as BrowserSettings,
    js_templates,
    timeouts::{ms, secs},
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, NavigateParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;

const NAVIGATION_STATUS: &str = "(function(){const e=performance.getEntriesByType('navigation')[0];return e&&e.responseStatus?e.responseStatus:0})()";

/// [`PageRenderer`] backed by one Chrome tab over CDP.
///
/// The browser process lives exactly as long as this value. Call
/// [`ChromeRenderer::close`] for an orderly shutdown; dropping it still
/// stops the CDP handler and kills the child process.
pub struct ChromeRenderer {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeRenderer {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = settings
            .chrome_path
            .clone()
            .map(Ok)
            .unwrap_or_else(crate::utils::find_chrome_executable)?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .window_size(settings.window_width, settings.window_height)
            .request_timeout(Duration::from_secs(secs::REQUEST))
            .arg("--disable-blink-features=AutomationControlled");

        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.disable_notifications {
            builder = builder.arg("--disable-notifications");
        }
        if let Some(ref ua) = settings.user_agent {
            builder = builder.arg(format!("--user-agent={}", ua));
        }
        if let Some(ref dir) = settings.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        let config = builder.build().map_err(HarvestError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(HarvestError::LaunchFailed(format!(
                    "could not open a tab: {}",
                    e
                )));
            }
        };

        tracing::info!("Chrome launched from {}", chrome_path.display());

        Ok(Self {
            browser: Some(browser),
            page,
            handler,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take() {
            let closed = browser.close().await;
            browser.wait().await.ok();
            closed.map_err(|e| HarvestError::General(format!("Failed to close Chrome: {}", e)))?;
        }
        self.handler.abort();
        tracing::debug!("Chrome session released");
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T> {
        self.page
            .evaluate(expression)
            .await
            .map_err(|e| HarvestError::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| HarvestError::Script(format!("unexpected script result: {}", e)))
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, async {
            let mut stable_count = 0;
            loop {
                match tokio::time::timeout(
                    Duration::from_secs(secs::READY_STATE),
                    self.page.evaluate(js_templates::READY_STATE),
                )
                .await
                {
                    Ok(Ok(result)) => {
                        if result.into_value::<String>().is_ok_and(|s| s == "complete") {
                            stable_count += 1;
                            if stable_count >= 2 {
                                return;
                            }
                        } else {
                            stable_count = 0;
                        }
                    }
                    Ok(Err(_)) | Err(_) => stable_count = 0,
                }
                tokio::time::sleep(Duration::from_millis(ms::READY_SETTLE)).await;
            }
        })
        .await
        .map_err(|_| HarvestError::timeout("document load", timeout))
    }
}

impl Drop for ChromeRenderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait::async_trait]
impl PageRenderer for ChromeRenderer {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| HarvestError::navigation(url, e))?;

        let response = tokio::time::timeout(timeout, self.page.execute(params))
            .await
            .map_err(|_| HarvestError::navigation(url, format!("no response within {}s", timeout.as_secs())))?
            .map_err(|e| HarvestError::navigation(url, e))?;

        if let Some(ref error_text) = response.result.error_text {
            return Err(HarvestError::navigation(url, error_text));
        }

        self.wait_for_load(timeout)
            .await
            .map_err(|e| HarvestError::navigation(url, e))?;

        let status: i64 = self.eval(NAVIGATION_STATUS).await.unwrap_or(0);
        if status >= 400 {
            return Err(HarvestError::navigation(url, format!("HTTP {}", status)));
        }

        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        match self.page.url().await {
            Ok(Some(url)) => Ok(url),
            _ => self.eval(js_templates::CURRENT_URL).await,
        }
    }

    async fn check(&mut self, predicate: &Predicate) -> Result<bool> {
        let script = js_templates::predicate(predicate, js_templates::CURRENT_URL);
        self.eval(&script).await
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        let count: usize = self.eval(&js_templates::count_elements(selector)).await?;
        Ok((0..count)
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn read(&mut self, scope: &ElementHandle, selector: &Selector) -> Result<Option<String>> {
        let script =
            js_templates::read_within(&scope.selector, scope.index, &selector.css, &selector.source);
        let value = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| HarvestError::Script(e.to_string()))?
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null);
        Ok(match value {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let result: serde_json::Value = self.eval(&js_templates::click_element(selector)).await?;
        Ok(result["found"].as_bool().unwrap_or(false))
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<bool> {
        let result: serde_json::Value = self.eval(&js_templates::fill_element(selector, text)).await?;
        Ok(result["found"].as_bool().unwrap_or(false))
    }

    async fn tag(&mut self, selector: &str) -> Result<Option<String>> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let result: serde_json::Value = self.eval(&js_templates::tag_element(selector, &token)).await?;
        Ok(result["found"].as_bool().unwrap_or(false).then_some(token))
    }

    async fn run_script(&mut self, code: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let args_json = serde_json::to_string(args)?;
        let result = self
            .page
            .evaluate(js_templates::call_function(code, &args_json))
            .await
            .map_err(|e| HarvestError::Script(e.to_string()))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        let url = self.current_url().await.unwrap_or_default();
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let png = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| HarvestError::SnapshotFailed(e.to_string()))?;
        let html = match self.page.content().await {
            Ok(html) => html,
            Err(_) => self.eval(js_templates::PAGE_HTML).await.unwrap_or_default(),
        };

        Ok(Snapshot {
            url,
            captured_at: chrono::Utc::now(),
            png,
            html,
        })
    }
}
