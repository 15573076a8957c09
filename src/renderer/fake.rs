//! Scripted in-memory site used by unit tests.

use super::{ElementHandle, PageRenderer, Predicate, Selector, Snapshot, Source};
use crate::{HarvestError, Result, js_templates};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeListing {
    values: HashMap<String, String>,
}

impl FakeListing {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn text(mut self, css: &str, value: &str) -> Self {
        self.values.insert(key(css, &Source::Text), value.to_string());
        self
    }

    pub(crate) fn attr(mut self, css: &str, name: &str, value: &str) -> Self {
        self.values
            .insert(key(css, &Source::Attr(name.to_string())), value.to_string());
        self
    }
}

fn key(css: &str, source: &Source) -> String {
    format!("{}|{}", css, source)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakePage {
    container: String,
    listings: Vec<FakeListing>,
    /// Appended to `listings` by the first scroll to the bottom.
    lazy: Vec<FakeListing>,
    /// Per-element values for selectors outside the container.
    links: HashMap<String, Vec<String>>,
    elements: HashSet<String>,
    hidden: HashSet<String>,
    disabled: HashSet<String>,
    texts: HashMap<String, String>,
    broken: HashSet<usize>,
    /// Clicking `.0` loads `.1`; `None` means the control does nothing.
    next: Option<(String, Option<String>)>,
}

impl FakePage {
    pub(crate) fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn listings(mut self, listings: Vec<FakeListing>) -> Self {
        self.listings = listings;
        self
    }

    pub(crate) fn lazy(mut self, listings: Vec<FakeListing>) -> Self {
        self.lazy = listings;
        self
    }

    pub(crate) fn links(mut self, selector: &str, values: &[&str]) -> Self {
        self.links.insert(
            selector.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub(crate) fn element(mut self, selector: &str) -> Self {
        self.elements.insert(selector.to_string());
        self
    }

    pub(crate) fn hidden(mut self, selector: &str) -> Self {
        self.elements.insert(selector.to_string());
        self.hidden.insert(selector.to_string());
        self
    }

    pub(crate) fn disabled(mut self, selector: &str) -> Self {
        self.elements.insert(selector.to_string());
        self.disabled.insert(selector.to_string());
        self
    }

    pub(crate) fn text_of(mut self, selector: &str, text: &str) -> Self {
        self.elements.insert(selector.to_string());
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub(crate) fn broken_listing(mut self, index: usize) -> Self {
        self.broken.insert(index);
        self
    }

    pub(crate) fn next(mut self, selector: &str, target: Option<&str>) -> Self {
        self.elements.insert(selector.to_string());
        self.next = Some((selector.to_string(), target.map(str::to_string)));
        self
    }
}

/// A modal that stays up until its dismiss control has been clicked
/// `clicks_needed` times (never, when `None`).
#[derive(Debug, Clone)]
pub(crate) struct FakeBlocker {
    pub(crate) selector: String,
    pub(crate) dismiss: String,
    pub(crate) clicks_needed: Option<u32>,
    text: String,
    /// Only shown while this URL is loaded.
    page: Option<String>,
    /// Input that must hold this text before the dismiss control works.
    /// When the input is the dismiss selector itself, filling dismisses.
    passcode: Option<(String, String)>,
    filled: bool,
    active: bool,
}

impl FakeBlocker {
    pub(crate) fn new(selector: &str, dismiss: &str, clicks_needed: Option<u32>) -> Self {
        Self {
            selector: selector.to_string(),
            dismiss: dismiss.to_string(),
            clicks_needed,
            text: String::new(),
            page: None,
            passcode: None,
            filled: false,
            active: true,
        }
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub(crate) fn on_page(mut self, url: &str) -> Self {
        self.page = Some(url.to_string());
        self
    }

    pub(crate) fn requires_fill(mut self, input: &str, text: &str) -> Self {
        self.passcode = Some((input.to_string(), text.to_string()));
        self
    }

    fn shown_on(&self, url: Option<&str>) -> bool {
        self.active && self.page.as_deref().is_none_or(|p| Some(p) == url)
    }

    /// Counts one dismissal action against `clicks_needed`.
    fn dismiss_once(&mut self) {
        if let Some(n) = self.clicks_needed.as_mut() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.active = false;
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRenderer {
    pages: HashMap<String, FakePage>,
    failing: HashMap<String, Option<u32>>,
    functions: HashMap<String, String>,
    blockers: Vec<FakeBlocker>,
    current: Option<String>,
    tags: HashSet<String>,
    tag_seq: u32,
    pub(crate) navigations: Vec<String>,
    pub(crate) clicks: Vec<String>,
    pub(crate) fills: Vec<(String, String)>,
    pub(crate) scripts: Vec<(String, Vec<serde_json::Value>)>,
    pub(crate) snapshots: u32,
}

impl FakeRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Navigation to `url` always fails.
    pub(crate) fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string(), None);
        self
    }

    /// Navigation to `url` fails `times` times, then succeeds.
    pub(crate) fn flaky(mut self, url: &str, times: u32) -> Self {
        self.failing.insert(url.to_string(), Some(times));
        self
    }

    /// `name(n)` loads `template` with `{page}` replaced by `n`.
    pub(crate) fn function(mut self, name: &str, template: &str) -> Self {
        self.functions.insert(name.to_string(), template.to_string());
        self
    }

    pub(crate) fn blocker(mut self, blocker: FakeBlocker) -> Self {
        self.blockers.push(blocker);
        self
    }

    pub(crate) fn blocker_active(&self, selector: &str) -> bool {
        self.shown_blocker(selector).is_some()
    }

    fn shown_blocker(&self, selector: &str) -> Option<&FakeBlocker> {
        let url = self.current.as_deref();
        self.blockers
            .iter()
            .find(|b| b.shown_on(url) && b.selector == selector)
    }

    fn text(&self, selector: &str) -> &str {
        if let Some(blocker) = self.shown_blocker(selector) {
            return &blocker.text;
        }
        self.current_page()
            .and_then(|p| p.texts.get(selector))
            .map_or("", String::as_str)
    }

    fn load(&mut self, url: &str) -> Result<()> {
        if let Some(remaining) = self.failing.get_mut(url) {
            match remaining {
                None => return Err(HarvestError::navigation(url, "net::ERR_NAME_NOT_RESOLVED")),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return Err(HarvestError::navigation(url, "net::ERR_CONNECTION_RESET"));
                }
            }
        }
        if !self.pages.contains_key(url) {
            return Err(HarvestError::navigation(url, "HTTP 404"));
        }
        self.current = Some(url.to_string());
        self.tags.clear();
        Ok(())
    }

    fn current_page(&self) -> Option<&FakePage> {
        self.current.as_ref().and_then(|u| self.pages.get(u))
    }

    fn present(&self, selector: &str) -> bool {
        if self.blocker_active(selector) {
            return true;
        }
        self.current_page().is_some_and(|p| {
            p.elements.contains(selector) || (p.container == selector && !p.listings.is_empty())
        })
    }

    fn visible(&self, selector: &str) -> bool {
        self.present(selector) && !self.current_page().is_some_and(|p| p.hidden.contains(selector))
    }

    fn eval(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Present { selector } => self.present(selector),
            Predicate::Visible { selector } => self.visible(selector),
            Predicate::Hidden { selector } => !self.visible(selector),
            Predicate::TextContains { selector, text } => {
                self.present(selector) && self.text(selector).contains(text.as_str())
            }
            Predicate::Disabled { selector } => {
                !self.present(selector)
                    || self.current_page().is_some_and(|p| p.disabled.contains(selector))
            }
            Predicate::UrlChanged { from } => self.current.as_deref() != Some(from.as_str()),
            Predicate::Stale { token } => !self.tags.contains(token),
            Predicate::Any { of } => of.iter().any(|p| self.eval(p)),
        }
    }
}

#[async_trait::async_trait]
impl PageRenderer for FakeRenderer {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.navigations.push(url.to_string());
        self.load(url)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn check(&mut self, predicate: &Predicate) -> Result<bool> {
        Ok(self.eval(predicate))
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        let count = match self.current_page() {
            Some(p) if p.container == selector => p.listings.len(),
            Some(p) if p.links.contains_key(selector) => p.links[selector].len(),
            _ if self.present(selector) => 1,
            _ => 0,
        };
        Ok((0..count)
            .map(|index| ElementHandle {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn read(&mut self, scope: &ElementHandle, selector: &Selector) -> Result<Option<String>> {
        let page = self
            .current_page()
            .ok_or_else(|| HarvestError::Script("no document".into()))?;
        if let Some(values) = page.links.get(&scope.selector) {
            return Ok(values.get(scope.index).cloned());
        }
        if page.broken.contains(&scope.index) {
            return Err(HarvestError::Script(format!(
                "listing {} is malformed",
                scope.index
            )));
        }
        let listing = page
            .listings
            .get(scope.index)
            .ok_or_else(|| HarvestError::Script(format!("listing {} no longer present", scope.index)))?;
        Ok(listing.values.get(&key(&selector.css, &selector.source)).cloned())
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        self.clicks.push(selector.to_string());

        let url = self.current.clone();
        if let Some(blocker) = self
            .blockers
            .iter_mut()
            .find(|b| b.shown_on(url.as_deref()) && b.dismiss == selector)
        {
            if blocker.passcode.is_none() || blocker.filled {
                blocker.dismiss_once();
            }
            return Ok(true);
        }

        let next = self.current_page().and_then(|p| p.next.clone());
        if let Some((next_selector, target)) = next
            && next_selector == selector
        {
            if let Some(target) = target {
                self.load(&target)?;
            }
            return Ok(true);
        }

        Ok(self.present(selector))
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<bool> {
        self.fills.push((selector.to_string(), text.to_string()));

        let url = self.current.clone();
        let mut found = false;
        for blocker in self.blockers.iter_mut().filter(|b| b.shown_on(url.as_deref())) {
            let Some((input, expected)) = &blocker.passcode else {
                continue;
            };
            if input != selector {
                continue;
            }
            found = true;
            blocker.filled = text == expected;
            if blocker.filled && blocker.dismiss == selector {
                blocker.dismiss_once();
            }
        }

        Ok(found || self.present(selector))
    }

    async fn tag(&mut self, selector: &str) -> Result<Option<String>> {
        if !self.present(selector) {
            return Ok(None);
        }
        self.tag_seq += 1;
        let token = format!("tag-{}", self.tag_seq);
        self.tags.insert(token.clone());
        Ok(Some(token))
    }

    async fn run_script(&mut self, code: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        self.scripts.push((code.to_string(), args.to_vec()));
        if code == js_templates::SCROLL_TO_BOTTOM {
            if let Some(page) = self.current.as_ref().and_then(|u| self.pages.get_mut(u)) {
                let lazy = std::mem::take(&mut page.lazy);
                page.listings.extend(lazy);
            }
            return Ok(serde_json::Value::Null);
        }
        let Some(template) = self.functions.get(code).cloned() else {
            return Err(HarvestError::Script(format!("{} is not defined", code)));
        };
        let page = args
            .first()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| HarvestError::Script("missing page argument".into()))?;
        let target = template.replace("{page}", &page.to_string());
        if self.pages.contains_key(&target) {
            self.load(&target)?;
        }
        Ok(serde_json::Value::Null)
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        self.snapshots += 1;
        Ok(Snapshot {
            url: self.current.clone().unwrap_or_default(),
            captured_at: chrono::Utc::now(),
            png: vec![0x89, b'P', b'N', b'G'],
            html: "<html></html>".to_string(),
        })
    }
}

/// `count` listings with a name, a price and a detail link.
pub(crate) fn products(prefix: &str, count: usize) -> Vec<FakeListing> {
    (0..count)
        .map(|i| {
            FakeListing::new()
                .text(".title", &format!("{} {}", prefix, i))
                .text(".price", &format!("KES {}", 100 + i))
                .attr("a", "href", &format!("/p/{}-{}", prefix, i))
        })
        .collect()
}
