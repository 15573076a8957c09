use crate::config::UrlPolicy;
use crate::model::{ExtractionWarning, Record, SENTINEL};
use crate::policy::resolve_link;
use crate::renderer::{ElementHandle, PageRenderer, Selector, Source};
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_identity_field() -> String {
    "url".to_string()
}

/// One declared field and its fallback selectors, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub selectors: Vec<Selector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorMap {
    pub container: String,
    /// Field holding the listing's detail link.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    pub fields: Vec<FieldSpec>,
}

impl SelectorMap {
    pub fn validate(&self) -> Result<()> {
        if self.container.trim().is_empty() {
            return Err(HarvestError::ProfileError(
                "selector map needs a container selector".into(),
            ));
        }
        if self.fields.is_empty() {
            return Err(HarvestError::ProfileError(
                "selector map declares no fields".into(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(HarvestError::ProfileError("field with empty name".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(HarvestError::ProfileError(format!(
                    "field '{}' declared twice",
                    field.name
                )));
            }
            if field.selectors.is_empty() {
                return Err(HarvestError::ProfileError(format!(
                    "field '{}' has no selectors",
                    field.name
                )));
            }
        }

        if !seen.contains(self.identity_field.as_str()) {
            return Err(HarvestError::ProfileError(format!(
                "identity field '{}' is not declared",
                self.identity_field
            )));
        }
        Ok(())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Default)]
pub struct PageExtraction {
    pub records: Vec<Record>,
    /// Listings dropped because reading them raised an error.
    pub skipped: usize,
    pub warnings: Vec<ExtractionWarning>,
}

/// Turns the listings of the current page into records.
pub struct ListingExtractor<'a> {
    policy: &'a UrlPolicy,
    base_url: Option<&'a str>,
}

impl<'a> ListingExtractor<'a> {
    pub fn new(policy: &'a UrlPolicy, base_url: Option<&'a str>) -> Self {
        Self { policy, base_url }
    }

    /// Only failures to enumerate the page surface as `Err`. A listing that
    /// cannot be read is skipped and counted; a field that cannot be read
    /// takes [`SENTINEL`].
    pub async fn extract<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        map: &SelectorMap,
        category: &str,
        page_index: u32,
    ) -> Result<PageExtraction> {
        let page_url = renderer.current_url().await?;
        let base = self.base_url.unwrap_or(&page_url).to_string();
        let listings = renderer.query_all(&map.container).await?;

        tracing::debug!(
            "{} page {}: {} listings at {}",
            category,
            page_index,
            listings.len(),
            page_url
        );

        let mut out = PageExtraction::default();
        for listing in &listings {
            let warn = |message: String| ExtractionWarning {
                category: category.to_string(),
                page_index,
                listing_index: listing.index,
                message,
            };

            match self.read_listing(renderer, listing, map, category, page_index).await {
                Ok(mut record) => {
                    if let Some(message) = self.resolve_identity(&mut record, &map.identity_field, &base) {
                        out.warnings.push(warn(message));
                    }
                    out.records.push(record);
                }
                Err(e) => {
                    tracing::warn!("{} page {}: skipping listing {}: {}", category, page_index, listing.index, e);
                    out.skipped += 1;
                    out.warnings.push(warn(format!("listing skipped: {}", e)));
                }
            }
        }
        Ok(out)
    }

    async fn read_listing<R: PageRenderer + ?Sized>(
        &self,
        renderer: &mut R,
        listing: &ElementHandle,
        map: &SelectorMap,
        category: &str,
        page_index: u32,
    ) -> Result<Record> {
        let mut record = Record::new(category, page_index);
        for field in &map.fields {
            let value = read_field(renderer, listing, &field.selectors)
                .await?
                .unwrap_or_else(|| SENTINEL.to_string());
            record.fields.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    /// Rewrites the identity field to an absolute, policy-approved URL.
    /// Returns a warning message when it had to fall back to the sentinel.
    fn resolve_identity(&self, record: &mut Record, field: &str, base: &str) -> Option<String> {
        let raw = record.get(field)?.to_string();
        if raw == SENTINEL {
            return Some(format!("identity field '{}' not found", field));
        }

        let resolved = resolve_link(base, &raw);
        let (value, warning) = match resolved {
            Some(url) if self.policy.allows(&url) => (url.to_string(), None),
            Some(url) => (
                SENTINEL.to_string(),
                Some(format!("identity link {} rejected by policy", url)),
            ),
            None => (
                SENTINEL.to_string(),
                Some(format!("identity link '{}' is not a valid URL", raw)),
            ),
        };
        record.fields.insert(field.to_string(), value);
        warning
    }
}

/// First selector yielding a non-empty value wins.
async fn read_field<R: PageRenderer + ?Sized>(
    renderer: &mut R,
    listing: &ElementHandle,
    selectors: &[Selector],
) -> Result<Option<String>> {
    for selector in selectors {
        let Some(raw) = renderer.read(listing, selector).await? else {
            continue;
        };
        let value = match selector.source {
            Source::Text => collapse_whitespace(&raw),
            _ => raw.trim().to_string(),
        };
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
