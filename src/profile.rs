//! Per-site data: obstacle registry, categories and their selector maps.

use crate::extractor::SelectorMap;
use crate::obstacle::ObstacleSpec;
use crate::pagination::PaginationStrategy;
use crate::renderer::Selector;
use crate::timeouts::ms;
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// One logical scrape target. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub seed_url: String,
    /// Overrides `run.page_cap` for this category.
    #[serde(default)]
    pub page_cap: Option<u32>,
    pub pagination: PaginationStrategy,
    pub selectors: SelectorMap,
    /// Scroll before every extraction so lazily rendered listings appear.
    #[serde(default)]
    pub lazy_load: Option<LazyLoad>,
    /// Page links on the first page; the last match's value (e.g.
    /// `attr:data-pagenumber`) lowers the page cap to the site's last page.
    #[serde(default)]
    pub last_page: Option<Selector>,
}

impl Category {
    pub fn effective_page_cap(&self, default: u32) -> u32 {
        self.page_cap.unwrap_or(default)
    }
}

/// Scroll-to-bottom rounds, each followed by a settle wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyLoad {
    #[serde(default = "default_scroll_rounds")]
    pub rounds: u32,
    #[serde(default = "default_scroll_settle")]
    pub settle_ms: u64,
}

fn default_scroll_rounds() -> u32 {
    1
}

fn default_scroll_settle() -> u64 {
    ms::LAZY_SETTLE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Base for resolving relative detail links. Defaults to the page URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleSpec>,
    pub categories: Vec<Category>,
}

impl SiteProfile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::ProfileError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let profile = Self::parse(&content)?;
        tracing::debug!(
            "loaded profile {} with {} categories",
            path.display(),
            profile.categories.len()
        );
        Ok(profile)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let profile: Self = toml::from_str(content)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(HarvestError::ProfileError("profile declares no categories".into()));
        }

        if let Some(base) = &self.base_url {
            Url::parse(base)
                .map_err(|e| HarvestError::ProfileError(format!("base_url '{}': {}", base, e)))?;
        }

        let mut obstacle_names = HashSet::new();
        for spec in &self.obstacles {
            if spec.name.trim().is_empty() {
                return Err(HarvestError::ProfileError("obstacle with empty name".into()));
            }
            if !obstacle_names.insert(spec.name.as_str()) {
                return Err(HarvestError::ProfileError(format!(
                    "obstacle '{}' declared twice",
                    spec.name
                )));
            }
        }

        let mut names = HashSet::new();
        for category in &self.categories {
            let name = category.name.trim();
            if name.is_empty() {
                return Err(HarvestError::ProfileError("category with empty name".into()));
            }
            if !names.insert(name) {
                return Err(HarvestError::ProfileError(format!(
                    "category '{}' declared twice",
                    name
                )));
            }
            Url::parse(&category.seed_url).map_err(|e| {
                HarvestError::ProfileError(format!(
                    "category '{}': seed_url '{}': {}",
                    name, category.seed_url, e
                ))
            })?;
            if category.page_cap == Some(0) {
                return Err(HarvestError::ProfileError(format!(
                    "category '{}': page_cap must be at least 1",
                    name
                )));
            }
            if category.lazy_load.as_ref().is_some_and(|l| l.rounds == 0) {
                return Err(HarvestError::ProfileError(format!(
                    "category '{}': lazy_load.rounds must be at least 1",
                    name
                )));
            }
            if category.last_page.as_ref().is_some_and(|s| s.css.trim().is_empty()) {
                return Err(HarvestError::ProfileError(format!(
                    "category '{}': last_page needs a css selector",
                    name
                )));
            }
            category
                .pagination
                .validate()
                .and_then(|_| category.selectors.validate())
                .map_err(|e| match e {
                    HarvestError::ProfileError(msg) => {
                        HarvestError::ProfileError(format!("category '{}': {}", name, msg))
                    }
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Categories to run, in profile order. An empty filter selects all.
    pub fn select(&self, only: &[String]) -> Result<Vec<Category>> {
        if only.is_empty() {
            return Ok(self.categories.clone());
        }
        if let Some(unknown) = only
            .iter()
            .find(|n| !self.categories.iter().any(|c| &c.name == *n))
        {
            return Err(HarvestError::ProfileError(format!(
                "unknown category '{}'",
                unknown
            )));
        }
        Ok(self
            .categories
            .iter()
            .filter(|c| only.contains(&c.name))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Source;

    const PROFILE: &str = r##"
base_url = "https://www.quickmart.co.ke"

[[obstacles]]
name = "store-picker"
detection = { kind = "visible", selector = "#shopPopupJs" }
resolution = { action = "click", selector = "#shopPopupJs .btn-continue" }
confirmation = { kind = "hidden", selector = "#shopPopupJs" }

[[categories]]
name = "Foods"
seed_url = "https://www.quickmart.co.ke/foods"
page_cap = 40
pagination = { strategy = "script", function = "changePage", next_selector = "li.next a" }

[categories.selectors]
container = ".products-wrapper .product"

[[categories.selectors.fields]]
name = "name"
selectors = [{ css = ".products-title" }, { css = ".product-name" }]

[[categories.selectors.fields]]
name = "url"
selectors = [{ css = "a", source = "attr:href" }]

[[categories]]
name = "Liquor"
seed_url = "https://www.quickmart.co.ke/liquor"
pagination = { strategy = "click", next_selector = "li.next a" }

[categories.selectors]
container = ".product"

[[categories.selectors.fields]]
name = "url"
selectors = [{ source = "attr:href" }]
"##;

    #[test]
    fn test_parse_profile() {
        let profile = SiteProfile::parse(PROFILE).unwrap();
        assert_eq!(profile.obstacles.len(), 1);
        assert_eq!(profile.categories.len(), 2);

        let foods = &profile.categories[0];
        assert_eq!(foods.effective_page_cap(150), 40);
        assert_eq!(foods.selectors.identity_field, "url");
        assert_eq!(foods.selectors.fields[0].selectors.len(), 2);

        let liquor = &profile.categories[1];
        assert_eq!(liquor.effective_page_cap(150), 150);
        let own_link = &liquor.selectors.fields[0].selectors[0];
        assert!(own_link.css.is_empty());
        assert_eq!(own_link.source, Source::Attr("href".into()));
    }

    #[test]
    fn test_lazy_load_and_last_page() {
        let extended = PROFILE.replace(
            "page_cap = 40\n",
            "page_cap = 40\nlazy_load = { rounds = 2 }\nlast_page = { css = \".pagination a.pageNumber\", source = \"attr:data-pagenumber\" }\n",
        );
        let profile = SiteProfile::parse(&extended).unwrap();

        let foods = &profile.categories[0];
        let lazy = foods.lazy_load.as_ref().unwrap();
        assert_eq!(lazy.rounds, 2);
        assert_eq!(lazy.settle_ms, 3000);
        assert_eq!(
            foods.last_page,
            Some(Selector::attr(".pagination a.pageNumber", "data-pagenumber"))
        );
        assert!(profile.categories[1].lazy_load.is_none());
        assert!(profile.categories[1].last_page.is_none());
    }

    #[test]
    fn test_zero_scroll_rounds_rejected() {
        let bad = PROFILE.replace("page_cap = 40\n", "page_cap = 40\nlazy_load = { rounds = 0 }\n");
        let err = SiteProfile::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("lazy_load.rounds"));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let doubled = PROFILE.replace("name = \"Liquor\"", "name = \"Foods\"");
        let err = SiteProfile::parse(&doubled).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_bad_seed_url_rejected() {
        let bad = PROFILE.replace("https://www.quickmart.co.ke/liquor", "liquor");
        let err = SiteProfile::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("Liquor"));
    }

    #[test]
    fn test_identity_field_must_be_declared() {
        let bad = PROFILE.replace(
            "container = \".product\"",
            "container = \".product\"\nidentity_field = \"link\"",
        );
        let err = SiteProfile::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("identity field 'link'"));
    }

    #[test]
    fn test_select_filters_in_profile_order() {
        let profile = SiteProfile::parse(PROFILE).unwrap();
        let picked = profile
            .select(&["Liquor".to_string(), "Foods".to_string()])
            .unwrap();
        let names: Vec<&str> = picked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Foods", "Liquor"]);

        assert!(profile.select(&["Bakery".to_string()]).is_err());
        assert_eq!(profile.select(&[]).unwrap().len(), 2);
    }
}
