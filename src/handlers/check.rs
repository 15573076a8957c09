use crate::{Result, config::Config, output, profile::SiteProfile};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub seed_url: String,
    pub page_cap: u32,
    pub strategy: String,
    pub fields: Vec<String>,
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileCheck {
    pub obstacles: Vec<String>,
    pub categories: Vec<CategorySummary>,
}

impl output::OutputFormatter for ProfileCheck {
    fn format_text(&self) -> String {
        use crate::output::text;

        let mut lines = vec![text::success(&format!(
            "Profile valid: {} categories, {} obstacles",
            self.categories.len(),
            self.obstacles.len()
        ))];

        if !self.obstacles.is_empty() {
            lines.push(text::section("Obstacles"));
            lines.extend(self.obstacles.iter().map(|o| text::bullet(o)));
        }

        lines.push(text::section("Categories"));
        for c in &self.categories {
            let line = format!(
                "{} [{} / cap {}] {}",
                c.name,
                c.strategy,
                c.page_cap,
                c.fields.join(", ")
            );
            lines.push(if c.allowed {
                text::bullet(&line)
            } else {
                text::warning(&format!("{} (seed rejected by policy)", line))
            });
        }
        lines.join("\n")
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

pub fn handle_check(config: &Config, profile_path: &Path) -> Result<ProfileCheck> {
    let profile = SiteProfile::from_file(profile_path)?;

    let categories = profile
        .categories
        .iter()
        .map(|c| CategorySummary {
            name: c.name.clone(),
            seed_url: c.seed_url.clone(),
            page_cap: c.effective_page_cap(config.run.page_cap),
            strategy: strategy_name(&c.pagination).to_string(),
            fields: c.selectors.field_names().map(str::to_string).collect(),
            allowed: config.policy.check(&c.seed_url).is_ok(),
        })
        .collect();

    Ok(ProfileCheck {
        obstacles: profile.obstacles.iter().map(|o| o.name.clone()).collect(),
        categories,
    })
}

fn strategy_name(strategy: &crate::pagination::PaginationStrategy) -> &'static str {
    use crate::pagination::PaginationStrategy::*;
    match strategy {
        UrlTemplate { .. } => "url_template",
        Click { .. } => "click",
        Script { .. } => "script",
        Single => "single",
    }
}
