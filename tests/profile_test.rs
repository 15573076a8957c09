//! Site profile and config loading
//!
//! Exercises the public loaders against the bundled profiles and
//! temporary files.

use listing_harvest::config::Config;
use listing_harvest::pagination::PaginationStrategy;
use listing_harvest::profile::SiteProfile;
use listing_harvest::{HarvestError, Harvester};
use std::path::PathBuf;
use tempfile::TempDir;

fn bundled(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("profiles")
        .join(name)
}

#[test]
fn test_bundled_profiles_are_valid() {
    let quickmart = SiteProfile::from_file(&bundled("quickmart.toml")).unwrap();
    let names: Vec<&str> = quickmart.obstacles.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["store-picker", "age-check"]);
    assert_eq!(quickmart.categories.len(), 2);

    let propertypro = SiteProfile::from_file(&bundled("propertypro.toml")).unwrap();
    assert!(matches!(
        propertypro.categories[0].pagination,
        PaginationStrategy::UrlTemplate { .. }
    ));

    let liquor = &quickmart.categories[1];
    assert_eq!(liquor.lazy_load.as_ref().map(|l| l.rounds), Some(1));

    let pamgolding = SiteProfile::from_file(&bundled("pamgolding.toml")).unwrap();
    let apartments = &pamgolding.categories[0];
    assert_eq!(apartments.effective_page_cap(150), 40);
    assert!(apartments.last_page.is_some());
}

#[test]
fn test_profile_from_tempfile() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("site.toml");
    std::fs::write(
        &path,
        r#"
[[categories]]
name = "Apartments"
seed_url = "https://www.pamgolding.co.za/property-search/apartments-for-sale/1"
pagination = { strategy = "single" }

[categories.selectors]
container = "a.pgp-property-image"
identity_field = "link"

[[categories.selectors.fields]]
name = "link"
selectors = [{ source = "attr:href" }]
"#,
    )
    .unwrap();

    let profile = SiteProfile::from_file(&path).unwrap();
    let category = &profile.categories[0];
    assert_eq!(category.selectors.identity_field, "link");
    assert_eq!(category.effective_page_cap(150), 150);
}

#[test]
fn test_missing_profile_is_profile_error() {
    let temp = TempDir::new().unwrap();
    let err = SiteProfile::from_file(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, HarvestError::ProfileError(_)));
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn test_malformed_profile_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "[[categories]]\nname = \"Foods\"\n").unwrap();

    assert!(SiteProfile::from_file(&path).is_err());
}

#[test]
fn test_config_file_feeds_harvester() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[run]
page_cap = 5
continue_on_obstacle_failure = true
delay_min_ms = 500
delay_max_ms = 900

[policy]
allowed_domains = ["quickmart.co.ke"]
disallowed_paths = ["/checkout"]
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.run.page_cap, 5);
    assert!(config.run.continue_on_obstacle_failure);
    assert_eq!(config.run.max_obstacle_attempts, 3);
    assert!(config.policy.check("https://www.quickmart.co.ke/checkout/1").is_err());

    let profile = SiteProfile::from_file(&bundled("quickmart.toml")).unwrap();
    let _harvester = Harvester::from_profile(&config, &profile);
    for category in &profile.categories {
        assert!(config.policy.check(&category.seed_url).is_ok());
    }
}

#[test]
fn test_inverted_delay_range_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[run]\ndelay_min_ms = 5000\ndelay_max_ms = 1000\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(matches!(config.validate(), Err(HarvestError::ConfigError(_))));
}
