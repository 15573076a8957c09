use crate::config::UrlPolicy;
use crate::{HarvestError, Result};
use url::Url;

impl UrlPolicy {
    pub fn allows(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        if !self.allowed_domains.is_empty() {
            let Some(host) = url.host_str() else {
                return false;
            };
            let host = host.to_ascii_lowercase();
            let permitted = self.allowed_domains.iter().any(|d| {
                let d = d.trim_start_matches('.').to_ascii_lowercase();
                host == d || host.ends_with(&format!(".{}", d))
            });
            if !permitted {
                return false;
            }
        }

        let path_and_query = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        !self
            .disallowed_paths
            .iter()
            .any(|p| path_and_query.starts_with(p.as_str()))
    }

    /// Parses `raw` and rejects it when the policy forbids it.
    pub fn check(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).map_err(|_| HarvestError::Disallowed(raw.to_string()))?;
        if self.allows(&url) {
            Ok(url)
        } else {
            Err(HarvestError::Disallowed(raw.to_string()))
        }
    }
}

/// Resolves a possibly relative link against `base`.
pub fn resolve_link(base: &str, link: &str) -> Option<Url> {
    match Url::parse(link) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(link).ok(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> UrlPolicy {
        UrlPolicy {
            allowed_domains: vec!["propertypro.co.ke".into()],
            disallowed_paths: vec![
                "/admin".into(),
                "/property-search".into(),
                "/property-for-rent?sort=".into(),
            ],
        }
    }

    #[test]
    fn test_empty_policy_allows_any_http() {
        let p = UrlPolicy::default();
        assert!(p.check("https://www.quickmart.co.ke/foods").is_ok());
        assert!(p.check("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_domain_allow_list_includes_subdomains() {
        let p = policy();
        assert!(p.check("https://www.propertypro.co.ke/property-for-rent").is_ok());
        assert!(p.check("https://propertypro.co.ke/property-for-rent").is_ok());
        assert!(p.check("https://evilpropertypro.co.ke/").is_err());
        assert!(p.check("https://example.com/").is_err());
    }

    #[test]
    fn test_disallowed_paths() {
        let p = policy();
        assert!(p.check("https://www.propertypro.co.ke/admin/login").is_err());
        assert!(p.check("https://www.propertypro.co.ke/property-search/x").is_err());
        assert!(p
            .check("https://www.propertypro.co.ke/property-for-rent?sort=price")
            .is_err());
        assert!(p
            .check("https://www.propertypro.co.ke/property-for-rent?page=2")
            .is_ok());
    }

    #[test]
    fn test_unparseable_is_rejected() {
        assert!(matches!(
            UrlPolicy::default().check("not a url"),
            Err(HarvestError::Disallowed(_))
        ));
    }

    #[test]
    fn test_resolve_link() {
        let base = "https://www.pamgolding.co.za/property-search/apartments/119";
        assert_eq!(
            resolve_link(base, "/property/123").unwrap().as_str(),
            "https://www.pamgolding.co.za/property/123"
        );
        assert_eq!(
            resolve_link(base, "https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
        assert!(resolve_link("about:blank", "/x").is_none());
    }
}
