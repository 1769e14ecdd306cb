//! HTML extraction for the three page kinds
//!
//! This module turns fetched pages into follow-up targets and records:
//! - Brand index: links to brand listing pages
//! - Brand listing: detail page links and the "next page" link
//! - Detail page: model name and specification table

use crate::output::PhoneRecord;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// Release date used when the page does not state one
pub const UNKNOWN: &str = "Unknown";

/// Links found on a brand listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Absolute detail page URLs, in page order
    pub phones: Vec<String>,
    /// Absolute URL of the next listing page
    pub next_page: Option<String>,
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(css, error = ?e, "Invalid selector");
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts brand listing links from the brand index
///
/// # Arguments
///
/// * `html` - The brand index HTML
/// * `base_url` - The page URL for resolving relative links
///
/// # Returns
///
/// Absolute URLs of `.php` brand pages, without duplicates
pub fn extract_brand_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(links) = selector(".st-text a[href]") else {
        return Vec::new();
    };

    let mut brands = Vec::new();
    for element in document.select(&links) {
        let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) else {
            continue;
        };
        if url.contains(".php") && !brands.contains(&url) {
            brands.push(url);
        }
    }
    brands
}

/// Extracts detail links and pagination from a brand listing
pub fn extract_listing(html: &str, base_url: &Url) -> ListingPage {
    let document = Html::parse_document(html);
    let mut page = ListingPage::default();

    if let Some(phones) = selector(".makers li a[href]") {
        for element in document.select(&phones) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
                if !page.phones.contains(&url) {
                    page.phones.push(url);
                }
            }
        }
    }

    if let Some(nav) = selector(".nav-pages a[href]") {
        page.next_page = document
            .select(&nav)
            .find(|a| {
                let title = a.value().attr("title").unwrap_or_default();
                element_text(*a).to_lowercase().contains("next")
                    || title.to_lowercase().contains("next")
            })
            .and_then(|a| a.value().attr("href"))
            .and_then(|h| resolve_link(h, base_url));
    }

    page
}

/// Builds a record from a phone detail page
///
/// Returns `None` when the page has no `#specs-list` table.
///
/// # Arguments
///
/// * `html` - The detail page HTML
/// * `url` - The detail page URL, stored in the record
/// * `brand` - Brand from the listing the page was found on
pub fn extract_phone(html: &str, url: &str, brand: Option<&str>) -> Option<PhoneRecord> {
    let document = Html::parse_document(html);

    let specs_list = selector("#specs-list")?;
    let table = document.select(&specs_list).next()?;

    let rows = selector("table tr")?;
    let label = selector(".ttl")?;
    let value = selector(".nfo")?;

    let mut specs = BTreeMap::new();
    for row in table.select(&rows) {
        let key = row.select(&label).next().map(element_text).unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let val = row.select(&value).next().map(element_text).unwrap_or_default();
        specs.insert(key, val);
    }

    let model_name = selector(".specs-phone-name-title")
        .and_then(|s| document.select(&s).next().map(element_text))
        .unwrap_or_default();

    let brand = brand
        .map(str::to_string)
        .or_else(|| brand_from_detail_url(url))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let release_date = release_date(&specs);

    Some(PhoneRecord::new(model_name, brand, release_date, url, specs))
}

/// Picks the release date from the specification table
///
/// Uses `Released` when present, otherwise the text after "Released" in
/// `Status` (e.g. `Available. Released 2023, September 22`).
pub fn release_date(specs: &BTreeMap<String, String>) -> String {
    if let Some(released) = specs.get("Released").filter(|v| !v.trim().is_empty()) {
        return released.trim().to_string();
    }

    specs
        .get("Status")
        .and_then(|status| status.split_once("Released"))
        .map(|(_, rest)| rest.trim().trim_start_matches(':').trim().to_string())
        .filter(|date| !date.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Derives the brand from a brand listing URL
///
/// `https://www.gsmarena.com/apple-phones-48.php` → `Apple`,
/// `.../sony_ericsson-phones-19.php` → `Sony Ericsson`.
pub fn brand_from_url(url: &str) -> Option<String> {
    let last = last_segment(url)?;
    let (slug, _) = last.split_once("-phones-")?;
    title_case(slug)
}

/// Brand guess for a detail page reached without a listing
fn brand_from_detail_url(url: &str) -> Option<String> {
    let last = last_segment(url)?;
    let slug = last.split('_').next()?;
    if slug == last {
        return None;
    }
    title_case(slug)
}

fn last_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

fn title_case(slug: &str) -> Option<String> {
    let words: Vec<String> = slug
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None for empty, fragment-only and non-HTTP(S) links.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("tel:") {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}

/// Returns true if `url` points at one of `allowed` hosts
///
/// An empty list allows every host.
pub fn is_allowed_host(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }

    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| allowed.iter().any(|d| d.eq_ignore_ascii_case(&host)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.gsmarena.com/makers.php3").unwrap()
    }

    const MAKERS: &str = r##"
        <html><body>
        <div class="st-text"><table><tr>
          <td><a href="apple-phones-48.php">Apple<br><span>98 devices</span></a></td>
          <td><a href="samsung-phones-9.php">Samsung<br><span>1400 devices</span></a></td>
          <td><a href="apple-phones-48.php">Apple again</a></td>
          <td><a href="#top">Top</a></td>
        </tr></table></div>
        <a href="news.php3">News</a>
        </body></html>
    "##;

    const LISTING: &str = r#"
        <html><body>
        <div class="makers"><ul>
          <li><a href="apple_iphone_15-12559.php"><strong>iPhone 15</strong></a></li>
          <li><a href="apple_iphone_15_pro-12557.php"><strong>iPhone 15 Pro</strong></a></li>
        </ul></div>
        <div class="nav-pages">
          <a href="apple-phones-f-48-0-p1.php">1</a>
          <a class="prevnextbutton" href="apple-phones-f-48-0-p2.php" title="Next page">&#9658;</a>
        </div>
        </body></html>
    "#;

    const DETAIL: &str = r#"
        <html><body>
        <h1 class="specs-phone-name-title">Apple iPhone 15</h1>
        <div id="specs-list">
          <table><tr><th>Launch</th><td class="ttl">Announced</td><td class="nfo">2023, September 12</td></tr>
          <tr><td class="ttl">Status</td><td class="nfo">Available. Released 2023, September 22</td></tr></table>
          <table><tr><td class="ttl">Weight</td><td class="nfo">171 g</td></tr>
          <tr><td class="ttl">&nbsp;</td><td class="nfo">orphan</td></tr></table>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_extract_brand_links() {
        let links = extract_brand_links(MAKERS, &base());
        assert_eq!(
            links,
            vec![
                "https://www.gsmarena.com/apple-phones-48.php",
                "https://www.gsmarena.com/samsung-phones-9.php"
            ]
        );
    }

    #[test]
    fn test_extract_listing() {
        let base = Url::parse("https://www.gsmarena.com/apple-phones-48.php").unwrap();
        let page = extract_listing(LISTING, &base);

        assert_eq!(page.phones.len(), 2);
        assert_eq!(
            page.phones[0],
            "https://www.gsmarena.com/apple_iphone_15-12559.php"
        );
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://www.gsmarena.com/apple-phones-f-48-0-p2.php")
        );
    }

    #[test]
    fn test_listing_without_next_page() {
        let html = r#"<div class="makers"><ul><li><a href="a_b-1.php">B</a></li></ul></div>
                      <div class="nav-pages"><a href="p1.php">1</a></div>"#;
        let page = extract_listing(html, &base());
        assert_eq!(page.phones.len(), 1);
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_extract_phone() {
        let url = "https://www.gsmarena.com/apple_iphone_15-12559.php";
        let record = extract_phone(DETAIL, url, Some("Apple")).unwrap();

        assert_eq!(record.model_name, "Apple iPhone 15");
        assert_eq!(record.brand, "Apple");
        assert_eq!(record.url, url);
        assert_eq!(record.release_date, "2023, September 22");
        assert_eq!(record.specs.get("Weight").map(String::as_str), Some("171 g"));
        assert_eq!(record.specs.len(), 3);
    }

    #[test]
    fn test_extract_phone_brand_fallback() {
        let url = "https://www.gsmarena.com/apple_iphone_15-12559.php";
        let record = extract_phone(DETAIL, url, None).unwrap();
        assert_eq!(record.brand, "Apple");
    }

    #[test]
    fn test_extract_phone_requires_specs_table() {
        let html = r#"<h1 class="specs-phone-name-title">Nothing</h1>"#;
        assert!(extract_phone(html, "https://www.gsmarena.com/x.php", None).is_none());
    }

    #[test]
    fn test_release_date_preference() {
        let mut specs = BTreeMap::new();
        assert_eq!(release_date(&specs), UNKNOWN);

        specs.insert("Status".to_string(), "Coming soon. Exp. release 2025".to_string());
        assert_eq!(release_date(&specs), UNKNOWN);

        specs.insert("Status".to_string(), "Available. Released 2024, March".to_string());
        assert_eq!(release_date(&specs), "2024, March");

        specs.insert("Released".to_string(), "2024, March 3".to_string());
        assert_eq!(release_date(&specs), "2024, March 3");
    }

    #[test]
    fn test_brand_from_url() {
        assert_eq!(
            brand_from_url("https://www.gsmarena.com/apple-phones-48.php").as_deref(),
            Some("Apple")
        );
        assert_eq!(
            brand_from_url("https://www.gsmarena.com/sony_ericsson-phones-19.php").as_deref(),
            Some("Sony Ericsson")
        );
        assert_eq!(
            brand_from_url("https://www.gsmarena.com/apple_iphone_15-12559.php"),
            None
        );
    }

    #[test]
    fn test_resolve_link() {
        assert_eq!(
            resolve_link("/apple-phones-48.php", &base()).as_deref(),
            Some("https://www.gsmarena.com/apple-phones-48.php")
        );
        assert!(resolve_link("javascript:void(0)", &base()).is_none());
        assert!(resolve_link("#specs", &base()).is_none());
        assert!(resolve_link("ftp://files.example.com/x", &base()).is_none());
    }

    #[test]
    fn test_is_allowed_host() {
        let allowed = vec!["www.gsmarena.com".to_string(), "gsmarena.com".to_string()];
        assert!(is_allowed_host("https://www.gsmarena.com/a.php", &allowed));
        assert!(is_allowed_host("https://GSMARENA.com/a.php", &allowed));
        assert!(!is_allowed_host("https://m.gsmarena.com/a.php", &allowed));
        assert!(!is_allowed_host("not a url", &allowed));
        assert!(is_allowed_host("https://anything.example/", &[]));
    }
}
