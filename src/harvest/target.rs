//! Harvest targets and the stage each one is processed in

use crate::harvest::extract::brand_from_url;
use std::fmt;

/// Which kind of page a target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Brand index (`makers.php3`), yields brand listings
    Discovery,
    /// Brand listing page, yields detail pages and the next listing page
    Listing,
    /// Phone detail page, yields one record
    Detail,
}

impl Stage {
    /// Guesses the stage of a configured seed from its URL
    pub fn for_seed(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last = path.rsplit('/').next().unwrap_or(path);

        if last.starts_with("makers") || last.is_empty() {
            Self::Discovery
        } else if last.contains("-phones-") {
            Self::Listing
        } else {
            Self::Detail
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Listing => "listing",
            Self::Detail => "detail",
        };
        f.write_str(name)
    }
}

/// One URL to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Absolute URL, used verbatim as the dedup key
    pub url: String,
    pub stage: Stage,
    /// Brand inherited from the listing the target was found on
    pub brand: Option<String>,
    /// 1-based attempt number
    pub attempt: u32,
}

impl Target {
    pub fn new(url: impl Into<String>, stage: Stage, brand: Option<String>) -> Self {
        Self {
            url: url.into(),
            stage,
            brand,
            attempt: 1,
        }
    }

    /// Target for a configured seed URL
    pub fn seed(url: impl Into<String>) -> Self {
        let url = url.into();
        let stage = Stage::for_seed(&url);
        let brand = match stage {
            Stage::Discovery => None,
            Stage::Listing | Stage::Detail => brand_from_url(&url),
        };
        Self::new(url, stage, brand)
    }

    /// Brand listing target; the brand comes from the listing URL
    pub fn listing(url: impl Into<String>) -> Self {
        let url = url.into();
        let brand = brand_from_url(&url);
        Self::new(url, Stage::Listing, brand)
    }

    pub fn detail(url: impl Into<String>, brand: Option<String>) -> Self {
        Self::new(url, Stage::Detail, brand)
    }

    /// The same target for its next attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}
