//! Bundled sample catalog used when the relay or upstream cannot be reached.
//!
//! Selection is a priority-ordered table of URL substrings. The first rule
//! whose needle occurs in the request URL wins. `VideoSolution` URLs look the
//! same for episodes, tests and teachers, so that row defers to the level the
//! caller asked for.

use serde_json::Value;
use tracing::warn;

use crate::catalog::extract_items;
use crate::models::CatalogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSet {
    Classes,
    Branches,
    Products,
    Seasons,
    Episodes,
    Tests,
    Teachers,
}

impl SampleSet {
    fn source(self) -> &'static str {
        match self {
            Self::Classes => include_str!("../fixtures/classes.json"),
            Self::Branches => include_str!("../fixtures/branches.json"),
            Self::Products => include_str!("../fixtures/products.json"),
            Self::Seasons => include_str!("../fixtures/seasons.json"),
            Self::Episodes => include_str!("../fixtures/episodes.json"),
            Self::Tests => include_str!("../fixtures/tests.json"),
            Self::Teachers => include_str!("../fixtures/teachers.json"),
        }
    }

    /// Parsed items of the fixture, unwrapped from its envelope.
    pub fn items(self) -> Vec<Value> {
        match serde_json::from_str::<Value>(self.source()) {
            Ok(value) => extract_items(value),
            Err(err) => {
                warn!(set = ?self, %err, "bundled sample fixture is not valid JSON");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pick {
    Fixed(SampleSet),
    ByLevel,
}

const FALLBACK_RULES: [(&str, Pick); 5] = [
    ("TypeKey=class", Pick::Fixed(SampleSet::Classes)),
    ("TypeKey=branch", Pick::Fixed(SampleSet::Branches)),
    ("/Product?", Pick::Fixed(SampleSet::Products)),
    ("ParentId=0&", Pick::Fixed(SampleSet::Seasons)),
    ("VideoSolution", Pick::ByLevel),
];

/// Chooses the sample set for a failed request, or `None` when no rule
/// matches.
pub fn select_fallback(url: &str, level: CatalogLevel) -> Option<SampleSet> {
    let (_, pick) = FALLBACK_RULES
        .iter()
        .find(|(needle, _)| url.contains(*needle))?;
    Some(match *pick {
        Pick::Fixed(set) => set,
        Pick::ByLevel => match level {
            CatalogLevel::Test => SampleSet::Tests,
            CatalogLevel::Teacher => SampleSet::Teachers,
            _ => SampleSet::Episodes,
        },
    })
}

/// Fallback items for `url`; empty when nothing matches.
pub fn fallback_items(url: &str, level: CatalogLevel) -> Vec<Value> {
    select_fallback(url, level)
        .map(SampleSet::items)
        .unwrap_or_default()
}
