//! Typed views over the upstream catalog payloads.
//!
//! Upstream items are kept as raw `serde_json::Value` inside tree nodes so the
//! navigation view can show them for diagnostics. The structs here are the
//! typed lens used to pull ids, labels and videos out of those values; unknown
//! fields are ignored and every label field is optional.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// The seven hierarchy depths, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogLevel {
    Class,
    Branch,
    Product,
    Season,
    Episode,
    Test,
    Teacher,
}

impl CatalogLevel {
    pub const ALL: [CatalogLevel; 7] = [
        Self::Class,
        Self::Branch,
        Self::Product,
        Self::Season,
        Self::Episode,
        Self::Test,
        Self::Teacher,
    ];

    /// Nesting depth, 0 for classes through 6 for teachers.
    pub fn depth(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.depth() as usize + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Branch => "branch",
            Self::Product => "product",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::Test => "test",
            Self::Teacher => "teacher",
        }
    }
}

/// Lookup entity (class or branch) returned by `ProductLookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<String>,
}

/// Product, season, episode, test or teacher.
///
/// Products carry `name`, teachers sometimes only `solverLabel`; everything
/// else uses `title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub solver_label: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub video_contents: Vec<VideoContent>,
}

impl ContentItem {
    pub fn label(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .or(self.solver_label.as_deref())
    }

    /// Playable ids attached to this item, skipping blank `sourceUrl`s.
    pub fn video_ids(&self) -> Vec<String> {
        self.video_contents
            .iter()
            .filter_map(|video| video.source_url.as_deref())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A playable unit. `source_url` is handed to the player untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContent {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub source_url: Option<String>,
}

// Upstream sends `null` or odd types for optional fields; treat both as absent
// instead of rejecting the whole item.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

// Keeps the entries that parse; anything but an array is an empty list.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Reads the `videoContents` array straight from a raw upstream item.
///
/// Used as the last resort when a node's child fetch comes back empty.
pub fn embedded_video_ids(raw: &Value) -> Vec<String> {
    raw.get("videoContents")
        .and_then(Value::as_array)
        .map(|videos| {
            videos
                .iter()
                .filter_map(|video| video.get("sourceUrl").and_then(Value::as_str))
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
