use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One feed item summary decoded from an activity page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub post_id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    pub title: String,
}

/// `{ "story": { ... } }` as returned by the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryEnvelope {
    pub story: Option<DetailRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub media: Vec<AssetDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub resized_url: String,
}

impl AssetDescriptor {
    pub fn is_video(&self) -> bool {
        self.kind == "video"
    }

    /// Videos are fetched from the resized rendition, everything else from
    /// the original.
    pub fn source_url(&self) -> &str {
        if self.is_video() {
            &self.resized_url
        } else {
            &self.original_url
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
