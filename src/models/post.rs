//! Post, user, and comment records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostType {
    #[default]
    Regular,
    Video,
    Short,
    Repost,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Regular => "REGULAR",
            PostType::Video => "VIDEO",
            PostType::Short => "SHORT",
            PostType::Repost => "REPOST",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGULAR" => Ok(PostType::Regular),
            "VIDEO" => Ok(PostType::Video),
            "SHORT" => Ok(PostType::Short),
            "REPOST" => Ok(PostType::Repost),
            other => Err(format!("unknown post type: {other}")),
        }
    }
}

/// A post row ready for insertion; `id` and `date_collected` are assigned by
/// the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub platform: String,
    /// Provider-side identifier, unique within a store.
    pub platform_id: String,
    pub post_url: Option<String>,
    pub date_created: DateTime<Utc>,
    pub post_type: PostType,
    /// Structured raw record as the provider returned it.
    pub content: Value,
    /// Caller-owned structured annotations; may be empty.
    pub metadata_content: Option<Value>,
    pub collection_task_id: Option<i64>,
}

/// A persisted post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub platform: String,
    pub platform_id: String,
    pub post_url: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_collected: DateTime<Utc>,
    pub post_type: PostType,
    pub content: Value,
    pub metadata_content: Option<Value>,
    pub collection_task_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub platform: String,
    pub platform_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub platform: String,
    pub platform_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub date_created: Option<DateTime<Utc>>,
    pub content: String,
    pub date_collected: DateTime<Utc>,
    pub post_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PostType::Regular, "REGULAR")]
    #[case(PostType::Video, "VIDEO")]
    #[case(PostType::Short, "SHORT")]
    #[case(PostType::Repost, "REPOST")]
    fn post_type_round_trips(#[case] post_type: PostType, #[case] label: &str) {
        assert_eq!(post_type.as_str(), label);
        assert_eq!(label.parse::<PostType>().unwrap(), post_type);
    }

    #[test]
    fn default_post_type_is_regular() {
        assert_eq!(PostType::default(), PostType::Regular);
    }
}
