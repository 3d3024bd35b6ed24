//! Record normalization
//!
//! A raw record is a tweet-shaped JSON object. Normalization keeps only what
//! the graph needs: ids, author, mentions, engagement counts and a
//! lexically sortable creation time. Mentioned handles are stripped from the
//! text because they are carried as structured data instead.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{IngestError, Result};

/// Wire format of `created_at` in raw records (`Wed Jan 07 11:06:08 +0000 2015`).
pub const RAW_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Normalized creation time format. Sorts lexically in time order.
pub const NORMALIZED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An author as referenced by a message: its poster or someone it mentions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub name: String,
    pub screen_name: String,
}

/// One normalized message: a row of a thread table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub is_rumour: bool,
    /// Text with mentioned handles removed.
    pub text: String,
    /// `None` marks a message that replies to nothing (a thread root).
    pub in_reply_to_id: Option<String>,
    pub author: AuthorRef,
    pub retweet_count: u64,
    pub favorite_count: u64,
    /// Creation time in [`NORMALIZED_TIME_FORMAT`].
    pub created_at: String,
    #[serde(default)]
    pub mentions: Vec<AuthorRef>,
}

/// Normalize one raw record.
///
/// `locator` names the record's origin (usually its file path) and is only
/// used in error messages. `is_rumour` comes from the dataset layout, never
/// from the record content.
pub fn normalize_record(raw: &Value, is_rumour: bool, locator: &str) -> Result<MessageRecord> {
    if !raw.is_object() {
        return Err(IngestError::malformed(locator, "record is not a JSON object"));
    }

    let id = id_field(raw, "id").ok_or_else(|| IngestError::malformed(locator, "missing id"))?;
    let in_reply_to_id = id_field(raw, "in_reply_to_status_id");

    let user = raw
        .get("user")
        .filter(|u| u.is_object())
        .ok_or_else(|| IngestError::malformed(locator, "missing user"))?;
    let author = author_ref(user).ok_or_else(|| {
        IngestError::malformed(locator, "user is missing id or screen_name")
    })?;

    let raw_created = raw
        .get("created_at")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::malformed(locator, "missing created_at"))?;
    let created_at = normalize_timestamp(raw_created).ok_or_else(|| {
        IngestError::malformed(locator, format!("unparseable created_at {raw_created:?}"))
    })?;

    let mut mentions = Vec::new();
    if let Some(list) = raw
        .get("entities")
        .and_then(|e| e.get("user_mentions"))
        .and_then(Value::as_array)
    {
        for mention in list {
            match author_ref(mention) {
                Some(m) => mentions.push(m),
                None => tracing::debug!(locator, "skipping mention without id/screen_name"),
            }
        }
    }

    let text = raw.get("text").and_then(Value::as_str).unwrap_or_default();
    let text = strip_mentions(text, &mentions);

    Ok(MessageRecord {
        id,
        is_rumour,
        text,
        in_reply_to_id,
        author,
        retweet_count: count_field(raw, "retweet_count", locator)?,
        favorite_count: count_field(raw, "favorite_count", locator)?,
        created_at,
        mentions,
    })
}

/// Re-render a raw `created_at` value in [`NORMALIZED_TIME_FORMAT`].
///
/// The wall-clock time is kept in the record's own offset.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_str(raw.trim(), RAW_TIME_FORMAT).ok()?;
    Some(parsed.format(NORMALIZED_TIME_FORMAT).to_string())
}

/// Remove every `@handle` of the given mentions, then collapse whitespace.
///
/// Text without mentions is returned unchanged.
pub fn strip_mentions(text: &str, mentions: &[AuthorRef]) -> String {
    if mentions.is_empty() {
        return text.to_string();
    }
    let mut out = text.to_string();
    for mention in mentions {
        out = out.replace(&format!("@{}", mention.screen_name), "");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read an identifier, preferring the `<key>_str` twin that tweet payloads
/// carry for 64-bit ids.
fn id_field(obj: &Value, key: &str) -> Option<String> {
    if let Some(s) = obj.get(format!("{key}_str")).and_then(Value::as_str) {
        return Some(s.to_string());
    }
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn author_ref(obj: &Value) -> Option<AuthorRef> {
    let id = id_field(obj, "id")?;
    let screen_name = obj.get("screen_name").and_then(Value::as_str)?;
    if screen_name.is_empty() {
        return None;
    }
    let name = obj.get("name").and_then(Value::as_str).unwrap_or(screen_name);
    Some(AuthorRef {
        id,
        name: name.to_string(),
        screen_name: screen_name.to_string(),
    })
}

fn count_field(obj: &Value, key: &str, locator: &str) -> Result<u64> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| IngestError::malformed(locator, format!("{key} is not a non-negative integer"))),
    }
}
