//! 🏷️ Event classification: the file name is the routing slip.
//!
//! `identify_users.csv` is an identify file. `object_accounts.csv` is a set of
//! objects for the `accounts` collection. `foo_bar.csv` is a mistake, and we say
//! so out loud instead of guessing.
//!
//! 🧠 Knowledge graph:
//! - Prefixes are case-sensitive and must be followed by `_`.
//! - Only the last path segment is inspected, so object-store keys like
//!   `uploads/2024/track_1.csv` and Windows paths like `C:\exports\track_1.csv`
//!   route the same as `track_1.csv`, whatever platform we run on.
//! - The classifier never looks at row contents. The pipeline does that.

use std::fmt;

use crate::common::DestinationKey;
use crate::error::ClassificationError;

/// 🎭 The six fixed kinds plus the generic object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Identify,
    Track,
    Page,
    Screen,
    Group,
    Alias,
    Object,
}

impl EventKind {
    /// The six fixed kinds, in prefix-matching order.
    pub const FIXED: [EventKind; 6] = [
        EventKind::Identify,
        EventKind::Track,
        EventKind::Page,
        EventKind::Screen,
        EventKind::Group,
        EventKind::Alias,
    ];

    /// 🏷️ Lowercase wire name; also the file prefix without its underscore.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Identify => "identify",
            EventKind::Track => "track",
            EventKind::Page => "page",
            EventKind::Screen => "screen",
            EventKind::Group => "group",
            EventKind::Alias => "alias",
            EventKind::Object => "object",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 📋 What the classifier decided about one source name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: EventKind,
    /// Only set for [`EventKind::Object`].
    pub collection: Option<String>,
}

impl Classification {
    /// 🗂️ The queue buffer every row of this file lands in.
    pub fn destination(&self) -> DestinationKey {
        match &self.collection {
            Some(collection) => DestinationKey::collection(collection),
            None => DestinationKey::fixed(self.kind.as_str()),
        }
    }
}

/// 🔍 Map a source name to its event kind by prefix.
///
/// ```ignore
/// let c = classify("object_accounts.csv")?;
/// assert_eq!(c.collection.as_deref(), Some("accounts"));
/// ```
pub fn classify(source_name: &str) -> Result<Classification, ClassificationError> {
    let file_name = source_name.rsplit(['/', '\\']).next().unwrap_or(source_name);

    for kind in EventKind::FIXED {
        if file_name
            .strip_prefix(kind.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
        {
            return Ok(Classification {
                kind,
                collection: None,
            });
        }
    }

    if let Some(rest) = file_name.strip_prefix("object_") {
        // -- 🗃️ collection = up to the next underscore, or up to the extension when there is none
        let collection = match rest.find('_') {
            Some(end) => &rest[..end],
            None => rest.rsplit_once('.').map_or(rest, |(stem, _)| stem),
        };
        if collection.is_empty() {
            return Err(ClassificationError::MissingCollection {
                source_name: source_name.to_string(),
            });
        }
        return Ok(Classification {
            kind: EventKind::Object,
            collection: Some(collection.to_string()),
        });
    }

    Err(ClassificationError::UnrecognizedPrefix {
        source_name: source_name.to_string(),
    })
}
