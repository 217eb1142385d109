use std::collections::{HashMap, HashSet};

use crate::errors::StorageError;
use crate::models::feed::Feed;
use crate::storage::{blocking, SharedStore};

use super::parser::ParsedEntry;

/// Entries in `parsed` whose GUID is not in `existing`.
///
/// Input order is kept. A GUID repeated within `parsed` yields one entry, the
/// last occurrence, placed where that GUID first appeared.
pub fn new_entries(parsed: Vec<ParsedEntry>, existing: &HashSet<String>) -> Vec<ParsedEntry> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut fresh: Vec<ParsedEntry> = Vec::new();

    for entry in parsed {
        if existing.contains(&entry.guid) {
            continue;
        }
        match slots.get(&entry.guid) {
            Some(&idx) => fresh[idx] = entry,
            None => {
                slots.insert(entry.guid.clone(), fresh.len());
                fresh.push(entry);
            }
        }
    }

    fresh
}

/// Query the store for the GUIDs of this feed and owner already persisted and
/// return only the unseen entries.
pub async fn find_new_entries(
    store: &SharedStore,
    feed: &Feed,
    parsed: Vec<ParsedEntry>,
) -> Result<Vec<ParsedEntry>, StorageError> {
    if parsed.is_empty() {
        return Ok(parsed);
    }

    let guids: Vec<String> = parsed.iter().map(|e| e.guid.clone()).collect();
    let (feed_id, user_id) = (feed.id, feed.user_id);
    let existing = blocking(store, move |s| s.find_entry_guids(feed_id, user_id, &guids)).await?;

    Ok(new_entries(parsed, &existing.into_iter().collect()))
}
