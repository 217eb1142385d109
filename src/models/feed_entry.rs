use super::feed::Feed;
use crate::{errors::StorageError, schema::*};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Categories are stored as a single delimited column.
pub const CATEGORY_DELIMITER: char = '|';

/// SQLite caps bound parameters per statement; GUID lookups are chunked below it.
const GUID_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Associations, PartialEq)]
#[diesel(belongs_to(Feed))]
#[diesel(table_name = feed_entries)]
pub struct FeedEntry {
    pub id: i32,
    pub feed_id: i32,
    pub user_id: i32,
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub snippet: Option<String>,
    pub published: Option<i64>,
    pub ingested: i64,
    pub categories: String,
    pub unread: bool,
}

impl FeedEntry {
    pub fn category_list(&self) -> Vec<String> {
        split_categories(&self.categories)
    }

    /// GUIDs from `candidates` already stored for this feed and user.
    pub fn existing_guids(
        conn: &mut SqliteConnection,
        feed: i32,
        owner: i32,
        candidates: &[String],
    ) -> Result<Vec<String>, StorageError> {
        use crate::schema::feed_entries::dsl::{feed_entries, feed_id, guid, user_id};

        let mut found = Vec::new();
        for chunk in candidates.chunks(GUID_CHUNK_SIZE) {
            let mut existing = feed_entries
                .filter(feed_id.eq(feed))
                .filter(user_id.eq(owner))
                .filter(guid.eq_any(chunk))
                .select(guid)
                .load::<String>(conn)?;
            found.append(&mut existing);
        }
        Ok(found)
    }

    pub fn get_by_feed(
        conn: &mut SqliteConnection,
        feed: i32,
    ) -> Result<Vec<FeedEntry>, StorageError> {
        use crate::schema::feed_entries::dsl::{feed_entries, feed_id, id};
        Ok(feed_entries
            .filter(feed_id.eq(feed))
            .order(id.asc())
            .load::<FeedEntry>(conn)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Insertable)]
#[diesel(table_name = feed_entries)]
pub struct NewFeedEntry {
    pub feed_id: i32,
    pub user_id: i32,
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub snippet: Option<String>,
    pub published: Option<i64>,
    pub ingested: i64,
    pub categories: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Associations, PartialEq)]
#[diesel(belongs_to(FeedEntry, foreign_key = entry_id))]
#[diesel(table_name = feed_entry_media)]
pub struct FeedEntryMedia {
    pub id: i32,
    pub entry_id: i32,
    pub user_id: i32,
    pub href: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub credit: Option<String>,
    pub medium: Option<String>,
    pub height: Option<i32>,
    pub width: Option<i32>,
}

impl FeedEntryMedia {
    pub fn get_by_entry(
        conn: &mut SqliteConnection,
        entry: i32,
    ) -> Result<Vec<FeedEntryMedia>, StorageError> {
        use crate::schema::feed_entry_media::dsl::{entry_id, feed_entry_media, id};
        Ok(feed_entry_media
            .filter(entry_id.eq(entry))
            .order(id.asc())
            .load::<FeedEntryMedia>(conn)?)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = feed_entry_media)]
struct NewFeedEntryMedia<'a> {
    entry_id: i32,
    user_id: i32,
    href: &'a str,
    title: Option<&'a str>,
    description: Option<&'a str>,
    credit: Option<&'a str>,
    medium: Option<&'a str>,
    height: Option<i32>,
    width: Option<i32>,
}

/// Media attachment waiting for its parent entry's id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMedia {
    pub href: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub credit: Option<String>,
    pub medium: Option<String>,
    pub height: Option<i32>,
    pub width: Option<i32>,
}

/// An entry and its media, written together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub entry: NewFeedEntry,
    pub media: Vec<NewMedia>,
}

impl NewEntry {
    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<FeedEntry, StorageError> {
        conn.transaction::<_, StorageError, _>(|conn| {
            let created: FeedEntry = diesel::insert_into(feed_entries::table)
                .values(&self.entry)
                .get_result(conn)?;

            if !self.media.is_empty() {
                let rows: Vec<NewFeedEntryMedia> = self
                    .media
                    .iter()
                    .map(|m| NewFeedEntryMedia {
                        entry_id: created.id,
                        user_id: created.user_id,
                        href: &m.href,
                        title: m.title.as_deref(),
                        description: m.description.as_deref(),
                        credit: m.credit.as_deref(),
                        medium: m.medium.as_deref(),
                        height: m.height,
                        width: m.width,
                    })
                    .collect();
                diesel::insert_into(feed_entry_media::table)
                    .values(&rows)
                    .execute(conn)?;
            }

            Ok(created)
        })
    }
}

pub fn join_categories(categories: &[String]) -> String {
    categories.join(&CATEGORY_DELIMITER.to_string())
}

pub fn split_categories(joined: &str) -> Vec<String> {
    joined
        .split(CATEGORY_DELIMITER)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
