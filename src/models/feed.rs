use super::user::User;
use crate::{errors::StorageError, schema::*};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Associations, PartialEq)]
#[diesel(belongs_to(User))]
#[diesel(table_name = feeds)]
pub struct Feed {
    pub id: i32,
    pub user_id: i32,
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    /// unix seconds of the last completed fetch, None if never fetched
    pub last_fetched: Option<i64>,
    pub created_at: i64,
}

impl Feed {
    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.last_fetched
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    pub fn get_by_id(
        conn: &mut SqliteConnection,
        feed_id: i32,
    ) -> Result<Option<Feed>, StorageError> {
        use crate::schema::feeds::dsl::feeds;
        Ok(feeds.find(feed_id).first::<Feed>(conn).optional()?)
    }

    pub fn get_by_user_url(
        conn: &mut SqliteConnection,
        owner: i32,
        feed_url: &str,
    ) -> Result<Option<Feed>, StorageError> {
        use crate::schema::feeds::dsl::{feeds, url, user_id};
        Ok(feeds
            .filter(user_id.eq(owner))
            .filter(url.eq(feed_url))
            .first::<Feed>(conn)
            .optional()?)
    }

    /// Feeds never fetched, or fetched before `threshold` (unix seconds). Oldest first.
    pub fn find_stale(
        conn: &mut SqliteConnection,
        threshold: i64,
    ) -> Result<Vec<Feed>, StorageError> {
        use crate::schema::feeds::dsl::{feeds, id, last_fetched};
        Ok(feeds
            .filter(last_fetched.is_null())
            .or_filter(last_fetched.lt(threshold))
            .order((last_fetched.asc(), id.asc()))
            .load::<Feed>(conn)?)
    }

    pub fn update(
        conn: &mut SqliteConnection,
        feed_id: i32,
        update: &PartialFeed,
    ) -> Result<bool, StorageError> {
        use crate::schema::feeds::dsl::{feeds, id};
        if update.is_empty() {
            return Ok(false);
        }
        let rows = diesel::update(feeds.filter(id.eq(feed_id)))
            .set(update)
            .execute(conn)?;
        Ok(rows > 0)
    }

    pub fn set_last_fetched(
        conn: &mut SqliteConnection,
        feed_id: i32,
        fetched_at: i64,
    ) -> Result<bool, StorageError> {
        use crate::schema::feeds::dsl::{feeds, id, last_fetched};
        let rows = diesel::update(feeds.filter(id.eq(feed_id)))
            .set(last_fetched.eq(Some(fetched_at)))
            .execute(conn)?;
        Ok(rows > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = feeds)]
pub struct NewFeed<'a> {
    pub user_id: i32,
    pub url: &'a str,
    pub name: &'a str,
    pub created_at: i64,
}

impl<'a> NewFeed<'a> {
    pub fn new(user_id: i32, url: &'a str, name: &'a str) -> Self {
        NewFeed {
            user_id,
            url,
            name,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<Feed, StorageError> {
        use crate::schema::feeds::dsl::*;
        Ok(diesel::insert_into(feeds).values(self).get_result(conn)?)
    }
}

/// Feed-level metadata refreshed from the parsed document. None fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, AsChangeset)]
#[diesel(table_name = feeds)]
pub struct PartialFeed {
    pub name: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
}

impl PartialFeed {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.link.is_none()
            && self.language.is_none()
            && self.copyright.is_none()
    }
}
