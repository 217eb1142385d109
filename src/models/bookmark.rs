use super::user::User;
use crate::{errors::StorageError, schema::*};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Associations, PartialEq)]
#[diesel(belongs_to(User))]
#[diesel(table_name = bookmarks)]
pub struct Bookmark {
    pub id: i32,
    pub user_id: i32,
    pub url: String,
    pub title: String,
    /// path of the captured PNG, if any
    pub screenshot: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookmarks)]
pub struct NewBookmark<'a> {
    pub user_id: i32,
    pub url: &'a str,
    pub title: &'a str,
    pub created_at: i64,
}

impl<'a> NewBookmark<'a> {
    pub fn new(user_id: i32, url: &'a str, title: &'a str) -> Self {
        NewBookmark {
            user_id,
            url,
            title,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<Bookmark, StorageError> {
        Ok(diesel::insert_into(bookmarks::table)
            .values(self)
            .get_result(conn)?)
    }
}

impl Bookmark {
    pub fn get_by_id(
        conn: &mut SqliteConnection,
        bookmark_id: i32,
    ) -> Result<Option<Bookmark>, StorageError> {
        Ok(bookmarks::table
            .find(bookmark_id)
            .first::<Bookmark>(conn)
            .optional()?)
    }

    pub fn set_screenshot(
        conn: &mut SqliteConnection,
        bookmark_id: i32,
        path: &str,
    ) -> Result<bool, StorageError> {
        use crate::schema::bookmarks::dsl::{bookmarks, id, screenshot};
        let rows = diesel::update(bookmarks.filter(id.eq(bookmark_id)))
            .set(screenshot.eq(Some(path)))
            .execute(conn)?;
        Ok(rows > 0)
    }
}
