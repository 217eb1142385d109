use crate::{errors::StorageError, schema::*};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimal owner record; accounts and sessions live in the web layer.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub created_at: i64,
}

impl User {
    pub fn create(conn: &mut SqliteConnection, email: &str) -> Result<User, StorageError> {
        let new_user = NewUser {
            email,
            created_at: Utc::now().timestamp(),
        };
        Ok(diesel::insert_into(users::table)
            .values(&new_user)
            .get_result(conn)?)
    }
}
