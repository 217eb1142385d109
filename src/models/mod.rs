pub mod bookmark;
pub mod feed;
pub mod feed_entry;
pub mod user;
