//! SQL for the `events` and `categories` tables.

pub mod categories;
pub mod events;
