//! Database repositories.

pub mod items;
