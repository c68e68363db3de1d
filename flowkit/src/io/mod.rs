//! File system and configuration helpers.

pub mod config;
pub mod discover;
