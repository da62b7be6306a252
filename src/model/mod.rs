//! Data types, and how they are stored.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
