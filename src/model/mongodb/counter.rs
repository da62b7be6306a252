use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// ID of the counter that hands out position IDs.
pub const POSITION_ID_COUNTER_ID: &str = "position_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u64,
}

impl Counter {
    /// Create a new `Counter` starting at the given value.
    pub fn new(id: impl Into<String>, start: u64) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u64> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| Error::Integrity(format!("Failed to find counter with ID {id}")))?;
        Ok(counter.next)
    }
}

/// Create the position ID counter, starting at 1, unless it already exists.
///
/// This operation is idempotent.
pub async fn ensure_position_id_counter_exists(counters: &Coll<Counter>) -> Result<()> {
    debug!("Ensuring position ID counter exists");
    let options = UpdateOptions::builder().upsert(true).build();
    counters
        .update_one(
            doc! { "_id": POSITION_ID_COUNTER_ID },
            doc! { "$setOnInsert": { "next": 1_i64 } },
            options,
        )
        .await?;
    Ok(())
}
