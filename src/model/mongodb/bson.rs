use mongodb::bson::{doc, Document};

use crate::model::common::position::PositionId;

/// Filter matching the document with the given integer `_id`.
pub fn u32_id_filter(id: PositionId) -> Document {
    doc! { "_id": id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_targets_id_only() {
        let filter = u32_id_filter(42);
        assert_eq!(filter.len(), 1);
        assert!(filter.contains_key("_id"));
    }
}
