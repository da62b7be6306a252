mod bson;
mod collection;
mod counter;
mod errors;

pub use bson::u32_id_filter;
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_position_id_counter_exists, Counter, POSITION_ID_COUNTER_ID};
pub use errors::{is_duplicate_key_error, DUPLICATE_KEY};
