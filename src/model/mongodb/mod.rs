mod bson;
mod collection;
mod errors;

pub use bson::Id;
pub use collection::{
    ensure_registry_indexes_exist, ensure_voting_indexes_exist, registry_collection, Coll,
    MongoCollection,
};
pub use errors::is_duplicate_key_error;
