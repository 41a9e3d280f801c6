pub mod hash_table;

pub use hash_table::ExtendibleHashTable;
