pub mod in_memory;
pub mod loopback;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
