mod scheduler;
mod storage;
mod worker;

pub mod server;

pub use storage::BytesStorage;
