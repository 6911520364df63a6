pub mod kv;
pub mod process;

pub use kv::KvCache;
pub use process::ProcessCache;
