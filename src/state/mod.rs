// State Module - per-symbol stores and rolling windows

pub mod store;
pub mod time_windows;

pub use store::{LockedStore, ShardedStore, SymbolStore};
pub use time_windows::TimeWindow;
