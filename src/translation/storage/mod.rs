//! 存储模块
//!
//! 译文持久化存储和进程内的进行中记录。

pub mod inflight;
pub mod store;

pub use inflight::{InFlightGuard, InFlightStore};
pub use store::{
    MemoryStore, PathnameRecord, SegmentMeta, SegmentRecord, SegmentStore, StoreStats,
};
