//! 客户端协调
//!
//! 浏览器端的两个循环在这里以不做 I/O 的状态机表示：恢复模式
//! ([`RecoveryMachine`]) 用内嵌字典立即替换文本并在短时间内监视 DOM 变化，
//! 延迟模式 ([`DeferredMachine`]) 轮询查询接口并按哈希标记回填译文。
//! 状态机接收事件、直接修改 [`DomTree`](crate::parsers::html::DomTree)，
//! 并返回需要宿主执行的 [`Effect`]。实际交付给浏览器的脚本见 [`script`]。

pub mod deferred;
pub mod dictionary;
pub mod recovery;
pub mod script;

use std::time::Duration;

use crate::translation::pipeline::PendingSegment;

pub use deferred::{DeferredConfig, DeferredMachine, DeferredState};
pub use dictionary::{embed_json, read_embedded, read_pending, Dictionary};
pub use recovery::{apply_dictionary, RecoveryMachine, RecoveryState};

/// 定时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// 恢复模式的监视窗口
    RecoveryWindow,
    /// 延迟模式的下一次轮询
    Poll,
}

/// 状态机请求宿主执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// 开始监视 body 的子节点和字符数据变化
    ObserveMutations,
    DisconnectObserver,
    ScheduleTimer { timer: Timer, after: Duration },
    /// 向查询接口提交仍待翻译的片段
    PostLookup {
        lang: String,
        segments: Vec<PendingSegment>,
    },
    /// 移除防闪烁样式，显示页面
    RevealBody,
}
