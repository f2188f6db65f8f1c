//! 进行中翻译记录
//!
//! 进程内共享的 `"{siteId}:{lang}:{hash}" → 开始时间` 映射，用来把同一文本的
//! 并发翻译折叠为一次。这只是建议性的去重，不是锁：多个实例之间没有协调，
//! 重复的缓存写入是幂等的。
//!
//! 过期清理是惰性的：每次检查或设置时，如果距上次清理已超过清理间隔，
//! 就移除所有超过最大存活时间的记录，不需要单独的定时任务。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::translation::config::{constants, TranslationConfig};

struct InFlightState {
    entries: HashMap<String, Instant>,
    last_sweep: Instant,
}

/// 进行中记录存储
///
/// 以 `Arc` 注入到引擎中，测试可以各自创建独立实例。
pub struct InFlightStore {
    state: Mutex<InFlightState>,
    cleanup_interval: Duration,
    max_age: Duration,
}

impl Default for InFlightStore {
    fn default() -> Self {
        Self::new(constants::INFLIGHT_CLEANUP_INTERVAL, constants::INFLIGHT_MAX_AGE)
    }
}

impl InFlightStore {
    pub fn new(cleanup_interval: Duration, max_age: Duration) -> Self {
        Self {
            state: Mutex::new(InFlightState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            cleanup_interval,
            max_age,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(config.inflight_cleanup_interval(), config.inflight_max_age())
    }

    /// 构造记录键
    pub fn build_key(site_id: &str, lang: &str, text_or_hash: &str) -> String {
        format!("{}:{}:{}", site_id, lang, text_or_hash)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        let state = self.lock_and_sweep();
        state.entries.contains_key(key)
    }

    pub fn set_in_flight(&self, key: &str) {
        let mut state = self.lock_and_sweep();
        state.entries.insert(key.to_string(), Instant::now());
    }

    /// 原子地检查并设置，已被占用时返回 None
    ///
    /// 返回的守卫在析构时删除记录，成功、失败和 panic 都会走到这里。
    pub fn try_claim(self: &Arc<Self>, key: &str) -> Option<InFlightGuard> {
        let mut state = self.lock_and_sweep();
        if state.entries.contains_key(key) {
            return None;
        }
        state.entries.insert(key.to_string(), Instant::now());

        Some(InFlightGuard {
            store: Arc::clone(self),
            key: key.to_string(),
        })
    }

    pub fn delete(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, InFlightState> {
        // 记录只是建议性的，锁中毒后继续使用内部数据
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_and_sweep(&self) -> MutexGuard<'_, InFlightState> {
        let mut state = self.lock();
        let now = Instant::now();

        if now.duration_since(state.last_sweep) > self.cleanup_interval {
            let before = state.entries.len();
            let max_age = self.max_age;
            state
                .entries
                .retain(|_, started| now.duration_since(*started) <= max_age);
            state.last_sweep = now;

            let evicted = before - state.entries.len();
            if evicted > 0 {
                debug!("清理了 {} 条过期的进行中记录", evicted);
            }
        }

        state
    }
}

/// 占用守卫，析构时释放记录
pub struct InFlightGuard {
    store: Arc<InFlightStore>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.store.delete(&self.key);
    }
}
