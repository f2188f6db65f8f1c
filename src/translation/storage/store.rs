//! 译文存储
//!
//! [`SegmentStore`] 是持久化缓存的接口，页面服务和后台任务只通过它读写。
//! 写入和用量记录的失败由调用方记录日志后吞掉，从不影响页面响应。
//! [`MemoryStore`] 是进程内实现，默认服务器和测试都使用它。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use serde::Serialize;

use crate::translation::config::constants;
use crate::translation::core::translator::Usage;
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::SegmentKind;

/// 一条片段译文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub hash: String,
    pub kind: SegmentKind,
    pub source: String,
    pub translated: String,
}

/// 一条路径译文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathnameRecord {
    pub source: String,
    pub translated: String,
}

/// 持久化缓存接口
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// 按原文哈希查找，只返回已有译文的哈希
    async fn lookup_segments(
        &self,
        site_id: &str,
        lang: &str,
        hashes: &[String],
    ) -> TranslationResult<HashMap<String, String>>;

    /// 按原始路径查找
    async fn lookup_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        paths: &[String],
    ) -> TranslationResult<HashMap<String, String>>;

    async fn batch_upsert_segments(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<SegmentRecord>,
    ) -> TranslationResult<usize>;

    async fn batch_upsert_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<PathnameRecord>,
    ) -> TranslationResult<usize>;

    async fn record_usage(&self, site_id: &str, lang: &str, usage: &Usage) -> TranslationResult<()>;
}

type Key = (String, String, String);

#[derive(Debug, Clone)]
struct StoredTranslation {
    translated: String,
    source: String,
    kind: SegmentKind,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct UsageLedger {
    total: Usage,
    records: u64,
    last_recorded: Option<DateTime<Utc>>,
}

/// 存储统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub segments: usize,
    pub pathnames: usize,
    pub upsert_calls: usize,
    pub hot_hits: usize,
    pub lookups: usize,
}

/// 已存储片段的元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentMeta {
    pub kind: SegmentKind,
    /// 写入时的原文
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

/// 进程内存储
pub struct MemoryStore {
    segments: DashMap<Key, StoredTranslation>,
    pathnames: DashMap<Key, StoredTranslation>,
    usage: DashMap<(String, String), UsageLedger>,
    hot: Mutex<LruCache<Key, String>>,
    upsert_calls: AtomicUsize,
    hot_hits: AtomicUsize,
    lookups: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(constants::DEFAULT_HOT_CACHE_SIZE)
    }
}

impl MemoryStore {
    pub fn new(hot_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(hot_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            segments: DashMap::new(),
            pathnames: DashMap::new(),
            usage: DashMap::new(),
            hot: Mutex::new(LruCache::new(capacity)),
            upsert_calls: AtomicUsize::new(0),
            hot_hits: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    fn key(site_id: &str, lang: &str, id: &str) -> Key {
        (site_id.to_string(), lang.to_string(), id.to_string())
    }

    fn hot(&self) -> MutexGuard<'_, LruCache<Key, String>> {
        self.hot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 已存储的片段数量
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn pathname_count(&self) -> usize {
        self.pathnames.len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// 某站点某语言累计的用量
    pub fn usage(&self, site_id: &str, lang: &str) -> Option<Usage> {
        self.usage
            .get(&(site_id.to_string(), lang.to_string()))
            .map(|ledger| ledger.total)
    }

    /// 用量记录的次数
    pub fn usage_records(&self, site_id: &str, lang: &str) -> u64 {
        self.usage
            .get(&(site_id.to_string(), lang.to_string()))
            .map(|ledger| ledger.records)
            .unwrap_or(0)
    }

    pub fn last_usage_at(&self, site_id: &str, lang: &str) -> Option<DateTime<Utc>> {
        self.usage
            .get(&(site_id.to_string(), lang.to_string()))
            .and_then(|ledger| ledger.last_recorded)
    }

    /// 片段的类型、原文和最后更新时间
    pub fn segment_meta(&self, site_id: &str, lang: &str, hash: &str) -> Option<SegmentMeta> {
        self.segments.get(&Self::key(site_id, lang, hash)).map(|entry| SegmentMeta {
            kind: entry.kind,
            source: entry.source.clone(),
            updated_at: entry.updated_at,
        })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            segments: self.segments.len(),
            pathnames: self.pathnames.len(),
            upsert_calls: self.upsert_calls.load(Ordering::SeqCst),
            hot_hits: self.hot_hits.load(Ordering::SeqCst),
            lookups: self.lookups.load(Ordering::SeqCst),
        }
    }

    fn lookup(
        &self,
        table: &DashMap<Key, StoredTranslation>,
        site_id: &str,
        lang: &str,
        ids: &[String],
    ) -> HashMap<String, String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut found = HashMap::new();

        for id in ids {
            let key = Self::key(site_id, lang, id);
            if let Some(hit) = self.hot().get(&key) {
                self.hot_hits.fetch_add(1, Ordering::SeqCst);
                found.insert(id.clone(), hit.clone());
                continue;
            }
            if let Some(entry) = table.get(&key) {
                let translated = entry.translated.clone();
                self.hot().put(key, translated.clone());
                found.insert(id.clone(), translated);
            }
        }

        found
    }

    fn upsert(&self, table: &DashMap<Key, StoredTranslation>, key: Key, stored: StoredTranslation) {
        self.hot().put(key.clone(), stored.translated.clone());
        table.insert(key, stored);
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn lookup_segments(
        &self,
        site_id: &str,
        lang: &str,
        hashes: &[String],
    ) -> TranslationResult<HashMap<String, String>> {
        Ok(self.lookup(&self.segments, site_id, lang, hashes))
    }

    async fn lookup_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        paths: &[String],
    ) -> TranslationResult<HashMap<String, String>> {
        // 路径表的键带前缀，避免与片段哈希在热缓存中冲突
        let prefixed: Vec<String> = paths.iter().map(|p| format!("path:{}", p)).collect();
        let found = self.lookup(&self.pathnames, site_id, lang, &prefixed);
        Ok(found
            .into_iter()
            .filter_map(|(key, value)| key.strip_prefix("path:").map(|p| (p.to_string(), value)))
            .collect())
    }

    async fn batch_upsert_segments(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<SegmentRecord>,
    ) -> TranslationResult<usize> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let count = records.len();
        let now = Utc::now();

        for record in records {
            self.upsert(
                &self.segments,
                Self::key(site_id, lang, &record.hash),
                StoredTranslation {
                    translated: record.translated,
                    source: record.source,
                    kind: record.kind,
                    updated_at: now,
                },
            );
        }

        Ok(count)
    }

    async fn batch_upsert_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<PathnameRecord>,
    ) -> TranslationResult<usize> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let count = records.len();
        let now = Utc::now();

        for record in records {
            self.upsert(
                &self.pathnames,
                Self::key(site_id, lang, &format!("path:{}", record.source)),
                StoredTranslation {
                    translated: record.translated,
                    source: record.source,
                    kind: SegmentKind::Pathname,
                    updated_at: now,
                },
            );
        }

        Ok(count)
    }

    async fn record_usage(&self, site_id: &str, lang: &str, usage: &Usage) -> TranslationResult<()> {
        let mut ledger = self
            .usage
            .entry((site_id.to_string(), lang.to_string()))
            .or_default();
        ledger.total.add(usage);
        ledger.records += 1;
        ledger.last_recorded = Some(Utc::now());
        Ok(())
    }
}
