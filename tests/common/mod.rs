// 集成测试公共模块
//
// 提供模拟翻译器、可注入故障的存储和测试页面

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lingo_relay::translation::core::{
    ItemType, TranslateRequest, TranslateResponse, Translator, Usage,
};
use lingo_relay::translation::storage::{
    MemoryStore, PathnameRecord, SegmentRecord, SegmentStore,
};
use lingo_relay::translation::{
    RenderMode, TranslationConfig, TranslationError, TranslationResult, TranslationService,
};

/// 测试配置构建器
pub struct TestConfigBuilder {
    config: TranslationConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = TranslationConfig::default();
        config.site_id = "test-site".to_string();
        Self { config }
    }

    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    pub fn skip_words(mut self, words: &[&str]) -> Self {
        self.config.skip_words = words.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn batch_items(mut self, items: usize) -> Self {
        self.config.max_batch_items = items;
        self
    }

    pub fn build(self) -> TranslationConfig {
        self.config
    }
}

/// 给片段加前缀、把路径放到语言目录下的翻译器，记录每次请求
#[derive(Default)]
pub struct MockTranslator {
    pub requests: Mutex<Vec<TranslateRequest>>,
    /// 译文中包含这些原文时返回错误
    pub fail_on: HashSet<String>,
    pub calls: AtomicUsize,
}

impl MockTranslator {
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            fail_on: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn translated_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .flat_map(|r| r.items.iter().map(|i| i.text.clone()))
            .collect()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, request: TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(item) = request.items.iter().find(|i| self.fail_on.contains(&i.text)) {
            return Err(TranslationError::TranslationServiceError(format!(
                "quota exceeded for {:?}",
                item.text
            )));
        }

        let texts = request
            .items
            .iter()
            .map(|item| match item.item_type {
                ItemType::Pathname => format!("/{}{}", request.target_lang, item.text),
                ItemType::Segment => format!("{}:{}", request.target_lang.to_uppercase(), item.text),
            })
            .collect();

        Ok(TranslateResponse {
            texts,
            usage: Usage {
                requests: 1,
                characters: request.total_chars() as u64,
                ..Usage::default()
            },
        })
    }
}

/// 总是失败的翻译器
pub struct DownTranslator;

#[async_trait]
impl Translator for DownTranslator {
    async fn translate(&self, _request: TranslateRequest) -> TranslationResult<TranslateResponse> {
        Err(TranslationError::NetworkError("connection refused".to_string()))
    }
}

/// 记录写入次数的存储，可以让写入失败
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub segment_upserts: AtomicUsize,
    pub pathname_upserts: AtomicUsize,
    pub usage: Mutex<Vec<Usage>>,
    pub fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn upserts(&self) -> usize {
        self.segment_upserts.load(Ordering::SeqCst) + self.pathname_upserts.load(Ordering::SeqCst)
    }

    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for usage in self.usage.lock().unwrap().iter() {
            total.add(usage);
        }
        total
    }

    fn check_write(&self) -> TranslationResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(TranslationError::CacheWriteError("database is read-only".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SegmentStore for RecordingStore {
    async fn lookup_segments(
        &self,
        site_id: &str,
        lang: &str,
        hashes: &[String],
    ) -> TranslationResult<HashMap<String, String>> {
        self.inner.lookup_segments(site_id, lang, hashes).await
    }

    async fn lookup_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        paths: &[String],
    ) -> TranslationResult<HashMap<String, String>> {
        self.inner.lookup_pathnames(site_id, lang, paths).await
    }

    async fn batch_upsert_segments(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<SegmentRecord>,
    ) -> TranslationResult<usize> {
        self.segment_upserts.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.batch_upsert_segments(site_id, lang, records).await
    }

    async fn batch_upsert_pathnames(
        &self,
        site_id: &str,
        lang: &str,
        records: Vec<PathnameRecord>,
    ) -> TranslationResult<usize> {
        self.pathname_upserts.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.batch_upsert_pathnames(site_id, lang, records).await
    }

    async fn record_usage(&self, site_id: &str, lang: &str, usage: &Usage) -> TranslationResult<()> {
        self.usage.lock().unwrap().push(*usage);
        self.inner.record_usage(site_id, lang, usage).await
    }
}

/// 组装服务
pub fn service_with(
    config: TranslationConfig,
    translator: Arc<dyn Translator>,
    store: Arc<RecordingStore>,
) -> TranslationService {
    TranslationService::new(config, translator, store).expect("test config should be valid")
}

/// 测试页面
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn shop_page() -> &'static str {
        r#"<!DOCTYPE html>
<html><head><title>Shoe Shop</title><meta name="description" content="Best shoes online"></head>
<body>
<nav><a href="/about">About us</a> <a href="https://other.example/x">Partner</a></nav>
<h1> Welcome </h1>
<p>Buy <b>red</b> shoes today</p>
<input type="search" placeholder="Search shoes">
<script>var greeting = "Hello";</script>
<div translate="no">Brand Name</div>
<footer><p>Shipping is free</p><p>Shipping is free</p></footer>
</body></html>"#
    }
}
