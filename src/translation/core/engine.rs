//! 翻译引擎核心实现
//!
//! 引擎把管道各步骤串起来，提供两种工作方式：
//!
//! ## 即时模式
//! 1. 片段在提取时已完成占位符保护
//! 2. 去重并按请求限制分块
//! 3. 所有块并发调用翻译服务，每块受超时约束
//! 4. 任何一块失败，整个请求失败并带上块的上下文
//! 5. 按原始顺序展开、还原占位符，校验失败只记录（严格模式下报错）
//!
//! ## 后台模式
//! 每个缓存未命中的单元（片段或路径）单独占用进行中记录并启动一个任务，
//! 翻译完成后立即写入存储再释放记录；失败时只释放记录，下次页面加载
//! 自然会重试。监督任务等待所有单元结束后只记录一次汇总用量。
//!
//! ## 使用示例
//! ```rust,ignore
//! let engine = TranslationEngine::new(translator, store, inflight, &config);
//! let ctx = TranslationContext::from_config(&config, "es");
//! let outcome = engine.translate_immediate(&segments, &ctx).await?;
//! assert_eq!(outcome.translations.len(), segments.len());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::translator::{TranslateItem, TranslateRequest, Translator, Usage};
use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{
    preprocess, reconstruct, segment_key, validate, BatchLimits, Chunk, PendingSegment, Segment,
    SegmentKind,
};
use crate::translation::storage::{
    InFlightGuard, InFlightStore, PathnameRecord, SegmentRecord, SegmentStore,
};

/// 一次翻译的站点和语言
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationContext {
    pub site_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub style: Option<String>,
}

impl TranslationContext {
    pub fn new(
        site_id: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            style: None,
        }
    }

    pub fn from_config(config: &TranslationConfig, target_lang: &str) -> Self {
        Self {
            site_id: config.site_id.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: target_lang.to_string(),
            style: config.style.clone(),
        }
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.style = style;
        self
    }

    /// 进行中记录的键
    pub fn inflight_key(&self, id: &str) -> String {
        InFlightStore::build_key(&self.site_id, &self.target_lang, id)
    }

    fn request(&self, items: Vec<TranslateItem>) -> TranslateRequest {
        TranslateRequest {
            items,
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        }
    }
}

/// 即时翻译结果
#[derive(Debug, Clone, Default)]
pub struct ImmediateOutcome {
    /// 与输入片段一一对应、已还原占位符的译文（不含空白信封）
    pub translations: Vec<String>,
    pub usage: Usage,
    /// 占位符校验失败的片段数
    pub violations: usize,
}

/// 后台翻译单元
#[derive(Debug, Clone)]
pub enum BackgroundUnit {
    Segment(Segment),
    Pathname(String),
}

impl BackgroundUnit {
    /// 进行中记录使用的标识
    pub fn id(&self) -> String {
        match self {
            BackgroundUnit::Segment(segment) => segment.hash(),
            BackgroundUnit::Pathname(path) => segment_key(SegmentKind::Pathname, path),
        }
    }

    pub fn descriptor(&self) -> PendingSegment {
        match self {
            BackgroundUnit::Segment(segment) => segment.descriptor(),
            BackgroundUnit::Pathname(path) => Segment::pathname(path).descriptor(),
        }
    }
}

/// 已调度的后台翻译
pub struct BackgroundTask {
    /// 所有单元的描述，已在进行中的单元也包括在内
    pub pending: Vec<PendingSegment>,
    /// 本次实际启动的单元数
    pub spawned: usize,
    /// 监督任务，结束时返回汇总用量；调用方通常直接丢弃
    pub handle: JoinHandle<Usage>,
}

/// 引擎统计信息
#[derive(Debug, Default)]
pub struct EngineStats {
    pub chunks_sent: AtomicUsize,
    pub items_sent: AtomicUsize,
    pub characters_sent: AtomicUsize,
    pub translation_errors: AtomicUsize,
    pub placeholder_violations: AtomicUsize,
    pub units_spawned: AtomicUsize,
    pub units_skipped: AtomicUsize,
    pub units_failed: AtomicUsize,
}

impl EngineStats {
    fn record_request(&self, request: &TranslateRequest) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.items_sent.fetch_add(request.items.len(), Ordering::Relaxed);
        self.characters_sent
            .fetch_add(request.total_chars(), Ordering::Relaxed);
    }

    fn inc(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            items_sent: self.items_sent.load(Ordering::Relaxed),
            characters_sent: self.characters_sent.load(Ordering::Relaxed),
            translation_errors: self.translation_errors.load(Ordering::Relaxed),
            placeholder_violations: self.placeholder_violations.load(Ordering::Relaxed),
            units_spawned: self.units_spawned.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineStatsSnapshot {
    pub chunks_sent: usize,
    pub items_sent: usize,
    pub characters_sent: usize,
    pub translation_errors: usize,
    pub placeholder_violations: usize,
    pub units_spawned: usize,
    pub units_skipped: usize,
    pub units_failed: usize,
}

/// 调用上游所需的共享部分，后台任务各持一份
#[derive(Clone)]
struct Upstream {
    translator: Arc<dyn Translator>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    stats: Arc<EngineStats>,
}

impl Upstream {
    /// 带并发限制和超时的一次上游调用
    async fn call(&self, request: TranslateRequest) -> TranslationResult<(Vec<String>, Usage)> {
        let expected = request.items.len();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TranslationError::ConcurrencyError(format!("获取并发许可失败: {}", e)))?;

        self.stats.record_request(&request);
        let result = tokio::time::timeout(self.timeout, self.translator.translate(request))
            .await
            .map_err(|_| {
                TranslationError::TimeoutError(format!("翻译请求超过 {:?}", self.timeout))
            })
            .and_then(|inner| inner);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                EngineStats::inc(&self.stats.translation_errors);
                return Err(e);
            }
        };

        if response.texts.len() != expected {
            EngineStats::inc(&self.stats.translation_errors);
            return Err(TranslationError::TranslationServiceError(format!(
                "返回 {} 条译文，请求了 {} 条",
                response.texts.len(),
                expected
            )));
        }

        Ok((response.texts, response.usage))
    }
}

/// 翻译引擎
pub struct TranslationEngine {
    upstream: Upstream,
    store: Arc<dyn SegmentStore>,
    inflight: Arc<InFlightStore>,
    limits: BatchLimits,
    strict_placeholders: bool,
}

impl TranslationEngine {
    pub fn new(
        translator: Arc<dyn Translator>,
        store: Arc<dyn SegmentStore>,
        inflight: Arc<InFlightStore>,
        config: &TranslationConfig,
    ) -> Self {
        Self {
            upstream: Upstream {
                translator,
                permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
                timeout: config.timeout(),
                stats: Arc::new(EngineStats::default()),
            },
            store,
            inflight,
            limits: BatchLimits::from_config(config),
            strict_placeholders: config.strict_placeholders,
        }
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.upstream.stats.snapshot()
    }

    pub fn inflight(&self) -> &Arc<InFlightStore> {
        &self.inflight
    }

    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// 阻塞翻译一组片段
    ///
    /// # 错误
    /// - 任何一块的上游失败或超时，带块序号上下文返回
    /// - 严格模式下占位符校验失败返回 `PlaceholderViolation`
    pub async fn translate_immediate(
        &self,
        segments: &[Segment],
        ctx: &TranslationContext,
    ) -> TranslationResult<ImmediateOutcome> {
        if segments.is_empty() {
            return Ok(ImmediateOutcome::default());
        }

        let values: Vec<&str> = segments.iter().map(|s| s.value.as_str()).collect();
        let pre = preprocess(&values, &self.limits);
        let total_chunks = pre.chunks.len();

        info!(
            "即时翻译 {} 个片段 ({} 条唯一, {} 块) -> {}",
            segments.len(),
            pre.total_unique,
            total_chunks,
            ctx.target_lang
        );

        let calls = pre.chunks.iter().map(|chunk| {
            let items = self.chunk_items(chunk, segments, &pre.dedupe.first_index, ctx);
            self.upstream.call(ctx.request(items))
        });
        let results = join_all(calls).await;

        let mut usage = Usage::default();
        let mut translated_unique = Vec::with_capacity(pre.total_unique);
        for (index, result) in results.into_iter().enumerate() {
            let (texts, chunk_usage) = result
                .map_err(|e| e.with_context(format!("第 {}/{} 块", index + 1, total_chunks)))?;
            usage.add(&chunk_usage);
            translated_unique.extend(texts);
        }

        let raw = reconstruct(&pre.dedupe, &translated_unique)?;

        let mut violations = 0;
        let mut translations = Vec::with_capacity(segments.len());
        for (segment, translated) in segments.iter().zip(raw.iter()) {
            if let Err(e) = self.check_placeholders(segment, translated) {
                violations += 1;
                if self.strict_placeholders {
                    return Err(e);
                }
                warn!("{}", e);
            }
            translations.push(translation_for(segment, translated));
        }

        Ok(ImmediateOutcome {
            translations,
            usage,
            violations,
        })
    }

    fn chunk_items(
        &self,
        chunk: &Chunk,
        segments: &[Segment],
        first_index: &[usize],
        ctx: &TranslationContext,
    ) -> Vec<TranslateItem> {
        chunk
            .items
            .iter()
            .enumerate()
            .map(|(offset, text)| {
                let is_path = first_index
                    .get(chunk.start + offset)
                    .and_then(|index| segments.get(*index))
                    .map(|segment| segment.kind == SegmentKind::Pathname)
                    .unwrap_or(false);
                if is_path {
                    TranslateItem::pathname(text.as_str())
                } else {
                    TranslateItem::segment(text.as_str(), ctx.style.clone())
                }
            })
            .collect()
    }

    fn check_placeholders(&self, segment: &Segment, translated: &str) -> TranslationResult<()> {
        let report = validate(&segment.value, translated.trim());
        if report.is_valid() {
            return Ok(());
        }
        EngineStats::inc(&self.upstream.stats.placeholder_violations);
        report
            .into_result()
            .map_err(|e| e.with_context(format!("{} 片段 {}", segment.kind.as_str(), segment.hash())))
    }

    /// 调度后台翻译，立即返回
    ///
    /// 必须在 tokio 运行时中调用。已在进行中的单元不会重复启动，
    /// 但仍出现在返回的描述列表里，客户端照常轮询。
    pub fn spawn_background(
        &self,
        units: Vec<BackgroundUnit>,
        ctx: &TranslationContext,
    ) -> BackgroundTask {
        let mut pending = Vec::with_capacity(units.len());
        let mut set: JoinSet<Option<Usage>> = JoinSet::new();

        for unit in units {
            pending.push(unit.descriptor());

            let key = ctx.inflight_key(&unit.id());
            let Some(guard) = self.inflight.try_claim(&key) else {
                debug!("单元已在进行中，跳过: {}", key);
                EngineStats::inc(&self.upstream.stats.units_skipped);
                continue;
            };

            EngineStats::inc(&self.upstream.stats.units_spawned);
            let worker = BackgroundWorker {
                upstream: self.upstream.clone(),
                store: Arc::clone(&self.store),
                ctx: ctx.clone(),
                strict_placeholders: self.strict_placeholders,
            };
            set.spawn(worker.run(unit, guard));
        }

        let spawned = set.len();
        if spawned > 0 {
            info!("启动 {} 个后台翻译单元 -> {}", spawned, ctx.target_lang);
        }

        let store = Arc::clone(&self.store);
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let mut total = Usage::default();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Some(usage)) => total.add(&usage),
                    Ok(None) => {}
                    Err(e) => warn!("后台翻译单元异常退出: {}", e),
                }
            }

            if !total.is_empty() {
                if let Err(e) = store.record_usage(&ctx.site_id, &ctx.target_lang, &total).await {
                    error!("记录用量失败: {}", e);
                }
            }
            total
        });

        BackgroundTask {
            pending,
            spawned,
            handle,
        }
    }
}

/// 单个后台单元的执行者
struct BackgroundWorker {
    upstream: Upstream,
    store: Arc<dyn SegmentStore>,
    ctx: TranslationContext,
    strict_placeholders: bool,
}

impl BackgroundWorker {
    /// 守卫随本函数结束析构，记录在成功、失败和 panic 时都会释放
    async fn run(self, unit: BackgroundUnit, guard: InFlightGuard) -> Option<Usage> {
        let key = guard.key().to_string();
        let result = match &unit {
            BackgroundUnit::Segment(segment) => self.translate_segment(segment).await,
            BackgroundUnit::Pathname(path) => self.translate_pathname(path).await,
        };
        drop(guard);

        match result {
            Ok(usage) => Some(usage),
            Err(e) => {
                EngineStats::inc(&self.upstream.stats.units_failed);
                // 暂时性故障下一次渲染会重新认领，不必提高日志级别
                if e.is_retryable() {
                    debug!("后台翻译单元失败 {}: {}", key, e);
                } else {
                    e.log(&format!("后台翻译单元失败 {}", key));
                }
                None
            }
        }
    }

    async fn translate_segment(&self, segment: &Segment) -> TranslationResult<Usage> {
        let item = TranslateItem::segment(segment.value.as_str(), self.ctx.style.clone());
        let (texts, usage) = self.upstream.call(self.ctx.request(vec![item])).await?;
        let translated = single(texts)?;

        let report = validate(&segment.value, translated.trim());
        if !report.is_valid() {
            EngineStats::inc(&self.upstream.stats.placeholder_violations);
            if self.strict_placeholders {
                report.into_result()?;
            } else {
                warn!("后台片段 {} 占位符异常: {}", segment.hash(), report);
            }
        }

        let record = SegmentRecord {
            hash: segment.hash(),
            kind: segment.kind,
            source: segment.source.clone(),
            translated: translation_for(segment, &translated),
        };
        if let Err(e) = self
            .store
            .batch_upsert_segments(&self.ctx.site_id, &self.ctx.target_lang, vec![record])
            .await
        {
            error!("{}", TranslationError::CacheWriteError(e.to_string()));
        }

        Ok(usage)
    }

    async fn translate_pathname(&self, path: &str) -> TranslationResult<Usage> {
        let (texts, usage) = self
            .upstream
            .call(self.ctx.request(vec![TranslateItem::pathname(path)]))
            .await?;
        let translated = normalize_pathname(&single(texts)?)?;

        let record = PathnameRecord {
            source: path.to_string(),
            translated,
        };
        if let Err(e) = self
            .store
            .batch_upsert_pathnames(&self.ctx.site_id, &self.ctx.target_lang, vec![record])
            .await
        {
            error!("{}", TranslationError::CacheWriteError(e.to_string()));
        }

        Ok(usage)
    }
}

fn single(texts: Vec<String>) -> TranslationResult<String> {
    texts.into_iter().next().ok_or_else(|| {
        TranslationError::TranslationServiceError("翻译服务没有返回译文".to_string())
    })
}

/// 路径片段的译文做规范化，其余片段还原占位符
fn translation_for(segment: &Segment, translated: &str) -> String {
    if segment.kind == SegmentKind::Pathname {
        return normalize_pathname(translated).unwrap_or_else(|_| segment.source.clone());
    }
    segment.restore(translated)
}

/// 译出的路径必须是以 `/` 开头、不含空白的根相对路径
pub fn normalize_pathname(translated: &str) -> TranslationResult<String> {
    let trimmed = translated.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) || trimmed.contains("//") {
        return Err(TranslationError::TranslationServiceError(format!(
            "无效的路径译文: {:?}",
            translated
        )));
    }

    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}
