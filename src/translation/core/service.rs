//! 页面翻译服务
//!
//! [`TranslationService`] 是对外的主要入口：接收一个 HTML 页面，返回带有
//! 已知译文、待翻译标记、链接路径译文和客户端协调负载的新页面。
//!
//! ## 流程
//!
//! 1. 解析并提取片段，收集同源链接路径（同步阶段）
//! 2. 按原文哈希和路径查询存储
//! 3. 即时模式阻塞翻译未命中的片段，失败时这些片段显示原文；
//!    延迟模式为未命中的片段调度后台翻译并生成待翻译描述
//! 4. 当前路径没有译文时总是作为后台单元调度
//! 5. 重新解析并回写、打标记、重写链接、注入字典和脚本（同步阶段）
//!
//! DOM 只存在于两个同步阶段中，不跨越任何 `.await`。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let service = TranslationService::new(config, translator, store)?;
//! let page = service
//!     .render_page(PageRequest::new(html, "es").with_pathname("/about"))
//!     .await?;
//! println!("{} 个片段待翻译", page.pending.len());
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::engine::{BackgroundUnit, ImmediateOutcome, TranslationContext, TranslationEngine};
use super::translator::{HttpTranslator, Translator, Usage};
use crate::parsers::html::{DomTree, HtmlDocument};
use crate::parsers::link_rewriter::{collect_link_paths, rewrite_link_paths};
use crate::reconcile::dictionary::{embed_json, Dictionary};
use crate::reconcile::script::{guard_css, script_attributes};
use crate::translation::config::constants::{DICTIONARY_ID, GUARD_ID, LOOKUP_PATH, PENDING_ID};
use crate::translation::config::{RenderMode, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{
    extract, is_translatable, walker, ApplyReport, PendingSegment, PlaceholderCodec, Segment,
    SlotOutcome,
};
use crate::translation::storage::{InFlightStore, MemoryStore, SegmentRecord, SegmentStore};

/// 一次页面渲染请求
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub html: String,
    /// 目标语言
    pub lang: String,
    /// 覆盖配置中的站点标识
    pub site_id: Option<String>,
    /// 当前页面的路径
    pub pathname: Option<String>,
    /// 页面所在的源，用于识别同源链接
    pub origin: Option<Url>,
    /// 覆盖配置中的渲染模式
    pub mode: Option<RenderMode>,
}

impl PageRequest {
    pub fn new(html: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            lang: lang.into(),
            site_id: None,
            pathname: None,
            origin: None,
            mode: None,
        }
    }

    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    pub fn with_pathname(mut self, pathname: impl Into<String>) -> Self {
        self.pathname = Some(pathname.into());
        self
    }

    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// 单次渲染的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub segments: usize,
    pub cached: usize,
    /// 本次即时翻译完成的片段
    pub translated: usize,
    pub pending: usize,
    /// 即时翻译失败、保留原文的片段
    pub failed: usize,
    pub violations: usize,
    pub applied: usize,
    pub links_rewritten: usize,
    pub background_units: usize,
    pub elapsed_ms: u64,
}

/// 渲染结果
#[derive(Debug)]
pub struct RenderedPage {
    pub html: String,
    pub pending: Vec<PendingSegment>,
    pub stats: RenderStats,
    pub mode: RenderMode,
    /// 后台翻译的监督任务，测试可以等待它
    pub background: Option<JoinHandle<Usage>>,
}

/// 第一个同步阶段的产物
struct Extracted {
    segments: Vec<Segment>,
    link_paths: Vec<String>,
}

/// 页面翻译服务
pub struct TranslationService {
    config: TranslationConfig,
    codec: PlaceholderCodec,
    engine: TranslationEngine,
    stats: ServiceStats,
}

impl TranslationService {
    pub fn new(
        config: TranslationConfig,
        translator: Arc<dyn Translator>,
        store: Arc<dyn SegmentStore>,
    ) -> TranslationResult<Self> {
        let inflight = Arc::new(InFlightStore::from_config(&config));
        Self::with_inflight(config, translator, store, inflight)
    }

    /// 使用外部提供的进行中记录，多个服务实例可以共享或各自独立
    pub fn with_inflight(
        config: TranslationConfig,
        translator: Arc<dyn Translator>,
        store: Arc<dyn SegmentStore>,
        inflight: Arc<InFlightStore>,
    ) -> TranslationResult<Self> {
        config.validate()?;
        let codec = PlaceholderCodec::from_config(&config)?;
        let engine = TranslationEngine::new(translator, store, inflight, &config);

        Ok(Self {
            config,
            codec,
            engine,
            stats: ServiceStats::default(),
        })
    }

    /// HTTP 翻译服务加进程内存储
    pub fn from_config(config: TranslationConfig) -> TranslationResult<Self> {
        let translator = Arc::new(HttpTranslator::new(&config)?);
        let store = Arc::new(MemoryStore::new(config.hot_cache_size));
        Self::new(config, translator, store)
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn engine(&self) -> &TranslationEngine {
        &self.engine
    }

    pub fn stats(&self) -> ServiceStatsSnapshot {
        self.stats.snapshot()
    }

    fn context(&self, lang: &str, site_id: Option<&str>) -> TranslationResult<TranslationContext> {
        let lang = lang.trim();
        if lang.is_empty() || lang.contains(':') || lang.contains(char::is_whitespace) {
            return Err(TranslationError::InvalidInput(format!("无效的目标语言: {:?}", lang)));
        }

        let mut ctx = TranslationContext::from_config(&self.config, lang);
        if let Some(site) = site_id {
            if site.is_empty() || site.contains(':') {
                return Err(TranslationError::InvalidInput(format!("无效的站点标识: {:?}", site)));
            }
            ctx.site_id = site.to_string();
        }
        Ok(ctx)
    }

    /// 客户端轮询：只返回已有译文的哈希
    pub async fn lookup(
        &self,
        lang: &str,
        site_id: Option<&str>,
        segments: &[PendingSegment],
    ) -> TranslationResult<HashMap<String, String>> {
        let ctx = self.context(lang, site_id)?;
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let mut seen = HashSet::new();
        let hashes: Vec<String> = segments
            .iter()
            .filter(|segment| seen.insert(segment.hash.clone()))
            .map(|segment| segment.hash.clone())
            .collect();
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let found = self
            .engine
            .store()
            .lookup_segments(&ctx.site_id, &ctx.target_lang, &hashes)
            .await?;
        debug!("查询 {} 个哈希，命中 {} 个", hashes.len(), found.len());
        Ok(found)
    }

    /// 渲染一个页面
    ///
    /// 翻译相关的失败不会让渲染失败，只会让对应片段显示原文。
    pub async fn render_page(&self, request: PageRequest) -> TranslationResult<RenderedPage> {
        let started = Instant::now();
        let mode = request.mode.unwrap_or(self.config.render_mode);
        let ctx = self.context(&request.lang, request.site_id.as_deref())?;

        if !self.config.enabled || ctx.target_lang.eq_ignore_ascii_case(&ctx.source_lang) {
            return Ok(RenderedPage {
                html: request.html,
                pending: Vec::new(),
                stats: RenderStats::default(),
                mode,
                background: None,
            });
        }

        let Extracted {
            segments,
            link_paths,
        } = self.extract(&request)?;
        let mut stats = RenderStats {
            segments: segments.len(),
            ..RenderStats::default()
        };

        let (cached, cached_paths) = self.lookup_cached(&ctx, &segments, &link_paths, &request).await;

        let mut outcomes = vec![SlotOutcome::Keep; segments.len()];
        let mut misses = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            match cached.get(&segment.hash()) {
                Some(translated) => outcomes[index] = SlotOutcome::Translated(translated.clone()),
                None => misses.push(index),
            }
        }
        stats.cached = segments.len() - misses.len();

        let mut pending = Vec::new();
        let mut units = Vec::new();
        match mode {
            RenderMode::Immediate if !misses.is_empty() => {
                let miss_segments: Vec<Segment> = misses.iter().map(|i| segments[*i].clone()).collect();
                match self.engine.translate_immediate(&miss_segments, &ctx).await {
                    Ok(outcome) => {
                        for (translated, index) in outcome.translations.iter().zip(&misses) {
                            outcomes[*index] = SlotOutcome::Translated(translated.clone());
                        }
                        stats.translated = misses.len();
                        stats.violations = outcome.violations;
                        self.write_back(&ctx, &miss_segments, outcome);
                    }
                    Err(e) => {
                        e.log(&format!("即时翻译失败，{} 个片段显示原文", misses.len()));
                        self.stats.immediate_failures.fetch_add(1, Ordering::Relaxed);
                        stats.failed = misses.len();
                    }
                }
            }
            RenderMode::Immediate => {}
            RenderMode::Deferred => {
                let mut seen = HashSet::new();
                for index in &misses {
                    let segment = &segments[*index];
                    outcomes[*index] = SlotOutcome::Pending;
                    if seen.insert(segment.hash()) {
                        pending.push(segment.descriptor());
                        units.push(BackgroundUnit::Segment(segment.clone()));
                    }
                }
            }
        }
        stats.pending = pending.len();

        if let Some(path) = request.pathname.as_deref() {
            if is_translatable(path) && !cached_paths.contains_key(path) {
                units.push(BackgroundUnit::Pathname(path.to_string()));
            }
        }

        let background = if units.is_empty() {
            None
        } else {
            let task = self.engine.spawn_background(units, &ctx);
            stats.background_units = task.spawned;
            Some(task.handle)
        };

        let mut dictionary = Dictionary::new(&ctx.target_lang);
        for (segment, outcome) in segments.iter().zip(&outcomes) {
            if let SlotOutcome::Translated(translated) = outcome {
                dictionary.insert(segment.kind, &segment.source, translated);
            }
        }
        for (source, translated) in &cached_paths {
            dictionary.insert_path(source, translated);
        }

        let (html, report, links_rewritten) =
            self.assemble(&request, &ctx, &segments, &outcomes, &dictionary, &pending)?;
        stats.applied = report.applied;
        stats.links_rewritten = links_rewritten;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        self.stats.record_page(&stats);
        info!(
            "渲染页面 -> {} ({}): {} 个片段, 缓存命中 {}, 待翻译 {}, 耗时 {}ms",
            ctx.target_lang,
            mode,
            stats.segments,
            stats.cached,
            stats.pending,
            stats.elapsed_ms
        );

        Ok(RenderedPage {
            html,
            pending,
            stats,
            mode,
            background,
        })
    }

    fn extract(&self, request: &PageRequest) -> TranslationResult<Extracted> {
        let doc = HtmlDocument::parse(&request.html);
        let segments = extract(&doc, &self.codec, None)?;
        let link_paths = collect_link_paths(&doc, request.origin.as_ref());
        Ok(Extracted {
            segments,
            link_paths,
        })
    }

    /// 存储查询失败时按全部未命中处理
    async fn lookup_cached(
        &self,
        ctx: &TranslationContext,
        segments: &[Segment],
        link_paths: &[String],
        request: &PageRequest,
    ) -> (HashMap<String, String>, HashMap<String, String>) {
        let store = self.engine.store();

        let mut seen = HashSet::new();
        let hashes: Vec<String> = segments
            .iter()
            .map(Segment::hash)
            .filter(|hash| seen.insert(hash.clone()))
            .collect();
        let cached = if hashes.is_empty() {
            HashMap::new()
        } else {
            store
                .lookup_segments(&ctx.site_id, &ctx.target_lang, &hashes)
                .await
                .unwrap_or_else(|e| {
                    warn!("查询片段缓存失败: {}", e);
                    HashMap::new()
                })
        };

        let mut paths = link_paths.to_vec();
        if let Some(path) = &request.pathname {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        let cached_paths = if paths.is_empty() {
            HashMap::new()
        } else {
            store
                .lookup_pathnames(&ctx.site_id, &ctx.target_lang, &paths)
                .await
                .unwrap_or_else(|e| {
                    warn!("查询路径缓存失败: {}", e);
                    HashMap::new()
                })
        };

        self.stats.cache_hits.fetch_add(cached.len(), Ordering::Relaxed);
        self.stats
            .cache_misses
            .fetch_add(hashes.len() - cached.len(), Ordering::Relaxed);
        (cached, cached_paths)
    }

    /// 即时翻译结果异步写回存储，不等待
    fn write_back(&self, ctx: &TranslationContext, segments: &[Segment], outcome: ImmediateOutcome) {
        let mut seen = HashSet::new();
        let records: Vec<SegmentRecord> = segments
            .iter()
            .zip(outcome.translations)
            .filter(|(segment, _)| seen.insert(segment.hash()))
            .map(|(segment, translated)| SegmentRecord {
                hash: segment.hash(),
                kind: segment.kind,
                source: segment.source.clone(),
                translated,
            })
            .collect();

        let store = Arc::clone(self.engine.store());
        let ctx = ctx.clone();
        let usage = outcome.usage;
        tokio::spawn(async move {
            if let Err(e) = store
                .batch_upsert_segments(&ctx.site_id, &ctx.target_lang, records)
                .await
            {
                error!("{}", TranslationError::CacheWriteError(e.to_string()));
            }
            if !usage.is_empty() {
                if let Err(e) = store.record_usage(&ctx.site_id, &ctx.target_lang, &usage).await {
                    error!("记录用量失败: {}", e);
                }
            }
        });
    }

    /// 第二个同步阶段：回写、标记、重写链接并注入负载
    fn assemble(
        &self,
        request: &PageRequest,
        ctx: &TranslationContext,
        segments: &[Segment],
        outcomes: &[SlotOutcome],
        dictionary: &Dictionary,
        pending: &[PendingSegment],
    ) -> TranslationResult<(String, ApplyReport, usize)> {
        let doc = HtmlDocument::parse(&request.html);

        let report = match walker::apply_outcomes(&doc, segments, outcomes, false) {
            Ok(report) => report,
            Err(e) => {
                warn!("回写失败，页面保留原文: {}", e);
                ApplyReport::default()
            }
        };
        let links = rewrite_link_paths(&doc, request.origin.as_ref(), &dictionary.path_map());

        if let Some(root) = doc.first_element("html") {
            doc.set_attribute(&root, "lang", Some(&ctx.target_lang));
        }
        self.inject(&doc, ctx, dictionary, pending)?;

        Ok((doc.to_html()?, report, links))
    }

    fn inject(
        &self,
        doc: &HtmlDocument,
        ctx: &TranslationContext,
        dictionary: &Dictionary,
        pending: &[PendingSegment],
    ) -> TranslationResult<()> {
        if dictionary.is_empty() && pending.is_empty() {
            return Ok(());
        }

        let head = doc.first_element("head").unwrap_or_else(|| doc.document());
        let body = doc.first_element("body").unwrap_or_else(|| doc.document());

        if !dictionary.is_empty() {
            let style = doc.create_element("style", &[("id", GUARD_ID)]);
            doc.append_child(&style, &doc.create_text(&guard_css(self.config.recovery_window_ms)));
            doc.append_child(&head, &style);

            append_json(doc, &head, DICTIONARY_ID, &embed_json(dictionary)?);
        }
        if !pending.is_empty() {
            append_json(doc, &head, PENDING_ID, &embed_json(&pending)?);
        }

        let attributes = script_attributes(&self.config, &ctx.target_lang, LOOKUP_PATH);
        let borrowed: Vec<(&str, &str)> = attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let script = doc.create_element("script", &borrowed);
        doc.append_child(&body, &script);

        Ok(())
    }

    /// 服务健康状态
    pub fn get_health(&self) -> HealthStatus {
        let mut components = HashMap::new();

        let engine = self.engine.stats();
        let translator = if engine.chunks_sent == 0 || engine.translation_errors * 2 < engine.chunks_sent {
            HealthLevel::Healthy
        } else if engine.translation_errors < engine.chunks_sent {
            HealthLevel::Degraded
        } else {
            HealthLevel::Unhealthy
        };
        components.insert("translator".to_string(), translator);

        let inflight = if self.engine.inflight().len() > 10_000 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
        components.insert("inflight".to_string(), inflight);
        components.insert("config".to_string(), HealthLevel::Healthy);

        let overall = if components.values().all(|&level| level == HealthLevel::Healthy) {
            HealthLevel::Healthy
        } else if components.values().any(|&level| level == HealthLevel::Unhealthy) {
            HealthLevel::Unhealthy
        } else {
            HealthLevel::Degraded
        };

        HealthStatus {
            overall,
            components,
        }
    }
}

fn append_json(doc: &HtmlDocument, parent: &<HtmlDocument as DomTree>::Node, id: &str, json: &str) {
    let script = doc.create_element("script", &[("type", "application/json"), ("id", id)]);
    doc.append_child(&script, &doc.create_text(json));
    doc.append_child(parent, &script);
}

/// 服务累计统计
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub pages_rendered: AtomicUsize,
    pub segments_extracted: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
    pub pending_segments: AtomicUsize,
    pub immediate_failures: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl ServiceStats {
    fn record_page(&self, stats: &RenderStats) {
        self.pages_rendered.fetch_add(1, Ordering::Relaxed);
        self.segments_extracted
            .fetch_add(stats.segments, Ordering::Relaxed);
        self.pending_segments.fetch_add(stats.pending, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            pages_rendered: self.pages_rendered.load(Ordering::Relaxed),
            segments_extracted: self.segments_extracted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            pending_segments: self.pending_segments.load(Ordering::Relaxed),
            immediate_failures: self.immediate_failures.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatsSnapshot {
    pub pages_rendered: usize,
    pub segments_extracted: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub pending_segments: usize,
    pub immediate_failures: usize,
    pub lookups: usize,
}

impl ServiceStatsSnapshot {
    /// 缓存命中率
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// 健康状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    /// 组件名称到健康级别
    pub components: HashMap<String, HealthLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}
