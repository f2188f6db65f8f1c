//! 延迟模式
//!
//! 初始延迟后按固定间隔向查询接口提交仍待翻译的片段，返回的译文通过
//! 服务端写入的哈希标记回填。达到最大轮询次数后剩余片段保留原文，
//! 并清除所有骨架标记。网络错误按普通的一次尝试处理，在相同间隔后重试。

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::{Effect, Timer};
use crate::parsers::html::DomTree;
use crate::translation::config::constants::{
    ATTR_MARKER_PREFIX, HASH_ATTR, PENDING_CLASS, TRANSLATABLE_ATTRS,
};
use crate::translation::config::TranslationConfig;
use crate::translation::pipeline::{PendingSegment, SegmentKind, Whitespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredConfig {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self::from_config(&TranslationConfig::default())
    }
}

impl DeferredConfig {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.deferred_initial_delay_ms),
            poll_interval: Duration::from_millis(config.deferred_poll_interval_ms),
            max_polls: config.deferred_max_polls.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Delayed,
    /// 已发出第 `attempt` 次查询
    Polling { attempt: u32 },
    Settled,
}

pub struct DeferredMachine {
    state: DeferredState,
    pending: Vec<PendingSegment>,
    lang: String,
    config: DeferredConfig,
    applied: usize,
}

impl DeferredMachine {
    pub fn new(pending: Vec<PendingSegment>, lang: &str, config: DeferredConfig) -> Self {
        // 路径没有页面标记，不需要轮询
        let pending = pending
            .into_iter()
            .filter(|segment| segment.kind != SegmentKind::Pathname)
            .collect();
        Self {
            state: DeferredState::Delayed,
            pending,
            lang: lang.to_string(),
            config,
            applied: 0,
        }
    }

    pub fn state(&self) -> DeferredState {
        self.state
    }

    pub fn pending(&self) -> &[PendingSegment] {
        &self.pending
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    /// 启动，等待初始延迟
    pub fn start(&mut self) -> Vec<Effect> {
        if self.pending.is_empty() {
            self.state = DeferredState::Settled;
            return Vec::new();
        }
        vec![Effect::ScheduleTimer {
            timer: Timer::Poll,
            after: self.config.initial_delay,
        }]
    }

    /// 定时器到期，发出下一次查询
    pub fn on_timer(&mut self) -> Vec<Effect> {
        let attempt = match self.state {
            DeferredState::Delayed => 1,
            DeferredState::Polling { attempt } => attempt + 1,
            DeferredState::Settled => return Vec::new(),
        };
        self.state = DeferredState::Polling { attempt };

        vec![Effect::PostLookup {
            lang: self.lang.clone(),
            segments: self.pending.clone(),
        }]
    }

    /// 查询返回 `{hash: 译文}`
    pub fn on_response<D: DomTree>(&mut self, doc: &D, found: &HashMap<String, String>) -> Vec<Effect> {
        if !matches!(self.state, DeferredState::Polling { .. }) {
            return Vec::new();
        }

        let mut remaining = Vec::with_capacity(self.pending.len());
        for segment in std::mem::take(&mut self.pending) {
            match found.get(&segment.hash) {
                Some(translated) => {
                    self.applied += apply_segment(doc, &segment, translated);
                }
                None => remaining.push(segment),
            }
        }
        self.pending = remaining;

        if self.pending.is_empty() {
            debug!("延迟翻译全部完成，共回填 {} 处", self.applied);
            self.settle(doc);
            return Vec::new();
        }
        self.next_or_fallback(doc)
    }

    /// 查询失败（网络错误或非 2xx）
    pub fn on_error<D: DomTree>(&mut self, doc: &D) -> Vec<Effect> {
        if !matches!(self.state, DeferredState::Polling { .. }) {
            return Vec::new();
        }
        self.next_or_fallback(doc)
    }

    fn next_or_fallback<D: DomTree>(&mut self, doc: &D) -> Vec<Effect> {
        let attempt = match self.state {
            DeferredState::Polling { attempt } => attempt,
            _ => 0,
        };

        if attempt >= self.config.max_polls {
            debug!("轮询 {} 次后仍有 {} 个片段未翻译，保留原文", attempt, self.pending.len());
            self.pending.clear();
            self.settle(doc);
            return Vec::new();
        }

        vec![Effect::ScheduleTimer {
            timer: Timer::Poll,
            after: self.config.poll_interval,
        }]
    }

    fn settle<D: DomTree>(&mut self, doc: &D) {
        clear_markers(doc);
        self.state = DeferredState::Settled;
    }
}

/// 按哈希标记回填一个片段，返回修改的节点数
pub fn apply_segment<D: DomTree>(doc: &D, segment: &PendingSegment, translated: &str) -> usize {
    if segment.kind == SegmentKind::Attribute {
        let Some(attr) = segment.attr.as_deref() else {
            return 0;
        };
        let marker = format!("{}{}", ATTR_MARKER_PREFIX, attr);
        let nodes = doc.find_by_attribute(&marker, Some(&segment.hash));
        for node in &nodes {
            doc.set_attribute(node, attr, Some(translated));
            doc.set_attribute(node, &marker, None);
        }
        return nodes.len();
    }

    let nodes = doc.find_by_attribute(HASH_ATTR, Some(&segment.hash));
    let mut applied = 0;
    for node in nodes {
        match segment.kind {
            SegmentKind::Title => {
                let (whitespace, _) = Whitespace::split(&doc.text_content(&node));
                doc.set_text_content(&node, &whitespace.wrap(translated));
            }
            SegmentKind::MetaDescription => {
                doc.set_attribute(&node, "content", Some(translated));
            }
            SegmentKind::HtmlBlock => {
                let Ok(inner) = doc.inner_html(&node) else {
                    continue;
                };
                let (whitespace, _) = Whitespace::split(&inner);
                let carried = carried_attributes(doc, &node);
                if doc.set_inner_html(&node, &whitespace.wrap(translated)).is_err() {
                    continue;
                }
                restore_carried(doc, &node, &carried);
            }
            SegmentKind::Text => {
                // 文本节点由服务端包裹在标记 span 中，回填后去掉包裹
                let (whitespace, _) = Whitespace::split(&doc.text_content(&node));
                let text = doc.create_text(&whitespace.wrap(translated));
                doc.replace_with(&node, &[text]);
                applied += 1;
                continue;
            }
            SegmentKind::Attribute | SegmentKind::Pathname => continue,
        }
        doc.set_attribute(&node, HASH_ATTR, None);
        doc.remove_class(&node, PENDING_CLASS);
        applied += 1;
    }
    applied
}

/// 块内元素上需要保留的属性：属性标记和可翻译属性的当前值
struct Carried {
    tag: String,
    attrs: Vec<(String, String)>,
}

fn carried_attributes<D: DomTree>(doc: &D, block: &D::Node) -> Vec<Carried> {
    doc.descendants(block)
        .into_iter()
        .filter(|node| doc.is_element(node))
        .map(|node| Carried {
            tag: doc.tag_name(&node).unwrap_or_default(),
            attrs: doc
                .attributes(&node)
                .into_iter()
                .filter(|(name, _)| {
                    name.starts_with(ATTR_MARKER_PREFIX) || TRANSLATABLE_ATTRS.contains(&name.as_str())
                })
                .collect(),
        })
        .collect()
}

/// 块译文用原始标记还原，按同标签元素的出现顺序把保留的属性写回新元素
fn restore_carried<D: DomTree>(doc: &D, block: &D::Node, carried: &[Carried]) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut old_by_tag: HashMap<&str, Vec<&Carried>> = HashMap::new();
    for item in carried {
        old_by_tag.entry(item.tag.as_str()).or_default().push(item);
    }

    for node in doc.descendants(block) {
        let Some(tag) = doc.tag_name(&node) else {
            continue;
        };
        let Some(candidates) = old_by_tag.get(tag.as_str()) else {
            continue;
        };
        let ordinal = seen.entry(candidates[0].tag.as_str()).or_insert(0);
        if let Some(old) = candidates.get(*ordinal) {
            for (name, value) in &old.attrs {
                doc.set_attribute(&node, name, Some(value.as_str()));
            }
        }
        *ordinal += 1;
    }
}

/// 清除所有待翻译标记，内容保持原文
pub fn clear_markers<D: DomTree>(doc: &D) {
    for node in doc.find_by_attribute(HASH_ATTR, None) {
        let is_wrapper = doc.has_tag(&node, "span")
            && doc.has_class(&node, PENDING_CLASS)
            && doc.attributes(&node).len() == 2;
        if is_wrapper {
            doc.unwrap_element(&node);
            continue;
        }
        doc.set_attribute(&node, HASH_ATTR, None);
        doc.remove_class(&node, PENDING_CLASS);
    }

    for node in doc.descendants(&doc.document()) {
        if !doc.is_element(&node) {
            continue;
        }
        for (name, _) in doc.attributes(&node) {
            if name.starts_with(ATTR_MARKER_PREFIX) {
                doc.set_attribute(&node, &name, None);
            }
        }
        if doc.has_class(&node, PENDING_CLASS) {
            doc.remove_class(&node, PENDING_CLASS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::HtmlDocument;
    use crate::translation::pipeline::segment_key;

    fn pending(kind: SegmentKind, content: &str, attr: Option<&str>) -> PendingSegment {
        PendingSegment {
            hash: segment_key(kind, content),
            kind,
            content: content.to_string(),
            attr: attr.map(str::to_string),
        }
    }

    fn page() -> (HtmlDocument, Vec<PendingSegment>) {
        let hello = pending(SegmentKind::Text, "Hello", None);
        let block = pending(SegmentKind::HtmlBlock, "Buy <b>now</b>", None);
        let alt = pending(SegmentKind::Attribute, "Logo", Some("alt"));
        let html = format!(
            r#"<html><head></head><body><h1><span data-lingo-hash="{}" class="lingo-pending"> Hello </span></h1><p data-lingo-hash="{}" class="intro lingo-pending">Buy <b>now</b></p><img src="l.png" alt="Logo" data-lingo-attr-alt="{}"></body></html>"#,
            hello.hash, block.hash, alt.hash
        );
        (HtmlDocument::parse(&html), vec![hello, block, alt])
    }

    fn config() -> DeferredConfig {
        DeferredConfig {
            initial_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(2000),
            max_polls: 3,
        }
    }

    #[test]
    fn test_partial_response_then_fallback() {
        let (doc, segments) = page();
        let mut machine = DeferredMachine::new(segments[..2].to_vec(), "es", config());

        assert_eq!(
            machine.start(),
            vec![Effect::ScheduleTimer {
                timer: Timer::Poll,
                after: Duration::from_millis(1000)
            }]
        );

        let effects = machine.on_timer();
        assert_eq!(machine.state(), DeferredState::Polling { attempt: 1 });
        match &effects[..] {
            [Effect::PostLookup { lang, segments }] => {
                assert_eq!(lang, "es");
                assert_eq!(segments.len(), 2);
            }
            other => panic!("unexpected effects: {other:?}"),
        }

        // 第一次只返回一个
        let mut found = HashMap::new();
        found.insert(segments[0].hash.clone(), "Hola".to_string());
        let effects = machine.on_response(&doc, &found);
        assert_eq!(
            effects,
            vec![Effect::ScheduleTimer {
                timer: Timer::Poll,
                after: Duration::from_millis(2000)
            }]
        );
        assert_eq!(machine.pending().len(), 1);
        assert_eq!(machine.pending()[0].hash, segments[1].hash);
        let html = doc.to_html().unwrap();
        assert!(html.contains("<h1> Hola </h1>"));

        // 之后一直没有结果
        for attempt in 2..=3 {
            machine.on_timer();
            assert_eq!(machine.state(), DeferredState::Polling { attempt });
            let effects = machine.on_response(&doc, &HashMap::new());
            if attempt < 3 {
                assert_eq!(effects.len(), 1);
            } else {
                assert!(effects.is_empty());
            }
        }

        assert_eq!(machine.state(), DeferredState::Settled);
        assert!(machine.pending().is_empty());
        let html = doc.to_html().unwrap();
        assert!(html.contains(r#"<p class="intro">Buy <b>now</b></p>"#));
        assert!(!html.contains("lingo-pending"));
        assert!(!html.contains("data-lingo-hash"));
        assert!(!html.contains("data-lingo-attr-alt"));
        assert!(machine.on_timer().is_empty());
    }

    #[test]
    fn test_network_error_reschedules_at_same_interval() {
        let (doc, segments) = page();
        let mut machine = DeferredMachine::new(segments, "es", config());
        machine.start();
        machine.on_timer();

        assert_eq!(
            machine.on_error(&doc),
            vec![Effect::ScheduleTimer {
                timer: Timer::Poll,
                after: Duration::from_millis(2000)
            }]
        );
        assert_eq!(machine.pending().len(), 3);

        machine.on_timer();
        let found: HashMap<String, String> = machine
            .pending()
            .iter()
            .map(|s| (s.hash.clone(), format!("ES:{}", s.content)))
            .collect();
        assert!(machine.on_response(&doc, &found).is_empty());
        assert_eq!(machine.state(), DeferredState::Settled);
        assert_eq!(machine.applied(), 3);

        let html = doc.to_html().unwrap();
        assert!(html.contains(r#"alt="ES:Logo""#));
        assert!(html.contains(r#"<p class="intro">ES:Buy <b>now</b></p>"#));
        assert!(html.contains("<h1> ES:Hello </h1>"));
    }

    #[test]
    fn test_nothing_pending_settles_immediately() {
        let mut machine = DeferredMachine::new(
            vec![pending(SegmentKind::Pathname, "/about", None)],
            "es",
            config(),
        );
        assert!(machine.start().is_empty());
        assert_eq!(machine.state(), DeferredState::Settled);
    }

    #[test]
    fn test_block_keeps_attribute_markers_of_its_elements() {
        let block = pending(SegmentKind::HtmlBlock, r#"See <a title="Open the cart">cart</a>"#, None);
        let title = pending(SegmentKind::Attribute, "Open the cart", Some("title"));
        let html = format!(
            r#"<html><body><p data-lingo-hash="{}" class="lingo-pending">See <a title="Open the cart" data-lingo-attr-title="{}">cart</a></p></body></html>"#,
            block.hash, title.hash
        );
        let doc = HtmlDocument::parse(&html);

        // 块先到，元素上的标记随新内容保留
        apply_segment(&doc, &block, r#"Ver <a title="Open the cart">carrito</a>"#);
        let link = doc.first_element("a").unwrap();
        assert_eq!(doc.text_content(&link), "carrito");
        assert_eq!(
            doc.get_attribute(&link, "data-lingo-attr-title"),
            Some(title.hash.clone())
        );

        assert_eq!(apply_segment(&doc, &title, "Abrir el carrito"), 1);
        let html = doc.to_html().unwrap();
        assert!(html.contains(r#"<p>Ver <a title="Abrir el carrito">carrito</a></p>"#));
    }

    #[test]
    fn test_translated_attribute_survives_later_block() {
        let block = pending(SegmentKind::HtmlBlock, r#"See <img alt="A cat">"#, None);
        let alt = pending(SegmentKind::Attribute, "A cat", Some("alt"));
        let html = format!(
            r#"<html><body><p data-lingo-hash="{}" class="lingo-pending">See <img alt="A cat" data-lingo-attr-alt="{}"></p></body></html>"#,
            block.hash, alt.hash
        );
        let doc = HtmlDocument::parse(&html);

        apply_segment(&doc, &alt, "Un gato");
        apply_segment(&doc, &block, r#"Mira <img alt="A cat">"#);

        let html = doc.to_html().unwrap();
        assert!(html.contains(r#"<p>Mira <img alt="Un gato"></p>"#));
    }
}
