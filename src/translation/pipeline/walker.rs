//! DOM 片段遍历
//!
//! [`plan`] 是唯一的遍历实现，提取和回写都消费它产生的槽位序列，
//! 两次遍历的顺序因此天然一致。顺序固定为：
//!
//! 1. `<head>` 中的 `<title>`
//! 2. `<meta name="description">` 的 `content`
//! 3. 只含行内内容的块级元素（整体作为一个 HTML 片段）
//! 4. body 中其余的文本节点（前序、文档顺序）
//! 5. 元素上的可翻译属性（文档顺序、属性声明顺序）
//!
//! 块级片段内部元素的属性同样单独提取。块的译文用原始标记还原，回写块之后
//! 原节点已被替换，属性按标签和原值在新的块内容中重新定位后再写入。

use tracing::{debug, warn};

use super::placeholder::{MarkupRun, PlaceholderCodec};
use super::segment::{is_translatable, Segment, SegmentKind, Whitespace};
use crate::parsers::html::serializer::{end_tag, start_tag};
use crate::parsers::html::{DomTree, NodeType};
use crate::translation::config::constants::{
    ATTR_MARKER_PREFIX, BLOCK_ELEMENTS, HASH_ATTR, INLINE_ELEMENTS, PENDING_CLASS, SKIP_ATTR,
    SKIP_CLASS, SKIP_ELEMENTS, TRANSLATABLE_ATTRS, VOID_INLINE_ELEMENTS,
};
use crate::translation::error::{TranslationError, TranslationResult};

/// 遍历得到的一个可翻译位置
#[derive(Debug, Clone)]
pub enum Slot<N> {
    /// `<title>` 元素
    Title(N),
    /// `<meta name="description">` 元素
    MetaDescription(N),
    /// 块级元素，替换其内部 HTML
    Block(N),
    /// 文本节点
    Text(N),
    /// 元素和属性名
    Attribute(N, String),
}

impl<N> Slot<N> {
    pub fn kind(&self) -> SegmentKind {
        match self {
            Slot::Title(_) => SegmentKind::Title,
            Slot::MetaDescription(_) => SegmentKind::MetaDescription,
            Slot::Block(_) => SegmentKind::HtmlBlock,
            Slot::Text(_) => SegmentKind::Text,
            Slot::Attribute(_, _) => SegmentKind::Attribute,
        }
    }
}

/// 回写时每个片段的处理方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// 已还原、去掉首尾空白的译文
    Translated(String),
    /// 写入延迟翻译标记
    Pending,
    /// 保留原文
    Keep,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub marked: usize,
    /// 路径片段的译文
    pub pathname: Option<String>,
}

/// 计算文档的全部可翻译槽位
pub fn plan<D: DomTree>(doc: &D) -> Vec<Slot<D::Node>> {
    let mut slots = Vec::new();

    let title = doc.elements_by_tag("title").into_iter().find(|node| {
        doc.parent(node)
            .map(|parent| doc.has_tag(&parent, "head"))
            .unwrap_or(false)
    });
    if let Some(title) = title {
        if is_translatable(doc.text_content(&title).trim()) {
            slots.push(Slot::Title(title));
        }
    }

    let meta = doc.elements_by_tag("meta").into_iter().find(|node| {
        doc.get_attribute(node, "name")
            .map(|name| name.trim().eq_ignore_ascii_case("description"))
            .unwrap_or(false)
    });
    if let Some(meta) = meta {
        if doc
            .get_attribute(&meta, "content")
            .map(|content| is_translatable(content.trim()))
            .unwrap_or(false)
        {
            slots.push(Slot::MetaDescription(meta));
        }
    }

    let root = doc.first_element("body").unwrap_or_else(|| doc.document());
    visit_blocks(doc, &root, &mut slots);
    visit_text(doc, &root, &mut slots);
    visit_attributes(doc, &doc.document(), &mut slots);

    slots
}

pub(crate) fn is_skip_tag<D: DomTree>(doc: &D, node: &D::Node) -> bool {
    doc.tag_name(node)
        .map(|tag| SKIP_ELEMENTS.contains(&tag.as_str()))
        .unwrap_or(false)
}

/// 页面作者显式排除的元素
pub(crate) fn is_marked_skip<D: DomTree>(doc: &D, node: &D::Node) -> bool {
    doc.get_attribute(node, "translate")
        .map(|value| value.trim().eq_ignore_ascii_case("no"))
        .unwrap_or(false)
        || doc.has_class(node, SKIP_CLASS)
        || doc.get_attribute(node, SKIP_ATTR).is_some()
}

fn is_opaque<D: DomTree>(doc: &D, node: &D::Node) -> bool {
    is_skip_tag(doc, node) || is_marked_skip(doc, node)
}

/// 节点自身或任一祖先元素被排除在翻译之外
pub fn is_excluded<D: DomTree>(doc: &D, node: &D::Node) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if doc.is_element(&n) && is_opaque(doc, &n) {
            return true;
        }
        current = doc.parent(&n);
    }
    false
}

#[derive(Default)]
struct InlineScan {
    text: String,
    elements: usize,
}

/// 检查子树是否只含行内内容，同时收集可见文本
fn scan_inline<D: DomTree>(doc: &D, node: &D::Node, scan: &mut InlineScan) -> bool {
    for child in doc.children(node) {
        match doc.node_type(&child) {
            NodeType::Text => {
                if let Some(text) = doc.text(&child) {
                    scan.text.push_str(&text);
                }
            }
            NodeType::Element => {
                scan.elements += 1;
                if is_opaque(doc, &child) {
                    continue;
                }
                let tag = doc.tag_name(&child).unwrap_or_default();
                if VOID_INLINE_ELEMENTS.contains(&tag.as_str()) {
                    continue;
                }
                if !INLINE_ELEMENTS.contains(&tag.as_str()) || !scan_inline(doc, &child, scan) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// 块级容器且内容全部为行内元素、至少含一个元素、有可翻译文本
fn is_grouped_block<D: DomTree>(doc: &D, node: &D::Node) -> bool {
    let Some(tag) = doc.tag_name(node) else {
        return false;
    };
    if !BLOCK_ELEMENTS.contains(&tag.as_str()) || is_opaque(doc, node) {
        return false;
    }

    let mut scan = InlineScan::default();
    scan_inline(doc, node, &mut scan) && scan.elements > 0 && is_translatable(scan.text.trim())
}

fn visit_blocks<D: DomTree>(doc: &D, node: &D::Node, slots: &mut Vec<Slot<D::Node>>) {
    for child in doc.children(node) {
        if !doc.is_element(&child) || is_opaque(doc, &child) {
            continue;
        }
        if is_grouped_block(doc, &child) {
            slots.push(Slot::Block(child));
        } else {
            visit_blocks(doc, &child, slots);
        }
    }
}

fn visit_text<D: DomTree>(doc: &D, node: &D::Node, slots: &mut Vec<Slot<D::Node>>) {
    for child in doc.children(node) {
        match doc.node_type(&child) {
            NodeType::Text => {
                let translatable = doc
                    .text(&child)
                    .map(|text| is_translatable(text.trim()))
                    .unwrap_or(false);
                if translatable {
                    slots.push(Slot::Text(child));
                }
            }
            NodeType::Element => {
                if is_opaque(doc, &child) || is_grouped_block(doc, &child) {
                    continue;
                }
                visit_text(doc, &child, slots);
            }
            _ => {}
        }
    }
}

fn visit_attributes<D: DomTree>(doc: &D, node: &D::Node, slots: &mut Vec<Slot<D::Node>>) {
    for child in doc.children(node) {
        if !doc.is_element(&child) || is_marked_skip(doc, &child) {
            continue;
        }

        for (name, value) in doc.attributes(&child) {
            if TRANSLATABLE_ATTRS.contains(&name.as_str()) && is_translatable(value.trim()) {
                slots.push(Slot::Attribute(child.clone(), name));
            }
        }

        if is_skip_tag(doc, &child) {
            continue;
        }
        visit_attributes(doc, &child, slots);
    }
}

/// 构造块内容的标记流
fn build_runs<D: DomTree>(doc: &D, node: &D::Node, runs: &mut Vec<MarkupRun>) -> TranslationResult<()> {
    for child in doc.children(node) {
        match doc.node_type(&child) {
            NodeType::Text => {
                if let Some(text) = doc.text(&child) {
                    runs.push(MarkupRun::Text(text));
                }
            }
            NodeType::Comment => runs.push(MarkupRun::Opaque(doc.outer_html(&child)?)),
            NodeType::Element => {
                let tag = doc.tag_name(&child).unwrap_or_default();
                if is_opaque(doc, &child) || VOID_INLINE_ELEMENTS.contains(&tag.as_str()) {
                    runs.push(MarkupRun::Opaque(doc.outer_html(&child)?));
                } else {
                    runs.push(MarkupRun::Open {
                        markup: start_tag(&tag, &doc.attributes(&child)),
                        tag: tag.clone(),
                    });
                    build_runs(doc, &child, runs)?;
                    runs.push(MarkupRun::Close { markup: end_tag(&tag) });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// 槽位当前的原文（去掉首尾空白前）
fn slot_raw_source<D: DomTree>(doc: &D, slot: &Slot<D::Node>) -> TranslationResult<String> {
    Ok(match slot {
        Slot::Title(node) => doc.text_content(node),
        Slot::MetaDescription(node) => doc.get_attribute(node, "content").unwrap_or_default(),
        Slot::Block(node) => doc.inner_html(node)?,
        Slot::Text(node) => doc.text(node).unwrap_or_default(),
        Slot::Attribute(node, name) => doc.get_attribute(node, name).unwrap_or_default(),
    })
}

fn build_segment<D: DomTree>(
    doc: &D,
    codec: &PlaceholderCodec,
    slot: &Slot<D::Node>,
) -> TranslationResult<Segment> {
    let raw = slot_raw_source(doc, slot)?;
    let source = raw.trim().to_string();

    let (whitespace, value, protection) = match slot {
        Slot::Block(node) => {
            let mut runs = Vec::new();
            build_runs(doc, node, &mut runs)?;
            let protected = codec.protect_runs(&runs);
            let (whitespace, value) = Whitespace::split(&protected.text);
            (whitespace, value.to_string(), protected.protection)
        }
        _ => {
            let (whitespace, trimmed) = Whitespace::split(&raw);
            let protected = codec.protect_text(trimmed);
            (whitespace, protected.text, protected.protection)
        }
    };

    let attr_name = match slot {
        Slot::Attribute(_, name) => Some(name.clone()),
        _ => None,
    };

    Ok(Segment {
        kind: slot.kind(),
        value,
        source,
        attr_name,
        whitespace,
        protection,
    })
}

/// 提取全部片段，`pathname` 存在时追加在末尾
pub fn extract<D: DomTree>(
    doc: &D,
    codec: &PlaceholderCodec,
    pathname: Option<&str>,
) -> TranslationResult<Vec<Segment>> {
    let mut segments = plan(doc)
        .iter()
        .map(|slot| build_segment(doc, codec, slot))
        .collect::<TranslationResult<Vec<_>>>()?;

    if let Some(path) = pathname {
        segments.push(Segment::pathname(path));
    }

    debug!("提取了 {} 个片段", segments.len());
    Ok(segments)
}

/// 宽松回写：在第一个错位处停止并记录警告
pub fn apply<D: DomTree>(doc: &D, translations: &[String], segments: &[Segment]) -> ApplyReport {
    let outcomes: Vec<SlotOutcome> = translations
        .iter()
        .map(|t| SlotOutcome::Translated(t.clone()))
        .collect();
    apply_lenient(doc, segments, &outcomes)
}

/// 严格回写：任何数量或顺序不一致都返回 `ExtractionMismatch`
pub fn apply_strict<D: DomTree>(
    doc: &D,
    translations: &[String],
    segments: &[Segment],
) -> TranslationResult<ApplyReport> {
    let outcomes: Vec<SlotOutcome> = translations
        .iter()
        .map(|t| SlotOutcome::Translated(t.clone()))
        .collect();
    apply_outcomes(doc, segments, &outcomes, true)
}

/// 部分回写，`None` 的片段保留原文
pub fn apply_partial<D: DomTree>(
    doc: &D,
    translations: &[Option<String>],
    segments: &[Segment],
) -> ApplyReport {
    let outcomes: Vec<SlotOutcome> = translations
        .iter()
        .map(|t| match t {
            Some(t) => SlotOutcome::Translated(t.clone()),
            None => SlotOutcome::Keep,
        })
        .collect();
    apply_lenient(doc, segments, &outcomes)
}

/// 为待翻译片段写入哈希标记
pub fn mark_pending<D: DomTree>(doc: &D, segments: &[Segment], pending: &[bool]) -> ApplyReport {
    let outcomes: Vec<SlotOutcome> = pending
        .iter()
        .map(|p| if *p { SlotOutcome::Pending } else { SlotOutcome::Keep })
        .collect();
    apply_lenient(doc, segments, &outcomes)
}

fn apply_lenient<D: DomTree>(doc: &D, segments: &[Segment], outcomes: &[SlotOutcome]) -> ApplyReport {
    match apply_outcomes(doc, segments, outcomes, false) {
        Ok(report) => report,
        Err(e) => {
            warn!("回写失败，保留原文: {}", e);
            ApplyReport::default()
        }
    }
}

/// 按同一遍历把每个片段的处理结果写回文档
///
/// 严格模式下先校验全部槽位再修改文档；宽松模式回写到第一个错位为止。
pub fn apply_outcomes<D: DomTree>(
    doc: &D,
    segments: &[Segment],
    outcomes: &[SlotOutcome],
    strict: bool,
) -> TranslationResult<ApplyReport> {
    let mut report = ApplyReport::default();

    if outcomes.len() != segments.len() {
        let err = TranslationError::ExtractionMismatch(format!(
            "译文数量 {} 与片段数量 {} 不一致",
            outcomes.len(),
            segments.len()
        ));
        if strict {
            return Err(err);
        }
        warn!("{}", err);
    }

    let doc_segments = match segments.last() {
        Some(last) if last.kind == SegmentKind::Pathname => &segments[..segments.len() - 1],
        _ => segments,
    };

    let slots = plan(doc);
    if slots.len() != doc_segments.len() {
        let err = TranslationError::ExtractionMismatch(format!(
            "文档槽位数量 {} 与片段数量 {} 不一致",
            slots.len(),
            doc_segments.len()
        ));
        if strict {
            return Err(err);
        }
        warn!("{}", err);
    }

    let mut aligned = 0;
    for (index, (slot, segment)) in slots.iter().zip(doc_segments).enumerate() {
        let source = slot_raw_source(doc, slot)?;
        if slot.kind() != segment.kind || source.trim() != segment.source {
            let err = TranslationError::ExtractionMismatch(format!(
                "第 {} 个片段错位: 期望 {}，实际 {}",
                index,
                segment.kind.as_str(),
                slot.kind().as_str()
            ));
            if strict {
                return Err(err);
            }
            warn!("{}", err);
            break;
        }
        aligned += 1;
    }

    let owners = block_owners(doc, &slots[..aligned]);
    let mut rewritten: Vec<bool> = vec![false; aligned];
    let mut claimed: Vec<(D::Node, String)> = Vec::new();

    for (index, slot) in slots.iter().take(aligned).enumerate() {
        let Some(outcome) = outcomes.get(index) else {
            break;
        };
        let segment = &segments[index];

        // 所在块已被替换时，在新内容中找到对应元素
        let relocated;
        let slot = match (slot, owners[index]) {
            (Slot::Attribute(node, name), Some(owner)) if rewritten[owner] => {
                let Slot::Block(block) = &slots[owner] else {
                    continue;
                };
                match relocate_attribute(doc, block, node, name, &segment.source, &claimed) {
                    Some(found) => {
                        claimed.push((found.clone(), name.clone()));
                        relocated = Slot::Attribute(found, name.clone());
                        &relocated
                    }
                    None => {
                        debug!("块内属性 {} 在译文中找不到对应元素", name);
                        continue;
                    }
                }
            }
            _ => slot,
        };

        match outcome {
            SlotOutcome::Translated(translated) => {
                write_slot(doc, slot, &segment.whitespace.wrap(translated))?;
                if matches!(slot, Slot::Block(_)) {
                    rewritten[index] = true;
                }
                report.applied += 1;
            }
            SlotOutcome::Pending => {
                mark_slot(doc, slot, &segment.hash());
                report.marked += 1;
            }
            SlotOutcome::Keep => {}
        }
    }

    if doc_segments.len() < segments.len() {
        if let Some(SlotOutcome::Translated(path)) = outcomes.get(doc_segments.len()) {
            report.pathname = Some(path.clone());
        }
    }

    debug!("回写 {} 个片段，标记 {} 个待翻译片段", report.applied, report.marked);
    Ok(report)
}

/// 每个属性槽位所在块级槽位的下标
fn block_owners<D: DomTree>(doc: &D, slots: &[Slot<D::Node>]) -> Vec<Option<usize>> {
    let blocks: Vec<(usize, &D::Node)> = slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| match slot {
            Slot::Block(node) => Some((index, node)),
            _ => None,
        })
        .collect();

    slots
        .iter()
        .map(|slot| {
            let Slot::Attribute(node, _) = slot else {
                return None;
            };
            if blocks.is_empty() {
                return None;
            }
            let mut current = doc.parent(node);
            while let Some(ancestor) = current {
                if let Some((index, _)) = blocks.iter().find(|(_, block)| doc.same_node(block, &ancestor)) {
                    return Some(*index);
                }
                current = doc.parent(&ancestor);
            }
            None
        })
        .collect()
}

/// 在替换后的块内容中按标签和属性原值查找第一个未被占用的元素
fn relocate_attribute<D: DomTree>(
    doc: &D,
    block: &D::Node,
    old: &D::Node,
    name: &str,
    source: &str,
    claimed: &[(D::Node, String)],
) -> Option<D::Node> {
    let tag = doc.tag_name(old)?;
    doc.descendants(block).into_iter().find(|node| {
        doc.has_tag(node, &tag)
            && doc
                .get_attribute(node, name)
                .map_or(false, |value| value.trim() == source)
            && !claimed
                .iter()
                .any(|(taken, attr)| attr == name && doc.same_node(taken, node))
    })
}

fn write_slot<D: DomTree>(doc: &D, slot: &Slot<D::Node>, value: &str) -> TranslationResult<()> {
    match slot {
        Slot::Title(node) => doc.set_text_content(node, value),
        Slot::MetaDescription(node) => doc.set_attribute(node, "content", Some(value)),
        Slot::Block(node) => doc.set_inner_html(node, value)?,
        Slot::Text(node) => doc.set_text(node, value),
        Slot::Attribute(node, name) => doc.set_attribute(node, name, Some(value)),
    }
    Ok(())
}

fn mark_slot<D: DomTree>(doc: &D, slot: &Slot<D::Node>, hash: &str) {
    match slot {
        Slot::Title(node) | Slot::Block(node) => {
            doc.set_attribute(node, HASH_ATTR, Some(hash));
            doc.add_class(node, PENDING_CLASS);
        }
        Slot::MetaDescription(node) => doc.set_attribute(node, HASH_ATTR, Some(hash)),
        Slot::Text(node) => {
            doc.wrap(node, "span", &[(HASH_ATTR, hash), ("class", PENDING_CLASS)]);
        }
        Slot::Attribute(node, name) => {
            doc.set_attribute(node, &format!("{}{}", ATTR_MARKER_PREFIX, name), Some(hash));
        }
    }
}
