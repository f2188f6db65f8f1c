//! 恢复模式
//!
//! 页面就绪时按字典替换全部可匹配内容，然后监视 DOM 变化，
//! 把客户端框架重新渲染回原文的部分再次替换。窗口结束后断开监视并显示页面。
//!
//! 同一子树内块级元素先于文本节点处理。本轮替换过的块，以及内容已经是
//! 字典中块译文的块，其中的文本不会被当作普通文本再处理一次，块内元素的
//! 属性仍然按字典替换。

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::debug;
use url::Url;

use super::dictionary::Dictionary;
use super::{Effect, Timer};
use crate::parsers::html::{DomTree, NodeType};
use crate::parsers::link_rewriter::rewrite_link_paths;
use crate::translation::config::constants::{BLOCK_ELEMENTS, TRANSLATABLE_ATTRS};
use crate::translation::pipeline::{is_excluded, Whitespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    Applying,
    Observing,
    Done,
}

pub struct RecoveryMachine {
    state: RecoveryState,
    dictionary: Dictionary,
    paths: HashMap<String, String>,
    origin: Option<Url>,
    window: Duration,
    applied: usize,
}

impl RecoveryMachine {
    pub fn new(dictionary: Dictionary, window: Duration) -> Self {
        let paths = dictionary.path_map();
        Self {
            state: RecoveryState::Idle,
            dictionary,
            paths,
            origin: None,
            window,
            applied: 0,
        }
    }

    /// 页面所在的源，用于识别绝对地址形式的同源链接
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// 累计替换的条目数
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// 页面就绪
    pub fn on_ready<D: DomTree>(&mut self, doc: &D) -> Vec<Effect> {
        if self.state != RecoveryState::Idle {
            return Vec::new();
        }

        if self.dictionary.is_empty() {
            self.state = RecoveryState::Done;
            return vec![Effect::RevealBody];
        }

        self.state = RecoveryState::Applying;
        self.applied += apply_dictionary(doc, &doc.document(), &self.dictionary);
        self.applied += rewrite_link_paths(doc, self.origin.as_ref(), &self.paths);
        debug!("恢复模式首轮替换 {} 处", self.applied);

        self.state = RecoveryState::Observing;
        vec![
            Effect::ObserveMutations,
            Effect::ScheduleTimer {
                timer: Timer::RecoveryWindow,
                after: self.window,
            },
        ]
    }

    /// 监视期间新插入或改动的节点
    pub fn on_mutations<D: DomTree>(&mut self, doc: &D, roots: &[D::Node]) -> Vec<Effect> {
        if self.state != RecoveryState::Observing {
            return Vec::new();
        }

        let mut applied = 0;
        for root in roots {
            applied += apply_dictionary(doc, root, &self.dictionary);
        }
        applied += rewrite_link_paths(doc, self.origin.as_ref(), &self.paths);
        self.applied += applied;

        if applied > 0 {
            debug!("监视期间重新替换 {} 处", applied);
        }
        Vec::new()
    }

    /// 监视窗口结束
    pub fn on_window_elapsed(&mut self) -> Vec<Effect> {
        if self.state != RecoveryState::Observing {
            return Vec::new();
        }
        self.state = RecoveryState::Done;
        vec![Effect::DisconnectObserver, Effect::RevealBody]
    }
}

/// 在 `root` 子树内按字典替换，返回替换数量
pub fn apply_dictionary<D: DomTree>(doc: &D, root: &D::Node, dictionary: &Dictionary) -> usize {
    let mut applied = 0;
    let mut translated_blocks: Vec<D::Node> = Vec::new();

    if !dictionary.html.is_empty() {
        let targets: HashSet<&str> = dictionary.html.values().map(String::as_str).collect();
        for node in subtree(doc, root) {
            let is_block = doc
                .tag_name(&node)
                .map(|tag| BLOCK_ELEMENTS.contains(&tag.as_str()))
                .unwrap_or(false);
            if !is_block || is_excluded(doc, &node) {
                continue;
            }
            let Ok(inner) = doc.inner_html(&node) else {
                continue;
            };
            let (whitespace, trimmed) = Whitespace::split(&inner);
            if let Some(translated) = dictionary.html.get(trimmed) {
                if doc.set_inner_html(&node, &whitespace.wrap(translated)).is_ok() {
                    applied += 1;
                    translated_blocks.push(node);
                }
            } else if targets.contains(trimmed) {
                translated_blocks.push(node);
            }
        }
    }

    // 块替换会生成新节点，文本遍历重新收集
    for node in subtree(doc, root) {
        match doc.node_type(&node) {
            NodeType::Text if !dictionary.text.is_empty() => {
                let Some(text) = doc.text(&node) else {
                    continue;
                };
                let (whitespace, trimmed) = Whitespace::split(&text);
                let Some(translated) = dictionary.text.get(trimmed) else {
                    continue;
                };
                if doc.parent(&node).map_or(false, |parent| is_excluded(doc, &parent)) {
                    continue;
                }
                if inside_any(doc, &node, &translated_blocks) {
                    continue;
                }
                doc.set_text(&node, &whitespace.wrap(translated));
                applied += 1;
            }
            NodeType::Element if !dictionary.attrs.is_empty() => {
                if is_excluded(doc, &node) {
                    continue;
                }
                applied += apply_attributes(doc, &node, dictionary);
            }
            _ => {}
        }
    }

    applied
}

fn apply_attributes<D: DomTree>(doc: &D, node: &D::Node, dictionary: &Dictionary) -> usize {
    let is_description = doc.has_tag(node, "meta")
        && doc
            .get_attribute(node, "name")
            .map(|name| name.trim().eq_ignore_ascii_case("description"))
            .unwrap_or(false);

    let mut applied = 0;
    for (name, value) in doc.attributes(node) {
        let candidate = TRANSLATABLE_ATTRS.contains(&name.as_str())
            || (is_description && name == "content");
        if !candidate {
            continue;
        }
        if let Some(translated) = dictionary.attrs.get(value.trim()) {
            doc.set_attribute(node, &name, Some(translated));
            applied += 1;
        }
    }
    applied
}

fn inside_any<D: DomTree>(doc: &D, node: &D::Node, blocks: &[D::Node]) -> bool {
    if blocks.is_empty() {
        return false;
    }
    let mut current = doc.parent(node);
    while let Some(ancestor) = current {
        if blocks.iter().any(|block| doc.same_node(block, &ancestor)) {
            return true;
        }
        current = doc.parent(&ancestor);
    }
    false
}

fn subtree<D: DomTree>(doc: &D, root: &D::Node) -> Vec<D::Node> {
    let mut nodes = vec![root.clone()];
    nodes.extend(doc.descendants(root));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::HtmlDocument;
    use crate::translation::pipeline::SegmentKind;

    fn dictionary() -> Dictionary {
        let mut dict = Dictionary::new("es");
        dict.insert(SegmentKind::Title, "Shop", "Tienda");
        dict.insert(SegmentKind::HtmlBlock, "Buy <b>shoes</b>", "Compra <b>zapatos</b>");
        dict.insert(SegmentKind::Text, "Welcome", "Bienvenido");
        dict.insert(SegmentKind::Text, "shoes", "ZAPATOS-TEXTO");
        dict.insert(SegmentKind::Attribute, "Search", "Buscar");
        dict.insert(SegmentKind::MetaDescription, "Best deals", "Mejores ofertas");
        dict.insert_path("/about", "/acerca-de");
        dict
    }

    const PAGE: &str = r#"<html><head><title>Shop</title><meta name="description" content="Best deals"></head>
<body><h1> Welcome </h1><p>Buy <b>shoes</b></p><input placeholder="Search">
<div class="notranslate">Welcome</div><a href="/about?x=1">About</a></body></html>"#;

    #[test]
    fn test_ready_applies_blocks_before_text() {
        let doc = HtmlDocument::parse(PAGE);
        let mut machine = RecoveryMachine::new(dictionary(), Duration::from_secs(2));

        let effects = machine.on_ready(&doc);
        assert_eq!(machine.state(), RecoveryState::Observing);
        assert_eq!(
            effects,
            vec![
                Effect::ObserveMutations,
                Effect::ScheduleTimer {
                    timer: Timer::RecoveryWindow,
                    after: Duration::from_secs(2)
                }
            ]
        );

        let html = doc.to_html().unwrap();
        assert!(html.contains("<title>Tienda</title>"));
        assert!(html.contains("<h1> Bienvenido </h1>"));
        // 块内的文本不会再被文本表替换
        assert!(html.contains("<p>Compra <b>zapatos</b></p>"));
        assert!(!html.contains("ZAPATOS-TEXTO"));
        assert!(html.contains(r#"placeholder="Buscar""#));
        assert!(html.contains(r#"content="Mejores ofertas""#));
        assert!(html.contains(r#"<div class="notranslate">Welcome</div>"#));
        assert!(html.contains(r#"href="/acerca-de?x=1""#));
        assert_eq!(machine.applied(), 6);
    }

    #[test]
    fn test_mutations_reapply_until_window_elapses() {
        let doc = HtmlDocument::parse(PAGE);
        let mut machine = RecoveryMachine::new(dictionary(), Duration::from_secs(2));
        machine.on_ready(&doc);

        // 客户端框架把标题改回原文并插入新链接
        let h1 = doc.first_element("h1").unwrap();
        doc.set_text_content(&h1, "Welcome");
        let body = doc.body().unwrap();
        let link = doc.create_element("a", &[("href", "/about")]);
        doc.append_child(&body, &link);

        machine.on_mutations(&doc, &[h1.clone(), link.clone()]);
        assert_eq!(doc.text_content(&h1), "Bienvenido");
        assert_eq!(doc.get_attribute(&link, "href").as_deref(), Some("/acerca-de"));

        assert_eq!(
            machine.on_window_elapsed(),
            vec![Effect::DisconnectObserver, Effect::RevealBody]
        );
        assert_eq!(machine.state(), RecoveryState::Done);

        doc.set_text_content(&h1, "Welcome");
        assert!(machine.on_mutations(&doc, &[h1.clone()]).is_empty());
        assert_eq!(doc.text_content(&h1), "Welcome");
    }

    #[test]
    fn test_empty_dictionary_reveals_immediately() {
        let doc = HtmlDocument::parse(PAGE);
        let mut machine = RecoveryMachine::new(Dictionary::new("es"), Duration::from_secs(2));
        assert_eq!(machine.on_ready(&doc), vec![Effect::RevealBody]);
        assert_eq!(machine.state(), RecoveryState::Done);
    }

    #[test]
    fn test_translated_block_text_is_not_translated_again() {
        let mut dict = Dictionary::new("es");
        dict.insert(SegmentKind::HtmlBlock, "Press <b>OK</b> now", "Pulsa <b>OK</b> ahora");
        dict.insert(SegmentKind::Text, "OK", "Vale");
        dict.insert(SegmentKind::Attribute, "Confirm", "Confirmar");

        // 服务端已经替换过块，客户端又原样挂载了一个未翻译的副本
        let doc = HtmlDocument::parse(
            r#"<html><body><p>Pulsa <b>OK</b> ahora</p><li>Press <b>OK</b> now</li><span>OK</span><p><b title="Confirm">OK</b> x</p></body></html>"#,
        );
        let applied = apply_dictionary(&doc, &doc.document(), &dict);

        let html = doc.to_html().unwrap();
        assert!(html.contains("<p>Pulsa <b>OK</b> ahora</p>"));
        assert!(html.contains("<li>Pulsa <b>OK</b> ahora</li>"));
        assert!(html.contains("<span>Vale</span>"));
        // 不在字典中的块照常处理文本和属性
        assert!(html.contains(r#"<p><b title="Confirmar">Vale</b> x</p>"#));
        assert_eq!(applied, 4);
    }
}
