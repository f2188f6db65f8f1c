//! 客户端字典和嵌入的 JSON 负载

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::parsers::html::DomTree;
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::{PendingSegment, SegmentKind};

/// 恢复模式使用的字典，键是去掉首尾空白的原文
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dictionary {
    /// 标题和文本节点
    pub text: BTreeMap<String, String>,
    /// 块级元素的内部 HTML
    pub html: BTreeMap<String, String>,
    /// 属性值（包括 meta description）
    pub attrs: BTreeMap<String, String>,
    /// 同源链接路径
    pub paths: BTreeMap<String, String>,
    pub lang: String,
}

impl Dictionary {
    pub fn new(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            ..Self::default()
        }
    }

    /// 按片段类型放入对应的表，译文与原文相同时忽略
    pub fn insert(&mut self, kind: SegmentKind, source: &str, translated: &str) {
        let source = source.trim();
        let translated = translated.trim();
        if source.is_empty() || source == translated {
            return;
        }

        let table = match kind {
            SegmentKind::Title | SegmentKind::Text => &mut self.text,
            SegmentKind::HtmlBlock => &mut self.html,
            SegmentKind::Attribute | SegmentKind::MetaDescription => &mut self.attrs,
            SegmentKind::Pathname => &mut self.paths,
        };
        table.insert(source.to_string(), translated.to_string());
    }

    pub fn insert_path(&mut self, source: &str, translated: &str) {
        self.insert(SegmentKind::Pathname, source, translated);
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.html.len() + self.attrs.len() + self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path_map(&self) -> HashMap<String, String> {
        self.paths
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// 从文档中读取嵌入的字典
    pub fn from_document<D: DomTree>(doc: &D, id: &str) -> Option<Self> {
        read_embedded(doc, id)
    }
}

/// 序列化为可以直接放进 `<script>` 的 JSON
pub fn embed_json<T: Serialize>(value: &T) -> TranslationResult<String> {
    let json = serde_json::to_string(value)?;
    Ok(json.replace("</", "<\\/").replace("<!--", "\\u003c!--"))
}

/// 读取指定 id 的 JSON 脚本内容
pub fn read_embedded<D: DomTree, T: DeserializeOwned>(doc: &D, id: &str) -> Option<T> {
    let node = doc.find_by_attribute("id", Some(id)).into_iter().next()?;
    let raw = doc.text_content(&node);
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("无法解析嵌入的 JSON #{}: {}", id, e);
            None
        }
    }
}

/// 读取嵌入的待翻译片段列表
pub fn read_pending<D: DomTree>(doc: &D, id: &str) -> Vec<PendingSegment> {
    read_embedded(doc, id).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::HtmlDocument;

    #[test]
    fn test_insert_routes_by_kind() {
        let mut dict = Dictionary::new("es");
        dict.insert(SegmentKind::Title, " Shop ", "Tienda");
        dict.insert(SegmentKind::HtmlBlock, "Buy <b>now</b>", "Compra <b>ya</b>");
        dict.insert(SegmentKind::MetaDescription, "Best deals", "Mejores ofertas");
        dict.insert(SegmentKind::Text, "OK", "OK");
        dict.insert_path("/about", "/acerca-de");

        assert_eq!(dict.text.get("Shop").map(String::as_str), Some("Tienda"));
        assert_eq!(dict.html.len(), 1);
        assert_eq!(dict.attrs.len(), 1);
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.path_map()["/about"], "/acerca-de");
    }

    #[test]
    fn test_embedded_json_survives_html_round_trip() {
        let mut dict = Dictionary::new("es");
        dict.insert(SegmentKind::HtmlBlock, "a</script><b>x</b>", "b</script><b>y</b>");
        let json = embed_json(&dict).unwrap();
        assert!(!json.contains("</script>"));

        let html = format!(
            r#"<html><head><script type="application/json" id="dict">{}</script></head><body></body></html>"#,
            json
        );
        let doc = HtmlDocument::parse(&html);
        let parsed = Dictionary::from_document(&doc, "dict").unwrap();
        assert_eq!(parsed, dict);
        assert!(Dictionary::from_document(&doc, "missing").is_none());
    }
}
