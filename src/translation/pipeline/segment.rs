//! 片段模型

use serde::{Deserialize, Serialize};

use super::placeholder::{restore, Protection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    Title,
    MetaDescription,
    HtmlBlock,
    Text,
    Attribute,
    Pathname,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Title => "title",
            SegmentKind::MetaDescription => "meta-description",
            SegmentKind::HtmlBlock => "html-block",
            SegmentKind::Text => "text",
            SegmentKind::Attribute => "attribute",
            SegmentKind::Pathname => "pathname",
        }
    }
}

/// 翻译前剥离、回写时拼回的首尾空白
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitespace {
    pub leading: String,
    pub trailing: String,
}

impl Whitespace {
    /// 拆分首尾空白，返回空白信封和中间部分
    pub fn split(value: &str) -> (Self, &str) {
        let trimmed_start = value.trim_start();
        let leading = &value[..value.len() - trimmed_start.len()];
        let trimmed = trimmed_start.trim_end();
        let trailing = &trimmed_start[trimmed.len()..];
        (
            Self {
                leading: leading.to_string(),
                trailing: trailing.to_string(),
            },
            trimmed,
        )
    }

    pub fn wrap(&self, inner: &str) -> String {
        format!("{}{}{}", self.leading, inner, self.trailing)
    }
}

/// 一个可翻译单元
///
/// 提取后不再修改。`value` 是去掉首尾空白、替换占位符后的文本，`source`
/// 是去掉首尾空白的原文（块级片段为内部 HTML），缓存和字典都以它为键。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub value: String,
    pub source: String,
    pub attr_name: Option<String>,
    pub whitespace: Whitespace,
    pub protection: Protection,
}

impl Segment {
    /// 路径片段不做占位符保护
    pub fn pathname(path: &str) -> Self {
        Self {
            kind: SegmentKind::Pathname,
            value: path.to_string(),
            source: path.to_string(),
            attr_name: None,
            whitespace: Whitespace::default(),
            protection: Protection::default(),
        }
    }

    /// 片段键，缓存、进行中记录和客户端标记共用
    pub fn hash(&self) -> String {
        segment_key(self.kind, &self.source)
    }

    /// 将翻译服务返回的占位符文本还原为最终内容（不含空白信封）
    pub fn restore(&self, translated: &str) -> String {
        restore(translated.trim(), &self.protection)
    }

    /// 客户端轮询用的描述
    pub fn descriptor(&self) -> PendingSegment {
        PendingSegment {
            hash: self.hash(),
            kind: self.kind,
            content: self.source.clone(),
            attr: self.attr_name.clone(),
        }
    }
}

/// 文本哈希（blake3 十六进制）
pub fn hash_text(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// 片段键：类型和原文一起参与哈希
///
/// 块级片段的原文是 HTML，其余类型是纯文本。同样的字符串在不同类型下
/// 译文的还原方式不同，键必须区分类型。
pub fn segment_key(kind: SegmentKind, source: &str) -> String {
    hash_text(&format!("{}\0{}", kind.as_str(), source))
}

/// 尚未翻译、需要客户端轮询的片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSegment {
    pub hash: String,
    pub kind: SegmentKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

/// 至少包含一个字母才需要翻译
pub fn is_translatable(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_envelope() {
        let (ws, inner) = Whitespace::split("\n  Hello world \t");
        assert_eq!(inner, "Hello world");
        assert_eq!(ws.leading, "\n  ");
        assert_eq!(ws.trailing, " \t");
        assert_eq!(ws.wrap("Hola mundo"), "\n  Hola mundo \t");

        let (ws, inner) = Whitespace::split("   ");
        assert_eq!(inner, "");
        assert_eq!(ws.wrap("x"), "   x");
    }

    #[test]
    fn test_descriptor_serialization() {
        let segment = Segment::pathname("/about");
        let json = serde_json::to_value(segment.descriptor()).unwrap();
        assert_eq!(json["kind"], "pathname");
        assert_eq!(json["content"], "/about");
        assert!(json.get("attr").is_none());
        assert_eq!(json["hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_key_depends_on_kind() {
        let text = Segment {
            kind: SegmentKind::Text,
            ..Segment::pathname("Use <b>bold</b> tags")
        };
        let block = Segment {
            kind: SegmentKind::HtmlBlock,
            ..text.clone()
        };
        assert_ne!(text.hash(), block.hash());
        assert_eq!(text.hash(), segment_key(SegmentKind::Text, "Use <b>bold</b> tags"));
        assert_ne!(text.hash(), hash_text("Use <b>bold</b> tags"));
    }

    #[test]
    fn test_is_translatable() {
        assert!(is_translatable("Hello"));
        assert!(is_translatable("Größe 42"));
        assert!(!is_translatable("42 - 7"));
        assert!(!is_translatable("  "));
    }
}
