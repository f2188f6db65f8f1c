use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

use crate::translation::error::{TranslationError, TranslationResult};

/// 序列化节点
///
/// `include_node` 为 false 时只输出子节点，文档节点必须这样序列化。
pub fn serialize_node(node: &Handle, include_node: bool) -> TranslationResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: if include_node {
            TraversalScope::IncludeNode
        } else {
            TraversalScope::ChildrenOnly(None)
        },
        ..Default::default()
    };

    let serializable: SerializableHandle = node.clone().into();
    serialize(&mut buf, &serializable, opts)
        .map_err(|e| TranslationError::ParseError(format!("DOM序列化失败: {}", e)))?;

    String::from_utf8(buf)
        .map_err(|e| TranslationError::ParseError(format!("序列化结果不是UTF-8: {}", e)))
}

/// 转义文本节点内容，规则与 html5ever 序列化器一致
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// 转义属性值，规则与 html5ever 序列化器一致
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// 开始标签的标记文本
pub fn start_tag(tag: &str, attrs: &[(String, String)]) -> String {
    let mut out = format!("<{}", tag);
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    out
}

pub fn end_tag(tag: &str) -> String {
    format!("</{}>", tag)
}
