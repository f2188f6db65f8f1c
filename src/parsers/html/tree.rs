//! DOM 能力接口
//!
//! 片段遍历、回写和客户端协调只依赖这一组窄接口，任何满足它的 DOM
//! 实现都可以替换 `HtmlDocument`。节点句柄必须廉价可克隆，修改通过
//! 内部可变性完成。

use crate::translation::error::TranslationResult;

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Document,
    Doctype,
    Element,
    Text,
    Comment,
    Other,
}

pub trait DomTree {
    type Node: Clone;

    /// 文档根节点
    fn document(&self) -> Self::Node;

    fn node_type(&self, node: &Self::Node) -> NodeType;

    /// 小写标签名，非元素返回 None
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn same_node(&self, a: &Self::Node, b: &Self::Node) -> bool;

    /// 文本或注释节点的内容
    fn text(&self, node: &Self::Node) -> Option<String>;

    fn set_text(&self, node: &Self::Node, value: &str);

    /// 按声明顺序返回属性
    fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;

    /// 设置属性，`None` 表示删除
    fn set_attribute(&self, node: &Self::Node, name: &str, value: Option<&str>);

    fn inner_html(&self, node: &Self::Node) -> TranslationResult<String>;

    fn outer_html(&self, node: &Self::Node) -> TranslationResult<String>;

    fn set_inner_html(&self, node: &Self::Node, html: &str) -> TranslationResult<()>;

    fn create_element(&self, tag: &str, attrs: &[(&str, &str)]) -> Self::Node;

    fn create_text(&self, text: &str) -> Self::Node;

    /// 追加子节点，子节点先从原父节点脱离
    fn append_child(&self, parent: &Self::Node, child: &Self::Node);

    /// 用一组节点替换 `old` 的位置，`old` 被脱离
    fn replace_with(&self, old: &Self::Node, replacements: &[Self::Node]);

    fn get_attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
        self.attributes(node)
            .into_iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value)
    }

    fn is_element(&self, node: &Self::Node) -> bool {
        self.node_type(node) == NodeType::Element
    }

    fn has_tag(&self, node: &Self::Node, tag: &str) -> bool {
        self.tag_name(node).as_deref() == Some(tag)
    }

    /// 子树中所有文本节点拼接的内容
    fn text_content(&self, node: &Self::Node) -> String {
        let mut out = String::new();
        collect_text(self, node, &mut out);
        out
    }

    /// 清空子节点并写入单个文本节点
    fn set_text_content(&self, node: &Self::Node, value: &str) {
        let text = self.create_text(value);
        self.replace_children(node, &[text]);
    }

    fn replace_children(&self, node: &Self::Node, children: &[Self::Node]) {
        for child in self.children(node) {
            self.replace_with(&child, &[]);
        }
        for child in children {
            self.append_child(node, child);
        }
    }

    /// 用新元素包裹节点，返回包裹元素
    fn wrap(&self, node: &Self::Node, tag: &str, attrs: &[(&str, &str)]) -> Self::Node {
        let wrapper = self.create_element(tag, attrs);
        self.replace_with(node, &[wrapper.clone()]);
        self.append_child(&wrapper, node);
        wrapper
    }

    /// 移除元素本身，保留其子节点
    fn unwrap_element(&self, node: &Self::Node) {
        let children = self.children(node);
        self.replace_with(node, &children);
    }

    /// 前序遍历的后代节点，不含 `root`
    fn descendants(&self, root: &Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Self::Node> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(self.children(&node).into_iter().rev());
            out.push(node);
        }
        out
    }

    fn elements_by_tag(&self, tag: &str) -> Vec<Self::Node> {
        self.descendants(&self.document())
            .into_iter()
            .filter(|node| self.has_tag(node, tag))
            .collect()
    }

    fn first_element(&self, tag: &str) -> Option<Self::Node> {
        self.elements_by_tag(tag).into_iter().next()
    }

    /// 按属性查找元素，`value` 为 None 时只要求属性存在
    fn find_by_attribute(&self, name: &str, value: Option<&str>) -> Vec<Self::Node> {
        self.descendants(&self.document())
            .into_iter()
            .filter(|node| match self.get_attribute(node, name) {
                Some(actual) => value.map_or(true, |expected| actual == expected),
                None => false,
            })
            .collect()
    }

    fn has_class(&self, node: &Self::Node, class: &str) -> bool {
        self.get_attribute(node, "class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn add_class(&self, node: &Self::Node, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let classes = match self.get_attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{} {}", existing.trim(), class)
            }
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", Some(&classes));
    }

    fn remove_class(&self, node: &Self::Node, class: &str) {
        let Some(existing) = self.get_attribute(node, "class") else {
            return;
        };
        let remaining: Vec<&str> = existing
            .split_ascii_whitespace()
            .filter(|c| *c != class)
            .collect();
        if remaining.is_empty() {
            self.set_attribute(node, "class", None);
        } else {
            self.set_attribute(node, "class", Some(&remaining.join(" ")));
        }
    }
}

fn collect_text<D: DomTree + ?Sized>(doc: &D, node: &D::Node, out: &mut String) {
    match doc.node_type(node) {
        NodeType::Text => {
            if let Some(text) = doc.text(node) {
                out.push_str(&text);
            }
        }
        NodeType::Comment | NodeType::Doctype => {}
        _ => {
            for child in doc.children(node) {
                collect_text(doc, &child, out);
            }
        }
    }
}
