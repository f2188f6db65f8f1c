use std::cell::RefCell;
use std::rc::Rc;

use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::tree_builder::create_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::serializer::serialize_node;
use super::tree::{DomTree, NodeType};
use crate::translation::error::{TranslationError, TranslationResult};

/// 基于 `markup5ever_rcdom` 的文档
///
/// 句柄是 `Rc`，因此文档不能跨越 `.await`；解析、提取和回写都在同步阶段完成。
pub struct HtmlDocument {
    dom: RcDom,
}

impl HtmlDocument {
    /// 解析完整 HTML 文档
    pub fn parse(html: &str) -> Self {
        Self {
            dom: html_to_dom(html),
        }
    }

    pub fn to_html(&self) -> TranslationResult<String> {
        serialize_node(&self.dom.document, false)
    }

    pub fn head(&self) -> Option<Handle> {
        find_nodes(&self.dom.document, vec!["html", "head"]).into_iter().next()
    }

    pub fn body(&self) -> Option<Handle> {
        find_nodes(&self.dom.document, vec!["html", "body"]).into_iter().next()
    }
}

/// 将 HTML 字符串转换为 DOM
pub fn html_to_dom(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: Vec<&str>) -> Vec<Handle> {
    let mut found_nodes = Vec::new();
    let Some(node_name) = node_names.first().copied() else {
        return found_nodes;
    };

    if node_names.len() == 1 {
        if get_node_name(node) == Some(node_name) {
            found_nodes.push(node.clone());
        }

        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, node_names.clone()));
        }
    } else if get_node_name(node) == Some(node_name) {
        let mut new_node_names = node_names;
        new_node_names.remove(0);
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, new_node_names.clone()));
        }
    } else {
        for child_node in node.children.borrow().iter() {
            found_nodes.append(&mut find_nodes(child_node, node_names.clone()));
        }
    }

    found_nodes
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    // 值为 None 时删除属性
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 将节点从父节点上摘下
fn detach(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

impl DomTree for HtmlDocument {
    type Node = Handle;

    fn document(&self) -> Handle {
        self.dom.document.clone()
    }

    fn node_type(&self, node: &Handle) -> NodeType {
        match &node.data {
            NodeData::Document => NodeType::Document,
            NodeData::Doctype { .. } => NodeType::Doctype,
            NodeData::Element { .. } => NodeType::Element,
            NodeData::Text { .. } => NodeType::Text,
            NodeData::Comment { .. } => NodeType::Comment,
            NodeData::ProcessingInstruction { .. } => NodeType::Other,
        }
    }

    fn tag_name(&self, node: &Handle) -> Option<String> {
        get_node_name(node).map(|name| name.to_ascii_lowercase())
    }

    fn children(&self, node: &Handle) -> Vec<Handle> {
        node.children.borrow().clone()
    }

    fn parent(&self, node: &Handle) -> Option<Handle> {
        get_parent_node(node)
    }

    fn same_node(&self, a: &Handle, b: &Handle) -> bool {
        Rc::ptr_eq(a, b)
    }

    fn text(&self, node: &Handle) -> Option<String> {
        match &node.data {
            NodeData::Text { contents } => Some(contents.borrow().to_string()),
            NodeData::Comment { contents } => Some(contents.to_string()),
            _ => None,
        }
    }

    fn set_text(&self, node: &Handle, value: &str) {
        if let NodeData::Text { contents } = &node.data {
            *contents.borrow_mut() = StrTendril::from_slice(value);
        }
    }

    fn attributes(&self, node: &Handle) -> Vec<(String, String)> {
        match &node.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn get_attribute(&self, node: &Handle, name: &str) -> Option<String> {
        get_node_attr(node, name)
    }

    fn set_attribute(&self, node: &Handle, name: &str, value: Option<&str>) {
        set_node_attr(node, name, value.map(str::to_string));
    }

    fn inner_html(&self, node: &Handle) -> TranslationResult<String> {
        serialize_node(node, false)
    }

    fn outer_html(&self, node: &Handle) -> TranslationResult<String> {
        serialize_node(node, true)
    }

    fn set_inner_html(&self, node: &Handle, html: &str) -> TranslationResult<()> {
        if !self.is_element(node) {
            return Err(TranslationError::InvalidInput(
                "只能替换元素的内部HTML".to_string(),
            ));
        }

        // 块内容只含行内元素，放在 body 上下文中解析即可
        let fragment = html_to_dom(&format!(
            "<!DOCTYPE html><html><head></head><body>{}</body></html>",
            html
        ));
        let body = find_nodes(&fragment.document, vec!["html", "body"])
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::ParseError("片段解析缺少 body".to_string()))?;

        let parsed = self.children(&body);
        self.replace_children(node, &parsed);
        Ok(())
    }

    fn create_element(&self, tag: &str, attrs: &[(&str, &str)]) -> Handle {
        let attrs = attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: QualName::new(None, ns!(), LocalName::from(*name)),
                value: format_tendril!("{}", value),
            })
            .collect();
        create_element(
            &self.dom,
            QualName::new(None, ns!(html), LocalName::from(tag)),
            attrs,
        )
    }

    fn create_text(&self, text: &str) -> Handle {
        Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from_slice(text)),
        })
    }

    fn append_child(&self, parent: &Handle, child: &Handle) {
        detach(child);
        child.parent.set(Some(Rc::downgrade(parent)));
        parent.children.borrow_mut().push(child.clone());
    }

    fn replace_with(&self, old: &Handle, replacements: &[Handle]) {
        let Some(parent) = get_parent_node(old) else {
            return;
        };

        for node in replacements {
            detach(node);
        }

        let position = parent
            .children
            .borrow()
            .iter()
            .position(|child| Rc::ptr_eq(child, old));
        let Some(position) = position else {
            return;
        };

        {
            let mut children = parent.children.borrow_mut();
            children.splice(position..=position, replacements.iter().cloned());
        }
        for node in replacements {
            node.parent.set(Some(Rc::downgrade(&parent)));
        }
        old.parent.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() {
        let doc = HtmlDocument::parse("<html><head><title>Hi</title></head><body><p>One</p></body></html>");
        let html = doc.to_html().unwrap();
        assert!(html.contains("<title>Hi</title>"));
        assert!(html.contains("<p>One</p>"));
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
    }

    #[test]
    fn test_attributes_keep_declaration_order() {
        let doc = HtmlDocument::parse("<body><img title=\"T\" data-x=\"1\" alt=\"A\"></body>");
        let img = doc.first_element("img").unwrap();
        let names: Vec<String> = doc.attributes(&img).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["title", "data-x", "alt"]);

        doc.set_attribute(&img, "alt", Some("B"));
        doc.set_attribute(&img, "data-x", None);
        assert_eq!(doc.get_attribute(&img, "alt").as_deref(), Some("B"));
        assert!(doc.get_attribute(&img, "data-x").is_none());
    }

    #[test]
    fn test_set_inner_html_reparents_children() {
        let doc = HtmlDocument::parse("<body><p id=\"x\">Hello <b>world</b></p></body>");
        let p = doc.find_by_attribute("id", Some("x")).remove(0);
        doc.set_inner_html(&p, "Hola <b>mundo</b> &amp; más").unwrap();

        assert_eq!(doc.inner_html(&p).unwrap(), "Hola <b>mundo</b> &amp; más");
        let b = doc.first_element("b").unwrap();
        let parent = doc.parent(&b).unwrap();
        assert!(doc.same_node(&parent, &p));
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let doc = HtmlDocument::parse("<body><div id=\"d\">Text</div></body>");
        let div = doc.find_by_attribute("id", Some("d")).remove(0);
        let text = doc.children(&div).remove(0);

        let span = doc.wrap(&text, "span", &[("class", "w")]);
        assert_eq!(doc.inner_html(&div).unwrap(), "<span class=\"w\">Text</span>");

        doc.unwrap_element(&span);
        assert_eq!(doc.inner_html(&div).unwrap(), "Text");
    }

    #[test]
    fn test_class_helpers() {
        let doc = HtmlDocument::parse("<body><p class=\"a\">x</p></body>");
        let p = doc.first_element("p").unwrap();
        doc.add_class(&p, "b");
        assert!(doc.has_class(&p, "b"));
        doc.remove_class(&p, "a");
        doc.remove_class(&p, "b");
        assert!(doc.get_attribute(&p, "class").is_none());
    }
}
