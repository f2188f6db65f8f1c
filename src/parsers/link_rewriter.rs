//! 链接重写模块
//!
//! 收集页面中的同源链接路径，并用路径译文重写 `a[href]` 和 `form[action]`

use std::collections::HashMap;

use url::Url;

use crate::parsers::html::DomTree;

/// 没有来源地址时用于解析根相对路径的占位基址
const FALLBACK_BASE: &str = "http://origin.invalid/";

/// 收集同源链接的路径，按首次出现顺序去重
pub fn collect_link_paths<D: DomTree>(doc: &D, origin: Option<&Url>) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();

    for (node, attr) in link_nodes(doc) {
        let Some(value) = doc.get_attribute(&node, attr) else {
            continue;
        };
        if let Some(resolved) = resolve_same_origin(value.trim(), origin) {
            let path = resolved.path().to_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }

    paths
}

/// 用路径译文重写同源链接，返回改写的链接数量
///
/// 已经是译文的路径不在映射的键中，重复调用不会再次改写。
pub fn rewrite_link_paths<D: DomTree>(
    doc: &D,
    origin: Option<&Url>,
    paths: &HashMap<String, String>,
) -> usize {
    if paths.is_empty() {
        return 0;
    }

    let mut rewritten = 0;
    for (node, attr) in link_nodes(doc) {
        let Some(value) = doc.get_attribute(&node, attr) else {
            continue;
        };
        if let Some(new_value) = rewrite_url(value.trim(), origin, paths) {
            doc.set_attribute(&node, attr, Some(&new_value));
            rewritten += 1;
        }
    }

    rewritten
}

/// 文档中所有 `a` 和 `form` 元素及其链接属性
fn link_nodes<D: DomTree>(doc: &D) -> Vec<(D::Node, &'static str)> {
    doc.descendants(&doc.document())
        .into_iter()
        .filter_map(|node| match doc.tag_name(&node).as_deref() {
            Some("a") => Some((node, "href")),
            Some("form") => Some((node, "action")),
            _ => None,
        })
        .collect()
}

/// 判断是否应该跳过重写的链接
fn should_skip_link(href: &str) -> bool {
    href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
        || href.starts_with("blob:")
}

fn is_absolute(href: &str) -> bool {
    href.starts_with("//") || href.starts_with("http://") || href.starts_with("https://")
}

/// 解析为绝对地址，非同源返回 None
fn resolve_same_origin(href: &str, origin: Option<&Url>) -> Option<Url> {
    if should_skip_link(href) {
        return None;
    }

    let base = match origin {
        Some(origin) => origin.clone(),
        None => {
            // 不知道来源时只认根相对路径
            if !href.starts_with('/') || href.starts_with("//") {
                return None;
            }
            Url::parse(FALLBACK_BASE).ok()?
        }
    };

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    if resolved.origin() != base.origin() {
        return None;
    }

    Some(resolved)
}

/// 重写单个URL，保留查询串和锚点
fn rewrite_url(href: &str, origin: Option<&Url>, paths: &HashMap<String, String>) -> Option<String> {
    let mut resolved = resolve_same_origin(href, origin)?;
    let translated = paths.get(resolved.path())?;
    if translated == resolved.path() {
        return None;
    }

    resolved.set_path(translated);

    if is_absolute(href) {
        return Some(resolved.to_string());
    }

    let mut out = resolved.path().to_string();
    if let Some(query) = resolved.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::HtmlDocument;

    #[test]
    fn test_should_skip_link() {
        assert!(should_skip_link(""));
        assert!(should_skip_link("#section"));
        assert!(should_skip_link("javascript:void(0)"));
        assert!(should_skip_link("mailto:test@example.com"));
        assert!(should_skip_link("tel:+1234567890"));
        assert!(should_skip_link("data:text/plain;base64,SGVsbG8="));

        assert!(!should_skip_link("https://example.com"));
        assert!(!should_skip_link("/relative/path"));
        assert!(!should_skip_link("relative.html"));
    }

    #[test]
    fn test_collect_same_origin_paths() {
        let origin: Url = "https://shop.example.com/products/".parse().unwrap();
        let doc = HtmlDocument::parse(
            "<body>\
             <a href=\"/about\">About</a>\
             <a href=\"shoes?page=2\">Shoes</a>\
             <a href=\"https://shop.example.com/about#team\">Team</a>\
             <a href=\"https://other.com/about\">Other</a>\
             <a href=\"#top\">Top</a>\
             <form action=\"/search\"></form>\
             </body>",
        );

        let paths = collect_link_paths(&doc, Some(&origin));
        assert_eq!(paths, vec!["/about", "/products/shoes", "/search"]);
    }

    #[test]
    fn test_rewrite_keeps_query_and_form() {
        let origin: Url = "https://shop.example.com/".parse().unwrap();
        let doc = HtmlDocument::parse(
            "<body>\
             <a id=\"a\" href=\"/about?ref=nav#team\">About</a>\
             <a id=\"b\" href=\"https://shop.example.com/about\">About</a>\
             <a id=\"c\" href=\"https://other.com/about\">Other</a>\
             <form id=\"f\" action=\"/search\"></form>\
             </body>",
        );
        let mut paths = HashMap::new();
        paths.insert("/about".to_string(), "/acerca-de".to_string());
        paths.insert("/search".to_string(), "/buscar".to_string());

        let count = rewrite_link_paths(&doc, Some(&origin), &paths);
        assert_eq!(count, 3);

        let attr = |id: &str, name: &str| {
            let node = doc.find_by_attribute("id", Some(id)).remove(0);
            doc.get_attribute(&node, name).unwrap()
        };
        assert_eq!(attr("a", "href"), "/acerca-de?ref=nav#team");
        assert_eq!(attr("b", "href"), "https://shop.example.com/acerca-de");
        assert_eq!(attr("c", "href"), "https://other.com/about");
        assert_eq!(attr("f", "action"), "/buscar");

        // 再次重写不会改变已翻译的路径
        assert_eq!(rewrite_link_paths(&doc, Some(&origin), &paths), 0);
    }

    #[test]
    fn test_without_origin_only_root_relative() {
        let doc = HtmlDocument::parse(
            "<body><a href=\"/cart\">Cart</a><a href=\"cart\">Cart</a><a href=\"https://x.com/cart\">X</a></body>",
        );
        assert_eq!(collect_link_paths(&doc, None), vec!["/cart"]);
    }
}
