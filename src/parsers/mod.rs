//! # 解析器模块
//!
//! - `html` - HTML文档解析、DOM能力接口、序列化
//! - `link_rewriter` - 同源链接收集和路径重写

pub mod html;
pub mod link_rewriter;

pub use html::{DomTree, HtmlDocument, NodeType};
pub use link_rewriter::{collect_link_paths, rewrite_link_paths};
