//! HTML解析和处理模块
//!
//! - `tree`: DOM 能力接口，遍历和客户端协调只依赖它
//! - `dom`: 基于 rcdom 的文档实现和基础DOM操作
//! - `serializer`: 序列化和转义

pub mod dom;
pub mod serializer;
pub mod tree;

pub use dom::{find_nodes, get_node_attr, get_node_name, get_parent_node, html_to_dom, set_node_attr, HtmlDocument};
pub use serializer::{escape_attr, escape_text, serialize_node};
pub use tree::{DomTree, NodeType};
