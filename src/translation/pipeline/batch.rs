//! 去重与分批模块
//!
//! 把页面片段的保护后文本折叠为唯一集合，再按请求限制打包成块。
//!
//! ## 核心功能
//!
//! - **去重**: 相同的保护后文本只翻译一次，`"3 items"` 和 `"4 items"` 保护后
//!   都是 `"[N1] items"`，共用一次上游翻译，只在各自还原时产生差异
//! - **分批**: 每块同时受条目数和字符数限制，加入下一条会超出任一限制时
//!   立即封块；单条超过字符限制时独占一块，字符串从不拆分
//! - **重建**: 按原始顺序把唯一译文展开回每个片段，输出长度始终等于输入长度
//!
//! ## 使用示例
//!
//! ```rust
//! use lingo_relay::translation::pipeline::batch::{preprocess, reconstruct, BatchLimits};
//!
//! let values = ["Home", "Cart", "Home"];
//! let pre = preprocess(&values, &BatchLimits::default());
//! assert_eq!(pre.total_unique, 2);
//!
//! let translated: Vec<String> = pre
//!     .chunks
//!     .iter()
//!     .flat_map(|chunk| chunk.items.iter().map(|s| s.to_uppercase()))
//!     .collect();
//! let all = reconstruct(&pre.dedupe, &translated).unwrap();
//! assert_eq!(all, vec!["HOME", "CART", "HOME"]);
//! ```

use std::collections::HashMap;

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};

/// 单次上游请求的尺寸限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_chars: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: constants::MAX_BATCH_ITEMS,
            max_chars: constants::MAX_BATCH_CHARS,
        }
    }
}

impl BatchLimits {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_items: config.max_batch_items.max(1),
            max_chars: config.max_batch_chars.max(1),
        }
    }
}

/// 去重结果
///
/// `unique` 保存唯一值（按首次出现顺序），`positions[i]` 是第 i 个输入在
/// `unique` 中的下标。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeResult {
    pub unique: Vec<String>,
    pub positions: Vec<usize>,
    /// 每个唯一值首次出现的输入下标
    pub first_index: Vec<usize>,
}

impl DedupeResult {
    pub fn input_len(&self) -> usize {
        self.positions.len()
    }
}

/// 一次上游请求的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 第一个条目在唯一集合中的下标
    pub start: usize,
    pub items: Vec<String>,
    pub chars: usize,
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub chunks: Vec<Chunk>,
    pub dedupe: DedupeResult,
    pub total_unique: usize,
}

/// 去重
pub fn dedupe<S: AsRef<str>>(values: &[S]) -> DedupeResult {
    let mut result = DedupeResult::default();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, value) in values.iter().enumerate() {
        let value = value.as_ref();
        let position = match seen.get(value) {
            Some(position) => *position,
            None => {
                let position = result.unique.len();
                seen.insert(value, position);
                result.unique.push(value.to_string());
                result.first_index.push(index);
                position
            }
        };
        result.positions.push(position);
    }

    result
}

/// 按限制把唯一值打包成块
pub fn chunk(unique: &[String], limits: &BatchLimits) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Option<Chunk> = None;

    for (index, item) in unique.iter().enumerate() {
        let len = item.chars().count();

        if let Some(open) = current.as_mut() {
            let fits = open.items.len() < limits.max_items && open.chars + len <= limits.max_chars;
            if fits {
                open.items.push(item.clone());
                open.chars += len;
                continue;
            }
        }

        if let Some(done) = current.take() {
            chunks.push(done);
        }
        current = Some(Chunk {
            start: index,
            items: vec![item.clone()],
            chars: len,
        });
    }

    if let Some(done) = current {
        chunks.push(done);
    }
    chunks
}

/// 去重并分批
pub fn preprocess<S: AsRef<str>>(values: &[S], limits: &BatchLimits) -> Preprocessed {
    let dedupe = dedupe(values);
    let chunks = chunk(&dedupe.unique, limits);
    let total_unique = dedupe.unique.len();

    tracing::debug!(
        "{} 个片段去重后剩 {} 条，分为 {} 块",
        dedupe.input_len(),
        total_unique,
        chunks.len()
    );

    Preprocessed {
        chunks,
        dedupe,
        total_unique,
    }
}

/// 按原始顺序展开唯一译文
pub fn reconstruct(dedupe: &DedupeResult, translated_unique: &[String]) -> TranslationResult<Vec<String>> {
    if translated_unique.len() != dedupe.unique.len() {
        return Err(TranslationError::ExtractionMismatch(format!(
            "唯一译文数量 {} 与唯一原文数量 {} 不一致",
            translated_unique.len(),
            dedupe.unique.len()
        )));
    }

    Ok(dedupe
        .positions
        .iter()
        .map(|position| translated_unique[*position].clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_dedupe_and_reconstruct() {
        let values = ["[N1] items", "Home", "[N1] items", "Cart", "Home"];
        let pre = preprocess(&values, &BatchLimits::default());

        assert_eq!(pre.total_unique, 3);
        assert_eq!(pre.dedupe.unique, vec!["[N1] items", "Home", "Cart"]);
        assert_eq!(pre.dedupe.first_index, vec![0, 1, 3]);
        assert_eq!(pre.chunks.len(), 1);

        let translated = vec![
            "[N1] artículos".to_string(),
            "Inicio".to_string(),
            "Carrito".to_string(),
        ];
        let all = reconstruct(&pre.dedupe, &translated).unwrap();
        assert_eq!(all.len(), values.len());
        assert_eq!(all[0], all[2]);
        assert_eq!(all[1], "Inicio");
        assert_eq!(all[4], "Inicio");
    }

    #[test]
    fn test_reconstruct_rejects_wrong_length() {
        let pre = preprocess(&["a", "b"], &BatchLimits::default());
        assert!(matches!(
            reconstruct(&pre.dedupe, &["x".to_string()]),
            Err(TranslationError::ExtractionMismatch(_))
        ));
    }

    #[test]
    fn test_chunks_respect_item_limit() {
        let values: Vec<String> = (0..300).map(|i| format!("text {}", i)).collect();
        let pre = preprocess(&values, &BatchLimits::default());

        assert_eq!(pre.chunks.len(), 3);
        assert_eq!(pre.chunks[0].items.len(), 128);
        assert_eq!(pre.chunks[1].start, 128);
        assert_eq!(pre.chunks[2].items.len(), 300 - 256);
    }

    #[test]
    fn test_chunks_respect_char_limit_and_oversize() {
        let limits = BatchLimits {
            max_items: 10,
            max_chars: 10,
        };
        let values = ["aaaa", "bbbb", "cccc", "this one is far too long", "dd"];
        let chunks = chunk(
            &values.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &limits,
        );

        let sizes: Vec<Vec<&str>> = chunks
            .iter()
            .map(|c| c.items.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(
            sizes,
            vec![
                vec!["aaaa", "bbbb"],
                vec!["cccc"],
                vec!["this one is far too long"],
                vec!["dd"],
            ]
        );
    }

    #[test]
    fn test_chunk_union_is_unique_set() {
        let limits = BatchLimits {
            max_items: 7,
            max_chars: 40,
        };
        let values: Vec<String> = (0..100).map(|i| "x".repeat(i % 13 + 1)).collect();
        let pre = preprocess(&values, &limits);

        let mut seen = HashSet::new();
        let mut next_start = 0;
        for chunk in &pre.chunks {
            assert!(chunk.items.len() <= limits.max_items);
            assert!(chunk.chars <= limits.max_chars || chunk.items.len() == 1);
            assert_eq!(chunk.start, next_start);
            next_start += chunk.items.len();
            for item in &chunk.items {
                assert!(seen.insert(item.clone()));
            }
        }
        assert_eq!(seen.len(), pre.total_unique);
        assert_eq!(pre.total_unique, 13);
    }
}
