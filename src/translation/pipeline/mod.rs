//! 翻译管道模块
//!
//! 提取、占位符保护、去重分批和回写

pub mod batch;
pub mod placeholder;
pub mod segment;
pub mod walker;

// 重新导出主要类型
pub use batch::{preprocess, reconstruct, BatchLimits, Chunk, DedupeResult, Preprocessed};
pub use placeholder::{
    restore, tokenize, validate, MarkupRun, Piece, PlaceholderCodec, Protected, Protection, Token,
    TokenKind, TokenRole, ValidationReport,
};
pub use segment::{
    hash_text, is_translatable, segment_key, PendingSegment, Segment, SegmentKind, Whitespace,
};
pub use walker::{
    apply, apply_outcomes, apply_partial, apply_strict, extract, is_excluded, mark_pending, plan,
    ApplyReport, Slot, SlotOutcome,
};
