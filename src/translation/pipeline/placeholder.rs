//! 占位符编解码
//!
//! 行内标记、品牌词和数字在发送给翻译服务前被替换为 `[B1]`、`[/B1]`、
//! `[S1]` 这样的短标记，译文返回后再按相反顺序还原。构造顺序固定为
//! 标签、品牌词、数字；还原顺序为数字、品牌词、标签。
//!
//! 标记语法只在 [`tokenize`] 中定义一次，保护、还原和校验共用它。
//! `[required]`、`[A]`、`[/S1]` 之类不符合语法的方括号文本都是普通内容。

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::parsers::html::escape_text;
use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};

/// 标记类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// b / strong
    Bold,
    /// em / i
    Emphasis,
    /// a
    Anchor,
    /// span
    Span,
    /// 其他行内元素
    Group,
    /// 空元素或不可翻译的整段标记
    Void,
    Number,
    SkipWord,
}

impl TokenKind {
    pub fn code(self) -> &'static str {
        match self {
            TokenKind::Bold => "B",
            TokenKind::Emphasis => "E",
            TokenKind::Anchor => "A",
            TokenKind::Span => "SP",
            TokenKind::Group => "G",
            TokenKind::Void => "V",
            TokenKind::Number => "N",
            TokenKind::SkipWord => "S",
        }
    }

    pub fn is_paired(self) -> bool {
        matches!(
            self,
            TokenKind::Bold | TokenKind::Emphasis | TokenKind::Anchor | TokenKind::Span | TokenKind::Group
        )
    }

    /// 行内标签对应的成对标记类型
    pub fn for_tag(tag: &str) -> Self {
        match tag {
            "b" | "strong" => TokenKind::Bold,
            "em" | "i" => TokenKind::Emphasis,
            "a" => TokenKind::Anchor,
            "span" => TokenKind::Span,
            _ => TokenKind::Group,
        }
    }

    /// 从输入开头解析类型代码，`SP` 优先于单字母
    fn parse_prefix(input: &str) -> Option<(Self, usize)> {
        if input.starts_with("SP") {
            return Some((TokenKind::Span, 2));
        }
        let kind = match input.as_bytes().first()? {
            b'B' => TokenKind::Bold,
            b'E' => TokenKind::Emphasis,
            b'A' => TokenKind::Anchor,
            b'G' => TokenKind::Group,
            b'V' => TokenKind::Void,
            b'N' => TokenKind::Number,
            b'S' => TokenKind::SkipWord,
            _ => return None,
        };
        Some((kind, 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRole {
    Open,
    Close,
    Standalone,
}

/// 一个语法上合法的占位符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub index: u32,
    pub role: TokenRole,
}

impl Token {
    pub fn open(kind: TokenKind, index: u32) -> Self {
        Self { kind, index, role: TokenRole::Open }
    }

    pub fn close(kind: TokenKind, index: u32) -> Self {
        Self { kind, index, role: TokenRole::Close }
    }

    pub fn standalone(kind: TokenKind, index: u32) -> Self {
        Self { kind, index, role: TokenRole::Standalone }
    }

    /// 配对标记的另一半
    fn counterpart(self) -> Self {
        match self.role {
            TokenRole::Open => Token::close(self.kind, self.index),
            TokenRole::Close => Token::open(self.kind, self.index),
            TokenRole::Standalone => self,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            TokenRole::Close => write!(f, "[/{}{}]", self.kind.code(), self.index),
            _ => write!(f, "[{}{}]", self.kind.code(), self.index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Token(Token),
}

/// 将字符串切分为文本和占位符
pub fn tokenize(input: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find('[') {
        let start = cursor + offset;
        match parse_token(&input[start..]) {
            Some((token, len)) => {
                if text_start < start {
                    pieces.push(Piece::Text(&input[text_start..start]));
                }
                pieces.push(Piece::Token(token));
                cursor = start + len;
                text_start = cursor;
            }
            None => cursor = start + 1,
        }
    }

    if text_start < input.len() {
        pieces.push(Piece::Text(&input[text_start..]));
    }
    pieces
}

/// 输入中出现的所有占位符
pub fn tokens(input: &str) -> Vec<Token> {
    tokenize(input)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Token(token) => Some(token),
            Piece::Text(_) => None,
        })
        .collect()
}

/// 尝试在输入开头解析一个占位符，返回标记和消耗的字节数
fn parse_token(input: &str) -> Option<(Token, usize)> {
    let mut pos = 1;
    let closing = input[pos..].starts_with('/');
    if closing {
        pos += 1;
    }

    let (kind, code_len) = TokenKind::parse_prefix(&input[pos..])?;
    pos += code_len;

    let digits = input[pos..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || input[pos..].starts_with('0') {
        return None;
    }
    let index: u32 = input[pos..pos + digits].parse().ok()?;
    pos += digits;

    if !input[pos..].starts_with(']') {
        return None;
    }
    pos += 1;

    let role = match (kind.is_paired(), closing) {
        (true, false) => TokenRole::Open,
        (true, true) => TokenRole::Close,
        (false, false) => TokenRole::Standalone,
        (false, true) => return None,
    };

    Some((Token { kind, index, role }, pos))
}

/// 块内容的标记流
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupRun {
    /// 未转义的文本
    Text(String),
    /// 行内元素的开始标签
    Open { tag: String, markup: String },
    /// 与最近一个未闭合 `Open` 配对的结束标签
    Close { markup: String },
    /// 原样保留的外部 HTML
    Opaque(String),
}

/// 一次替换：占位符和它代表的原文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub placeholder: String,
    pub original: String,
}

/// 单个片段的全部替换记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protection {
    pub tags: Vec<Replacement>,
    pub skip_words: Vec<Replacement>,
    pub numbers: Vec<Replacement>,
    /// 还原时是否转义文本，块级 HTML 片段为 true
    pub escape_text: bool,
}

impl Protection {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.skip_words.is_empty() && self.numbers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    pub text: String,
    pub protection: Protection,
}

enum Part {
    Text(String),
    Token(String),
}

/// 单次保护过程中的计数器，按类型从 1 开始编号
#[derive(Default)]
struct Numbering {
    counters: HashMap<TokenKind, u32>,
    standalone: HashMap<(TokenKind, String), String>,
}

impl Numbering {
    fn next(&mut self, kind: TokenKind) -> u32 {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }

    /// 同一原文复用同一个独立标记，第二个返回值表示是否新建
    fn standalone(&mut self, kind: TokenKind, original: &str) -> (String, bool) {
        if let Some(existing) = self.standalone.get(&(kind, original.to_string())) {
            return (existing.clone(), false);
        }
        let placeholder = Token::standalone(kind, self.next(kind)).to_string();
        self.standalone
            .insert((kind, original.to_string()), placeholder.clone());
        (placeholder, true)
    }
}

/// 占位符编解码器
#[derive(Debug, Clone)]
pub struct PlaceholderCodec {
    skip_words: Option<Regex>,
    numbers: Option<Regex>,
}

impl Default for PlaceholderCodec {
    fn default() -> Self {
        Self {
            skip_words: None,
            numbers: Regex::new(NUMBER_PATTERN).ok(),
        }
    }
}

const NUMBER_PATTERN: &str = r"\b\d+(?:[.,]\d+)*\b";

impl PlaceholderCodec {
    pub fn new(skip_words: &[String], protect_numbers: bool) -> TranslationResult<Self> {
        let skip_words = build_skip_pattern(skip_words)?;
        let numbers = if protect_numbers {
            Some(Regex::new(NUMBER_PATTERN).map_err(|e| {
                TranslationError::ConfigError(format!("数字匹配规则无效: {}", e))
            })?)
        } else {
            None
        };

        Ok(Self { skip_words, numbers })
    }

    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        Self::new(&config.skip_words, config.protect_numbers)
    }

    /// 保护纯文本（文本节点、标题、属性）
    pub fn protect_text(&self, text: &str) -> Protected {
        let mut protected = self.protect(&[MarkupRun::Text(text.to_string())]);
        protected.protection.escape_text = false;
        protected
    }

    /// 保护块级内容，文本在还原时重新转义
    pub fn protect_runs(&self, runs: &[MarkupRun]) -> Protected {
        let mut protected = self.protect(runs);
        protected.protection.escape_text = true;
        protected
    }

    fn protect(&self, runs: &[MarkupRun]) -> Protected {
        let mut numbering = Numbering::default();
        let mut protection = Protection::default();

        let mut parts = protect_tags(runs, &mut numbering, &mut protection.tags);
        if let Some(pattern) = &self.skip_words {
            parts = protect_matches(parts, pattern, TokenKind::SkipWord, &mut numbering, &mut protection.skip_words);
        }
        if let Some(pattern) = &self.numbers {
            parts = protect_matches(parts, pattern, TokenKind::Number, &mut numbering, &mut protection.numbers);
        }

        let text = parts
            .into_iter()
            .map(|part| match part {
                Part::Text(text) | Part::Token(text) => text,
            })
            .collect();

        Protected { text, protection }
    }
}

fn build_skip_pattern(skip_words: &[String]) -> TranslationResult<Option<Regex>> {
    let mut words: Vec<&str> = skip_words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect();
    if words.is_empty() {
        return Ok(None);
    }

    // 长词优先，避免被前缀截断
    words.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    words.dedup();

    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    let alternatives: Vec<String> = words
        .iter()
        .map(|word| {
            let mut alt = String::new();
            if word.chars().next().is_some_and(is_word_char) {
                alt.push_str(r"\b");
            }
            alt.push_str(&regex::escape(word));
            if word.chars().last().is_some_and(is_word_char) {
                alt.push_str(r"\b");
            }
            alt
        })
        .collect();

    Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
        .map(Some)
        .map_err(|e| TranslationError::ConfigError(format!("品牌词匹配规则无效: {}", e)))
}

fn protect_tags(
    runs: &[MarkupRun],
    numbering: &mut Numbering,
    replacements: &mut Vec<Replacement>,
) -> Vec<Part> {
    let mut parts = Vec::with_capacity(runs.len());
    let mut open: Vec<Token> = Vec::new();

    for run in runs {
        match run {
            MarkupRun::Text(text) => parts.push(Part::Text(text.clone())),
            MarkupRun::Open { tag, markup } => {
                let kind = TokenKind::for_tag(tag);
                let token = Token::open(kind, numbering.next(kind));
                open.push(token);
                replacements.push(Replacement {
                    placeholder: token.to_string(),
                    original: markup.clone(),
                });
                parts.push(Part::Token(token.to_string()));
            }
            MarkupRun::Close { markup } => match open.pop() {
                Some(token) => {
                    let close = token.counterpart();
                    replacements.push(Replacement {
                        placeholder: close.to_string(),
                        original: markup.clone(),
                    });
                    parts.push(Part::Token(close.to_string()));
                }
                None => parts.push(standalone_part(TokenKind::Void, markup, numbering, replacements)),
            },
            MarkupRun::Opaque(markup) => {
                parts.push(standalone_part(TokenKind::Void, markup, numbering, replacements))
            }
        }
    }

    parts
}

fn standalone_part(
    kind: TokenKind,
    original: &str,
    numbering: &mut Numbering,
    replacements: &mut Vec<Replacement>,
) -> Part {
    let (placeholder, created) = numbering.standalone(kind, original);
    if created {
        replacements.push(Replacement {
            placeholder: placeholder.clone(),
            original: original.to_string(),
        });
    }
    Part::Token(placeholder)
}

/// 只在文本部分中查找匹配，已有标记不会被再次扫描
fn protect_matches(
    parts: Vec<Part>,
    pattern: &Regex,
    kind: TokenKind,
    numbering: &mut Numbering,
    replacements: &mut Vec<Replacement>,
) -> Vec<Part> {
    let mut out = Vec::with_capacity(parts.len());

    for part in parts {
        let text = match part {
            Part::Text(text) => text,
            token => {
                out.push(token);
                continue;
            }
        };

        let mut last = 0;
        for found in pattern.find_iter(&text) {
            if found.start() > last {
                out.push(Part::Text(text[last..found.start()].to_string()));
            }
            out.push(standalone_part(kind, found.as_str(), numbering, replacements));
            last = found.end();
        }
        if last < text.len() {
            out.push(Part::Text(text[last..].to_string()));
        }
    }

    out
}

/// 还原译文中的占位符
///
/// 依次查找数字、品牌词、标签的替换记录。未知标记原样保留；
/// `escape_text` 为 true 时所有文本内容（包括还原出的数字和品牌词）都会被转义，
/// 只有标签替换写回原始标记。
pub fn restore(translated: &str, protection: &Protection) -> String {
    let lookup = |list: &[Replacement], key: &str| -> Option<String> {
        list.iter()
            .find(|replacement| replacement.placeholder == key)
            .map(|replacement| replacement.original.clone())
    };
    let text = |value: &str| {
        if protection.escape_text {
            escape_text(value)
        } else {
            value.to_string()
        }
    };

    let mut out = String::with_capacity(translated.len());
    for piece in tokenize(translated) {
        match piece {
            Piece::Text(value) => out.push_str(&text(value)),
            Piece::Token(token) => {
                let key = token.to_string();
                if let Some(original) = lookup(&protection.numbers, &key)
                    .or_else(|| lookup(&protection.skip_words, &key))
                {
                    out.push_str(&text(&original));
                } else if let Some(markup) = lookup(&protection.tags, &key) {
                    out.push_str(&markup);
                } else {
                    out.push_str(&text(&key));
                }
            }
        }
    }
    out
}

/// 占位符校验结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// 原文中有、译文中缺失的标记
    pub missing: Vec<String>,
    /// 译文中多出的标记
    pub extra: Vec<String>,
    pub unmatched_open: Vec<String>,
    pub unmatched_close: Vec<String>,
    pub nesting_errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
            && self.extra.is_empty()
            && self.unmatched_open.is_empty()
            && self.unmatched_close.is_empty()
            && self.nesting_errors.is_empty()
    }

    /// 严格模式下转换为错误
    pub fn into_result(self) -> TranslationResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(TranslationError::PlaceholderViolation(self.to_string()))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = [
            ("缺失", &self.missing),
            ("多余", &self.extra),
            ("未闭合", &self.unmatched_open),
            ("无匹配的结束", &self.unmatched_close),
            ("嵌套错误", &self.nesting_errors),
        ];
        let described: Vec<String> = groups
            .iter()
            .filter(|(_, tokens)| !tokens.is_empty())
            .map(|(label, tokens)| format!("{}: {}", label, tokens.join(" ")))
            .collect();
        if described.is_empty() {
            write!(f, "ok")
        } else {
            write!(f, "{}", described.join("; "))
        }
    }
}

/// 对照原文校验译文中的占位符
pub fn validate(original: &str, translated: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut expected: HashMap<Token, usize> = HashMap::new();
    for token in tokens(original) {
        *expected.entry(token).or_insert(0) += 1;
    }
    let found = tokens(translated);
    let mut actual: HashMap<Token, usize> = HashMap::new();
    for token in &found {
        *actual.entry(*token).or_insert(0) += 1;
    }

    for token in tokens(original) {
        let want = expected.get(&token).copied().unwrap_or(0);
        let have = actual.get(&token).copied().unwrap_or(0);
        let label = token.to_string();
        if have < want && !report.missing.contains(&label) {
            report.missing.push(label);
        }
    }
    for token in &found {
        let want = expected.get(token).copied().unwrap_or(0);
        let have = actual.get(token).copied().unwrap_or(0);
        let label = token.to_string();
        if have > want && !report.extra.contains(&label) {
            report.extra.push(label);
        }
    }

    let mut stack: Vec<Token> = Vec::new();
    for token in found {
        match token.role {
            TokenRole::Standalone => {}
            TokenRole::Open => stack.push(token),
            TokenRole::Close => {
                let open = token.counterpart();
                if stack.last() == Some(&open) {
                    stack.pop();
                } else if let Some(pos) = stack.iter().rposition(|t| *t == open) {
                    report.nesting_errors.push(token.to_string());
                    stack.remove(pos);
                } else {
                    report.unmatched_close.push(token.to_string());
                }
            }
        }
    }
    report.unmatched_open = stack.iter().map(Token::to_string).collect();

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(items: &[(&str, &str)]) -> Vec<MarkupRun> {
        items
            .iter()
            .map(|(kind, value)| match *kind {
                "text" => MarkupRun::Text(value.to_string()),
                "close" => MarkupRun::Close { markup: value.to_string() },
                "opaque" => MarkupRun::Opaque(value.to_string()),
                tag => MarkupRun::Open {
                    tag: tag.to_string(),
                    markup: value.to_string(),
                },
            })
            .collect()
    }

    #[test]
    fn test_tokenize_ignores_non_grammar_brackets() {
        let pieces = tokenize("[required] [A] [/S1] [B0] [B1]x[/B1] [SP2] [N12]");
        let found: Vec<String> = pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Token(token) => Some(token.to_string()),
                Piece::Text(_) => None,
            })
            .collect();
        assert_eq!(found, vec!["[B1]", "[/B1]", "[SP2]", "[N12]"]);

        let text: String = pieces
            .iter()
            .map(|piece| match piece {
                Piece::Text(text) => text.to_string(),
                Piece::Token(token) => token.to_string(),
            })
            .collect();
        assert_eq!(text, "[required] [A] [/S1] [B0] [B1]x[/B1] [SP2] [N12]");
    }

    #[test]
    fn test_skip_word_scenario() {
        let codec = PlaceholderCodec::new(&["eBay".to_string()], true).unwrap();
        let protected = codec.protect_text("Use Find-Your-Item, it's great with eBay");
        assert_eq!(protected.text, "Use Find-Your-Item, it's great with [S1]");

        let restored = restore("Utiliza Find-Your-Item, es genial con [S1]", &protected.protection);
        assert_eq!(restored, "Utiliza Find-Your-Item, es genial con eBay");
    }

    #[test]
    fn test_skip_words_are_case_insensitive_and_keep_original() {
        let codec = PlaceholderCodec::new(&["eBay".to_string()], false).unwrap();
        let protected = codec.protect_text("EBAY and eBay but not eBayer");
        assert_eq!(protected.text, "[S1] and [S2] but not eBayer");
        assert_eq!(restore("[S2] y [S1]", &protected.protection), "eBay y EBAY");
    }

    #[test]
    fn test_numbers_reuse_tokens() {
        let codec = PlaceholderCodec::default();
        let protected = codec.protect_text("3 items, 3 left, 1,299.00 total");
        assert_eq!(protected.text, "[N1] items, [N1] left, [N2] total");
        assert_eq!(protected.protection.numbers.len(), 2);

        let other = codec.protect_text("4 items");
        assert_eq!(other.text, "[N1] items");
        assert_eq!(restore("[N1] artículos", &other.protection), "4 artículos");
    }

    #[test]
    fn test_block_round_trip() {
        let codec = PlaceholderCodec::new(&["eBay".to_string()], true).unwrap();
        let input = runs(&[
            ("text", "Buy "),
            ("b", "<b>"),
            ("text", "2 shoes"),
            ("close", "</b>"),
            ("text", " on "),
            ("a", "<a href=\"/x\">"),
            ("text", "eBay & more"),
            ("close", "</a>"),
            ("opaque", "<br>"),
            ("text", "<now>"),
        ]);
        let protected = codec.protect_runs(&input);
        assert_eq!(
            protected.text,
            "Buy [B1][N1] shoes[/B1] on [A1][S1] & more[/A1][V1]<now>"
        );

        let restored = restore(&protected.text, &protected.protection);
        assert_eq!(
            restored,
            "Buy <b>2 shoes</b> on <a href=\"/x\">eBay &amp; more</a><br>&lt;now&gt;"
        );
    }

    #[test]
    fn test_nested_paired_tokens_use_per_kind_counters() {
        let codec = PlaceholderCodec::new(&[], false).unwrap();
        let input = runs(&[
            ("b", "<b>"),
            ("i", "<i>"),
            ("text", "x"),
            ("close", "</i>"),
            ("close", "</b>"),
            ("b", "<strong>"),
            ("text", "y"),
            ("close", "</strong>"),
        ]);
        let protected = codec.protect_runs(&input);
        assert_eq!(protected.text, "[B1][E1]x[/E1][/B1][B2]y[/B2]");
        assert_eq!(
            restore("[B2]Y[/B2] [B1][E1]X[/E1][/B1]", &protected.protection),
            "<strong>Y</strong> <b><i>X</i></b>"
        );
    }

    #[test]
    fn test_text_segments_are_not_escaped() {
        let codec = PlaceholderCodec::default();
        let protected = codec.protect_text("a < b");
        assert_eq!(restore("a < b", &protected.protection), "a < b");
    }

    #[test]
    fn test_validate_reports() {
        let original = "[B1]Hello[/B1] [A1]world[/A1] [N1]";
        assert!(validate(original, "[B1]Hola[/B1] [A1]mundo[/A1] [N1]").is_valid());
        // 顺序改变但嵌套合法
        assert!(validate(original, "[N1] [A1]mundo[/A1] [B1]Hola[/B1]").is_valid());

        let report = validate(original, "[B1]Hola [A1]mundo[/B1][/A1]");
        assert_eq!(report.missing, vec!["[N1]"]);
        assert_eq!(report.nesting_errors, vec!["[/B1]"]);
        assert!(report.unmatched_close.is_empty());
        assert!(report.unmatched_open.is_empty());

        let report = validate(original, "[B1]Hola[/B1] [A1]mundo [N1] [G1]");
        assert_eq!(report.missing, vec!["[/A1]"]);
        assert_eq!(report.extra, vec!["[G1]"]);
        assert_eq!(report.unmatched_open, vec!["[A1]", "[G1]"]);

        let report = validate("[B1]x[/B1]", "[B1]x[/B1][/B1]");
        assert_eq!(report.extra, vec!["[/B1]"]);
        assert_eq!(report.unmatched_close, vec!["[/B1]"]);
        assert!(matches!(
            report.into_result(),
            Err(TranslationError::PlaceholderViolation(_))
        ));
    }
}
