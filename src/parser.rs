//! Character-level state machine for the A1111 emphasis dialect.
//!
//! The parser walks the prompt one character at a time. Plain tags are flushed with the neutral
//! weight whenever the delimiter is seen; `(name:weight)` groups carry an explicit weight. Groups
//! nested inside an outer group are copied verbatim into the outer name, so only the outermost
//! pair of a token can carry a weight.
//!
//! Malformed emphasis is not always fatal. When the text after a closing parenthesis is not the
//! delimiter, the cursor jumps back to the last confirmed delimiter and the span is re-read as
//! literal text. When the weight itself is not numeric, the span is re-read once more and matched
//! against a last-resort `(name:number)` pattern that takes the final separator as the split point.
//!
//! The machine never flushes trailing text at the end of input; callers are expected to terminate
//! the prompt with the delimiter (see [`crate::tokenizer::Tokenizer`]).

use std::sync::OnceLock;

use log::{debug, trace, warn};
use regex::Regex;

use crate::error::{Result, SaniproError};
use crate::token::{Token, DEFAULT_WEIGHT};

const ESCAPE: char = '\\';

/// States of the A1111 parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Reading a plain tag.
    Default,
    /// A backslash was read outside any group.
    Escaped,
    /// Reading the name part of an emphasis group.
    InParenthesis,
    /// A backslash was read inside an emphasis group.
    EscapedInParenthesis,
    /// Reading the weight part of an emphasis group.
    AfterColon,
    /// The group was closed; waiting for the delimiter.
    EmphasisEnd,
    /// The weight did not parse; skipping to the group start for a second attempt.
    FailedParenthesis,
    /// The group was re-read after a failed weight; waiting for the delimiter.
    AfterFailed,
    /// Re-reading a malformed group as literal text.
    PartialEmphasis,
    /// A backslash was read while re-reading literal text.
    EscapedPartial,
    /// A delimiter was just flushed; leading whitespace is skipped.
    AfterDelimiter,
}

/// Characters framing an emphasis group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightSyntax {
    /// Opens a group, `(` by default.
    pub open: char,
    /// Closes a group, `)` by default.
    pub close: char,
    /// Separates the name from the weight, `:` by default.
    pub separator: char,
}

impl Default for WeightSyntax {
    fn default() -> Self {
        Self {
            open: '(',
            close: ')',
            separator: ':',
        }
    }
}

impl WeightSyntax {
    /// Checks that the syntax characters, the delimiter and the escape character are all distinct.
    pub fn validate(&self, delimiter: char) -> Result<()> {
        let chars = [ESCAPE, self.open, self.close, self.separator, delimiter];
        for (idx, ch) in chars.iter().enumerate() {
            if chars[idx + 1..].contains(ch) {
                return Err(SaniproError::InvalidConfig(format!(
                    "character {ch:?} is used for more than one role in the weight syntax"
                )));
            }
        }
        Ok(())
    }
}

/// Tokenizer for prompts written in the A1111 emphasis syntax.
#[derive(Debug, Clone)]
pub struct A1111Parser {
    delimiter: char,
    syntax: WeightSyntax,
    fallback: Regex,
}

/// Mutable state owned by a single [`A1111Parser::parse`] call.
struct ParserContext<'a> {
    chars: &'a [char],
    tokens: Vec<Token>,
    name: String,
    weight: String,
    last_delimiter: Option<usize>,
    depth: usize,
    cursor: usize,
    jump: Option<usize>,
    state: ParserState,
}

impl<'a> ParserContext<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            tokens: Vec::new(),
            name: String::new(),
            weight: String::new(),
            last_delimiter: None,
            depth: 0,
            cursor: 0,
            jump: None,
            state: ParserState::Default,
        }
    }

    fn push_token(&mut self, token: Token) {
        self.tokens.push(token);
        self.last_delimiter = Some(self.cursor);
    }

    fn flush_plain(&mut self) {
        let name = take_trimmed(&mut self.name);
        self.push_token(Token::new(name, DEFAULT_WEIGHT));
    }

    fn clear_buffers(&mut self) {
        self.name.clear();
        self.weight.clear();
    }

    /// Moves the cursor back to the character following the last confirmed delimiter.
    fn rewind(&mut self) {
        self.jump = Some(self.last_delimiter.map_or(0, |idx| idx + 1));
    }

    /// Copies `start..=end` verbatim into the name buffer and resumes after `end`.
    fn splice(&mut self, start: usize, end: usize) {
        self.name.extend(&self.chars[start..=end]);
        self.jump = Some(end + 1);
    }
}

fn take_trimmed(buffer: &mut String) -> String {
    let trimmed = buffer.trim().to_owned();
    buffer.clear();
    trimmed
}

fn weight_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)$").expect("weight pattern is valid")
    })
}

/// Parses an optionally signed, optionally abbreviated decimal such as `-.7`, `+1.2` or `3`.
///
/// Literals too long to fit a finite `f64` are rejected.
#[must_use]
pub fn parse_weight(text: &str) -> Option<f64> {
    let text = text.trim();
    if !weight_pattern().is_match(text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

impl A1111Parser {
    /// Creates a parser using `delimiter` and the default `(name:weight)` syntax.
    #[must_use]
    pub fn new(delimiter: char) -> Self {
        Self::with_syntax(delimiter, WeightSyntax::default())
    }

    /// Creates a parser using custom group and separator characters.
    #[must_use]
    pub fn with_syntax(delimiter: char, syntax: WeightSyntax) -> Self {
        let pattern = format!(
            r"^{open}(.*){sep}([+-]?[0-9]+(?:\.[0-9]+)?){close}$",
            open = regex::escape(&syntax.open.to_string()),
            sep = regex::escape(&syntax.separator.to_string()),
            close = regex::escape(&syntax.close.to_string()),
        );
        let fallback = Regex::new(&pattern).expect("escaped fallback pattern is valid");
        Self {
            delimiter,
            syntax,
            fallback,
        }
    }

    /// Returns the token delimiter.
    #[must_use]
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Returns the group and separator characters.
    #[must_use]
    pub fn syntax(&self) -> WeightSyntax {
        self.syntax
    }

    /// Tokenizes `prompt`, returning every token terminated by the delimiter.
    pub fn parse(&self, prompt: &str) -> Result<Vec<Token>> {
        let chars: Vec<char> = prompt.chars().collect();
        let mut ctx = ParserContext::new(&chars);

        while ctx.cursor < chars.len() {
            let ch = chars[ctx.cursor];
            let next = self.step(&mut ctx, ch)?;
            trace!(
                "{:<5} {:?} {:?} -> {:?} name={:?} weight={:?}",
                ctx.cursor,
                ch,
                ctx.state,
                next,
                ctx.name,
                ctx.weight
            );
            ctx.state = next;
            ctx.cursor = ctx.jump.take().unwrap_or(ctx.cursor + 1);
        }

        self.finish(ctx)
    }

    fn step(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        match ctx.state {
            ParserState::Default => self.handle_default(ctx, ch),
            ParserState::AfterDelimiter => self.handle_after_delimiter(ctx, ch),
            ParserState::Escaped => self.accept_escaped(ctx, ch, ParserState::Default),
            ParserState::InParenthesis => self.handle_in_parenthesis(ctx, ch),
            ParserState::EscapedInParenthesis => {
                self.accept_escaped(ctx, ch, ParserState::InParenthesis)
            }
            ParserState::AfterColon => Ok(self.handle_after_colon(ctx, ch)),
            ParserState::EmphasisEnd => self.handle_emphasis_end(ctx, ch),
            ParserState::FailedParenthesis => self.handle_failed_parenthesis(ctx, ch),
            ParserState::AfterFailed => self.handle_after_failed(ctx, ch),
            ParserState::PartialEmphasis => Ok(self.handle_partial_emphasis(ctx, ch)),
            ParserState::EscapedPartial => {
                self.accept_escaped(ctx, ch, ParserState::PartialEmphasis)
            }
        }
    }

    fn finish(&self, ctx: ParserContext<'_>) -> Result<Vec<Token>> {
        let end = ctx.chars.len();
        match ctx.state {
            ParserState::Escaped
            | ParserState::EscapedInParenthesis
            | ParserState::EscapedPartial => {
                return Err(SaniproError::syntax(
                    "input ends with a dangling escape character",
                    end,
                ));
            }
            ParserState::FailedParenthesis | ParserState::AfterFailed => {
                return Err(SaniproError::syntax(
                    "emphasis with an invalid weight is not terminated",
                    end,
                ));
            }
            _ if ctx.depth > 0 => {
                return Err(SaniproError::syntax("unclosed parenthesis", end));
            }
            _ => {}
        }
        if !ctx.name.trim().is_empty() || !ctx.weight.trim().is_empty() {
            warn!(
                "discarding unterminated trailing text {:?}; terminate the prompt with {:?}",
                ctx.name.trim(),
                self.delimiter
            );
        }
        Ok(ctx.tokens)
    }

    fn is_special(&self, ch: char) -> bool {
        ch == ESCAPE || ch == self.syntax.open || ch == self.syntax.close || ch == self.delimiter
    }

    fn accept_escaped(
        &self,
        ctx: &mut ParserContext<'_>,
        ch: char,
        return_state: ParserState,
    ) -> Result<ParserState> {
        if !self.is_special(ch) {
            return Err(SaniproError::syntax(
                format!(
                    "{ch:?} cannot be escaped; only {ESCAPE:?}, {:?}, {:?} and {:?} can follow a backslash",
                    self.syntax.open, self.syntax.close, self.delimiter
                ),
                ctx.cursor,
            ));
        }
        ctx.name.push(ch);
        Ok(return_state)
    }

    fn handle_default(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        if ch == ESCAPE {
            Ok(ParserState::Escaped)
        } else if ch == self.syntax.open {
            ctx.depth += 1;
            Ok(ParserState::InParenthesis)
        } else if ch == self.syntax.close {
            Err(SaniproError::syntax(
                format!("could not find the opening {:?}", self.syntax.open),
                ctx.cursor,
            ))
        } else if ch == self.delimiter {
            ctx.flush_plain();
            Ok(ParserState::AfterDelimiter)
        } else {
            ctx.name.push(ch);
            Ok(ParserState::Default)
        }
    }

    fn handle_after_delimiter(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        if ch != self.delimiter && ch.is_whitespace() {
            ctx.last_delimiter = Some(ctx.cursor);
            return Ok(ParserState::AfterDelimiter);
        }
        self.handle_default(ctx, ch)
    }

    fn handle_in_parenthesis(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        if ch == ESCAPE {
            Ok(ParserState::EscapedInParenthesis)
        } else if ch == self.syntax.open {
            let end = find_closing_paren(ctx.chars, ctx.cursor, self.syntax)
                .ok_or_else(|| SaniproError::syntax("unclosed parenthesis", ctx.cursor))?;
            ctx.splice(ctx.cursor, end);
            Ok(ParserState::InParenthesis)
        } else if ch == self.syntax.close {
            Err(SaniproError::syntax(
                format!(
                    "emphasis requires a weight after {:?}",
                    self.syntax.separator
                ),
                ctx.cursor,
            ))
        } else if ch == self.syntax.separator {
            Ok(ParserState::AfterColon)
        } else {
            ctx.name.push(ch);
            Ok(ParserState::InParenthesis)
        }
    }

    fn handle_after_colon(&self, ctx: &mut ParserContext<'_>, ch: char) -> ParserState {
        if ch == self.syntax.close {
            ctx.depth = ctx.depth.saturating_sub(1);
            ParserState::EmphasisEnd
        } else {
            ctx.weight.push(ch);
            ParserState::AfterColon
        }
    }

    fn handle_emphasis_end(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        if ch == self.delimiter {
            let name = take_trimmed(&mut ctx.name);
            let weight = take_trimmed(&mut ctx.weight);
            return match parse_weight(&weight) {
                Some(_) if name.is_empty() => Err(SaniproError::syntax(
                    "emphasis requires a non-empty name",
                    ctx.cursor,
                )),
                Some(value) => {
                    ctx.push_token(Token::new(name, value));
                    Ok(ParserState::AfterDelimiter)
                }
                None => {
                    debug!("weight {weight:?} is not numeric, re-reading the group");
                    ctx.rewind();
                    Ok(ParserState::FailedParenthesis)
                }
            };
        }
        if ch.is_whitespace() {
            return Ok(ParserState::EmphasisEnd);
        }
        ctx.clear_buffers();
        ctx.rewind();
        Ok(ParserState::PartialEmphasis)
    }

    fn handle_failed_parenthesis(
        &self,
        ctx: &mut ParserContext<'_>,
        ch: char,
    ) -> Result<ParserState> {
        if ch != self.syntax.open {
            return Ok(ParserState::FailedParenthesis);
        }
        let end = find_closing_paren(ctx.chars, ctx.cursor, self.syntax)
            .ok_or_else(|| SaniproError::syntax("unclosed parenthesis", ctx.cursor))?;
        ctx.splice(ctx.cursor, end);
        Ok(ParserState::AfterFailed)
    }

    fn handle_after_failed(&self, ctx: &mut ParserContext<'_>, ch: char) -> Result<ParserState> {
        if ch != self.delimiter {
            return Ok(ParserState::AfterFailed);
        }
        let span = take_trimmed(&mut ctx.name);
        ctx.weight.clear();
        let token = self.parse_bad_tuple(&span, ctx.cursor)?;
        ctx.push_token(token);
        Ok(ParserState::AfterDelimiter)
    }

    fn handle_partial_emphasis(&self, ctx: &mut ParserContext<'_>, ch: char) -> ParserState {
        if ch == ESCAPE {
            ParserState::EscapedPartial
        } else if ch == self.delimiter {
            ctx.flush_plain();
            ParserState::AfterDelimiter
        } else {
            ctx.name.push(ch);
            ParserState::PartialEmphasis
        }
    }

    /// Splits a whole `(name:weight)` span at its last separator.
    fn parse_bad_tuple(&self, span: &str, position: usize) -> Result<Token> {
        let invalid = || {
            SaniproError::syntax(
                format!(
                    "could not read {span:?} as name{}weight; try escaping with a backslash",
                    self.syntax.separator
                ),
                position,
            )
        };
        let captures = self.fallback.captures(span).ok_or_else(invalid)?;
        let name = captures.get(1).map_or("", |m| m.as_str()).trim();
        let weight = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Token::new(name, weight))
    }
}

/// Returns the index of the group close matching the group open at `start`.
///
/// A backslash escapes exactly one following character.
fn find_closing_paren(chars: &[char], start: usize, syntax: WeightSyntax) -> Option<usize> {
    let mut depth = 0isize;
    let mut escaped = false;
    for (idx, &ch) in chars.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
        } else if ch == ESCAPE {
            escaped = true;
        } else if ch == syntax.open {
            depth += 1;
        } else if ch == syntax.close {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(prompt: &str) -> Result<Vec<Token>> {
        A1111Parser::new(',').parse(prompt)
    }

    fn assert_parses(cases: &[(&str, Vec<Token>)]) {
        for (input, expected) in cases {
            let tokens = parse(input).unwrap_or_else(|err| panic!("{input:?} failed: {err}"));
            assert_eq!(&tokens, expected, "input {input:?}");
        }
    }

    #[test]
    fn basic_parsing() {
        assert_parses(&[
            ("1girl,", vec![Token::plain("1girl")]),
            ("(black hair:1.1),", vec![Token::new("black hair", 1.1)]),
            ("(black hair:.7),", vec![Token::new("black hair", 0.7)]),
            ("(black hair:-.7),", vec![Token::new("black hair", -0.7)]),
            ("(black hair:-1.1),", vec![Token::new("black hair", -1.1)]),
            ("(black hair:+3),", vec![Token::new("black hair", 3.0)]),
            (",", vec![Token::plain("")]),
            (",,", vec![Token::plain(""), Token::plain("")]),
            (",,,", vec![Token::plain(""), Token::plain(""), Token::plain("")]),
            ("(,:1.1),", vec![Token::new(",", 1.1)]),
        ]);
    }

    #[test]
    fn handles_colons() {
        assert_parses(&[
            (":,", vec![Token::plain(":")]),
            ("(::1.1),", vec![Token::new(":", 1.1)]),
            (
                "(::1.1), aaa,",
                vec![Token::new(":", 1.1), Token::plain("aaa")],
            ),
            (
                "(::1.1), (::1.2),",
                vec![Token::new(":", 1.1), Token::new(":", 1.2)],
            ),
            (":d,", vec![Token::plain(":d")]),
            ("(:3:1.2),", vec![Token::new(":3", 1.2)]),
            ("(re:stage!:1.2),", vec![Token::new("re:stage!", 1.2)]),
        ]);
    }

    #[test]
    fn escapes_delimiters_and_backslashes() {
        assert_parses(&[
            (r"\,,", vec![Token::plain(",")]),
            (r"\,\,,", vec![Token::plain(",,")]),
            (r"\\,", vec![Token::plain("\\")]),
            (r"\\\(series\\\),", vec![Token::plain(r"\(series\)")]),
            (r"fate \\\(series\\\),", vec![Token::plain(r"fate \(series\)")]),
            (
                r"(fate \\\(series\\\):1.1),",
                vec![Token::new(r"fate \(series\)", 1.1)],
            ),
        ]);
    }

    #[test]
    fn nested_groups_are_kept_verbatim() {
        assert_parses(&[
            (
                "cat, (bow:1.2) (hat:1.2),",
                vec![Token::plain("cat"), Token::plain("(bow:1.2) (hat:1.2)")],
            ),
            (
                "(cat, (bow:1.2) (hat:1.2):1.3),",
                vec![Token::new("cat, (bow:1.2) (hat:1.2)", 1.3)],
            ),
            (
                "(cat, bow:1.2)\n, hat,",
                vec![Token::new("cat, bow", 1.2), Token::plain("hat")],
            ),
            (
                r"(bba:1.2) fate \\\(series\\\),",
                vec![Token::plain(r"(bba:1.2) fate \(series\)")],
            ),
        ]);
    }

    #[test]
    fn literal_recovery_does_not_duplicate_earlier_tokens() {
        assert_parses(&[(
            "(a:1.5) x,(b:1.2) y,",
            vec![Token::plain("(a:1.5) x"), Token::plain("(b:1.2) y")],
        )]);
    }

    #[test]
    fn skips_whitespace_after_delimiter() {
        assert_parses(&[(
            "a,  \t b, (c:0.5),",
            vec![Token::plain("a"), Token::plain("b"), Token::new("c", 0.5)],
        )]);
    }

    #[test]
    fn rejects_malformed_prompts() {
        let cases = [
            r"\a,",
            "(,",
            "),",
            "(),",
            r"\:d,",
            r"(\:3:1.2),",
            r"(re\:stage!:1.2),",
            "(:1.2),",
            "(aaa:1.),",
            "(white dress),",
            "(re:stage!),",
            "(unclosed (inner:1.1),",
            "trailing\\",
        ];
        for input in cases {
            let err = parse(input).expect_err(input);
            assert!(err.is_syntax(), "{input:?} produced {err}");
        }
    }

    #[test]
    fn syntax_errors_report_position() {
        let err = parse("ok, oops),").expect_err("unmatched close");
        assert!(matches!(
            err,
            SaniproError::InvalidSyntax { position: 8, .. }
        ));
    }

    #[test]
    fn unterminated_text_is_not_flushed() {
        assert_eq!(parse("a, b").unwrap(), vec![Token::plain("a")]);
        assert_eq!(parse("(a:1.2)").unwrap(), Vec::<Token>::new());
    }

    #[test]
    fn custom_delimiter_and_syntax() {
        let syntax = WeightSyntax {
            open: '[',
            close: ']',
            separator: '=',
        };
        let parser = A1111Parser::with_syntax(';', syntax);
        let tokens = parser.parse("cat; [dog=1.4]; a:b, c; \\;;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::plain("cat"),
                Token::new("dog", 1.4),
                Token::plain("a:b, c"),
                Token::plain(";"),
            ]
        );
    }

    #[test]
    fn finds_matching_close() {
        let cases = [
            (r"(\),", None),
            ("((aba:0.9), abb:1.2),", Some(19)),
            ("(ab, ((aba:0.9), baa:1.1):1.1),", Some(29)),
            (r"(fate \(series\):0.9),", Some(20)),
            (r"((fate \(series\):0.9), abb:1.2),", Some(31)),
        ];
        for (input, expected) in cases {
            let chars: Vec<char> = input.chars().collect();
            assert_eq!(
                find_closing_paren(&chars, 0, WeightSyntax::default()),
                expected,
                "input {input:?}"
            );
        }
    }

    #[test]
    fn bad_tuple_splits_on_last_separator() {
        let parser = A1111Parser::new(',');
        let cases = [
            ("(white dress:1.2)", Token::new("white dress", 1.2)),
            ("(white dress:+1.2)", Token::new("white dress", 1.2)),
            ("(white dress:-1.2)", Token::new("white dress", -1.2)),
            ("(re:stage!:1.2)", Token::new("re:stage!", 1.2)),
            (
                "(aaa, (sailor:1.2) (hat:1.2):1.3)",
                Token::new("aaa, (sailor:1.2) (hat:1.2)", 1.3),
            ),
            ("(::1.2)", Token::new(":", 1.2)),
        ];
        for (input, expected) in cases {
            assert_eq!(parser.parse_bad_tuple(input, 0).unwrap(), expected);
        }
        assert!(parser.parse_bad_tuple("(white dress)", 0).is_err());
    }

    #[test]
    fn weight_grammar() {
        assert_eq!(parse_weight("-.7"), Some(-0.7));
        assert_eq!(parse_weight("+1.2"), Some(1.2));
        assert_eq!(parse_weight(" 3 "), Some(3.0));
        assert_eq!(parse_weight("3.0"), Some(3.0));
        for invalid in ["", "1.", "inf", "NaN", "1e3", "stage!", "1.2.3"] {
            assert_eq!(parse_weight(invalid), None, "{invalid:?}");
        }
        assert_eq!(parse_weight(&"9".repeat(400)), None);
    }

    #[test]
    fn overflowing_weight_is_a_syntax_error() {
        let err = parse(&format!("(a:{}),", "9".repeat(400))).unwrap_err();
        assert!(err.is_syntax(), "{err}");
        let err = parse(&format!("(a:1:{}),", "9".repeat(400))).unwrap_err();
        assert!(err.is_syntax(), "{err}");
    }

    #[test]
    fn syntax_roles_must_be_distinct() {
        assert!(WeightSyntax::default().validate(',').is_ok());
        assert!(WeightSyntax::default().validate(':').is_err());
        assert!(WeightSyntax::default().validate('\\').is_err());
    }
}
