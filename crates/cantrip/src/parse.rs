//! Parser: token stream → script tree.
//!
//! A script is an ordered sequence of sentences; a sentence an ordered
//! sequence of words; a word an ordered sequence of morphemes. The tree is
//! immutable after parsing. Blocks keep both their parsed subscript and the
//! exact source text between their delimiters so they can be re-serialized
//! and treated as string-like literals.

use smallvec::SmallVec;

use crate::tokenize::{SourcePosition, Token, TokenKind, decode_escape, tokenize};

/// Error produced by the tokenizer/parser/compiler layer.
///
/// Carries a message and the position of the offending token when one is
/// known. Runtime failures use the result model instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Option<SourcePosition>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: SourcePosition) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} ({position})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// The root of the parsed syntax tree.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub sentences: Vec<Sentence>,
}

/// One command invocation's worth of words.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub words: Vec<Word>,
    pub position: SourcePosition,
}

/// A single argument source, possibly built from several morphemes.
#[derive(Debug, Clone)]
pub struct Word {
    pub morphemes: SmallVec<[Morpheme; 2]>,
    pub position: SourcePosition,
}

// Equality on the tree ignores source positions: a reparsed block compares
// equal to the original even though its offsets differ.
impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.sentences == other.sentences
    }
}
impl Eq for Script {}

impl PartialEq for Sentence {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}
impl Eq for Sentence {}

impl PartialEq for Word {
    fn eq(&self, other: &Self) -> bool {
        self.morphemes == other.morphemes
    }
}
impl Eq for Word {}

/// A block morpheme: the parsed subscript plus the verbatim source text
/// between the braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMorpheme {
    pub script: Script,
    pub source: String,
}

/// A here-string morpheme: verbatim text plus the delimiter length that
/// opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HereStringMorpheme {
    pub text: String,
    pub delimiter_length: usize,
}

/// A tagged-string morpheme: verbatim text plus the tag that delimits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedStringMorpheme {
    pub text: String,
    pub tag: String,
}

/// A comment morpheme: text after the delimiter plus the delimiter length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentMorpheme {
    pub text: String,
    pub delimiter_length: usize,
}

/// A substitute-next morpheme. Always precedes the morpheme it applies to
/// (its source), and only appears inside compound words, strings, and tuples
/// or at the head of a substitution word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstituteNextMorpheme {
    /// True when a leading `*` marks the substitution for tuple expansion.
    pub expansion: bool,
    /// Number of `$` characters: the substitution depth.
    pub levels: usize,
    /// The literal marker text (`$`, `$$`, `*$`, …).
    pub literal: String,
}

/// The smallest classifiable syntactic atom inside a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Morpheme {
    Literal(String),
    Tuple(Script),
    Block(BlockMorpheme),
    Expression(Script),
    String(Vec<Morpheme>),
    HereString(HereStringMorpheme),
    TaggedString(TaggedStringMorpheme),
    LineComment(CommentMorpheme),
    BlockComment(CommentMorpheme),
    SubstituteNext(SubstituteNextMorpheme),
}

impl Morpheme {
    /// True for the comment morphemes.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment(_) | Self::BlockComment(_))
    }
}

/// Parses source text into a script tree.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let tokens = tokenize(source);
    let mut parser = Parser {
        source,
        tokens,
        idx: 0,
    };
    let (script, _) = parser.parse_script(End::Eof)?;
    Ok(script)
}

/// Where a nested script ends.
#[derive(Debug, Clone, Copy)]
enum End {
    Eof,
    Brace(SourcePosition),
    Paren(SourcePosition),
    Bracket(SourcePosition),
}

impl End {
    fn closer(self) -> Option<TokenKind> {
        match self {
            Self::Eof => None,
            Self::Brace(_) => Some(TokenKind::CloseBrace),
            Self::Paren(_) => Some(TokenKind::CloseParen),
            Self::Bracket(_) => Some(TokenKind::CloseBracket),
        }
    }

    fn unmatched_open(self) -> Option<(&'static str, SourcePosition)> {
        match self {
            Self::Eof => None,
            Self::Brace(p) => Some(("unmatched left brace", p)),
            Self::Paren(p) => Some(("unmatched left parenthesis", p)),
            Self::Bracket(p) => Some(("unmatched left bracket", p)),
        }
    }
}

fn unmatched_closer(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::CloseBrace => "unmatched right brace",
        TokenKind::CloseParen => "unmatched right parenthesis",
        _ => "unmatched right bracket",
    }
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    idx: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.idx).copied()
    }

    fn peek_next(&self) -> Option<Token> {
        self.tokens.get(self.idx + 1).copied()
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.idx];
        self.idx += 1;
        token
    }

    /// Parses sentences until the matching closer (consumed) or end of input.
    /// Returns the script and the byte offset where the closer starts.
    fn parse_script(&mut self, end: End) -> Result<(Script, usize), ParseError> {
        let mut sentences = Vec::new();
        loop {
            let Some(token) = self.peek() else {
                return match end.unmatched_open() {
                    None => Ok((Script { sentences }, self.source.len())),
                    Some((message, position)) => Err(ParseError::new(message, position)),
                };
            };
            match token.kind {
                TokenKind::Whitespace | TokenKind::Continuation | TokenKind::Newline | TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::CloseBrace | TokenKind::CloseParen | TokenKind::CloseBracket => {
                    if Some(token.kind) == end.closer() {
                        self.bump();
                        return Ok((Script { sentences }, token.start));
                    }
                    return Err(ParseError::new(unmatched_closer(token.kind), token.position));
                }
                _ => {
                    let sentence = self.parse_sentence()?;
                    if !sentence.words.is_empty() {
                        sentences.push(sentence);
                    }
                }
            }
        }
    }

    /// Parses words until a sentence separator or closer (left unconsumed).
    fn parse_sentence(&mut self) -> Result<Sentence, ParseError> {
        let position = self.peek().map_or_else(SourcePosition::default, |t| t.position);
        let mut words = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::CloseBrace
                | TokenKind::CloseParen
                | TokenKind::CloseBracket => break,
                TokenKind::Whitespace | TokenKind::Continuation => {
                    self.bump();
                }
                _ => words.push(self.parse_word()?),
            }
        }
        Ok(Sentence { words, position })
    }

    fn parse_word(&mut self) -> Result<Word, ParseError> {
        let position = self.peek().map_or_else(SourcePosition::default, |t| t.position);
        let mut morphemes: SmallVec<[Morpheme; 2]> = SmallVec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Whitespace
                | TokenKind::Continuation
                | TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::CloseBrace
                | TokenKind::CloseParen
                | TokenKind::CloseBracket => break,
                TokenKind::OpenBrace => {
                    let block = self.parse_block()?;
                    morphemes.push(block);
                }
                TokenKind::OpenParen => {
                    let tuple = self.parse_subscript(End::Paren(token.position))?;
                    morphemes.push(Morpheme::Tuple(tuple));
                }
                TokenKind::OpenBracket => {
                    let expr = self.parse_subscript(End::Bracket(token.position))?;
                    morphemes.push(Morpheme::Expression(expr));
                }
                TokenKind::DoubleQuote => {
                    morphemes.push(self.parse_string()?);
                }
                TokenKind::HereStringDelimiter => {
                    morphemes.push(self.parse_here_string()?);
                }
                TokenKind::TaggedStringDelimiter => {
                    morphemes.push(self.parse_tagged_or_empty()?);
                }
                TokenKind::Comment if morphemes.is_empty() => {
                    morphemes.push(self.parse_comment()?);
                    break;
                }
                TokenKind::Dollar => {
                    self.parse_substitution(&mut morphemes, false)?;
                }
                TokenKind::Asterisk
                    if morphemes.is_empty()
                        && self.peek_next().is_some_and(|t| t.kind == TokenKind::Dollar) =>
                {
                    self.bump();
                    self.parse_substitution(&mut morphemes, true)?;
                }
                TokenKind::Asterisk
                    if morphemes.is_empty()
                        && self.peek_next().is_some_and(|t| t.kind == TokenKind::OpenParen) =>
                {
                    self.bump();
                    morphemes.push(Morpheme::SubstituteNext(SubstituteNextMorpheme {
                        expansion: true,
                        levels: 0,
                        literal: "*".to_string(),
                    }));
                    let open = self.peek().expect("peeked open parenthesis");
                    let tuple = self.parse_subscript(End::Paren(open.position))?;
                    morphemes.push(Morpheme::Tuple(tuple));
                }
                TokenKind::InvalidEscape => {
                    return Err(ParseError::new("invalid escape", token.position));
                }
                TokenKind::Text | TokenKind::Escape | TokenKind::Comment | TokenKind::Asterisk => {
                    self.parse_literal_run(&mut morphemes);
                }
            }
        }
        Ok(Word { morphemes, position })
    }

    /// Accumulates consecutive text-like tokens into one literal morpheme.
    fn parse_literal_run(&mut self, morphemes: &mut SmallVec<[Morpheme; 2]>) {
        let mut text = String::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Text | TokenKind::Comment | TokenKind::Asterisk => {
                    text.push_str(token.lexeme(self.source));
                    self.bump();
                }
                TokenKind::Escape => {
                    let c = decode_escape(token.lexeme(self.source)).expect("escape token decodes");
                    text.push(c);
                    self.bump();
                }
                _ => break,
            }
        }
        push_literal(morphemes, &text);
    }

    /// Parses a `$`-substitution: the dollar run, its source morpheme, and
    /// any selector subscripts attached directly to it.
    ///
    /// A dollar run with no valid source degrades to literal text.
    fn parse_substitution(
        &mut self,
        morphemes: &mut SmallVec<[Morpheme; 2]>,
        expansion: bool,
    ) -> Result<(), ParseError> {
        let mut levels = 0;
        while self.peek().is_some_and(|t| t.kind == TokenKind::Dollar) {
            self.bump();
            levels += 1;
        }
        let mut literal = String::new();
        if expansion {
            literal.push('*');
        }
        literal.extend(std::iter::repeat_n('$', levels));

        let marker = Morpheme::SubstituteNext(SubstituteNextMorpheme {
            expansion,
            levels,
            literal: literal.clone(),
        });
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Text | TokenKind::Escape) => {
                morphemes.push(marker);
                let mut name = String::new();
                while let Some(token) = self.peek() {
                    match token.kind {
                        TokenKind::Text => {
                            name.push_str(token.lexeme(self.source));
                            self.bump();
                        }
                        TokenKind::Escape => {
                            let c = decode_escape(token.lexeme(self.source)).expect("escape token decodes");
                            name.push(c);
                            self.bump();
                        }
                        _ => break,
                    }
                }
                morphemes.push(Morpheme::Literal(name));
            }
            Some(TokenKind::OpenBrace) => {
                morphemes.push(marker);
                let block = self.parse_block()?;
                morphemes.push(block);
            }
            Some(TokenKind::OpenParen) => {
                morphemes.push(marker);
                let open = self.peek().expect("peeked open parenthesis");
                let tuple = self.parse_subscript(End::Paren(open.position))?;
                morphemes.push(Morpheme::Tuple(tuple));
            }
            Some(TokenKind::OpenBracket) => {
                morphemes.push(marker);
                let open = self.peek().expect("peeked open bracket");
                let expr = self.parse_subscript(End::Bracket(open.position))?;
                morphemes.push(Morpheme::Expression(expr));
            }
            // no valid source: the marker is plain text
            _ => {
                push_literal(morphemes, &literal);
                return Ok(());
            }
        }
        self.parse_attached_selectors(morphemes)
    }

    /// Parses subscripts directly following a substitution source (no
    /// intervening whitespace); they become the substitution's selectors.
    fn parse_attached_selectors(&mut self, morphemes: &mut SmallVec<[Morpheme; 2]>) -> Result<(), ParseError> {
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::OpenParen => {
                    let tuple = self.parse_subscript(End::Paren(token.position))?;
                    morphemes.push(Morpheme::Tuple(tuple));
                }
                TokenKind::OpenBrace => {
                    let block = self.parse_block()?;
                    morphemes.push(block);
                }
                TokenKind::OpenBracket => {
                    let expr = self.parse_subscript(End::Bracket(token.position))?;
                    morphemes.push(Morpheme::Expression(expr));
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_block(&mut self) -> Result<Morpheme, ParseError> {
        let open = self.bump();
        let (script, close_start) = self.parse_script(End::Brace(open.position))?;
        let source = self.source[open.end..close_start].to_string();
        Ok(Morpheme::Block(BlockMorpheme { script, source }))
    }

    fn parse_subscript(&mut self, end: End) -> Result<Script, ParseError> {
        self.bump();
        let (script, _) = self.parse_script(end)?;
        Ok(script)
    }

    /// Parses a `"…"` string with internal substitutions.
    ///
    /// A quote run inside the string closes it and, for even-length runs,
    /// immediately reopens it, so `""` inside a string contributes nothing.
    fn parse_string(&mut self) -> Result<Morpheme, ParseError> {
        let open = self.bump();
        let mut morphemes: SmallVec<[Morpheme; 2]> = SmallVec::new();
        let mut pending = String::new();
        loop {
            let Some(token) = self.peek() else {
                return Err(ParseError::new("unterminated string", open.position));
            };
            match token.kind {
                TokenKind::DoubleQuote => {
                    self.bump();
                    break;
                }
                TokenKind::TaggedStringDelimiter | TokenKind::HereStringDelimiter => {
                    self.bump();
                    if token.len() % 2 == 1 {
                        break;
                    }
                }
                TokenKind::Dollar => {
                    flush_pending(&mut morphemes, &mut pending);
                    self.parse_substitution(&mut morphemes, false)?;
                }
                TokenKind::OpenBracket => {
                    flush_pending(&mut morphemes, &mut pending);
                    let expr = self.parse_subscript(End::Bracket(token.position))?;
                    morphemes.push(Morpheme::Expression(expr));
                }
                TokenKind::InvalidEscape => {
                    return Err(ParseError::new("invalid escape", token.position));
                }
                TokenKind::Escape => {
                    let c = decode_escape(token.lexeme(self.source)).expect("escape token decodes");
                    pending.push(c);
                    self.bump();
                }
                _ => {
                    pending.push_str(token.lexeme(self.source));
                    self.bump();
                }
            }
        }
        flush_pending(&mut morphemes, &mut pending);
        Ok(Morpheme::String(morphemes.into_vec()))
    }

    /// Parses a here-string: `"""…"""` with a matching closing run length.
    fn parse_here_string(&mut self) -> Result<Morpheme, ParseError> {
        let open = self.bump();
        let delimiter_length = open.len();
        loop {
            let Some(token) = self.peek() else {
                return Err(ParseError::new("unterminated here-string", open.position));
            };
            if token.kind == TokenKind::HereStringDelimiter && token.len() == delimiter_length {
                self.bump();
                return Ok(Morpheme::HereString(HereStringMorpheme {
                    text: self.source[open.end..token.start].to_string(),
                    delimiter_length,
                }));
            }
            self.bump();
        }
    }

    /// Parses either an empty quoted string (`""` before a separator) or a
    /// tagged string (`""TAG … TAG""`).
    fn parse_tagged_or_empty(&mut self) -> Result<Morpheme, ParseError> {
        let open = self.bump();
        let terminates_word = self.peek().is_none_or(|t| {
            matches!(
                t.kind,
                TokenKind::Whitespace
                    | TokenKind::Continuation
                    | TokenKind::Newline
                    | TokenKind::Semicolon
                    | TokenKind::CloseBrace
                    | TokenKind::CloseParen
                    | TokenKind::CloseBracket
            )
        });
        if terminates_word {
            return Ok(Morpheme::String(Vec::new()));
        }

        // the tag is the remainder of the opening line
        let line_end = self.source[open.end..]
            .find('\n')
            .map_or(self.source.len(), |i| open.end + i);
        let tag = self.source[open.end..line_end].trim().to_string();
        if tag.is_empty() {
            return Err(ParseError::new("unterminated tagged string", open.position));
        }
        let closer = format!("{tag}\"\"");
        let Some(found) = self.source[line_end..].find(&closer) else {
            return Err(ParseError::new("unterminated tagged string", open.position));
        };
        let close_start = line_end + found;
        let close_end = close_start + closer.len();
        let text = self.source[line_end..close_start].to_string();
        while self.peek().is_some_and(|t| t.start < close_end) {
            self.bump();
        }
        Ok(Morpheme::TaggedString(TaggedStringMorpheme { text, tag }))
    }

    /// Parses a line comment or a `#{…}#` block comment (with balanced
    /// same-length delimiters).
    fn parse_comment(&mut self) -> Result<Morpheme, ParseError> {
        let open = self.bump();
        let delimiter_length = open.len();
        if self.peek().is_some_and(|t| t.kind == TokenKind::OpenBrace && t.start == open.end) {
            let brace = self.bump();
            let content_start = brace.end;
            let mut depth = 1usize;
            loop {
                let Some(token) = self.peek() else {
                    return Err(ParseError::new("unmatched block comment delimiter", open.position));
                };
                match token.kind {
                    TokenKind::Comment
                        if token.len() == delimiter_length
                            && self.peek_next().is_some_and(|t| t.kind == TokenKind::OpenBrace && t.start == token.end) =>
                    {
                        self.bump();
                        self.bump();
                        depth += 1;
                    }
                    TokenKind::CloseBrace
                        if self
                            .peek_next()
                            .is_some_and(|t| t.kind == TokenKind::Comment && t.len() == delimiter_length && t.start == token.end) =>
                    {
                        let close = self.bump();
                        self.bump();
                        depth -= 1;
                        if depth == 0 {
                            return Ok(Morpheme::BlockComment(CommentMorpheme {
                                text: self.source[content_start..close.start].to_string(),
                                delimiter_length,
                            }));
                        }
                    }
                    _ => {
                        self.bump();
                    }
                }
            }
        }

        // line comment: everything up to (not including) the newline
        let content_start = open.end;
        let mut content_end = content_start;
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Newline {
                break;
            }
            content_end = token.end;
            self.bump();
        }
        Ok(Morpheme::LineComment(CommentMorpheme {
            text: self.source[content_start..content_end].to_string(),
            delimiter_length,
        }))
    }
}

/// Pushes accumulated string-literal text as one literal morpheme.
fn flush_pending(morphemes: &mut SmallVec<[Morpheme; 2]>, pending: &mut String) {
    if !pending.is_empty() {
        morphemes.push(Morpheme::Literal(std::mem::take(pending)));
    }
}

/// Appends a literal morpheme for `text` (nothing for empty text).
///
/// Never merges with a preceding literal: a substitution's name literal must
/// stay distinct from adjacent plain text.
fn push_literal(morphemes: &mut SmallVec<[Morpheme; 2]>, text: &str) {
    if !text.is_empty() {
        morphemes.push(Morpheme::Literal(text.to_string()));
    }
}
