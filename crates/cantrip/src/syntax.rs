//! Word classification.
//!
//! Inspects a word's morpheme sequence and assigns it a role that determines
//! its evaluation strategy. Classification happens between parsing and
//! lowering; invalid shapes are rejected here with "invalid word structure"
//! so the compiler only ever sees well-formed words.

use crate::parse::{Morpheme, ParseError, Word};

/// The role of a word, driving compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    /// Comments only; contributes nothing.
    Ignored,
    /// A single literal morpheme.
    Literal,
    /// A single block morpheme.
    Block,
    /// A single tuple morpheme.
    Tuple,
    /// A single expression morpheme.
    Expression,
    /// A single quoted-string morpheme.
    String,
    /// A single here-string morpheme.
    HereString,
    /// A single tagged-string morpheme.
    TaggedString,
    /// Multiple morphemes concatenated textually into one String.
    Compound,
    /// A word producing one value via substitution (plus selectors).
    Substitution {
        /// True when the value is marked for tuple expansion into the
        /// surrounding word list.
        expansion: bool,
    },
    /// A literal or tuple source with attached selectors, producing a
    /// qualified value.
    Qualified,
}

fn invalid(word: &Word) -> ParseError {
    ParseError::new("invalid word structure", word.position)
}

fn is_selector_morpheme(morpheme: &Morpheme) -> bool {
    matches!(morpheme, Morpheme::Tuple(_) | Morpheme::Block(_) | Morpheme::Expression(_))
}

/// Length of the substitution sequence starting at `start` (the
/// substitute-next marker, its source, and any trailing selector morphemes),
/// or `None` when no well-formed sequence starts there.
pub(crate) fn substitution_sequence_len(morphemes: &[Morpheme], start: usize) -> Option<usize> {
    let Some(Morpheme::SubstituteNext(_)) = morphemes.get(start) else {
        return None;
    };
    let source = morphemes.get(start + 1)?;
    if !matches!(
        source,
        Morpheme::Literal(_) | Morpheme::Tuple(_) | Morpheme::Block(_) | Morpheme::Expression(_)
    ) {
        return None;
    }
    let mut len = 2;
    while morphemes.get(start + len).is_some_and(is_selector_morpheme) {
        len += 1;
    }
    Some(len)
}

/// Classifies a word into its role.
pub fn classify_word(word: &Word) -> Result<WordKind, ParseError> {
    let morphemes = &word.morphemes[..];
    if morphemes.is_empty() || morphemes.iter().all(Morpheme::is_comment) {
        return Ok(WordKind::Ignored);
    }
    if morphemes.iter().any(Morpheme::is_comment) {
        return Err(invalid(word));
    }

    if morphemes.len() == 1 {
        return match &morphemes[0] {
            Morpheme::Literal(_) => Ok(WordKind::Literal),
            Morpheme::Block(_) => Ok(WordKind::Block),
            Morpheme::Tuple(_) => Ok(WordKind::Tuple),
            Morpheme::Expression(_) => Ok(WordKind::Expression),
            Morpheme::String(_) => Ok(WordKind::String),
            Morpheme::HereString(_) => Ok(WordKind::HereString),
            Morpheme::TaggedString(_) => Ok(WordKind::TaggedString),
            _ => Err(invalid(word)),
        };
    }

    match &morphemes[0] {
        Morpheme::SubstituteNext(sub) => {
            let Some(len) = substitution_sequence_len(morphemes, 0) else {
                return Err(invalid(word));
            };
            if len == morphemes.len() {
                return Ok(WordKind::Substitution { expansion: sub.expansion });
            }
            // an expansion must stand alone as its word
            if sub.expansion {
                return Err(invalid(word));
            }
            check_compound(word, morphemes)
        }
        Morpheme::Literal(_) => {
            if morphemes[1..].iter().all(is_selector_morpheme) {
                return Ok(WordKind::Qualified);
            }
            check_compound(word, morphemes)
        }
        Morpheme::Tuple(_) => {
            if morphemes[1..].iter().all(is_selector_morpheme) {
                return Ok(WordKind::Qualified);
            }
            Err(invalid(word))
        }
        Morpheme::Expression(_) => check_compound(word, morphemes),
        _ => Err(invalid(word)),
    }
}

/// Validates a compound word: literal text runs, expressions, and
/// substitution sequences, textually concatenated. A selector morpheme after
/// a text run (and any block, tuple, or string morpheme outside a
/// substitution sequence) is invalid.
fn check_compound(word: &Word, morphemes: &[Morpheme]) -> Result<WordKind, ParseError> {
    let mut i = 0;
    while i < morphemes.len() {
        match &morphemes[i] {
            Morpheme::Literal(_) | Morpheme::Expression(_) => i += 1,
            Morpheme::SubstituteNext(sub) => {
                if sub.expansion {
                    return Err(invalid(word));
                }
                let Some(len) = substitution_sequence_len(morphemes, i) else {
                    return Err(invalid(word));
                };
                i += len;
            }
            _ => return Err(invalid(word)),
        }
    }
    Ok(WordKind::Compound)
}
