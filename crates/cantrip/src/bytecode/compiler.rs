//! Script-to-program compiler.
//!
//! Lowers a parsed script into a flat opcode program. Each sentence opens a
//! word frame, evaluates its words into it, closes the frame as a tuple, and
//! evaluates the sentence; the sentence result is then published as the
//! program's last result. Word lowering is driven by the classifier's roles.

use std::rc::Rc;

use super::{builder::ProgramBuilder, code::Program, op::Opcode};
use crate::{
    parse::{BlockMorpheme, Morpheme, ParseError, Script, Sentence, Word},
    syntax::{WordKind, classify_word, substitution_sequence_len},
    value::Value,
};

/// The compiler. All entry points are associated functions; no state is kept
/// between compilations.
pub struct Compiler;

impl Compiler {
    /// Compiles a script. Comment-only sentences compile to nothing; an
    /// empty program completes with OK(Nil).
    pub fn compile_script(script: &Script) -> Result<Program, ParseError> {
        let mut builder = ProgramBuilder::new();
        for sentence in script.sentences.iter().filter(|s| sentence_is_effective(s)) {
            Self::compile_sentence(&mut builder, sentence)?;
            builder.emit(Opcode::PushResult);
        }
        Ok(builder.build())
    }

    /// Compiles a tuple body: one pre-evaluated sentence.
    #[must_use]
    pub fn compile_tuple_body(values: &[Value]) -> Program {
        let mut builder = ProgramBuilder::new();
        builder.emit_push_constant(Value::tuple(values.to_vec()));
        builder.emit(Opcode::EvaluateSentence);
        builder.emit(Opcode::PushResult);
        builder.build()
    }

    fn compile_sentence(builder: &mut ProgramBuilder, sentence: &Sentence) -> Result<(), ParseError> {
        builder.set_position(sentence.position);
        builder.emit(Opcode::OpenFrame);
        Self::compile_words_into_frame(builder, &sentence.words)?;
        builder.emit(Opcode::CloseFrameAsTuple);
        builder.emit(Opcode::EvaluateSentence);
        Ok(())
    }

    /// Compiles words into the currently open frame, honoring expansion
    /// marks.
    fn compile_words_into_frame(builder: &mut ProgramBuilder, words: &[Word]) -> Result<(), ParseError> {
        for word in words {
            match classify_word(word)? {
                WordKind::Ignored => {}
                WordKind::Substitution { expansion: true } => {
                    Self::compile_substitution_sequence(builder, word, &word.morphemes, 0)?;
                    builder.emit(Opcode::ExpandValue);
                }
                kind => Self::compile_word_value(builder, word, kind)?,
            }
        }
        Ok(())
    }

    /// Compiles a word to a single value on the stack.
    fn compile_word_value(builder: &mut ProgramBuilder, word: &Word, kind: WordKind) -> Result<(), ParseError> {
        match kind {
            WordKind::Literal => {
                let Morpheme::Literal(text) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                builder.emit_push_literal(text);
            }
            WordKind::Block => {
                let Morpheme::Block(block) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                builder.emit_push_constant(block_value(block));
            }
            WordKind::HereString => {
                let Morpheme::HereString(here) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                builder.emit_push_constant(Value::string(here.text.as_str()));
            }
            WordKind::TaggedString => {
                let Morpheme::TaggedString(tagged) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                builder.emit_push_constant(Value::string(tagged.text.as_str()));
            }
            WordKind::String => {
                let Morpheme::String(parts) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                Self::compile_join(builder, word, parts)?;
            }
            WordKind::Tuple => {
                let Morpheme::Tuple(script) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                Self::compile_frame(builder, script, Opcode::CloseFrameAsTuple)?;
            }
            WordKind::Expression => {
                let Morpheme::Expression(script) = &word.morphemes[0] else {
                    return Err(invalid_structure(word));
                };
                Self::compile_expression(builder, script)?;
            }
            WordKind::Compound => Self::compile_join(builder, word, &word.morphemes)?,
            WordKind::Substitution { expansion: false } => {
                let end = Self::compile_substitution_sequence(builder, word, &word.morphemes, 0)?;
                if end != word.morphemes.len() {
                    return Err(invalid_structure(word));
                }
            }
            // expansion is only meaningful directly inside a word frame
            WordKind::Substitution { expansion: true } => return Err(invalid_structure(word)),
            WordKind::Qualified => Self::compile_qualified(builder, word)?,
            WordKind::Ignored => {}
        }
        Ok(())
    }

    /// Compiles the morphemes of a string or compound word and joins their
    /// string forms. A single part still joins, coercing the value to a
    /// String.
    fn compile_join(builder: &mut ProgramBuilder, word: &Word, parts: &[Morpheme]) -> Result<(), ParseError> {
        let mut count: u16 = 0;
        let mut i = 0;
        while i < parts.len() {
            match &parts[i] {
                Morpheme::Literal(text) => {
                    builder.emit_push_literal(text);
                    i += 1;
                }
                Morpheme::Expression(script) => {
                    Self::compile_expression(builder, script)?;
                    i += 1;
                }
                Morpheme::SubstituteNext(_) => {
                    i = Self::compile_substitution_sequence(builder, word, parts, i)?;
                }
                _ => return Err(invalid_structure(word)),
            }
            count += 1;
        }
        if count == 0 {
            builder.emit_push_literal("");
        } else {
            builder.emit(Opcode::JoinStrings(count));
        }
        Ok(())
    }

    /// Compiles one substitution sequence starting at `start`: source value,
    /// `ResolveValue` per substitution level, then the attached selectors.
    /// Returns the index one past the sequence.
    fn compile_substitution_sequence(
        builder: &mut ProgramBuilder,
        word: &Word,
        morphemes: &[Morpheme],
        start: usize,
    ) -> Result<usize, ParseError> {
        let Some(end) = substitution_sequence_len(morphemes, start).map(|len| start + len) else {
            return Err(invalid_structure(word));
        };
        let Morpheme::SubstituteNext(sub) = &morphemes[start] else {
            return Err(invalid_structure(word));
        };

        let mut resolves = sub.levels;
        match &morphemes[start + 1] {
            Morpheme::Literal(name) => builder.emit_push_literal(name),
            // a block source names the variable by its verbatim source text
            Morpheme::Block(block) => builder.emit_push_literal(&block.source),
            Morpheme::Tuple(script) => Self::compile_frame(builder, script, Opcode::CloseFrameAsTuple)?,
            // an expression already produces a value, which consumes a level
            Morpheme::Expression(script) => {
                Self::compile_expression(builder, script)?;
                resolves = resolves.saturating_sub(1);
            }
            _ => return Err(invalid_structure(word)),
        }
        for _ in 0..resolves {
            builder.emit(Opcode::ResolveValue);
        }

        for morpheme in &morphemes[start + 2..end] {
            Self::compile_selector(builder, word, morpheme)?;
        }
        Ok(end)
    }

    /// Compiles one selector morpheme and its select opcode: a tuple is a
    /// key path, an expression an index, a block a rule list.
    fn compile_selector(builder: &mut ProgramBuilder, word: &Word, morpheme: &Morpheme) -> Result<(), ParseError> {
        match morpheme {
            Morpheme::Tuple(script) => {
                Self::compile_frame(builder, script, Opcode::CloseFrameAsTuple)?;
                builder.emit(Opcode::SelectKeys);
            }
            Morpheme::Expression(script) => {
                Self::compile_expression(builder, script)?;
                builder.emit(Opcode::SelectIndex);
            }
            Morpheme::Block(block) => {
                Self::compile_frame(builder, &block.script, Opcode::CloseFrameAsList)?;
                builder.emit(Opcode::SelectRules);
            }
            _ => return Err(invalid_structure(word)),
        }
        Ok(())
    }

    /// Compiles a qualified word: a selector-less qualified constant, then
    /// selector applications (selection on a qualified value appends).
    fn compile_qualified(builder: &mut ProgramBuilder, word: &Word) -> Result<(), ParseError> {
        let source = match &word.morphemes[0] {
            Morpheme::Literal(name) => Value::string(name.as_str()),
            Morpheme::Tuple(script) => {
                let mut names = Vec::new();
                for sentence in &script.sentences {
                    for inner in &sentence.words {
                        match classify_word(inner)? {
                            WordKind::Ignored => {}
                            WordKind::Literal => {
                                let Morpheme::Literal(name) = &inner.morphemes[0] else {
                                    return Err(invalid_structure(word));
                                };
                                names.push(Value::string(name.as_str()));
                            }
                            _ => return Err(invalid_structure(word)),
                        }
                    }
                }
                Value::tuple(names)
            }
            _ => return Err(invalid_structure(word)),
        };
        builder.emit_push_constant(Value::qualified(source, vec![]));
        for morpheme in &word.morphemes[1..] {
            Self::compile_selector(builder, word, morpheme)?;
        }
        Ok(())
    }

    /// Compiles a word frame from all words of all sentences in `script`,
    /// closing it with `close` (tuple for word lists and key paths, list for
    /// rule lists).
    fn compile_frame(builder: &mut ProgramBuilder, script: &Script, close: Opcode) -> Result<(), ParseError> {
        builder.emit(Opcode::OpenFrame);
        for sentence in &script.sentences {
            Self::compile_words_into_frame(builder, &sentence.words)?;
        }
        builder.emit(close);
        Ok(())
    }

    /// Compiles an expression subscript: inner sentences run in order and
    /// the last one's value is the expression's value. An empty expression
    /// is Nil.
    fn compile_expression(builder: &mut ProgramBuilder, script: &Script) -> Result<(), ParseError> {
        let sentences: Vec<&Sentence> = script.sentences.iter().filter(|s| sentence_is_effective(s)).collect();
        if sentences.is_empty() {
            builder.emit(Opcode::PushNil);
            return Ok(());
        }
        let last = sentences.len() - 1;
        for (i, sentence) in sentences.into_iter().enumerate() {
            Self::compile_sentence(builder, sentence)?;
            if i < last {
                builder.emit(Opcode::PushResult);
            }
        }
        Ok(())
    }
}

/// A sentence is effective when any of its words is more than comments.
fn sentence_is_effective(sentence: &Sentence) -> bool {
    sentence
        .words
        .iter()
        .any(|word| !word.morphemes.iter().all(Morpheme::is_comment))
}

fn invalid_structure(word: &Word) -> ParseError {
    ParseError::new("invalid word structure", word.position)
}

/// Builds the Script value for a block, carrying its verbatim source.
fn block_value(block: &BlockMorpheme) -> Value {
    Value::script(block.script.clone(), Some(Rc::from(block.source.as_str())))
}
