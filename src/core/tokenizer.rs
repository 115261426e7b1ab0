// src/core/tokenizer.rs

use crate::constants::{FLAG_PREFIXES, PIPE};
use lazy_static::lazy_static;
use regex::Regex;
use std::{iter::Peekable, str::CharIndices};
use thiserror::Error;

lazy_static! {
    /// Words matching this are values even when they start with a flag prefix (`-5`, `.25`).
    static ref NUMERIC_RE: Regex =
        Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?$").unwrap();
}

/// A single lexical unit of the command language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain or quoted word, quotes already stripped.
    Word(String),
    /// An unquoted word that started with `-`, `/` or `.`, holding the name without the prefix.
    ///
    /// Words that read as numbers (`-5`, `.25`, `-1e3`) are [`Token::Word`] instead, so
    /// negative and fractional values can follow a flag.
    FlagPrefix(String),
    /// The `|` separator between pipeline segments.
    Pipe,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("Unterminated quote starting at byte {0}.")]
    UnterminatedQuote(usize),
}

/// A lazy tokenizer over one input string.
///
/// It is not restartable: to tokenize again, call [`tokenize`] again with the same input.
/// After the first error the iterator is fused and yields `None`.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    chars: Peekable<CharIndices<'a>>,
    failed: bool,
}

/// Starts tokenizing `input`. An empty or blank input yields no tokens.
pub fn tokenize(input: &str) -> Tokenizer<'_> {
    Tokenizer {
        chars: input.char_indices().peekable(),
        failed: false,
    }
}

impl Tokenizer<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    /// Consumes a quoted run whose opening quote is at `start`, appending its content to `word`.
    /// Inside quotes only `\"` is an escape; every other backslash is kept as-is.
    fn read_quoted(&mut self, start: usize, word: &mut String) -> Result<(), TokenizeError> {
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(()),
                Some((_, '\\')) if self.chars.next_if(|(_, c)| *c == '"').is_some() => {
                    word.push('"');
                }
                Some((_, c)) => word.push(c),
                None => return Err(TokenizeError::UnterminatedQuote(start)),
            }
        }
    }

    fn read_word(&mut self) -> Result<Token, TokenizeError> {
        let mut word = String::new();
        let flag_eligible = self
            .chars
            .peek()
            .is_some_and(|(_, c)| FLAG_PREFIXES.contains(c));

        while let Some(&(pos, c)) = self.chars.peek() {
            if c.is_whitespace() || c == PIPE {
                break;
            }
            self.chars.next();
            if c == '"' {
                self.read_quoted(pos, &mut word)?;
            } else {
                word.push(c);
            }
        }

        Ok(if flag_eligible {
            classify_prefixed(word)
        } else {
            Token::Word(word)
        })
    }
}

/// Decides whether an unquoted word starting with a prefix character opens a flag.
fn classify_prefixed(word: String) -> Token {
    if NUMERIC_RE.is_match(&word) {
        return Token::Word(word);
    }
    let name = if word.starts_with('-') {
        word.trim_start_matches('-')
    } else {
        let mut chars = word.chars();
        chars.next();
        chars.as_str()
    };
    if name.is_empty() {
        Token::Word(word)
    } else {
        Token::FlagPrefix(name.to_string())
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        let &(_, c) = self.chars.peek()?;
        if c == PIPE {
            self.chars.next();
            return Some(Ok(Token::Pipe));
        }
        let result = self.read_word();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
