// src/core/command_line.rs

use crate::core::{
    argument_key::ArgumentKey,
    tokenizer::{Token, TokenizeError, tokenize},
};
use std::iter;

/// The arguments of one pipeline segment: an ordered map from [`ArgumentKey`] to the
/// values typed after it.
///
/// Values before any flag live under [`ArgumentKey::empty`]; the first of them is the
/// command name and the rest are positional values. A flag typed without values is
/// still present, with an empty value list.
#[derive(Debug, Clone, Default)]
pub struct CommandLine {
    entries: Vec<(ArgumentKey, Vec<String>)>,
}

/// An ordered sequence of command lines, one per `|`-delimited segment.
pub type Pipeline = Vec<CommandLine>;

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key with no values. Does nothing when an intersecting key already exists.
    pub fn with_key(mut self, key: impl Into<ArgumentKey>) -> Self {
        self.append(key.into(), iter::empty());
        self
    }

    /// Appends `value` under `key`, creating the entry when needed.
    pub fn with_value(mut self, key: impl Into<ArgumentKey>, value: impl Into<String>) -> Self {
        self.append(key.into(), iter::once(value.into()));
        self
    }

    /// Appends an anonymous value (command name or positional).
    pub fn with_anonymous(self, value: impl Into<String>) -> Self {
        self.with_value(ArgumentKey::empty(), value)
    }

    /// Appends `values` to the first entry intersecting `key`, or adds a new entry.
    fn append(&mut self, key: ArgumentKey, values: impl IntoIterator<Item = String>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.extend(values),
            None => self.entries.push((key, values.into_iter().collect())),
        }
    }

    /// Values of the first key intersecting `key`, if present.
    pub fn get(&self, key: &ArgumentKey) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    /// Looks a flag up by one of its spellings.
    pub fn get_by_alias(&self, alias: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k.contains(alias))
            .map(|(_, values)| values.as_slice())
    }

    pub fn contains(&self, key: &ArgumentKey) -> bool {
        self.get(key).is_some()
    }

    /// The anonymous values, command name first.
    pub fn anonymous(&self) -> &[String] {
        self.get(&ArgumentKey::empty()).unwrap_or_default()
    }

    pub fn command_name(&self) -> Option<&str> {
        self.anonymous().first().map(String::as_str)
    }

    /// The anonymous value at `position`, where position 0 is the command name.
    pub fn positional(&self, position: usize) -> Option<&str> {
        self.anonymous().get(position).map(String::as_str)
    }

    /// Named keys in insertion order, excluding the anonymous key.
    pub fn named(&self) -> impl Iterator<Item = (&ArgumentKey, &[String])> {
        self.entries
            .iter()
            .filter(|(k, _)| !k.is_empty_key())
            .map(|(k, v)| (k, v.as_slice()))
    }

    /// A line is empty when it holds no named keys and no anonymous values.
    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|(k, values)| k.is_empty_key() && values.is_empty())
    }
}

impl<K: Into<ArgumentKey>> FromIterator<K> for CommandLine {
    /// Builds a line from bare keys, the equivalent of `{ "foo", "bar" }`.
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |line, key| line.with_key(key))
    }
}

impl<K: Into<ArgumentKey>, V: Into<String>> Extend<(K, V)> for CommandLine {
    /// Appends `(key, value)` pairs, the equivalent of `{ {"foo","bar"}, {"foo","baz"} }`.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key.into(), iter::once(value.into()));
        }
    }
}

/// Parses `input` into a pipeline in a single pass over the token stream.
///
/// A flag opens a scope that collects every following word until the next flag or pipe.
/// Empty segments (leading, trailing or doubled pipes) are dropped, so `parse("")` is empty.
pub fn parse(input: &str) -> Result<Pipeline, TokenizeError> {
    let mut pipeline = Vec::new();
    let mut current = CommandLine::new();
    let mut current_key = ArgumentKey::empty();

    for token in tokenize(input) {
        match token? {
            Token::Pipe => {
                if !current.is_empty() {
                    pipeline.push(std::mem::take(&mut current));
                }
                current_key = ArgumentKey::empty();
            }
            Token::FlagPrefix(name) => {
                current_key = ArgumentKey::single(name);
                current.append(current_key.clone(), iter::empty());
            }
            Token::Word(value) => current.append(current_key.clone(), iter::once(value)),
        }
    }

    if !current.is_empty() {
        pipeline.push(current);
    }
    log::trace!("Parsed {} pipeline segment(s) from {:?}", pipeline.len(), input);
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_anonymous_values_only() {
        let pipeline = parse("a b c").unwrap();
        assert_eq!(pipeline.len(), 1);
        let line = &pipeline[0];
        assert_eq!(line.anonymous(), strings(&["a", "b", "c"]).as_slice());
        assert_eq!(line.named().count(), 0);
        assert_eq!(line.command_name(), Some("a"));
    }

    #[test]
    fn test_empty_input_yields_no_lines() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
        assert!(parse("| |").unwrap().is_empty());
    }

    #[test]
    fn test_bare_flags_are_present_without_values() {
        let pipeline = parse("test -flag1 -flag2 false").unwrap();
        let line = &pipeline[0];
        assert_eq!(line.get_by_alias("flag1"), Some(&[][..]));
        assert_eq!(line.get_by_alias("FLAG2"), Some(strings(&["false"]).as_slice()));
        assert_eq!(line.get_by_alias("flag3"), None);
    }

    #[test]
    fn test_flag_scope_collects_until_next_flag() {
        let pipeline = parse("test -list 4 5 6 -name x").unwrap();
        let line = &pipeline[0];
        assert_eq!(line.get_by_alias("list"), Some(strings(&["4", "5", "6"]).as_slice()));
        assert_eq!(line.get_by_alias("name"), Some(strings(&["x"]).as_slice()));
        assert_eq!(line.anonymous(), strings(&["test"]).as_slice());
    }

    #[test]
    fn test_repeated_flag_appends_in_order() {
        let pipeline = parse("test -tag a -other -Tag b").unwrap();
        assert_eq!(
            pipeline[0].get_by_alias("tag"),
            Some(strings(&["a", "b"]).as_slice())
        );
    }

    #[test]
    fn test_pipe_resets_scope_and_drops_empty_segments() {
        let pipeline = parse("a -x 1 || b 2 |").unwrap();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[0].command_name(), Some("a"));
        assert_eq!(pipeline[1].anonymous(), strings(&["b", "2"]).as_slice());
        assert!(!pipeline[1].contains(&ArgumentKey::single("x")));
    }

    #[test]
    fn test_line_starting_with_flag_has_no_command_name() {
        let pipeline = parse("-flag value").unwrap();
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline[0].command_name(), None);
    }

    #[test]
    fn test_unterminated_quote_fails_parse() {
        assert_eq!(
            parse("a \"b").unwrap_err(),
            TokenizeError::UnterminatedQuote(2)
        );
    }

    #[test]
    fn test_collection_literal_equivalence() {
        let keys_only: CommandLine = ["foo"].into_iter().collect();
        assert_eq!(keys_only.named().count(), 1);
        assert_eq!(keys_only.get_by_alias("foo"), Some(&[][..]));

        let mut pairs = CommandLine::new();
        pairs.extend([("foo", "bar"), ("foo", "baz")]);
        let named: Vec<_> = pairs.named().collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].0.name(), "foo");
        assert_eq!(named[0].1, strings(&["bar", "baz"]).as_slice());
    }

    #[test]
    fn test_positional_offsets_skip_command_name() {
        let line = CommandLine::new()
            .with_anonymous("test")
            .with_anonymous("abc");
        assert_eq!(line.positional(0), Some("test"));
        assert_eq!(line.positional(1), Some("abc"));
        assert_eq!(line.positional(2), None);
    }
}
