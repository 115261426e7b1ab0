// src/core/argument_key.rs

use std::fmt;

/// An alias-set identity for a flag, a parameter or a command.
///
/// Aliases are compared case-insensitively and two keys are equal when their alias
/// sets intersect. That relation is not transitive (`{a,b} == {b,c}` and
/// `{b,c} == {c,d}` but `{a,b} != {c,d}`), which is why `ArgumentKey` deliberately
/// implements neither `Eq` nor `Hash`: it is only ever used for linear lookups.
#[derive(Debug, Clone)]
pub struct ArgumentKey {
    aliases: Vec<String>,
}

impl ArgumentKey {
    /// The distinguished key holding anonymous values (command name and positionals).
    pub fn empty() -> Self {
        Self {
            aliases: vec![String::new()],
        }
    }

    /// A key with a single alias, as built from a flag token.
    pub fn single(alias: impl Into<String>) -> Self {
        Self {
            aliases: vec![alias.into()],
        }
    }

    /// Builds a key from a primary name followed by any number of aliases.
    /// Case-insensitive duplicates are folded into the first spelling.
    pub fn new<I, S>(name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut key = Self::single(name);
        for alias in aliases {
            key.push_alias(alias.into());
        }
        key
    }

    /// Adds `alias` unless an equal spelling is already present.
    pub(crate) fn push_alias(&mut self, alias: String) {
        if !self.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    /// The first alias, used as the canonical name.
    pub fn name(&self) -> &str {
        self.aliases.first().map_or("", String::as_str)
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_empty_key(&self) -> bool {
        self.aliases.iter().all(String::is_empty)
    }

    /// True when `alias` is one of this key's spellings, ignoring case.
    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| eq_ignore_case(a, alias))
    }

    /// True when both keys share at least one alias.
    pub fn intersects(&self, other: &Self) -> bool {
        self.aliases.iter().any(|a| other.contains(a))
    }

    /// The first alias of `self` that `other` also carries, for error messages.
    pub fn shared_alias(&self, other: &Self) -> Option<&str> {
        self.aliases
            .iter()
            .find(|a| other.contains(a))
            .map(String::as_str)
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || (!a.is_ascii() && a.to_lowercase() == b.to_lowercase())
}

impl PartialEq for ArgumentKey {
    fn eq(&self, other: &Self) -> bool {
        self.intersects(other)
    }
}

impl From<&str> for ArgumentKey {
    fn from(alias: &str) -> Self {
        Self::single(alias)
    }
}

impl fmt::Display for ArgumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_key() {
            return f.write_str("<anonymous>");
        }
        f.write_str(&self.aliases.join("|"))
    }
}
