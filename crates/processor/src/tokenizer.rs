//! Text tokenization
//!
//! Turns a record value into a lazy, restartable sequence of normalized words.
//! A word is a maximal run of Unicode alphanumeric characters, combining
//! marks or `_`, compared case-insensitively by lower-casing the whole text
//! up front. Marks stay inside the word they decorate, so decomposed accents
//! and the dot that lower-casing adds to `İ` do not split a word.

use crate::error::{TokenizeError, TokenizeResult};

/// Lower-cased word tokens of one record value
///
/// Owns the normalized text; every call to [`TokenStream::iter`] restarts
/// from the first token without re-normalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStream {
    normalized: String,
}

impl TokenStream {
    /// Iterate over the tokens
    pub fn iter(&self) -> Tokens<'_> {
        Tokens {
            rest: &self.normalized,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &'a TokenStream {
    type Item = &'a str;
    type IntoIter = Tokens<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the tokens of a [`TokenStream`]
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.find(is_word_char)?;
        let tail = &self.rest[start..];
        let len = tail.find(|c: char| !is_word_char(c)).unwrap_or(tail.len());
        let (token, rest) = tail.split_at(len);
        self.rest = rest;
        Some(token)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_combining_mark(c)
}

/// Generic combining-mark blocks; script-specific signs are already
/// alphabetic
fn is_combining_mark(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}

/// Tokenize a record value.
///
/// Fails with [`TokenizeError::InvalidInput`] when the value is absent. An
/// empty or separator-only value yields an empty stream.
pub fn tokenize(value: Option<&str>) -> TokenizeResult<TokenStream> {
    let text = value.ok_or_else(TokenizeError::missing_value)?;
    Ok(TokenStream {
        normalized: text.to_lowercase(),
    })
}
