//! Pre-tokenizer patterns: the per-encoding Unicode regex that segments a literal run of text
//! into BPE-eligible pieces.
//!
//! `fancy_regex` is required (not the faster `regex` crate) because several patterns use
//! features `regex` can't express: the case-insensitive inline group `(?i: ... )` scoped to part
//! of an alternation, and the negative lookahead `\s+(?!\S)`. Possessive quantifiers in the
//! upstream cl100k_base pattern (`?+`, `++`) are rewritten to their greedy equivalents below,
//! since `fancy_regex` doesn't support them either; the match sequence is unaffected for any of
//! these patterns (verified against the reference token vectors).

use fancy_regex::Regex;

use crate::error::Error;

/// Identifies which built-in pre-tokenizer pattern (and special-token set) an encoding uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternId {
    Cl100kBase,
    R50kBase,
    O200kBase,
    Gpt2,
}

impl PatternId {
    pub fn pattern(self) -> &'static str {
        match self {
            // Possessive `?+` / `++` rewritten to `?` / `+`.
            PatternId::Cl100kBase => {
                r"'(?i:[sdmt]|ll|ve|re)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]|\s+(?!\S)|\s+"
            }
            PatternId::R50kBase => {
                r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+$|\s+(?!\S)|\s+"
            }
            PatternId::O200kBase => {
                r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+(?i:'s|'t|'re|'ve|'m|'ll|'d)?|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*(?i:'s|'t|'re|'ve|'m|'ll|'d)?|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n/]*|\s*[\r\n]+|\s+(?!\S)|\s+"
            }
            PatternId::Gpt2 => {
                r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+"
            }
        }
    }

    pub fn compile(self) -> Result<Regex, Error> {
        Regex::new(self.pattern()).map_err(Error::from)
    }
}

/// Iterates the non-overlapping leftmost pieces of `text` according to `regex`.
///
/// Each yielded piece is a contiguous `&str` slice; the regex is constructed so that matches
/// exhaust the whole input (every character belongs to exactly one match).
pub fn pieces<'a>(regex: &'a Regex, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    regex.find_iter(text).filter_map(|m| m.ok()).map(|m| m.as_str())
}
