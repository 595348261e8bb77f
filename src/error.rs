//! Typed error surface for construction and per-call failures.
//!
//! Construction errors (bad regex, malformed vocabulary) are fatal to the call that produced
//! them; per-call errors (disallowed special token, unknown rank, oversized input) never poison
//! the `Encoding` they were raised against, which remains fully usable afterwards.

use crate::Rank;

/// Errors that can occur while building or using an [`crate::Encoding`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pre-tokenizer or special-token pattern failed to compile.
    #[error("failed to compile regex: {0}")]
    Regex(#[from] fancy_regex::Error),

    /// `decode`/`decode_bytes` saw a rank absent from both the merge and special tables.
    #[error("unknown token for decoding: {0}")]
    DecodeKey(Rank),

    /// Decoded bytes, or a vocabulary buffer, were not valid UTF-8.
    #[error("{0}")]
    Decode(String),

    /// A single-piece operation did not resolve to exactly one token.
    #[error("{0}")]
    Encode(String),

    /// A reserved marker was seen in text under the "disallow everything else" policy.
    #[error("the text contains a special token that is not allowed: {0}")]
    DisallowedSpecialToken(String),

    /// Input exceeded the hard scalar-value length limit.
    #[error("input of {len} scalar values exceeds the maximum of {max}")]
    InputTooLarge { len: usize, max: usize },

    /// `registry::get_encoding`/`encoding_for_model` saw an unrecognized name.
    #[error("no known tiktoken encoding for {0:?}")]
    UnsupportedEncoding(String),

    /// Vocabulary acquisition (download, hash check, cache I/O) failed.
    #[cfg(feature = "download")]
    #[error("failed to load vocabulary: {0}")]
    Loader(#[from] crate::loader::LoaderError),
}

pub type Result<T> = std::result::Result<T, Error>;
