//! The unstable-boundary helper: computes the stable token prefix and the set of plausible
//! completions for a piece whose tokenization could change if more text were appended.
//!
//! Grounded directly on the reference `_encode_unstable_native`/`_increase_last_piece_token_len`
//! pair: the regex that pre-tokenizes a fixed string is not guaranteed stable under concatenation
//! (e.g. `"images/"` and `"images/1"` can segment the trailing run differently), so callers doing
//! incremental completion need the set of tokenizations the tail could still resolve to.

use std::collections::HashSet;

use crate::bpe;
use crate::encoding::Encoding;
use crate::error::Error;
use crate::special::{AllowedSpecial, DisallowedSpecial};
use crate::Rank;

fn decodes_to_all_whitespace(enc: &Encoding, token: Rank) -> bool {
    enc.decode_single_token_bytes(token)
        .map(|bytes| {
            !bytes.is_empty() && bytes.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        })
        .unwrap_or(false)
}

/// Extends `last_piece_token_len` leftward while the token at that position decodes to
/// all-whitespace bytes. Returns `tokens` unchanged (ownership is just threaded through) along
/// with the possibly-larger length.
pub(crate) fn increase_last_piece_token_len(
    enc: &Encoding,
    tokens: Vec<Rank>,
    last_piece_token_len: usize,
) -> (Vec<Rank>, usize) {
    let mut len = last_piece_token_len;
    if len > 0 {
        while len < tokens.len() {
            let candidate = tokens[tokens.len() - len - 1];
            if decodes_to_all_whitespace(enc, candidate) {
                len += 1;
            } else {
                break;
            }
        }
    }
    (tokens, len)
}

/// Returns the index of the first sorted key that does *not* have `prefix` as a byte prefix,
/// i.e. the end of the run of keys starting with `prefix`. Used with the start of the run to
/// iterate every key with `prefix` as a prefix via binary search (`partition_point`).
fn prefix_range<'a>(sorted: &'a [Box<[u8]>], prefix: &[u8]) -> &'a [Box<[u8]>] {
    let start = sorted.partition_point(|k| k.as_ref() < prefix);
    let end = start
        + sorted[start..].partition_point(|k| k.starts_with(prefix));
    &sorted[start..end]
}

/// Computes `(stable_tokens, completions)` for `text` per the procedure in the unstable-boundary
/// helper: encode normally, peel off the whitespace-extended unstable tail, then enumerate every
/// plausible continuation of that tail using the sorted merge-table keys.
pub fn encode_with_unstable(
    enc: &Encoding,
    text: &str,
    allowed: AllowedSpecial,
    disallowed: DisallowedSpecial,
) -> Result<(Vec<Rank>, HashSet<Vec<Rank>>), Error> {
    let (allowed_set, disallowed_set) = enc.resolve_specials(allowed, disallowed);
    let (tokens, last_piece_token_len) = enc.encode_native(text, &allowed_set, &disallowed_set)?;

    if last_piece_token_len == 0 {
        return Ok((tokens, HashSet::new()));
    }

    let (mut tokens, last_piece_token_len) = increase_last_piece_token_len(enc, tokens, last_piece_token_len);
    let tail_start = tokens.len() - last_piece_token_len;
    let unstable_bytes = enc.decode_bytes_unchecked(&tokens[tail_start..]);
    tokens.truncate(tail_start);

    let mut completions: HashSet<Vec<Rank>> = HashSet::new();
    if unstable_bytes.is_empty() {
        return Ok((tokens, completions));
    }

    let sorted = enc.token_byte_values();

    for key in prefix_range(sorted, &unstable_bytes) {
        completions.insert(vec![enc.encode_single_token(key)?]);
    }

    for i in 1..unstable_bytes.len() {
        let (prefix, suffix) = unstable_bytes.split_at(i);
        for key in prefix_range(sorted, suffix) {
            let mut combined = prefix.to_vec();
            combined.extend_from_slice(key);
            // Morally this is byte_pair_encode(&combined, ...), but a regex split may have been
            // introduced by the extra bytes (e.g. cl100k's "  !" splits to " " + " !", and
            // byte_pair_encode("  !") != encode_ordinary("  !")), so prefer regex-aware encoding
            // whenever `combined` is valid UTF-8.
            let mut piece_tokens = match std::str::from_utf8(&combined) {
                Ok(s) => enc.encode_ordinary_native_with_len(s).0,
                Err(_) => bpe::byte_pair_encode(&combined, &enc_mergeable_ranks(enc)),
            };
            let mut acc_len = 0usize;
            let mut cut = piece_tokens.len();
            for (idx, &t) in piece_tokens.iter().enumerate() {
                acc_len += enc
                    .decode_single_token_bytes(t)
                    .map(|b| b.len())
                    .unwrap_or(0);
                if acc_len >= unstable_bytes.len() {
                    cut = idx + 1;
                    break;
                }
            }
            piece_tokens.truncate(cut);
            completions.insert(piece_tokens);
        }
    }

    if let Some(&last_byte) = unstable_bytes.last() {
        if unstable_bytes.len() > 1 && matches!(last_byte, b' ' | b'\t' | b'\n' | b'\r') {
            let (head, tail) = unstable_bytes.split_at(unstable_bytes.len() - 1);
            let mut combined = bpe::byte_pair_encode(head, &enc_mergeable_ranks(enc));
            combined.extend(bpe::byte_pair_encode(tail, &enc_mergeable_ranks(enc)));
            completions.insert(combined);
        }
    }

    Ok((tokens, completions))
}

fn enc_mergeable_ranks(enc: &Encoding) -> &crate::vocab::MergeableRanks {
    &enc.mergeable_ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::test_support::toy_encoding;

    #[test]
    fn stable_prefix_returns_no_completions_when_last_piece_is_special() {
        let enc = toy_encoding(&[], &[("<|endoftext|>", 999)]);
        let (tokens, completions) = encode_with_unstable(
            &enc,
            "hi<|endoftext|>",
            AllowedSpecial::All,
            DisallowedSpecial::Some(HashSet::new()),
        )
        .unwrap();
        assert_eq!(tokens.last(), Some(&999));
        assert!(completions.is_empty());
    }

    #[test]
    fn unstable_tail_has_at_least_one_completion() {
        let enc = toy_encoding(&[(b"im", 1000), (b"ima", 1001), (b"imag", 1002)], &[]);
        let (_stable, completions) = encode_with_unstable(
            &enc,
            "im",
            AllowedSpecial::All,
            DisallowedSpecial::Some(HashSet::new()),
        )
        .unwrap();
        assert!(!completions.is_empty());
    }
}
