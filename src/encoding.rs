//! The public encoder: composes the pre-tokenizer, the special-token splitter and the BPE merge
//! engine into the operations a caller actually uses.

use std::collections::HashSet;

use fancy_regex::Regex;
use rustc_hash::FxHashMap;
use tracing::instrument;

use crate::bpe;
use crate::error::Error;
use crate::offsets;
use crate::pretokenize::{self, PatternId};
use crate::special::{self, AllowedSpecial, DisallowedSpecial};
use crate::vocab::MergeableRanks;
use crate::Rank;

/// Input longer than this many Unicode scalar values is rejected by `encode`/`encode_ordinary`.
pub const MAX_INPUT_SIZE: usize = 1_000_000;

/// A constructed tokenizer: owns its merge table, special-token table, and compiled patterns, and
/// is immutable afterwards. Cheap to share across threads behind an `Arc` (it is `Send + Sync`).
#[derive(Debug)]
pub struct Encoding {
    pub(crate) name: String,
    pub(crate) mergeable_ranks: MergeableRanks,
    pub(crate) decoder: FxHashMap<Rank, Box<[u8]>>,
    pub(crate) special_tokens_encoder: FxHashMap<String, Rank>,
    pub(crate) special_tokens_decoder: FxHashMap<Rank, Box<[u8]>>,
    pub(crate) pretok_regex: Regex,
    pub(crate) special_regex: Option<Regex>,
    pub(crate) sorted_token_bytes: Vec<Box<[u8]>>,
    pub(crate) max_token_value: Rank,
}

impl Encoding {
    /// Builds an encoder from a merge table and a special-token table.
    ///
    /// Asserts (in debug builds) that no special-token marker is a prefix of another, and that no
    /// special-token rank collides with a merge-table rank.
    #[instrument(skip(name, mergeable_ranks, special_tokens), fields(name = %name.as_ref()))]
    pub fn new(
        name: impl AsRef<str>,
        pattern: PatternId,
        mergeable_ranks: MergeableRanks,
        special_tokens: FxHashMap<String, Rank>,
    ) -> Result<Self, Error> {
        let pretok_regex = pattern.compile()?;
        let special_regex = special::build_special_regex(special_tokens.keys().map(|s| s.as_str()))?;

        let mut decoder: FxHashMap<Rank, Box<[u8]>> = FxHashMap::default();
        decoder.reserve(mergeable_ranks.len());
        for (bytes, &rank) in &mergeable_ranks {
            decoder.insert(rank, bytes.clone());
        }
        debug_assert_eq!(
            decoder.len(),
            mergeable_ranks.len(),
            "mergeable rank table has duplicate ranks"
        );

        let mut special_tokens_decoder: FxHashMap<Rank, Box<[u8]>> = FxHashMap::default();
        for (marker, &rank) in &special_tokens {
            special_tokens_decoder.insert(rank, marker.as_bytes().to_vec().into_boxed_slice());
        }

        let mut sorted_token_bytes: Vec<Box<[u8]>> = mergeable_ranks.keys().cloned().collect();
        sorted_token_bytes.sort_unstable();

        let max_token_value = mergeable_ranks
            .values()
            .chain(special_tokens.values())
            .copied()
            .max()
            .unwrap_or(0);

        tracing::trace!(
            n_vocab = mergeable_ranks.len() + special_tokens.len(),
            max_token_value,
            "constructed encoding"
        );

        Ok(Self {
            name: name.as_ref().to_string(),
            mergeable_ranks,
            decoder,
            special_tokens_encoder: special_tokens,
            special_tokens_decoder,
            pretok_regex,
            special_regex,
            sorted_token_bytes,
            max_token_value,
        })
    }

    /// The encoding's name, e.g. `"cl100k_base"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of distinct token ids (merge table plus special tokens).
    pub fn n_vocab(&self) -> usize {
        self.mergeable_ranks.len() + self.special_tokens_encoder.len()
    }

    /// The largest token id this encoding can produce.
    pub fn max_token_value(&self) -> Rank {
        self.max_token_value
    }

    /// The rank of `<|endoftext|>`, if this encoding has one.
    pub fn eot_token(&self) -> Option<Rank> {
        self.special_tokens_encoder.get("<|endoftext|>").copied()
    }

    /// Whether `rank` names a special token rather than an ordinary merge-table entry.
    pub fn is_special(&self, rank: Rank) -> bool {
        self.special_tokens_decoder.contains_key(&rank)
    }

    /// All merge-table keys, sorted lexicographically by byte value.
    pub fn token_byte_values(&self) -> &[Box<[u8]>] {
        &self.sorted_token_bytes
    }

    fn check_input_size(text: &str) -> Result<(), Error> {
        let len = text.chars().count();
        if len > MAX_INPUT_SIZE {
            return Err(Error::InputTooLarge { len, max: MAX_INPUT_SIZE });
        }
        Ok(())
    }

    /// Encodes `text` with no special-token handling: every byte of `text` is either pre-tokenized
    /// and merged, or a literal occurrence of `<|endoftext|>` and friends is encoded as ordinary
    /// text rather than as a dedicated rank.
    pub fn encode_ordinary(&self, text: &str) -> Result<Vec<Rank>, Error> {
        Self::check_input_size(text)?;
        Ok(self.encode_ordinary_native(text))
    }

    fn encode_ordinary_native(&self, text: &str) -> Vec<Rank> {
        self.encode_ordinary_native_with_len(text).0
    }

    pub(crate) fn encode_ordinary_native_with_len(&self, text: &str) -> (Vec<Rank>, usize) {
        let mut out = Vec::new();
        let mut last_piece_token_len = 0usize;
        for piece in pretokenize::pieces(&self.pretok_regex, text) {
            let bytes = piece.as_bytes();
            if let Some(&rank) = self.mergeable_ranks.get(bytes) {
                out.push(rank);
                last_piece_token_len = 1;
            } else {
                let tokens = bpe::byte_pair_encode(bytes, &self.mergeable_ranks);
                last_piece_token_len = tokens.len();
                out.extend(tokens);
            }
        }
        (out, last_piece_token_len)
    }

    /// Encodes `text`, treating markers in `allowed` as dedicated ranks and failing on markers in
    /// `disallowed`. Markers that are neither allowed nor disallowed are left as ordinary text.
    pub fn encode(
        &self,
        text: &str,
        allowed: AllowedSpecial,
        disallowed: DisallowedSpecial,
    ) -> Result<Vec<Rank>, Error> {
        Self::check_input_size(text)?;
        let allowed_set = self.resolve_allowed(allowed);
        let disallowed_set = self.resolve_disallowed(disallowed, &allowed_set);
        Ok(self.encode_native(text, &allowed_set, &disallowed_set)?.0)
    }

    /// Shorthand for `encode` with every known special token allowed; never fails, since nothing
    /// is left disallowed.
    pub fn encode_with_all_specials(&self, text: &str) -> Result<Vec<Rank>, Error> {
        self.encode(text, AllowedSpecial::All, DisallowedSpecial::Some(HashSet::new()))
    }

    fn resolve_allowed(&self, allowed: AllowedSpecial) -> HashSet<String> {
        match allowed {
            AllowedSpecial::All => self.special_tokens_encoder.keys().cloned().collect(),
            AllowedSpecial::Some(set) => set,
        }
    }

    fn resolve_disallowed(
        &self,
        disallowed: DisallowedSpecial,
        allowed: &HashSet<String>,
    ) -> HashSet<String> {
        match disallowed {
            DisallowedSpecial::All => self
                .special_tokens_encoder
                .keys()
                .filter(|marker| !allowed.contains(marker.as_str()))
                .cloned()
                .collect(),
            DisallowedSpecial::Some(set) => set,
        }
    }

    pub(crate) fn resolve_specials(
        &self,
        allowed: AllowedSpecial,
        disallowed: DisallowedSpecial,
    ) -> (HashSet<String>, HashSet<String>) {
        let allowed_set = self.resolve_allowed(allowed);
        let disallowed_set = self.resolve_disallowed(disallowed, &allowed_set);
        (allowed_set, disallowed_set)
    }

    /// The core pipeline described in the special-token splitter component: advance a cursor,
    /// searching from it for the next special marker; dispatch on whether it's allowed,
    /// disallowed, or neither. Returns the token sequence and the token count of the final piece
    /// emitted (0 if the final emission was a special token), used by the unstable-boundary helper.
    pub(crate) fn encode_native(
        &self,
        text: &str,
        allowed: &HashSet<String>,
        disallowed: &HashSet<String>,
    ) -> Result<(Vec<Rank>, usize), Error> {
        let mut ret = Vec::new();
        let mut start = 0usize;
        let mut last_piece_token_len = 0usize;

        loop {
            let mut search_from = start;
            let next_special = loop {
                let Some(re) = self.special_regex.as_ref() else {
                    break None;
                };
                match re.find_from_pos(text, search_from)? {
                    Some(m) => {
                        let marker = m.as_str();
                        if allowed.contains(marker) {
                            break Some(m);
                        }
                        if disallowed.contains(marker) {
                            return Err(Error::DisallowedSpecialToken(marker.to_string()));
                        }
                        // Known marker, but neither allowed nor disallowed here: skip past its
                        // first character and keep searching; it reappears as ordinary text.
                        search_from = m.start() + 1;
                        if search_from > text.len() {
                            break None;
                        }
                    }
                    None => break None,
                }
            };

            let end = next_special.as_ref().map_or(text.len(), |m| m.start());
            let (mut tokens, piece_len) = self.encode_ordinary_native_with_len(&text[start..end]);
            if !tokens.is_empty() {
                last_piece_token_len = piece_len;
            }
            ret.append(&mut tokens);

            match next_special {
                Some(m) => {
                    let rank = self.special_tokens_encoder[m.as_str()];
                    ret.push(rank);
                    start = m.end();
                    last_piece_token_len = 0;
                }
                None => break,
            }
        }

        Ok((ret, last_piece_token_len))
    }

    /// Direct BPE over `bytes`, bypassing pre-tokenization entirely. `bytes` must be non-empty.
    pub fn encode_single_piece(&self, bytes: &[u8]) -> Vec<Rank> {
        if let Some(&rank) = self.mergeable_ranks.get(bytes) {
            return vec![rank];
        }
        bpe::byte_pair_encode(bytes, &self.mergeable_ranks)
    }

    /// Looks `bytes` up as a single token, either in the merge table or (if `bytes` is valid
    /// UTF-8) the special-token table.
    pub fn encode_single_token(&self, bytes: &[u8]) -> Result<Rank, Error> {
        if let Some(&rank) = self.mergeable_ranks.get(bytes) {
            return Ok(rank);
        }
        if let Ok(s) = std::str::from_utf8(bytes) {
            if let Some(&rank) = self.special_tokens_encoder.get(s) {
                return Ok(rank);
            }
        }
        Err(Error::Encode(format!(
            "{bytes:?} is not a single token in {}",
            self.name
        )))
    }

    /// Encodes an arbitrary byte buffer, including buffers that are not valid UTF-8.
    ///
    /// The valid-UTF-8 prefix is encoded ordinarily; an unstable trailing token run (by
    /// whitespace-extension, see the unstable-boundary helper) is peeled off, its bytes are
    /// re-joined with the invalid tail, and the combination is BPE-encoded directly. This keeps
    /// `decode_bytes(encode_bytes(b)) == b` for every byte buffer, including ones with no valid
    /// UTF-8 prefix at all.
    pub fn encode_bytes(&self, bytes: &[u8]) -> Vec<Rank> {
        let (valid_len, text) = match std::str::from_utf8(bytes) {
            Ok(s) => (bytes.len(), s),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // Safety of the unwrap: `valid_up_to` is exactly the longest valid-UTF-8 prefix.
                (valid_up_to, std::str::from_utf8(&bytes[..valid_up_to]).unwrap())
            }
        };

        let (tokens, last_piece_token_len) = self.encode_ordinary_native_with_len(text);
        let (mut tokens, last_piece_token_len) =
            crate::unstable::increase_last_piece_token_len(self, tokens, last_piece_token_len);

        let mut unstable_bytes = if last_piece_token_len > 0 {
            let tail_start = tokens.len() - last_piece_token_len;
            let tail = self.decode_bytes_unchecked(&tokens[tail_start..]);
            tokens.truncate(tail_start);
            tail
        } else {
            Vec::new()
        };
        unstable_bytes.extend_from_slice(&bytes[valid_len..]);

        if !unstable_bytes.is_empty() {
            tokens.extend(bpe::byte_pair_encode(&unstable_bytes, &self.mergeable_ranks));
        }
        tokens
    }

    /// Decodes `tokens` into raw bytes. `decode_bytes_unchecked` assumes every token id exists in
    /// the merge or special table and is used internally on token lists we just generated.
    pub(crate) fn decode_bytes_unchecked(&self, tokens: &[Rank]) -> Vec<u8> {
        let mut out = Vec::new();
        for &token in tokens {
            if let Some(bytes) = self.decoder.get(&token) {
                out.extend_from_slice(bytes);
            } else if let Some(bytes) = self.special_tokens_decoder.get(&token) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// Decodes `tokens` to bytes, failing on any id not present in either table.
    pub fn decode_bytes(&self, tokens: &[Rank]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(tokens.len() * 2);
        for &token in tokens {
            let bytes = self
                .decoder
                .get(&token)
                .or_else(|| self.special_tokens_decoder.get(&token))
                .ok_or(Error::DecodeKey(token))?;
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    /// Decodes `tokens` to a `String`, failing if the resulting bytes are not valid UTF-8 (no
    /// lossy replacement is ever performed on this path).
    pub fn decode(&self, tokens: &[Rank]) -> Result<String, Error> {
        let bytes = self.decode_bytes(tokens)?;
        String::from_utf8(bytes).map_err(|e| Error::Decode(format!("decoded bytes are not valid UTF-8: {e}")))
    }

    /// Looks a single token up as bytes, in either table.
    pub fn decode_single_token_bytes(&self, token: Rank) -> Result<Vec<u8>, Error> {
        if let Some(bytes) = self.decoder.get(&token) {
            return Ok(bytes.to_vec());
        }
        if let Some(bytes) = self.special_tokens_decoder.get(&token) {
            return Ok(bytes.to_vec());
        }
        Err(Error::DecodeKey(token))
    }

    /// Encodes `text` and additionally reports the set of plausible tokenizations for the
    /// trailing "unstable" run of tokens — the part of the output that could change if more text
    /// were appended after `text`. See the unstable-boundary helper for the algorithm.
    pub fn encode_with_unstable(
        &self,
        text: &str,
        allowed: AllowedSpecial,
        disallowed: DisallowedSpecial,
    ) -> Result<(Vec<Rank>, HashSet<Vec<Rank>>), Error> {
        Self::check_input_size(text)?;
        crate::unstable::encode_with_unstable(self, text, allowed, disallowed)
    }

    /// Decodes `tokens` to text together with, for each token, the character index at which its
    /// byte run begins in the decoded text.
    pub fn decode_with_offsets(&self, tokens: &[Rank]) -> Result<(String, Vec<usize>), Error> {
        let mut token_byte_lens = Vec::with_capacity(tokens.len());
        let mut bytes = Vec::new();
        for &token in tokens {
            let tb = self
                .decoder
                .get(&token)
                .or_else(|| self.special_tokens_decoder.get(&token))
                .ok_or(Error::DecodeKey(token))?;
            token_byte_lens.push(tb.len());
            bytes.extend_from_slice(tb);
        }
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("decoded bytes are not valid UTF-8: {e}")))?;
        let char_offsets = offsets::token_start_char_offsets(&text, &token_byte_lens);
        Ok((text, char_offsets))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::toy_encoding;
    use super::*;

    #[test]
    fn encode_ordinary_never_special_cases_markers() {
        let enc = toy_encoding(&[], &[("<|endoftext|>", 300)]);
        let tokens = enc.encode_ordinary("<|endoftext|>").unwrap();
        assert!(!tokens.contains(&300));
    }

    #[test]
    fn encode_disallows_default_special() {
        let enc = toy_encoding(&[], &[("<|endoftext|>", 300)]);
        let err = enc
            .encode("<|endoftext|>", AllowedSpecial::Some(HashSet::new()), DisallowedSpecial::All)
            .unwrap_err();
        assert!(matches!(err, Error::DisallowedSpecialToken(m) if m == "<|endoftext|>"));
    }

    #[test]
    fn encode_allows_explicit_special() {
        let enc = toy_encoding(&[], &[("<|endoftext|>", 300)]);
        let tokens = enc
            .encode(
                "<|endoftext|>",
                AllowedSpecial::Some(["<|endoftext|>".to_string()].into_iter().collect()),
                DisallowedSpecial::All,
            )
            .unwrap();
        assert_eq!(tokens, vec![300]);
    }

    #[test]
    fn encode_leaves_neither_allowed_nor_disallowed_as_text() {
        let enc = toy_encoding(&[], &[("<|endoftext|>", 300)]);
        let tokens = enc
            .encode(
                "<|endoftext|>",
                AllowedSpecial::Some(HashSet::new()),
                DisallowedSpecial::Some(HashSet::new()),
            )
            .unwrap();
        assert_ne!(tokens, vec![300]);
        assert!(!tokens.is_empty());
    }

    #[test]
    fn round_trip_ordinary_text() {
        let enc = toy_encoding(&[(b"he", 1000), (b"llo", 1001)], &[]);
        let tokens = enc.encode_ordinary("hello").unwrap();
        let back = enc.decode(&tokens).unwrap();
        assert_eq!(back, "hello");
    }

    #[test]
    fn round_trip_invalid_utf8_bytes() {
        let enc = toy_encoding(&[], &[]);
        for k in 0..=10 {
            let buf = vec![0x80u8; k];
            let tokens = enc.encode_bytes(&buf);
            let back = enc.decode_bytes(&tokens).unwrap();
            assert_eq!(back, buf, "round trip failed for {k} invalid bytes");
        }
    }

    #[test]
    fn round_trip_mixed_valid_and_invalid_utf8() {
        let enc = toy_encoding(&[(b"he", 1000), (b"llo", 1001)], &[]);
        let mut buf = b"hello".to_vec();
        buf.push(0xff);
        buf.push(0xfe);
        let tokens = enc.encode_bytes(&buf);
        let back = enc.decode_bytes(&tokens).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn decode_single_token_round_trips_with_encode_single_token() {
        let enc = toy_encoding(&[(b"he", 1000)], &[]);
        let bytes = enc.decode_single_token_bytes(1000).unwrap();
        assert_eq!(enc.encode_single_token(&bytes).unwrap(), 1000);
    }

    #[test]
    fn decode_rejects_unknown_rank() {
        let enc = toy_encoding(&[], &[]);
        let err = enc.decode_bytes(&[99_999]).unwrap_err();
        assert!(matches!(err, Error::DecodeKey(99_999)));
    }

    #[test]
    fn input_too_large_is_rejected() {
        let enc = toy_encoding(&[], &[]);
        let text = "a".repeat(MAX_INPUT_SIZE + 1);
        let err = enc.encode_ordinary(&text).unwrap_err();
        assert!(matches!(err, Error::InputTooLarge { .. }));
    }

    #[test]
    fn decode_with_offsets_matches_token_boundaries() {
        let enc = toy_encoding(&[(b"he", 1000), (b"llo", 1001)], &[]);
        let tokens = enc.encode_ordinary("hello world").unwrap();
        let (text, offsets) = enc.decode_with_offsets(&tokens).unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(offsets[0], 0);
    }
}
