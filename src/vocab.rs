//! Parsing of the `<base64-token> <rank>\n` vocabulary file format.
//!
//! Adapted from the `.tiktoken` format used by the reference implementation: one entry per line,
//! a base64-encoded token followed by a single space and a decimal rank. Unparseable lines are
//! skipped rather than rejected, matching the reference's forgiving behaviour.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rustc_hash::FxHashMap;

use crate::{error::Error, Rank};

/// Mergeable-rank table: byte string -> rank, as read from a `.tiktoken` file.
pub type MergeableRanks = FxHashMap<Box<[u8]>, Rank>;

/// Parses a `.tiktoken`-format buffer into a mergeable-ranks table.
///
/// `buf` must be valid UTF-8 (`Error::Decode` otherwise); within that, each non-empty line is
/// `base64(token) ' ' rank`. A line that fails to split, base64-decode, or parse its rank is
/// silently skipped.
pub fn parse_tiktoken_bpe(buf: &[u8]) -> Result<MergeableRanks, Error> {
    let text = std::str::from_utf8(buf)
        .map_err(|e| Error::Decode(format!("vocabulary file is not valid UTF-8: {e}")))?;

    let mut ranks = MergeableRanks::default();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let Some((token_b64, rank_str)) = line.split_once(' ') else {
            continue;
        };
        let Ok(token) = STANDARD.decode(token_b64) else {
            continue;
        };
        let Ok(rank) = rank_str.parse::<Rank>() else {
            continue;
        };
        ranks.insert(token.into_boxed_slice(), rank);
    }
    Ok(ranks)
}

/// Converts the GPT-2 "data-gym" vocabulary pair (`vocab.bpe` merge list + `encoder.json` token
/// table) into a mergeable-ranks table. Grounded on the reference's
/// `data_gym_to_mergeable_bpe_ranks`: the data-gym format maps each byte to a printable Unicode
/// character so that merges can be stored as whitespace-separated text, and `encoder.json` assigns
/// ranks to the resulting strings. This is the inverse of that byte-to-unicode remapping.
#[cfg(feature = "download")]
pub fn parse_gpt2_data_gym(vocab_bpe: &str, encoder_json: &str) -> Result<MergeableRanks, Error> {
    let (rank_to_intbyte, data_gym_byte_to_byte) = gpt2_byte_mapping();

    let decode_data_gym = |s: &str| -> Vec<u8> {
        s.chars().map(|c| data_gym_byte_to_byte[&c]).collect()
    };

    let mut ranks = MergeableRanks::default();
    for (i, &byte) in rank_to_intbyte.iter().enumerate() {
        ranks.insert(vec![byte].into_boxed_slice(), i as Rank);
    }

    let mut lines = vocab_bpe.lines();
    lines.next(); // first line is a version comment, as in the reference format
    let mut next_rank = ranks.len() as Rank;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((first, second)) = line.split_once(' ') else {
            continue;
        };
        let mut merged = decode_data_gym(first);
        merged.extend(decode_data_gym(second));
        ranks.insert(merged.into_boxed_slice(), next_rank);
        next_rank += 1;
    }

    // encoder.json assigns the authoritative ranks; it is expected to agree with the merge order
    // above, but we trust it as the source of truth rather than re-deriving assertions from it.
    let encoder: std::collections::HashMap<String, Rank> =
        serde_json::from_str(encoder_json).map_err(|e| Error::Decode(format!("encoder.json is not valid JSON: {e}")))?;
    for (token, rank) in encoder {
        if token == "<|endoftext|>" {
            continue;
        }
        let bytes = decode_data_gym(&token);
        ranks.insert(bytes.into_boxed_slice(), rank);
    }

    Ok(ranks)
}

#[cfg(feature = "download")]
fn gpt2_byte_mapping() -> (Vec<u8>, FxHashMap<char, u8>) {
    // The printable single-byte Latin-1 ranges the reference's `bytes_to_unicode` starts from:
    // '!'..='~', then '\u{a1}'..='\u{ac}', then '\u{ae}'..='\u{ff}'.
    let mut rank_to_intbyte: Vec<u8> = (0u32..=255)
        .filter(|&b| (0x21..=0x7e).contains(&b) || (0xa1..=0xac).contains(&b) || (0xae..=0xff).contains(&b))
        .map(|b| b as u8)
        .collect();

    let mut data_gym_byte_to_byte: FxHashMap<char, u8> = rank_to_intbyte
        .iter()
        .map(|&b| (char::from_u32(b as u32).unwrap(), b))
        .collect();

    let mut n: u32 = 0;
    for b in 0u32..=255 {
        if !rank_to_intbyte.contains(&(b as u8)) {
            rank_to_intbyte.push(b as u8);
            let mapped_char = char::from_u32(256 + n).unwrap();
            data_gym_byte_to_byte.insert(mapped_char, b as u8);
            n += 1;
        }
    }
    debug_assert_eq!(rank_to_intbyte.len(), 256);
    (rank_to_intbyte, data_gym_byte_to_byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "download")]
    #[test]
    fn gpt2_byte_mapping_covers_all_256_bytes() {
        let (rank_to_intbyte, _) = gpt2_byte_mapping();
        let mut seen: Vec<u8> = rank_to_intbyte.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 256);
    }

    #[cfg(feature = "download")]
    #[test]
    fn gpt2_data_gym_single_merge_round_trips_through_encoder_json() {
        let vocab_bpe = "#version: 0.2\n! \"\n";
        let encoder_json = r#"{"!": 0, "\"": 1, "!\"": 2, "<|endoftext|>": 3}"#;
        let ranks = parse_gpt2_data_gym(vocab_bpe, encoder_json).unwrap();
        assert_eq!(ranks.get(&b"!\""[..]), Some(&2));
    }

    #[test]
    fn parses_well_formed_lines() {
        let buf = format!(
            "{} 0\n{} 1\n",
            STANDARD.encode(b"a"),
            STANDARD.encode(b"b")
        );
        let ranks = parse_tiktoken_bpe(buf.as_bytes()).unwrap();
        assert_eq!(ranks.get(&b"a"[..]), Some(&0));
        assert_eq!(ranks.get(&b"b"[..]), Some(&1));
        assert_eq!(ranks.len(), 2);
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let buf = format!(
            "\n{} not-a-number\nnotbase64!!! 5\n{} 2\n",
            STANDARD.encode(b"x"),
            STANDARD.encode(b"y"),
        );
        let ranks = parse_tiktoken_bpe(buf.as_bytes()).unwrap();
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks.get(&b"y"[..]), Some(&2));
    }

    #[test]
    fn rejects_invalid_utf8_buffer() {
        let buf = [0xff, 0xfe, 0x00];
        assert!(parse_tiktoken_bpe(&buf).is_err());
    }
}
