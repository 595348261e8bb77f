//! Integration-level tests for properties that don't require a real vocabulary: round-trip laws,
//! determinism, and special-token policy, all against a small synthetic encoding.

use std::collections::HashSet;

use rustc_hash::FxHashMap;
use tiktoken_compat::pretokenize::PatternId;
use tiktoken_compat::vocab::MergeableRanks;
use tiktoken_compat::{AllowedSpecial, DisallowedSpecial, Encoding, Error};

fn synthetic_cl100k_like() -> Encoding {
    let mut ranks = MergeableRanks::default();
    for b in 0u16..256 {
        ranks.insert(vec![b as u8].into_boxed_slice(), b as u32);
    }
    let merges: &[(&[u8], u32)] = &[
        (b"he", 256),
        (b"ll", 257),
        (b"wo", 258),
        (b"rl", 259),
        (b"hell", 260),
        (b"o ", 261),
        (b" w", 262),
    ];
    for &(bytes, rank) in merges {
        ranks.insert(bytes.to_vec().into_boxed_slice(), rank);
    }
    let specials: FxHashMap<String, u32> = [("<|endoftext|>".to_string(), 50000)].into_iter().collect();
    Encoding::new("synthetic", PatternId::Cl100kBase, ranks, specials).unwrap()
}

#[test]
fn round_trip_ordinary_text() {
    let enc = synthetic_cl100k_like();
    for text in ["hello world", "", "a", "the quick brown fox"] {
        let tokens = enc.encode_ordinary(text).unwrap();
        assert_eq!(enc.decode(&tokens).unwrap(), text);
    }
}

#[test]
fn round_trip_arbitrary_bytes_including_invalid_utf8() {
    let enc = synthetic_cl100k_like();
    let cases: Vec<Vec<u8>> = (0..=10).map(|k| vec![0x80u8; k]).collect();
    for buf in cases {
        let tokens = enc.encode_bytes(&buf);
        let back = enc.decode_bytes(&tokens).unwrap();
        assert_eq!(back, buf);
    }
}

#[test]
fn single_token_round_trip() {
    let enc = synthetic_cl100k_like();
    for &rank in &[0u32, 104, 256, 260] {
        let bytes = enc.decode_single_token_bytes(rank).unwrap();
        assert_eq!(enc.encode_single_token(&bytes).unwrap(), rank);
    }
}

#[test]
fn encoding_is_deterministic_across_repeated_calls() {
    let enc = synthetic_cl100k_like();
    let text = "hello world, hello again";
    let first = enc.encode_ordinary(text).unwrap();
    for _ in 0..10 {
        assert_eq!(enc.encode_ordinary(text).unwrap(), first);
    }
}

#[test]
fn encoding_is_deterministic_across_threads() {
    use std::sync::Arc;
    let enc = Arc::new(synthetic_cl100k_like());
    let text = "hello world, hello again";
    let expected = enc.encode_ordinary(text).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let enc = Arc::clone(&enc);
            let text = text.to_string();
            std::thread::spawn(move || enc.encode_ordinary(&text).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn special_token_policy() {
    let enc = synthetic_cl100k_like();

    let ordinary = enc.encode_ordinary("<|endoftext|>").unwrap();
    assert!(!ordinary.contains(&50000));

    let err = enc
        .encode("<|endoftext|>", AllowedSpecial::Some(HashSet::new()), DisallowedSpecial::All)
        .unwrap_err();
    assert!(matches!(err, Error::DisallowedSpecialToken(m) if m == "<|endoftext|>"));

    let allowed = enc
        .encode(
            "<|endoftext|>",
            AllowedSpecial::Some(["<|endoftext|>".to_string()].into_iter().collect()),
            DisallowedSpecial::All,
        )
        .unwrap();
    assert_eq!(allowed, vec![50000]);

    let neither = enc
        .encode("<|endoftext|>", AllowedSpecial::Some(HashSet::new()), DisallowedSpecial::Some(HashSet::new()))
        .unwrap();
    assert_ne!(neither, vec![50000]);
    assert!(!neither.is_empty());
}

#[test]
fn stability_under_repetition() {
    let enc = synthetic_cl100k_like();
    for c in ["^", "0", "a", "'s", " ", "\n"] {
        let text = c.repeat(10_000);
        let start = std::time::Instant::now();
        let tokens = enc.encode_ordinary(&text).unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(enc.decode(&tokens).unwrap(), text);
    }
}

#[test]
fn input_too_large_is_rejected() {
    let enc = synthetic_cl100k_like();
    let text = "a".repeat(1_000_001);
    let err = enc.encode_ordinary(&text).unwrap_err();
    assert!(matches!(err, Error::InputTooLarge { len, max } if len == 1_000_001 && max == 1_000_000));
}
