//! Built-in per-encoding constructors and model-name resolution.
//!
//! Grounded on the reference's `openai_public.rs` constructor table: each encoding is a
//! `(name, pattern, explicit_n_vocab, special_tokens)` tuple; the merge table itself still has to
//! come from a real `.tiktoken` file (see [`crate::loader`]), since it is hundreds of thousands of
//! lines of vocabulary data this crate does not vendor.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::pretokenize::PatternId;
use crate::Rank;

/// Everything needed to build an [`crate::Encoding`] except the merge table itself.
pub struct EncodingConstructor {
    pub name: &'static str,
    pub pattern: PatternId,
    pub special_tokens: FxHashMap<String, Rank>,
    pub explicit_n_vocab: Option<usize>,
}

fn specials(pairs: &[(&str, Rank)]) -> FxHashMap<String, Rank> {
    pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
}

fn o200k_harmony_specials() -> FxHashMap<String, Rank> {
    let m = specials(&[
        ("<|endoftext|>", 199999),
        ("<|endofprompt|>", 200018),
        ("<|startoftext|>", 199998),
        ("<|channel|>", 200005),
        ("<|constrain|>", 200003),
        ("<|message|>", 200008),
        ("<|return|>", 200002),
        ("<|start|>", 200006),
        ("<|end|>", 200007),
        ("<|call|>", 200012),
    ]);
    let used_ranks: std::collections::HashSet<Rank> = m.values().copied().collect();
    let mut m = m;
    for n in 200000..=201087u32 {
        if used_ranks.contains(&n) {
            continue;
        }
        m.insert(format!("<|reserved_{n}|>"), n);
    }
    m
}

fn gpt2_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "gpt2",
        pattern: PatternId::Gpt2,
        special_tokens: specials(&[("<|endoftext|>", 50256)]),
        explicit_n_vocab: Some(50257),
    }
}

fn r50k_base_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "r50k_base",
        pattern: PatternId::R50kBase,
        special_tokens: specials(&[("<|endoftext|>", 50256)]),
        explicit_n_vocab: Some(50257),
    }
}

fn p50k_base_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "p50k_base",
        pattern: PatternId::R50kBase,
        special_tokens: specials(&[("<|endoftext|>", 50256)]),
        explicit_n_vocab: Some(50281),
    }
}

fn p50k_edit_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "p50k_edit",
        pattern: PatternId::R50kBase,
        special_tokens: specials(&[
            ("<|endoftext|>", 50256),
            ("<|fim_prefix|>", 50281),
            ("<|fim_middle|>", 50282),
            ("<|fim_suffix|>", 50283),
        ]),
        explicit_n_vocab: None,
    }
}

fn cl100k_base_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "cl100k_base",
        pattern: PatternId::Cl100kBase,
        special_tokens: specials(&[
            ("<|endoftext|>", 100257),
            ("<|fim_prefix|>", 100258),
            ("<|fim_middle|>", 100259),
            ("<|fim_suffix|>", 100260),
            ("<|endofprompt|>", 100276),
        ]),
        explicit_n_vocab: Some(100277),
    }
}

fn o200k_base_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "o200k_base",
        pattern: PatternId::O200kBase,
        special_tokens: specials(&[("<|endoftext|>", 199999), ("<|endofprompt|>", 200018)]),
        explicit_n_vocab: Some(200019),
    }
}

fn o200k_harmony_constructor() -> EncodingConstructor {
    EncodingConstructor {
        name: "o200k_harmony",
        pattern: PatternId::O200kBase,
        special_tokens: o200k_harmony_specials(),
        explicit_n_vocab: None,
    }
}

static CONSTRUCTORS: Lazy<FxHashMap<&'static str, fn() -> EncodingConstructor>> = Lazy::new(|| {
    let mut m: FxHashMap<&'static str, fn() -> EncodingConstructor> = FxHashMap::default();
    m.insert("gpt2", gpt2_constructor);
    m.insert("r50k_base", r50k_base_constructor);
    m.insert("p50k_base", p50k_base_constructor);
    m.insert("p50k_edit", p50k_edit_constructor);
    m.insert("cl100k_base", cl100k_base_constructor);
    m.insert("o200k_base", o200k_base_constructor);
    m.insert("o200k_harmony", o200k_harmony_constructor);
    m
});

/// Returns the built-in constructor for `name`, if known.
pub fn find_encoding_constructor(name: &str) -> Result<EncodingConstructor, Error> {
    CONSTRUCTORS
        .get(name)
        .map(|f| f())
        .ok_or_else(|| Error::UnsupportedEncoding(name.to_string()))
}

/// Every built-in encoding name, for diagnostics and the CLI's `--list-encodings`.
pub fn list_encoding_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CONSTRUCTORS.keys().copied().collect();
    names.sort_unstable();
    names
}

const MODEL_PREFIX_TO_ENCODING: &[(&str, &str)] = &[
    ("o1-", "o200k_base"),
    ("o3-", "o200k_base"),
    ("gpt-4o-", "o200k_base"),
    ("ft:gpt-4o", "o200k_base"),
    ("gpt-4-", "cl100k_base"),
    ("ft:gpt-4", "cl100k_base"),
    ("gpt-3.5-turbo-", "cl100k_base"),
    ("gpt-35-turbo-", "cl100k_base"),
    ("ft:gpt-3.5-turbo", "cl100k_base"),
    ("ft:davinci-002", "cl100k_base"),
    ("ft:babbage-002", "cl100k_base"),
];

const MODEL_EXACT_TO_ENCODING: &[(&str, &str)] = &[
    ("gpt-4o", "o200k_base"),
    ("gpt-4", "cl100k_base"),
    ("gpt-3.5-turbo", "cl100k_base"),
    ("gpt-35-turbo", "cl100k_base"),
    ("text-davinci-003", "p50k_base"),
    ("text-davinci-002", "p50k_base"),
    ("text-davinci-001", "r50k_base"),
    ("text-davinci-edit-001", "p50k_edit"),
    ("code-davinci-edit-001", "p50k_edit"),
    ("davinci", "r50k_base"),
    ("curie", "r50k_base"),
    ("babbage", "r50k_base"),
    ("ada", "r50k_base"),
    ("gpt2", "gpt2"),
];

/// Resolves a model name to its encoding name: exact match first, then longest matching prefix.
pub fn encoding_name_for_model(model: &str) -> Result<&'static str, Error> {
    if let Some((_, enc)) = MODEL_EXACT_TO_ENCODING.iter().find(|&&(m, _)| m == model) {
        return Ok(enc);
    }
    MODEL_PREFIX_TO_ENCODING
        .iter()
        .filter(|&&(prefix, _)| model.starts_with(prefix))
        .max_by_key(|&&(prefix, _)| prefix.len())
        .map(|&(_, enc)| enc)
        .ok_or_else(|| Error::UnsupportedEncoding(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings_resolve() {
        for name in [
            "gpt2",
            "r50k_base",
            "p50k_base",
            "p50k_edit",
            "cl100k_base",
            "o200k_base",
            "o200k_harmony",
        ] {
            assert!(find_encoding_constructor(name).is_ok(), "{name} should resolve");
        }
    }

    #[test]
    fn unknown_encoding_errors() {
        assert!(find_encoding_constructor("not-a-real-encoding").is_err());
    }

    #[test]
    fn model_exact_match_wins_over_prefix() {
        assert_eq!(encoding_name_for_model("gpt-4").unwrap(), "cl100k_base");
    }

    #[test]
    fn model_prefix_match() {
        assert_eq!(encoding_name_for_model("gpt-4o-mini").unwrap(), "o200k_base");
        assert_eq!(encoding_name_for_model("gpt-4-turbo").unwrap(), "cl100k_base");
    }

    #[test]
    fn unknown_model_errors() {
        assert!(encoding_name_for_model("not-a-real-model").is_err());
    }

    #[test]
    fn o200k_harmony_reserved_range_is_populated_without_rank_collisions() {
        let c = o200k_harmony_constructor();
        // Unnamed ids below the 200013 reserved-fill start must still resolve to a marker.
        for n in [200000u32, 200001, 200004, 200009, 200010, 200011] {
            assert_eq!(c.special_tokens.get(&format!("<|reserved_{n}|>")), Some(&n));
        }
        assert_eq!(c.special_tokens.get("<|reserved_200013|>"), Some(&200013));
        assert_eq!(c.special_tokens.get("<|reserved_201087|>"), Some(&201087));
        // Rank 200018 is already taken by "<|endofprompt|>"; no second marker may claim it.
        assert!(!c.special_tokens.contains_key("<|reserved_200018|>"));
        // Every id in the declared 200000..=201087 harmony range resolves to exactly one marker.
        for n in 200000u32..=201087 {
            assert_eq!(
                c.special_tokens.values().filter(|&&v| v == n).count(),
                1,
                "id {n} must resolve to exactly one marker"
            );
        }
        let mut ranks: Vec<Rank> = c.special_tokens.values().copied().collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), c.special_tokens.len(), "special-token ranks must be disjoint");
    }
}
