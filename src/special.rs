//! Special-token marker matching: the alternation regex over reserved strings (`<|endoftext|>`
//! and friends), plus the allowed/disallowed policy types used by [`crate::Encoding::encode`].

use std::collections::HashSet;

use fancy_regex::Regex;

use crate::error::Error;

/// Which special tokens the caller permits `encode` to treat as dedicated ranks.
#[derive(Debug, Clone)]
pub enum AllowedSpecial {
    /// Every special token this encoding knows about.
    All,
    /// Exactly these markers.
    Some(HashSet<String>),
}

/// Which special tokens `encode` must reject if seen in the input.
#[derive(Debug, Clone)]
pub enum DisallowedSpecial {
    /// Every special token not already in `allowed`.
    All,
    /// Exactly these markers.
    Some(HashSet<String>),
}

impl Default for DisallowedSpecial {
    fn default() -> Self {
        DisallowedSpecial::All
    }
}

/// Compiles the alternation regex that finds the next occurrence of *any* special marker.
///
/// Markers are sorted before escaping and joining so construction is deterministic (a `HashMap`'s
/// iteration order is not). Asserts that no marker is a prefix of another, since the splitter's
/// "first match wins" semantics would otherwise depend on alternation order in a way the current
/// vocabularies never exercise.
pub fn build_special_regex<'a>(markers: impl Iterator<Item = &'a str>) -> Result<Option<Regex>, Error> {
    let mut sorted: Vec<&str> = markers.collect();
    if sorted.is_empty() {
        return Ok(None);
    }
    sorted.sort_unstable();

    for w in sorted.windows(2) {
        debug_assert!(
            !w[1].starts_with(w[0]),
            "special-token marker {:?} is a prefix of {:?}; splitter precedence would be ambiguous",
            w[0],
            w[1]
        );
    }

    let joined = sorted
        .iter()
        .map(|m| fancy_regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Some(Regex::new(&joined)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_marker_set_compiles_to_none() {
        assert!(build_special_regex(std::iter::empty()).unwrap().is_none());
    }

    #[test]
    fn finds_first_marker_from_a_position() {
        let re = build_special_regex(["<|endoftext|>", "<|fim_prefix|>"].into_iter())
            .unwrap()
            .unwrap();
        let text = "hello <|endoftext|> world";
        let m = re.find_from_pos(text, 0).unwrap().unwrap();
        assert_eq!(m.as_str(), "<|endoftext|>");
        assert_eq!(m.start(), 6);
    }
}
