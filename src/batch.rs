//! Batch dispatch: run encode/decode concurrently over arrays of inputs, preserving order.
//!
//! Async variants fan each input out to `tokio::task::spawn_blocking` (the encoder is pure CPU
//! work, so it belongs on the blocking pool, not competing with the async executor's own tasks)
//! and are gated behind the `download` feature, which is what pulls in `tokio`; sync variants use
//! `rayon`'s `par_iter` for contexts without a runtime and are always available. Both preserve
//! input order regardless of completion order, since each result is written into its original
//! slot.

#[cfg(feature = "download")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "download")]
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Error;
use crate::special::{AllowedSpecial, DisallowedSpecial};
use crate::Encoding;
use crate::Rank;

/// Runs `encode` over every input in `texts` concurrently, preserving order.
///
/// If `cancel` is set before all tasks are spawned, no further tasks are spawned and this returns
/// `None`; in-flight tasks are still allowed to finish, but their results are discarded. Returns
/// `Some(results)` otherwise, one entry per input.
#[cfg(feature = "download")]
pub async fn encode_batch(
    enc: Arc<Encoding>,
    texts: Vec<String>,
    allowed: AllowedSpecial,
    disallowed: DisallowedSpecial,
    cancel: Option<&AtomicBool>,
) -> Option<Vec<Result<Vec<Rank>, Error>>> {
    let mut handles = Vec::with_capacity(texts.len());
    for text in texts {
        if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
            return None;
        }
        let enc = Arc::clone(&enc);
        let allowed = allowed.clone();
        let disallowed = disallowed.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            enc.encode(&text, allowed, disallowed)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("encode task panicked"));
    }
    Some(results)
}

/// As [`encode_batch`], but with no special-token handling.
#[cfg(feature = "download")]
pub async fn encode_ordinary_batch(
    enc: Arc<Encoding>,
    texts: Vec<String>,
    cancel: Option<&AtomicBool>,
) -> Option<Vec<Result<Vec<Rank>, Error>>> {
    let mut handles = Vec::with_capacity(texts.len());
    for text in texts {
        if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
            return None;
        }
        let enc = Arc::clone(&enc);
        handles.push(tokio::task::spawn_blocking(move || enc.encode_ordinary(&text)));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("encode task panicked"));
    }
    Some(results)
}

/// Runs `decode` over every token sequence in `token_batches` concurrently, preserving order.
#[cfg(feature = "download")]
pub async fn decode_batch(
    enc: Arc<Encoding>,
    token_batches: Vec<Vec<Rank>>,
    cancel: Option<&AtomicBool>,
) -> Option<Vec<Result<String, Error>>> {
    let mut handles = Vec::with_capacity(token_batches.len());
    for tokens in token_batches {
        if cancel.map(|c| c.load(Ordering::SeqCst)).unwrap_or(false) {
            return None;
        }
        let enc = Arc::clone(&enc);
        handles.push(tokio::task::spawn_blocking(move || enc.decode(&tokens)));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("decode task panicked"));
    }
    Some(results)
}

/// Synchronous counterpart to [`encode_batch`], for callers without a `tokio` runtime.
/// Embarrassingly parallel via `rayon`; no shared mutable state, so there is no cancellation
/// concept here (nothing to cancel between: every input is independent and cheap to start).
pub fn encode_batch_sync(
    enc: &Encoding,
    texts: &[String],
    allowed: AllowedSpecial,
    disallowed: DisallowedSpecial,
) -> Vec<Result<Vec<Rank>, Error>> {
    texts
        .par_iter()
        .map(|text| enc.encode(text, allowed.clone(), disallowed.clone()))
        .collect()
}

/// As [`encode_batch_sync`], but with no special-token handling.
pub fn encode_ordinary_batch_sync(enc: &Encoding, texts: &[String]) -> Vec<Result<Vec<Rank>, Error>> {
    texts.par_iter().map(|text| enc.encode_ordinary(text)).collect()
}

/// Synchronous counterpart to [`decode_batch`].
pub fn decode_batch_sync(enc: &Encoding, token_batches: &[Vec<Rank>]) -> Vec<Result<String, Error>> {
    token_batches.par_iter().map(|tokens| enc.decode(tokens)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::test_support::toy_encoding;

    #[test]
    fn sync_batch_preserves_order() {
        let enc = toy_encoding(&[(b"he", 1000), (b"llo", 1001)], &[]);
        let texts = vec!["hello".to_string(), "abc".to_string(), "hello world".to_string()];
        let results = encode_ordinary_batch_sync(&enc, &texts);
        assert_eq!(results.len(), 3);
        for (text, result) in texts.iter().zip(results.iter()) {
            let tokens = result.as_ref().unwrap();
            assert_eq!(&enc.decode(tokens).unwrap(), text);
        }
    }

    #[cfg(feature = "download")]
    #[tokio::test]
    async fn async_batch_preserves_order_and_completes() {
        let enc = Arc::new(toy_encoding(&[(b"he", 1000), (b"llo", 1001)], &[]));
        let texts = vec!["hello".to_string(), "world".to_string(), "hello world".to_string()];
        let results = encode_ordinary_batch(Arc::clone(&enc), texts.clone(), None).await.unwrap();
        assert_eq!(results.len(), 3);
        for (text, result) in texts.iter().zip(results.iter()) {
            let tokens = result.as_ref().unwrap();
            assert_eq!(&enc.decode(tokens).unwrap(), text);
        }
    }

    #[cfg(feature = "download")]
    #[tokio::test]
    async fn cancellation_before_spawn_discards_everything() {
        let enc = Arc::new(toy_encoding(&[], &[]));
        let cancel = AtomicBool::new(true);
        let texts = vec!["a".to_string(), "b".to_string()];
        let results = encode_ordinary_batch(enc, texts, Some(&cancel)).await;
        assert!(results.is_none());
    }
}
