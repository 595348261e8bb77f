//! Byte-offset -> Unicode-scalar-index mapping used by [`crate::Encoding::decode_with_offsets`].

/// For each token's byte length (in order, summing to `text`'s UTF-8 byte length), returns the
/// character (Unicode scalar) index at which that token's byte run begins.
///
/// Built in one pass: for each scalar of UTF-8 length `L` occupying character index `c`, the next
/// `L` byte positions map to `c`; the final byte position maps to the total scalar count. A token
/// that ends in the middle of a multi-byte scalar (only possible when the token boundary splits a
/// scalar that originally spanned more than one token) is reported as starting at that scalar's
/// index, so the same index can appear for consecutive tokens.
pub fn token_start_char_offsets(text: &str, token_byte_lens: &[usize]) -> Vec<usize> {
    let total_bytes = text.len();
    let mut byte_to_char = vec![0usize; total_bytes + 1];
    let mut char_index = 0usize;
    for (byte_pos, ch) in text.char_indices() {
        let width = ch.len_utf8();
        for b in byte_pos..byte_pos + width {
            byte_to_char[b] = char_index;
        }
        char_index += 1;
    }
    byte_to_char[total_bytes] = char_index;

    let mut offsets = Vec::with_capacity(token_byte_lens.len());
    let mut byte_offset = 0usize;
    for &len in token_byte_lens {
        offsets.push(byte_to_char[byte_offset]);
        byte_offset += len;
    }
    offsets
}
