//! Byte- and codepoint-level helpers shared by the alphabet, the path trie and the scorer.

/// Returns `true` if `byte` starts a UTF-8 encoded codepoint (i.e. it is not a continuation byte).
pub fn byte_is_codepoint_boundary(byte: u8) -> bool {
    byte & 0xC0 != 0x80
}

/// Total encoded length implied by a UTF-8 lead byte, or `None` for continuation bytes and
/// patterns no valid encoding starts with.
pub fn utf8_sequence_len(lead: u8) -> Option<usize> {
    if lead >> 7 == 0x00 {
        Some(1)
    } else if lead >> 5 == 0x06 {
        Some(2)
    } else if lead >> 4 == 0x0E {
        Some(3)
    } else if lead >> 3 == 0x1E {
        Some(4)
    } else {
        None
    }
}

/// Group raw bytes into codepoint-sized chunks.
///
/// Works on bytes rather than `str` because byte-mode decoding can hand us partial or invalid
/// sequences; each chunk is converted lossily.
pub fn split_into_codepoints(bytes: &[u8]) -> Vec<String> {
    let mut units = Vec::new();
    let mut start = 0;
    for i in 1..=bytes.len() {
        if i == bytes.len() || byte_is_codepoint_boundary(bytes[i]) {
            units.push(String::from_utf8_lossy(&bytes[start..i]).into_owned());
            start = i;
        }
    }
    units
}

/// Split on single spaces, dropping empty pieces.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}
