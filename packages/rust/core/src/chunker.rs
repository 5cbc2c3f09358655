//! Digest chunker: splits digest text into transport-sized parts.
//!
//! Sizes are counted in `char`s. Paragraph separators (`\n\n`) stay attached
//! to the paragraph before them, so concatenating the chunk bodies gives back
//! the exact input. When more than one chunk is produced, each rendered chunk
//! carries a `part i/total` header whose length is reserved out of the limit.

use newsdigest_shared::{Chunk, NewsDigestError, Result};

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split `text` into chunks whose rendered text is at most `max_size` chars.
pub fn split_digest(text: &str, max_size: usize) -> Result<Vec<Chunk>> {
    if text.chars().count() <= max_size {
        return Ok(vec![Chunk {
            index: 1,
            total: 1,
            body: text.to_string(),
        }]);
    }

    // Reserve room for the header; grow the reserve if the count gains a digit.
    let mut digits = 1;
    loop {
        let reserve = header_len(digits);
        let capacity = max_size.checked_sub(reserve).filter(|c| *c > 0).ok_or_else(|| {
            NewsDigestError::validation(format!(
                "chunk size {max_size} leaves no room for a {reserve}-char part header"
            ))
        })?;

        let bodies = pack_paragraphs(text, capacity);
        let needed = bodies.len().to_string().len();
        if needed <= digits {
            let total = bodies.len();
            return Ok(bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| Chunk {
                    index: i + 1,
                    total,
                    body,
                })
                .collect());
        }
        digits = needed;
    }
}

/// Length of `"part {i}/{n}\n\n"` when both numbers have `digits` digits.
fn header_len(digits: usize) -> usize {
    Chunk::header(1, 1).len() - 2 + 2 * digits
}

/// Greedy paragraph packing with hard splits for oversized paragraphs.
fn pack_paragraphs(text: &str, capacity: usize) -> Vec<String> {
    let mut bodies = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0;

    for para in text.split_inclusive(PARAGRAPH_SEPARATOR) {
        let para_len = para.chars().count();

        if para_len > capacity {
            if !buf.is_empty() {
                bodies.push(std::mem::take(&mut buf));
                buf_len = 0;
            }
            bodies.extend(hard_split(para, capacity));
            continue;
        }

        if buf_len + para_len > capacity {
            bodies.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        buf.push_str(para);
        buf_len += para_len;
    }

    if !buf.is_empty() {
        bodies.push(buf);
    }
    bodies
}

/// Fixed-size slices of `capacity` chars; never splits a code point.
fn hard_split(para: &str, capacity: usize) -> Vec<String> {
    let chars: Vec<char> = para.chars().collect();
    chars
        .chunks(capacity)
        .map(|slice| slice.iter().collect())
        .collect()
}
