//! ChunkEngine: split oversized text inputs into overlapping chunks.
//!
//! Units are lines (newline-terminated), bytes (cut on UTF-8 character
//! boundaries), or approximate tokens (runs of alphanumerics, or single
//! punctuation characters). Chunk `i` covers units `[i*step, i*step+size)`
//! with `step = size - overlap`; the sequence ends with the first chunk that
//! reaches the end of the text. With `max_chunks > 0` the tail is dropped and
//! the split reports itself truncated.

use baton_types::workflow::{ChunkBy, ChunkConfig};

/// Separator placed between recombined chunk results.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// One slice of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the split.
    pub index: usize,
    pub text: String,
}

/// Ordered, finite, consuming sequence of chunks.
#[derive(Debug)]
pub struct ChunkSplit {
    chunks: std::vec::IntoIter<Chunk>,
    kept: usize,
    total: usize,
}

impl ChunkSplit {
    /// Number of chunks that will be yielded.
    pub fn len(&self) -> usize {
        self.kept
    }

    pub fn is_empty(&self) -> bool {
        self.kept == 0
    }

    /// Number of chunks the input would need without `max_chunks`.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether trailing chunks were dropped because of `max_chunks`.
    pub fn truncated(&self) -> bool {
        self.kept < self.total
    }
}

impl Iterator for ChunkSplit {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        self.chunks.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for ChunkSplit {}

/// Check `size > 0` and `overlap < size`.
pub fn validate_chunk_config(config: &ChunkConfig) -> Result<(), String> {
    if config.size == 0 {
        return Err("chunk size must be greater than 0".to_string());
    }
    if config.overlap >= config.size {
        return Err(format!(
            "chunk overlap ({}) must be less than chunk size ({})",
            config.overlap, config.size
        ));
    }
    Ok(())
}

/// Size of `text` in the given unit.
pub fn measure(text: &str, by: ChunkBy) -> usize {
    match by {
        ChunkBy::Bytes => text.len(),
        ChunkBy::Lines => line_starts(text).len(),
        ChunkBy::Tokens => token_starts(text).len(),
    }
}

/// Whether `text` exceeds the step's chunk threshold.
pub fn needs_chunking(text: &str, config: &ChunkConfig) -> bool {
    measure(text, config.by) > config.size
}

/// Split `text` according to `config`.
///
/// `config` must already have passed [`validate_chunk_config`]; an invalid
/// config yields a single chunk holding the whole text.
pub fn split(text: &str, config: &ChunkConfig) -> ChunkSplit {
    if validate_chunk_config(config).is_err() {
        return whole(text);
    }

    let boundaries = unit_boundaries(text, config.by);
    let units = boundaries.len().saturating_sub(1);
    if units == 0 {
        return ChunkSplit {
            chunks: Vec::new().into_iter(),
            kept: 0,
            total: 0,
        };
    }

    let step = config.size - config.overlap;
    let windows = if units <= config.size {
        1
    } else {
        (units - config.size).div_ceil(step) + 1
    };

    // Byte units inside one character share a boundary, so narrow windows can
    // come out empty or repeat their neighbour.
    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(windows);
    for window in 0..windows {
        let start = window * step;
        let end = (start + config.size).min(units);
        let range = (boundaries[start], boundaries[end]);
        if range.0 < range.1 && ranges.last() != Some(&range) {
            ranges.push(range);
        }
    }

    let total = ranges.len();
    let kept = if config.max_chunks > 0 {
        total.min(config.max_chunks)
    } else {
        total
    };

    let chunks = ranges
        .into_iter()
        .take(kept)
        .enumerate()
        .map(|(index, (start, end))| Chunk {
            index,
            text: text[start..end].to_string(),
        })
        .collect::<Vec<_>>();

    ChunkSplit {
        chunks: chunks.into_iter(),
        kept,
        total,
    }
}

/// Join per-chunk results in chunk order, whatever order they arrived in.
pub fn recombine(mut results: Vec<(usize, String)>) -> String {
    results.sort_by_key(|(index, _)| *index);
    results
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

fn whole(text: &str) -> ChunkSplit {
    ChunkSplit {
        chunks: vec![Chunk {
            index: 0,
            text: text.to_string(),
        }]
        .into_iter(),
        kept: 1,
        total: 1,
    }
}

/// Byte offsets where each unit starts, followed by `text.len()`.
fn unit_boundaries(text: &str, by: ChunkBy) -> Vec<usize> {
    let mut starts = match by {
        ChunkBy::Lines => line_starts(text),
        ChunkBy::Tokens => token_starts(text),
        ChunkBy::Bytes => byte_starts(text),
    };
    starts.push(text.len());
    starts
}

fn line_starts(text: &str) -> Vec<usize> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut starts = vec![0];
    starts.extend(
        text.match_indices('\n')
            .map(|(i, _)| i + 1)
            .filter(|&i| i < text.len()),
    );
    starts
}

/// Every byte is a unit, but a unit inside a multi-byte character is folded
/// into the character's first byte so slices stay valid UTF-8.
fn byte_starts(text: &str) -> Vec<usize> {
    (0..text.len())
        .map(|i| {
            let mut i = i;
            while !text.is_char_boundary(i) {
                i -= 1;
            }
            i
        })
        .collect()
}

/// Approximate tokens: alphanumeric runs and single punctuation characters.
/// Whitespace belongs to the preceding token; leading whitespace belongs to
/// the first one.
fn token_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if c.is_alphanumeric() || c == '_' {
            if !in_word {
                starts.push(i);
                in_word = true;
            }
        } else {
            starts.push(i);
            in_word = false;
        }
    }
    if let Some(first) = starts.first_mut() {
        *first = 0;
    }
    starts
}
