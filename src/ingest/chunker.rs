use crate::config::ChunkingConfig;

/// A bounded slice of extracted text. `start` is the char offset in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub start: usize,
    pub text: &'a str,
}

impl Chunk<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Lazy overlapping chunk sequence. Clone it to restart from the beginning.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    max_chunk_size: usize,
    overlap: usize,
    // (char offset, byte offset) of the next chunk
    next_start: Option<(usize, usize)>,
    next_index: usize,
}

/// Splits `text` into chunks of at most `max_chunk_size` chars where each
/// chunk repeats the last `overlap` chars of its predecessor.
pub fn split(text: &str, max_chunk_size: usize, overlap: usize) -> Chunks<'_> {
    let max_chunk_size = max_chunk_size.max(1);
    Chunks {
        text,
        max_chunk_size,
        overlap: overlap.min(max_chunk_size - 1),
        next_start: Some((0, 0)),
        next_index: 0,
    }
}

/// Skips chunking below the configured threshold; the whole text becomes one chunk.
pub fn plan<'a>(text: &'a str, config: &ChunkingConfig) -> Chunks<'a> {
    let chars = text.chars().count();
    if chars <= config.threshold {
        return split(text, chars.max(1), 0);
    }
    split(text, config.chunk_size, config.overlap)
}

impl Chunks<'_> {
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

fn byte_offset(text: &str, chars: usize) -> Option<usize> {
    text.char_indices().nth(chars).map(|(idx, _)| idx)
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, start_byte) = self.next_start?;
        let rest = &self.text[start_byte..];
        // Some(_) means text remains past this chunk
        let chunk_end = byte_offset(rest, self.max_chunk_size);
        let text = &rest[..chunk_end.unwrap_or(rest.len())];

        let chunk = Chunk {
            index: self.next_index,
            start,
            text,
        };
        self.next_index += 1;
        self.next_start = chunk_end.map(|_| {
            let stride = self.max_chunk_size - self.overlap;
            let resume = byte_offset(text, stride).unwrap_or(text.len());
            (start + stride, start_byte + resume)
        });

        Some(chunk)
    }
}

/// Rebuilds the source text from a chunk sequence by dropping each overlap.
pub fn stitch<'a>(chunks: impl IntoIterator<Item = Chunk<'a>>, overlap: usize) -> String {
    let mut out = String::new();
    for chunk in chunks {
        if chunk.index == 0 {
            out.push_str(chunk.text);
            continue;
        }
        let skip = chunk
            .text
            .char_indices()
            .nth(overlap)
            .map(|(idx, _)| idx)
            .unwrap_or(chunk.text.len());
        out.push_str(&chunk.text[skip..]);
    }
    out
}
