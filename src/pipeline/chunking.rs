//! Overlapping, boundary-aware text segmentation.
//!
//! Text is first broken into pieces no longer than `chunk_size` characters, preferring paragraph
//! breaks, then line breaks, then spaces, and finally single characters. Separators stay attached
//! to the end of the piece they terminate, so pieces tile the input exactly. Pieces are then
//! packed greedily into chunks; each chunk after the first starts with the trailing pieces of the
//! previous one, up to `chunk_overlap` characters. Pieces are packed as they are produced, so
//! only the current window is ever buffered.
//!
//! All sizes are in characters (Unicode scalar values), not bytes or tokens. Every chunk is a
//! contiguous slice of the input, so `start_offset` plus the chunk text is enough to rebuild the
//! original document.

use super::types::{Chunk, ChunkingOptions, PipelineError};
use std::collections::VecDeque;

/// Separators in preference order. The empty separator means "split into characters".
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Contiguous byte range of the input plus its character length.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Split `text` into ordered, overlapping chunks.
pub fn segment(text: &str, options: &ChunkingOptions) -> Result<Vec<Chunk>, PipelineError> {
    let ChunkingOptions {
        chunk_size,
        chunk_overlap,
    } = *options;
    if chunk_size == 0 {
        return Err(PipelineError::Segmentation(
            "chunk size must be greater than zero".into(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(PipelineError::Segmentation(format!(
            "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
        )));
    }

    let mut packer = Packer::new(text, chunk_size, chunk_overlap);
    split_span(text, 0, text.len(), &SEPARATORS, chunk_size, &mut packer);
    let chunks = packer.finish();

    if chunks.is_empty() {
        return Err(PipelineError::Segmentation(
            "segmenter produced no chunks".into(),
        ));
    }
    Ok(chunks)
}

fn split_span(
    text: &str,
    start: usize,
    end: usize,
    separators: &[&str],
    chunk_size: usize,
    out: &mut Packer<'_>,
) {
    if start >= end {
        return;
    }
    let span = &text[start..end];
    let chars = span.chars().count();
    if chars <= chunk_size {
        out.push(Piece { start, end, chars });
        return;
    }

    let Some(position) = separators
        .iter()
        .position(|separator| separator.is_empty() || span.contains(separator))
    else {
        split_chars(span, start, out);
        return;
    };
    let separator = separators[position];
    if separator.is_empty() {
        split_chars(span, start, out);
        return;
    }

    let remaining = &separators[position + 1..];
    let mut piece_start = start;
    for (offset, _) in span.match_indices(separator) {
        let piece_end = start + offset + separator.len();
        split_span(text, piece_start, piece_end, remaining, chunk_size, out);
        piece_start = piece_end;
    }
    split_span(text, piece_start, end, remaining, chunk_size, out);
}

fn split_chars(span: &str, base: usize, out: &mut Packer<'_>) {
    for (offset, ch) in span.char_indices() {
        out.push(Piece {
            start: base + offset,
            end: base + offset + ch.len_utf8(),
            chars: 1,
        });
    }
}

/// Greedy chunk builder fed one piece at a time.
///
/// Only the pieces of the current window are held, at most `chunk_size` of them.
struct Packer<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    // (piece, character offset of the piece within `text`)
    window: VecDeque<(Piece, usize)>,
    window_chars: usize,
    char_offset: usize,
    chunks: Vec<Chunk>,
}

impl<'a> Packer<'a> {
    fn new(text: &'a str, chunk_size: usize, overlap: usize) -> Self {
        Self {
            text,
            chunk_size,
            overlap,
            window: VecDeque::new(),
            window_chars: 0,
            char_offset: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: Piece) {
        if !self.window.is_empty() && self.window_chars + piece.chars > self.chunk_size {
            self.emit();
            while self.window_chars > self.overlap
                || (self.window_chars > 0 && self.window_chars + piece.chars > self.chunk_size)
            {
                let Some((dropped, _)) = self.window.pop_front() else {
                    break;
                };
                self.window_chars -= dropped.chars;
            }
        }
        self.window.push_back((piece, self.char_offset));
        self.window_chars += piece.chars;
        self.char_offset += piece.chars;
    }

    fn emit(&mut self) {
        let (Some(&(first, start_offset)), Some(&(last, _))) =
            (self.window.front(), self.window.back())
        else {
            return;
        };
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            text: self.text[first.start..last.end].to_string(),
            start_offset,
        });
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.emit();
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options(chunk_size: usize, chunk_overlap: usize) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Rebuild the source from chunks using their offsets, dropping the overlapped prefix.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut rebuilt = String::new();
        let mut covered = 0;
        for chunk in chunks {
            let skip = covered - chunk.start_offset;
            rebuilt.extend(chunk.text.chars().skip(skip));
            covered = chunk.start_offset + chunk.text.chars().count();
        }
        rebuilt
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = segment("hello world", &ChunkingOptions::default()).expect("chunks");
        assert_eq!(
            chunks,
            vec![Chunk {
                index: 0,
                text: "hello world".into(),
                start_offset: 0,
            }]
        );
    }

    #[test]
    fn text_of_exactly_chunk_size_is_a_single_chunk() {
        let text = "x".repeat(1000);
        let chunks = segment(&text, &ChunkingOptions::default()).expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn default_options_split_2500_characters_into_three_chunks() {
        let text = "a".repeat(2500);
        let chunks = segment(&text, &ChunkingOptions::default()).expect("chunks");
        let offsets: Vec<usize> = chunks.iter().map(|chunk| chunk.start_offset).collect();
        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.text.len()).collect();
        assert_eq!(offsets, vec![0, 800, 1600]);
        assert_eq!(lengths, vec![1000, 1000, 900]);
    }

    #[test]
    fn words_are_not_split_when_spaces_are_available() {
        let text = vec!["word"; 500].join(" ");
        let chunks = segment(&text, &ChunkingOptions::default()).expect("chunks");
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 1000);
            assert!(chunk.text.starts_with("word"));
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn paragraph_breaks_are_preferred() {
        let paragraph = "sentence ".repeat(5);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = segment(&text, &options(60, 0)).expect("chunks");
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert!(chunks[1].text.starts_with("sentence"));
    }

    #[test]
    fn overlap_repeats_the_tail_of_the_previous_chunk() {
        let text = "one two three four five six seven eight";
        let chunks = segment(text, &options(14, 6)).expect("chunks");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let previous_end = pair[0].start_offset + pair[0].text.chars().count();
            assert!(pair[1].start_offset < previous_end, "chunks must overlap");
            assert!(previous_end - pair[1].start_offset <= 6);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn multibyte_characters_are_counted_as_characters() {
        let text = "é".repeat(25);
        let chunks = segment(&text, &options(10, 2)).expect("chunks");
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 10);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn invalid_options_are_segmentation_errors() {
        assert!(matches!(
            segment("text", &options(0, 0)),
            Err(PipelineError::Segmentation(_))
        ));
        assert!(matches!(
            segment("text", &options(10, 10)),
            Err(PipelineError::Segmentation(_))
        ));
    }

    #[test]
    fn empty_text_yields_segmentation_error() {
        assert!(matches!(
            segment("", &ChunkingOptions::default()),
            Err(PipelineError::Segmentation(_))
        ));
    }

    #[test]
    fn unbroken_text_keeps_at_most_one_window_buffered() {
        let text = "x".repeat(2_000_000);
        let mut packer = Packer::new(&text, 1000, 200);
        let mut peak = 0;
        for (offset, ch) in text.char_indices() {
            packer.push(Piece {
                start: offset,
                end: offset + ch.len_utf8(),
                chars: 1,
            });
            peak = peak.max(packer.window.len());
        }
        assert_eq!(peak, 1000);
        assert_eq!(packer.finish().len(), 2500);
    }

    #[test]
    fn unbroken_text_yields_fixed_stride_windows() {
        let text = "x".repeat(2_000_000);
        let chunks = segment(&text, &ChunkingOptions::default()).expect("chunks");
        // Windows start every 800 characters until one reaches the end.
        assert_eq!(chunks.len(), 2500);
        assert!(
            chunks
                .iter()
                .enumerate()
                .all(|(position, chunk)| chunk.start_offset == position * 800)
        );
        let last = chunks.last().expect("last chunk");
        assert_eq!(last.start_offset + last.text.len(), text.len());
    }

    proptest! {
        #[test]
        fn chunks_rebuild_the_source_without_loss(
            text in "[a-zé \n]{1,600}",
            chunk_size in 1_usize..120,
            overlap_ratio in 0.0_f64..1.0,
        ) {
            let chunk_overlap = ((chunk_size as f64) * overlap_ratio) as usize;
            prop_assume!(chunk_overlap < chunk_size);
            let chunks = segment(&text, &options(chunk_size, chunk_overlap)).unwrap();

            prop_assert_eq!(reconstruct(&chunks), text.clone());
            for (position, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, position);
                let len = chunk.text.chars().count();
                prop_assert!(len >= 1 && len <= chunk_size);
                let source: String = text.chars().skip(chunk.start_offset).take(len).collect();
                prop_assert_eq!(&source, &chunk.text);
            }
            for pair in chunks.windows(2) {
                let previous_end = pair[0].start_offset + pair[0].text.chars().count();
                prop_assert!(pair[1].start_offset <= previous_end);
                prop_assert!(pair[1].start_offset > pair[0].start_offset);
                prop_assert!(previous_end - pair[1].start_offset <= chunk_overlap);
            }
        }

        #[test]
        fn text_within_chunk_size_is_one_identical_chunk(text in "[a-z \n]{1,200}") {
            let chunks = segment(&text, &options(200, 50)).unwrap();
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(&chunks[0].text, &text);
        }
    }
}
