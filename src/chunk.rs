//! Fixed-size overlapping text chunker.
//!
//! Splits a [`Document`]'s text into [`Chunk`]s of at most `chunk_size`
//! characters. Each window starts `chunk_size - overlap` characters after the
//! previous one, so adjacent chunks share exactly `overlap` characters and a
//! sentence cut at one boundary is still whole in the neighbouring chunk.
//!
//! Windows are measured in characters, not bytes, so multi-byte text is never
//! split inside a code point. Chunks never span documents.
//!
//! # Example
//!
//! ```rust
//! use lorekeeper::chunk::chunk_document;
//! use lorekeeper::models::Document;
//!
//! let doc = Document {
//!     id: "guide.pdf#p1".into(),
//!     source_path: "guide.pdf".into(),
//!     raw_text: "abcdefghij".into(),
//!     page_number: 1,
//! };
//! let chunks = chunk_document(&doc, 6, 2).unwrap();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "abcdef");
//! assert_eq!(chunks[1].text, "efghij");
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Check the `0 < overlap < chunk_size` precondition.
pub fn validate_params(chunk_size: usize, overlap: usize) -> Result<()> {
    if overlap == 0 || overlap >= chunk_size {
        return Err(RagError::InvalidInput(format!(
            "chunk overlap must satisfy 0 < overlap < chunk_size (got overlap={}, chunk_size={})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Split one document into overlapping windows.
///
/// Returns an empty vector for empty text. The final chunk may be shorter
/// than `chunk_size`; no chunk is emitted once a window has reached the end
/// of the text, so the tail is never duplicated.
pub fn chunk_document(doc: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate_params(chunk_size, overlap)?;

    // Byte position of every char start, plus the end of the string.
    let bounds: Vec<usize> = doc
        .raw_text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(doc.raw_text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(total_chars.div_ceil(step));
    let mut start = 0usize;

    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);
        let text = &doc.raw_text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(doc, chunks.len() as u32, text, start, end));
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunk every document in order, concatenating the results.
pub fn chunk_documents(docs: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let mut all = Vec::new();
    for doc in docs {
        all.extend(chunk_document(doc, chunk_size, overlap)?);
    }
    Ok(all)
}

fn make_chunk(doc: &Document, index: u32, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}#c{}", doc.id, index),
        document_id: doc.id.clone(),
        source_path: doc.source_path.clone(),
        page_number: doc.page_number,
        chunk_index: index,
        text: text.to_string(),
        start_offset: start,
        end_offset: end,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "guide.pdf#p3".to_string(),
            source_path: "guide.pdf".to_string(),
            raw_text: text.to_string(),
            page_number: 3,
        }
    }

    /// Rebuild the source text by dropping each later chunk's overlapping head.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.extend(c.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_rejects_bad_overlap() {
        assert!(chunk_document(&doc("abc"), 10, 0).is_err());
        assert!(chunk_document(&doc("abc"), 10, 10).is_err());
        assert!(chunk_document(&doc("abc"), 10, 12).is_err());
        assert!(chunk_document(&doc("abc"), 10, 3).is_ok());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_document(&doc(""), 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_document(&doc("Safe code 2591"), 500, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Safe code 2591");
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 14);
        assert_eq!(chunks[0].page_number, 3);
        assert_eq!(chunks[0].id, "guide.pdf#p3#c0");
    }

    #[test]
    fn test_windows_advance_by_step() {
        let chunks = chunk_document(&doc("0123456789"), 4, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["0123", "3456", "6789"]);
        let offsets: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.start_offset, c.end_offset))
            .collect();
        assert_eq!(offsets, vec![(0, 4), (3, 7), (6, 10)]);
    }

    #[test]
    fn test_no_degenerate_trailing_chunk() {
        // 10 chars, size 8, overlap 3: [0,8) then [5,10) reaches the end.
        let chunks = chunk_document(&doc("abcdefghij"), 8, 3).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "fghij");

        // Exactly one window's worth of text must not produce a second chunk.
        let chunks = chunk_document(&doc("abcdefgh"), 8, 3).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_overlap_invariant_and_size_bound() {
        let text: String = (0..40)
            .map(|i| format!("Chapter {} collectible. ", i))
            .collect();
        let (size, overlap) = (50, 12);
        let chunks = chunk_document(&doc(&text), size, overlap).unwrap();
        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.text.chars().count() <= size);
        }
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].text.chars().count() - overlap)
                .collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_coverage_reconstructs_text() {
        let text = "The workbench is in the back room of the music store. ".repeat(17);
        let chunks = chunk_document(&doc(&text), 64, 16).unwrap();
        assert_eq!(reconstruct(&chunks, 16), text);
    }

    #[test]
    fn test_multibyte_text_split_on_chars() {
        let text = "⚠️ Spoiler: Ellie finds the guitar in Jackson — héllo wörld ".repeat(5);
        let chunks = chunk_document(&doc(&text), 20, 5).unwrap();
        for c in &chunks {
            assert!(c.text.chars().count() <= 20);
        }
        assert_eq!(reconstruct(&chunks, 5), text);
        assert_eq!(
            chunks.last().unwrap().end_offset,
            text.chars().count()
        );
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let c1 = chunk_document(&doc(text), 16, 4).unwrap();
        let c2 = chunk_document(&doc(text), 16, 4).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_chunks_do_not_cross_documents() {
        let a = Document {
            id: "a.pdf#p1".into(),
            source_path: "a.pdf".into(),
            raw_text: "aaaaaaaaaa".into(),
            page_number: 1,
        };
        let b = Document {
            id: "b.pdf#p1".into(),
            source_path: "b.pdf".into(),
            raw_text: "bbbbbb".into(),
            page_number: 1,
        };
        let chunks = chunk_documents(&[a, b], 6, 2).unwrap();
        for c in &chunks {
            let expected = if c.document_id.starts_with('a') { 'a' } else { 'b' };
            assert!(c.text.chars().all(|ch| ch == expected));
        }
        let b_chunks: Vec<_> = chunks.iter().filter(|c| c.document_id == "b.pdf#p1").collect();
        assert_eq!(b_chunks[0].chunk_index, 0);
        assert_eq!(b_chunks[0].start_offset, 0);
    }
}
