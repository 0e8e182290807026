use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tiktoken_rs::CoreBPE;

use super::error::{MemoryError, Result};

static CL100K: OnceCell<Arc<CoreBPE>> = OnceCell::new();

/// Load the `cl100k_base` vocabulary (the `gpt-3.5-turbo` / `gpt-4` family)
/// once per process.
fn shared_bpe() -> Result<Arc<CoreBPE>> {
    CL100K
        .get_or_try_init(|| tiktoken_rs::cl100k_base().map(Arc::new))
        .cloned()
        .map_err(|e| MemoryError::Tokenizer(e.to_string()))
}

/// A contiguous token window of the input, decoded back to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The decoded window with surrounding whitespace trimmed.
    pub text: String,
    /// Offset of the window's first token in the input token stream.
    pub token_start: usize,
    /// Number of tokens in the window.
    pub token_count: usize,
}

/// Splits text into windows of at most `max_tokens` BPE tokens.
///
/// Splits fall on token boundaries only, so a sentence (or word) may be cut
/// wherever a window fills up. A boundary is shifted only when it would leave
/// a character's bytes in two different chunks.
#[derive(Clone)]
pub struct Chunker {
    bpe: Arc<CoreBPE>,
    max_tokens: usize,
}

impl fmt::Debug for Chunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunker")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    pub fn new(max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(MemoryError::InvalidChunkSize(max_tokens));
        }
        Ok(Self {
            bpe: shared_bpe()?,
            max_tokens,
        })
    }

    /// Number of tokens `text` encodes to.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split `text` into trimmed chunk strings, in order.
    ///
    /// Text with no tokens yields no chunks. Whitespace-only text yields
    /// empty-string chunks, one per window.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.chunk_spans(text)?.into_iter().map(|c| c.text).collect())
    }

    /// Like [`Chunker::chunk`], but keeps the token span of each window.
    pub fn chunk_spans(&self, text: &str) -> Result<Vec<TextChunk>> {
        let tokens = self.bpe.encode_ordinary(text);
        let mut chunks = Vec::with_capacity(tokens.len().div_ceil(self.max_tokens));

        let mut start = 0;
        while start < tokens.len() {
            let ideal_end = (start + self.max_tokens).min(tokens.len());
            let decode = |end: usize| {
                self.bpe
                    .decode(tokens[start..end].to_vec())
                    .map_err(|e| e.to_string())
            };
            let (end, decoded) = settle_boundary(start, ideal_end, tokens.len(), decode)?;
            chunks.push(TextChunk {
                text: decoded.trim().to_string(),
                token_start: start,
                token_count: end - start,
            });
            start = end;
        }

        Ok(chunks)
    }
}

/// Find the end of the window starting at `start` that decodes cleanly:
/// `ideal_end` if possible, else the nearest earlier end, else the nearest
/// later one. Ends are tried one token at a time, so the common case is a
/// single decode.
fn settle_boundary<F>(
    start: usize,
    ideal_end: usize,
    len: usize,
    decode: F,
) -> Result<(usize, String)>
where
    F: Fn(usize) -> std::result::Result<String, String>,
{
    for end in (start + 1..=ideal_end).rev() {
        if let Ok(text) = decode(end) {
            return Ok((end, text));
        }
    }

    let mut last_error = String::from("token window is not valid UTF-8");
    for end in ideal_end + 1..=len {
        match decode(end) {
            Ok(text) => return Ok((end, text)),
            Err(e) => last_error = e,
        }
    }

    Err(MemoryError::Tokenizer(last_error))
}

/// Chunk `text` with a one-off [`Chunker`].
pub fn chunk_text(text: &str, max_tokens: usize) -> Result<Vec<String>> {
    Chunker::new(max_tokens)?.chunk(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_tokens_is_rejected() {
        let err = Chunker::new(0).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidChunkSize(0)));
    }

    #[test]
    fn test_empty_content() {
        let chunker = Chunker::new(500).unwrap();
        assert!(chunker.chunk("").unwrap().is_empty());
    }

    #[test]
    fn test_whitespace_only_is_one_empty_chunk() {
        let chunker = Chunker::new(500).unwrap();
        assert_eq!(chunker.chunk("   \n\t ").unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_short_text_is_single_trimmed_chunk() {
        let chunker = Chunker::new(500).unwrap();
        let chunks = chunker.chunk("  The sky is blue.\n").unwrap();
        assert_eq!(chunks, vec!["The sky is blue.".to_string()]);
    }

    #[test]
    fn test_exactly_max_tokens_is_single_chunk() {
        let text = "one two three four five six seven eight";
        let probe = Chunker::new(500).unwrap();
        let n = probe.count_tokens(text);

        let chunker = Chunker::new(n).unwrap();
        let chunks = chunker.chunk(text).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_splits_into_ceil_windows() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = Chunker::new(37).unwrap();
        let n = chunker.count_tokens(&text);
        assert!(n > 37);

        let spans = chunker.chunk_spans(&text).unwrap();
        assert_eq!(spans.len(), n.div_ceil(37));

        let (last, full) = spans.split_last().unwrap();
        assert!(full.iter().all(|c| c.token_count == 37));
        assert!(last.token_count <= 37);
        assert_eq!(spans.iter().map(|c| c.token_count).sum::<usize>(), n);

        for pair in spans.windows(2) {
            assert_eq!(pair[0].token_start + pair[0].token_count, pair[1].token_start);
        }
    }

    #[test]
    fn test_chunks_preserve_text_up_to_whitespace() {
        let text = "Remember to water the plants on Tuesday and call the dentist. ".repeat(10);
        let chunker = Chunker::new(8).unwrap();
        let joined: String = chunker.chunk(&text).unwrap().concat();

        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&joined), strip(&text));
    }

    #[test]
    fn test_multibyte_characters_stay_whole() {
        let text = "🦀🦀🦀 ünïcödé 日本語のテキスト 🦀🦀".repeat(5);
        let chunker = Chunker::new(1).unwrap();
        let chunks = chunker.chunk(&text).unwrap();

        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&chunks.concat()), strip(&text));
        assert!(chunks.iter().all(|c| !c.contains('\u{FFFD}')));
    }

    #[test]
    fn test_chunk_text_is_deterministic() {
        let text = "Deterministic chunking means the same input always splits the same way.";
        assert_eq!(chunk_text(text, 5).unwrap(), chunk_text(text, 5).unwrap());
    }
}
