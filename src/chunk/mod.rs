//! Paragraph-aware text chunking with sliding overlap
//!
//! Splits raw document text into passages sized for embedding and lexical
//! indexing. Paragraphs are packed greedily up to `max_chars`; oversized
//! paragraphs fall back to sentence packing, and oversized sentences to word
//! packing. A final pass prepends the tail of each chunk to its successor so
//! boundary terms stay visible to both.

use regex::Regex;

/// Stateless text chunker
///
/// `chunk` is a pure function of its input: identical text always produces
/// identical chunks, which keeps re-ingestion idempotent downstream.
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
    min_chars: usize,
    tabs_spaces: Regex,
    newline_runs: Regex,
    paragraph_break: Regex,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize, min_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
            min_chars,
            tabs_spaces: Regex::new(r"[ \t]+").expect("static regex"),
            newline_runs: Regex::new(r"\n{3,}").expect("static regex"),
            paragraph_break: Regex::new(r"\n\s*\n+").expect("static regex"),
        }
    }

    /// Split text into ordered, overlapping chunks
    ///
    /// Buffers shorter than `min_chars` at flush time are discarded, so a
    /// document shorter than `min_chars` yields no chunks at all.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = self.normalize(text);
        if text.is_empty() {
            return Vec::new();
        }

        let mut base: Vec<String> = Vec::new();
        let mut cur = String::new();

        for para in self.paragraph_break.split(&text) {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if para.chars().count() > self.max_chars {
                self.flush(&mut base, &mut cur);
                self.split_long_paragraph(&mut base, para);
                continue;
            }

            if cur.chars().count() + para.chars().count() + 2 > self.max_chars {
                self.flush(&mut base, &mut cur);
            }
            if !cur.is_empty() {
                cur.push_str("\n\n");
            }
            cur.push_str(para);
        }
        self.flush(&mut base, &mut cur);

        self.apply_overlap(base)
    }

    /// Sentence-level packing for paragraphs that exceed `max_chars`
    fn split_long_paragraph(&self, out: &mut Vec<String>, para: &str) {
        let mut cur = String::new();
        for sent in split_sentences(para) {
            let sent = sent.trim();
            // A single sentence longer than max_chars is split at word boundaries
            if sent.chars().count() > self.max_chars {
                if !cur.is_empty() {
                    self.add_if_big(out, &cur);
                    cur.clear();
                }
                self.split_long_sentence(out, sent);
                continue;
            }
            if cur.chars().count() + sent.chars().count() + 1 > self.max_chars {
                self.add_if_big(out, &cur);
                cur.clear();
            }
            if !cur.is_empty() {
                cur.push(' ');
            }
            cur.push_str(sent);
        }
        self.add_if_big(out, &cur);
    }

    fn split_long_sentence(&self, out: &mut Vec<String>, sentence: &str) {
        let mut cur = String::new();
        for word in sentence.split_whitespace() {
            if cur.chars().count() + word.chars().count() + 1 > self.max_chars {
                self.add_if_big(out, &cur);
                cur.clear();
            }
            if !cur.is_empty() {
                cur.push(' ');
            }
            cur.push_str(word);
        }
        self.add_if_big(out, &cur);
    }

    /// Prepend the tail of chunk i-1 to chunk i so boundary terms score in both
    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.overlap_chars == 0 || chunks.len() <= 1 {
            return chunks;
        }

        let mut out = Vec::with_capacity(chunks.len());
        let mut prev: Option<&String> = None;
        for chunk in &chunks {
            match prev {
                None => out.push(chunk.clone()),
                Some(p) => {
                    let tail = char_tail(p, self.overlap_chars);
                    out.push(format!("{}\n{}", tail, chunk));
                }
            }
            prev = Some(chunk);
        }
        out
    }

    fn flush(&self, out: &mut Vec<String>, cur: &mut String) {
        self.add_if_big(out, cur);
        cur.clear();
    }

    fn add_if_big(&self, out: &mut Vec<String>, s: &str) {
        let s = s.trim();
        if s.chars().count() >= self.min_chars {
            out.push(s.to_string());
        }
    }

    fn normalize(&self, s: &str) -> String {
        let s = s.replace('\u{0000}', " ");
        let s = self.tabs_spaces.replace_all(&s, " ");
        let s = self.newline_runs.replace_all(&s, "\n\n");
        s.trim().to_string()
    }
}

/// Split after `.`, `!` or `?` followed by whitespace, keeping the terminator
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    sentences.push(&text[start..next_i]);
                    start = next_i;
                }
            }
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Last `n` characters of a string, respecting char boundaries
fn char_tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    let (idx, _) = s.char_indices().nth(skip).expect("skip < char count");
    &s[idx..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let chunker = Chunker::new(500, 50, 10);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraph_packing() {
        let chunker = Chunker::new(500, 50, 10);

        let text = "This is paragraph one with some content.\n\n\
                    This is paragraph two with more content.\n\n\
                    This is paragraph three.";

        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 550);
        }
    }

    #[test]
    fn test_long_paragraph_without_punctuation() {
        let chunker = Chunker::new(100, 0, 10);

        // 249 chars with no sentence boundary forces word-level splitting
        let long_para = "word ".repeat(50).trim_end().to_string();

        let chunks = chunker.chunk(&long_para);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn test_long_sentence_split_at_word_boundaries() {
        let chunker = Chunker::new(100, 0, 10);

        let long_sentence = "This is a very long sentence that contains many words and \
                             keeps going without any break until the end of the entire \
                             content which makes it exceed the maximum character limit.";

        let chunks = chunker.chunk(long_sentence);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn test_sentence_packing_of_long_paragraph() {
        let chunker = Chunker::new(100, 0, 10);

        let para = "First sentence here. Second sentence follows it. Third sentence \
                    adds more. Fourth sentence keeps going. Fifth one ends the paragraph.";

        let chunks = chunker.chunk(para);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
            assert!(chunk.chars().count() >= 10);
        }
    }

    #[test]
    fn test_min_chars_filter() {
        let chunker = Chunker::new(80, 0, 50);

        // The tiny paragraph is forced to flush alone: the next paragraph
        // does not fit in the same 80-char buffer.
        let text = format!("Tiny.\n\n{}", "x".repeat(78));

        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "x".repeat(78));
        for chunk in &chunks {
            assert!(chunk.chars().count() >= 50);
        }
    }

    #[test]
    fn test_document_below_min_chars_is_dropped_entirely() {
        let chunker = Chunker::new(250, 30, 20);
        assert!(chunker.chunk("too short").is_empty());
    }

    #[test]
    fn test_overlap_prefix_invariant() {
        let chunker = Chunker::new(100, 20, 10);

        let text = "First paragraph with quite a lot of content inside it to fill space.\n\n\
                    Second paragraph continues the document with different words.\n\n\
                    Third paragraph ends the document with a final thought.";

        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);

        // Recompute base chunks to check the prefix relation
        let base = Chunker::new(100, 0, 10).chunk(text);
        for i in 1..chunks.len() {
            let tail = char_tail(&base[i - 1], 20);
            assert!(
                chunks[i].starts_with(tail),
                "chunk {} does not start with tail of chunk {}",
                i,
                i - 1
            );
        }
    }

    #[test]
    fn test_overlap_skipped_for_single_chunk() {
        let chunker = Chunker::new(500, 50, 10);
        let chunks = chunker.chunk("Just one modest paragraph of text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Just one modest paragraph of text.");
    }

    #[test]
    fn test_three_paragraph_example() {
        // 200-char para, 50-char para, 300-char para with max=250/min=20/overlap=30:
        // para 1 flushes alone, para 2 joins the next buffer, para 3 is
        // sentence-split; chunk 2 starts with the 30-char tail of chunk 1.
        let chunker = Chunker::new(250, 30, 20);

        let p1 = "a".repeat(199) + ".";
        let p2 = "b".repeat(49) + ".";
        let p3 = format!(
            "{} {} {}",
            "c".repeat(99) + ".",
            "d".repeat(99) + ".",
            "e".repeat(98) + "."
        );
        let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0], p1);

        let tail = char_tail(&p1, 30);
        assert!(chunks[1].starts_with(tail));
    }

    #[test]
    fn test_normalization_collapses_whitespace() {
        let chunker = Chunker::new(500, 0, 5);
        let chunks = chunker.chunk("hello\t\t  world\n\n\n\n\nnext   paragraph");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "hello world\n\nnext paragraph");
    }
}
