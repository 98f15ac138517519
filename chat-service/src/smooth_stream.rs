/// Re-chunks streamed model text into whole words.
///
/// Each emitted chunk is one word plus the whitespace that follows it. A
/// word is only released once the next word has started, so a token split
/// mid-word never reaches the caller as a fragment.
#[derive(Debug, Default)]
pub struct WordChunker {
    buffer: String,
}

impl WordChunker {
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut chunks = Vec::new();
        while let Some(end) = next_word_end(&self.buffer) {
            chunks.push(self.buffer.drain(..end).collect());
        }
        chunks
    }

    /// Release whatever is buffered; called at the end of every model pass.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Byte offset where the first complete word (and its trailing whitespace) ends.
fn next_word_end(text: &str) -> Option<usize> {
    let mut seen_word = false;
    let mut seen_gap = false;

    for (idx, c) in text.char_indices() {
        if c.is_whitespace() {
            seen_gap |= seen_word;
        } else if seen_gap {
            return Some(idx);
        } else {
            seen_word = true;
        }
    }
    None
}
