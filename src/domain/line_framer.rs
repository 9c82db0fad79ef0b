// Line framer - splits a text stream into newline-terminated records

/// Accumulates text chunks and yields complete lines.
///
/// The trailing partial line is carried across calls. No length limit is
/// applied, so a stream that never sends `\n` grows the buffer without bound.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, in arrival order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        // `complete` ends with '\n', so the final split segment is empty
        let mut lines: Vec<String> = complete.split('\n').map(str::to_string).collect();
        lines.pop();
        lines
    }

    /// The undelimited tail held for the next chunk.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}
