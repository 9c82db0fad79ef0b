// Incremental UTF-8 decoding for raw device reads
use bytes::{Buf, BytesMut};

/// Turns arbitrary byte chunks into text, holding back a multi-byte sequence
/// that was split across reads. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: BytesMut,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // incomplete sequence at the end, wait for more bytes
                        None => {
                            self.pending.advance(valid_up_to);
                            break;
                        }
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.advance(valid_up_to + invalid);
                        }
                    }
                }
            }
        }

        text
    }
}
