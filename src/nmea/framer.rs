//! Splits a byte stream into sentence lines.
//!
//! A read may end in the middle of a sentence or carry several sentences at
//! once. The framer owns the unterminated tail between reads: bytes pushed
//! by one read are only released as a line once a terminator (CR, LF, or the
//! start of the next sentence) arrives.

/// Upper bound on buffered bytes without a terminator.
pub const MAX_PENDING: usize = 1024;

#[derive(Debug)]
pub struct SentenceFramer {
    pending: Vec<u8>,
    max_pending: usize,
}

fn is_start(b: u8) -> bool {
    b == b'$' || b == b'!'
}

fn is_terminator(b: u8) -> bool {
    matches!(b, b'\r' | b'\n') || is_start(b)
}

impl SentenceFramer {
    pub fn new() -> Self {
        Self::with_limit(MAX_PENDING)
    }

    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            max_pending,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Unterminated bytes carried to the next read.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Next complete line starting with `$` or `!`, trimmed.
    pub fn next_sentence(&mut self) -> Option<String> {
        loop {
            let Some(start) = self.pending.iter().position(|b| is_start(*b)) else {
                self.pending.clear();
                return None;
            };
            self.pending.drain(..start);

            let Some(end) = self.pending[1..].iter().position(|b| is_terminator(*b)) else {
                if self.pending.len() > self.max_pending {
                    log::debug!("Dropping {} unterminated NMEA bytes", self.pending.len());
                    self.pending.clear();
                }
                return None;
            };

            let line: Vec<u8> = self.pending.drain(..end + 1).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.len() > 1 {
                return Some(text.to_string());
            }
        }
    }

    /// Push one read and collect every sentence it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_sentence()).collect()
    }
}

impl Default for SentenceFramer {
    fn default() -> Self {
        Self::new()
    }
}
