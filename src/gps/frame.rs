//! Frame extraction: turns a raw, possibly noisy byte stream into discrete
//! candidate NMEA sentence frames.

/// Upper bound on buffered, not-yet-framed input. When exceeded the oldest
/// bytes are discarded so a later `$` marker stays findable.
pub const INGEST_BUFFER_CAP: usize = 4096;

/// Start-of-sentence marker.
const START: u8 = b'$';

/// Drops bytes that cannot occur in a sentence: anything that is not ASCII
/// alphanumeric, whitespace or punctuation. Transmission noise and stray
/// null bytes otherwise corrupt the framing.
pub fn scrub(chunk: &[u8]) -> Vec<u8> {
    chunk
        .iter()
        .copied()
        .filter(|b| {
            b.is_ascii_alphanumeric() || b.is_ascii_whitespace() || b.is_ascii_punctuation()
        })
        .collect()
}

/// Accumulates raw chunks and slices them into complete candidate frames.
///
/// A frame starts at `$` and ends before the first CR or LF after it. Chunks
/// may contain noise, several sentences, or a sentence split across calls;
/// complete frames drain via [`FrameExtractor::next_frame`] in arrival order
/// and a partial tail is retained for the next ingest.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scrubs and buffers one chunk, enforcing the buffer cap from the
    /// front. Returns the scrubbed copy of the chunk, which is what a
    /// session log captures.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<u8> {
        let clean = scrub(chunk);
        self.buffer.extend_from_slice(&clean);
        if self.buffer.len() > INGEST_BUFFER_CAP {
            // safety valve
            self.buffer.drain(..self.buffer.len() - INGEST_BUFFER_CAP);
        }
        clean
    }

    /// Pops the next complete frame, `$` included, line terminator excluded.
    ///
    /// Returns `None` once the buffer holds no complete frame: either it is
    /// drained, or it ends in a partial frame that is kept for more input.
    /// A buffer without any start marker can never produce a frame and is
    /// cleared.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let start = match self.buffer.iter().position(|&b| b == START) {
                Some(i) => i,
                None => {
                    self.buffer.clear();
                    return None;
                }
            };
            self.buffer.drain(..start);

            let end = self
                .buffer
                .iter()
                .position(|&b| b == b'\r' || b == b'\n')?;

            let frame = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.drain(..=end);
            if frame.len() > 1 {
                return Some(frame);
            }
            // Bare "$" before a terminator carries nothing; keep draining.
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
