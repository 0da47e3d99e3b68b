//! Line/stream framer
//!
//! Splits the raw byte stream coming off the serial link into `\n`-terminated
//! lines. The classifier can temporarily switch the framer into capture mode,
//! in which a declared number of raw bytes is collected as one opaque body
//! (SMS text, HTTP payload) instead of being split on newlines.

/// A unit produced by the framer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line with the line terminator stripped. Never empty.
    Line(String),
    /// A completed capture body of exactly the armed length
    Body(Vec<u8>),
}

#[derive(Debug)]
struct Capture {
    remaining: usize,
    body: Vec<u8>,
}

/// Accumulates bytes across transport deliveries and emits [`Frame`]s.
#[derive(Debug, Default)]
pub struct Framer {
    /// Bytes received but not yet framed
    buffer: Vec<u8>,
    /// Active capture, if the classifier armed one
    capture: Option<Capture>,
}

impl Framer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            capture: None,
        }
    }

    /// Consume one transport delivery.
    ///
    /// `on_frame` is invoked for every completed frame in arrival order. For a
    /// [`Frame::Line`] it may return `Some(n)` to arm capture of the next `n`
    /// raw bytes; line scanning stops at that point and the remaining bytes of
    /// the delivery go to the capture first. The return value is ignored for
    /// [`Frame::Body`].
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(Frame) -> Option<usize>,
    {
        if bytes.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(bytes);

        loop {
            if let Some(capture) = self.capture.as_mut() {
                let take = capture.remaining.min(self.buffer.len());
                capture.body.extend(self.buffer.drain(..take));
                capture.remaining -= take;
                if capture.remaining > 0 {
                    // buffer is exhausted, wait for the next delivery
                    return;
                }
                if let Some(done) = self.capture.take() {
                    tracing::trace!("Captured body of {} bytes", done.body.len());
                    on_frame(Frame::Body(done.body));
                }
            }

            let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
                return;
            };
            let mut raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            raw.pop();
            while raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if raw.is_empty() {
                continue;
            }

            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(len) = on_frame(Frame::Line(line)) {
                self.arm_capture(len);
            }
        }
    }

    /// Switch to capture mode for the next `len` bytes. A new arm replaces any
    /// capture already in progress.
    pub fn arm_capture(&mut self, len: usize) {
        // `len` comes off the wire; only reserve what is already buffered
        self.capture = Some(Capture {
            remaining: len,
            body: Vec::with_capacity(len.min(self.buffer.len())),
        });
    }

    /// True while a capture is collecting bytes
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Number of bytes buffered but not yet framed
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line and abandon an active capture
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.capture = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(framer: &mut Framer, chunks: &[&[u8]]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for chunk in chunks {
            framer.feed(chunk, |f| {
                frames.push(f);
                None
            });
        }
        frames
    }

    fn line(s: &str) -> Frame {
        Frame::Line(s.to_string())
    }

    #[test]
    fn test_lines_simple() {
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &[b"OK\r\nERROR\r\n"]);
        assert_eq!(frames, vec![line("OK"), line("ERROR")]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_lines_split_across_deliveries() {
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &[b"+CS", b"Q: 15,", b"0\r", b"\nOK\r\n"]);
        assert_eq!(frames, vec![line("+CSQ: 15,0"), line("OK")]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"\r\nRING\r\n\r\n+CLIP: \"123\",129\r\n";
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &chunks);
        assert_eq!(frames, vec![line("RING"), line("+CLIP: \"123\",129")]);
    }

    #[test]
    fn test_empty_lines_suppressed() {
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &[b"\r\n\r\n\n\r\r\n"]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_bare_lf_terminator() {
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &[b"OK\n"]);
        assert_eq!(frames, vec![line("OK")]);
    }

    #[test]
    fn test_empty_delivery_is_noop() {
        let mut framer = Framer::new();
        let mut called = false;
        framer.feed(b"", |_| {
            called = true;
            None
        });
        assert!(!called);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_partial_line_kept_until_terminated() {
        let mut framer = Framer::new();
        let frames = collect(&mut framer, &[b"+CCID"]);
        assert!(frames.is_empty());
        assert_eq!(framer.pending_len(), 5);
    }

    #[test]
    fn test_capture_in_single_delivery_with_trailing_lines() {
        let mut framer = Framer::new();
        let mut frames = Vec::new();
        framer.feed(b"+HTTPREAD: 5\r\nhe\nlo\r\nOK\r\n", |f| {
            let arm = match &f {
                Frame::Line(l) if l.starts_with("+HTTPREAD") => Some(5),
                _ => None,
            };
            frames.push(f);
            arm
        });
        assert_eq!(
            frames,
            vec![
                line("+HTTPREAD: 5"),
                Frame::Body(b"he\nlo".to_vec()),
                line("OK"),
            ]
        );
        assert!(!framer.is_capturing());
    }

    #[test]
    fn test_capture_spanning_deliveries() {
        let mut framer = Framer::new();
        let mut frames = Vec::new();
        let chunks: [&[u8]; 4] = [b"+HTTPREAD: 10\r\n01", b"2345", b"6789\r", b"\nOK\r\n"];
        for chunk in chunks {
            framer.feed(chunk, |f| {
                let arm = match &f {
                    Frame::Line(l) if l.starts_with("+HTTPREAD") => Some(10),
                    _ => None,
                };
                frames.push(f);
                arm
            });
        }
        assert_eq!(
            frames,
            vec![
                line("+HTTPREAD: 10"),
                Frame::Body(b"0123456789".to_vec()),
                line("OK"),
            ]
        );
    }

    #[test]
    fn test_zero_length_capture_yields_empty_body() {
        let mut framer = Framer::new();
        let mut frames = Vec::new();
        framer.feed(b"+HTTPREAD: 0\r\nOK\r\n", |f| {
            let arm = matches!(&f, Frame::Line(l) if l.starts_with("+HTTPREAD")).then_some(0);
            frames.push(f);
            arm
        });
        assert_eq!(
            frames,
            vec![line("+HTTPREAD: 0"), Frame::Body(Vec::new()), line("OK")]
        );
    }

    #[test]
    fn test_arming_huge_capture_does_not_allocate_up_front() {
        let mut framer = Framer::new();
        framer.arm_capture(usize::MAX);
        let mut frames = Vec::new();
        framer.feed(b"abc", |f| {
            frames.push(f);
            None
        });
        assert!(frames.is_empty());
        assert!(framer.is_capturing());
    }

    #[test]
    fn test_reset_drops_partial_state() {
        let mut framer = Framer::new();
        framer.feed(b"garbage", |_| None);
        framer.arm_capture(12);
        framer.reset();
        assert!(!framer.is_capturing());
        assert_eq!(framer.pending_len(), 0);
        let frames = collect(&mut framer, &[b"OK\r\n"]);
        assert_eq!(frames, vec![line("OK")]);
    }
}
