//! Line splitting for incoming TCP bytes.

/// Accumulates raw bytes and hands them out one `\n`-terminated line at a time.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
    max_line_length: usize,
}

impl LineBuffer {
    pub(crate) fn new(max_line_length: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_length: max_line_length.max(1),
        }
    }

    pub(crate) fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    ///
    /// Unterminated data longer than the maximum line length comes out in
    /// chunks of that length.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let limit = self.max_line_length;
        // A full-length line may still be followed by `\r\n`
        let cr_at_limit = self.pending.get(limit) == Some(&b'\r');
        let window = if cr_at_limit { limit + 2 } else { limit + 1 };
        let newline = self.pending.iter().take(window).position(|&b| b == b'\n');

        match newline {
            Some(end) => {
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Some(decode(line))
            }
            // The `\n` after this `\r` has not arrived yet
            None if cr_at_limit && self.pending.len() == limit + 1 => None,
            None if self.pending.len() > limit => {
                let chunk: Vec<u8> = self.pending.drain(..limit).collect();
                Some(decode(chunk))
            }
            None => None,
        }
    }

    /// Whatever is left once the peer stopped sending
    pub(crate) fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.pending);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(decode(rest))
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_until_terminator() {
        let mut lines = LineBuffer::new(64);
        lines.extend(b"hel");
        assert_eq!(lines.next_line(), None);
        lines.extend(b"lo\nwor");
        assert_eq!(lines.next_line().as_deref(), Some("hello"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn strips_crlf_and_keeps_empty_lines() {
        let mut lines = LineBuffer::new(64);
        lines.extend(b"one\r\n\ntwo\n");
        assert_eq!(lines.next_line().as_deref(), Some("one"));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line().as_deref(), Some("two"));
        assert!(lines.is_empty());
    }

    #[test]
    fn overlong_data_is_chunked() {
        let mut lines = LineBuffer::new(4);
        lines.extend(b"abcdefg");
        assert_eq!(lines.next_line().as_deref(), Some("abcd"));
        assert_eq!(lines.next_line(), None);
        lines.extend(b"\n");
        assert_eq!(lines.next_line().as_deref(), Some("efg"));
    }

    #[test]
    fn line_of_exactly_max_length() {
        let mut lines = LineBuffer::new(4);
        lines.extend(b"abcd\n");
        assert_eq!(lines.next_line().as_deref(), Some("abcd"));
        assert!(lines.is_empty());
    }

    #[test]
    fn crlf_after_full_length_line() {
        let mut lines = LineBuffer::new(4);
        lines.extend(b"abcd\r\nnext\n");
        assert_eq!(lines.next_line().as_deref(), Some("abcd"));
        assert_eq!(lines.next_line().as_deref(), Some("next"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn crlf_split_across_reads_at_limit() {
        let mut lines = LineBuffer::new(4);
        lines.extend(b"abcd\r");
        assert_eq!(lines.next_line(), None);
        lines.extend(b"\n");
        assert_eq!(lines.next_line().as_deref(), Some("abcd"));
        assert!(lines.is_empty());
    }

    #[test]
    fn lone_cr_at_limit_still_chunks() {
        let mut lines = LineBuffer::new(4);
        lines.extend(b"abcd\rx");
        assert_eq!(lines.next_line().as_deref(), Some("abcd"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_remainder().as_deref(), Some("\rx"));
    }

    #[test]
    fn remainder_flushes_partial_line() {
        let mut lines = LineBuffer::new(64);
        lines.extend(b"tail\r");
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_remainder().as_deref(), Some("tail"));
        assert_eq!(lines.take_remainder(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut lines = LineBuffer::new(64);
        lines.extend(&[b'o', b'k', 0xff, b'\n']);
        assert_eq!(lines.next_line().as_deref(), Some("ok\u{fffd}"));
    }
}
