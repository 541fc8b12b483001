/// Lines longer than this are junk and get thrown away
pub const MAX_LINE_LEN: usize = 400;

/// The prompt the adapter prints when it is ready for the next command
const PROMPT: u8 = b'>';

/// Accumulates response bytes into lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one received byte. Returns the trimmed line when `byte` terminates a
    /// non-empty one.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' | b'\n' => {
                let line = String::from_utf8_lossy(&self.line).trim().to_string();
                self.line.clear();
                (!line.is_empty()).then_some(line)
            }
            PROMPT => None,
            _ => {
                self.line.push(byte);
                if self.line.len() > MAX_LINE_LEN {
                    self.line.clear();
                }
                None
            }
        }
    }

    /// Drop whatever partial line is pending.
    pub fn clear(&mut self) {
        self.line.clear();
    }

    pub fn pending(&self) -> &[u8] {
        &self.line
    }
}

#[cfg(test)]
fn push_all(buffer: &mut LineBuffer, data: &[u8]) -> Vec<String> {
    data.iter().filter_map(|&b| buffer.push(b)).collect()
}

#[test]
fn test_splits_on_cr_and_lf() {
    let mut buffer = LineBuffer::new();
    let lines = push_all(&mut buffer, b"7DA03621F9A00000000\r\n7DA2100FF7900000000\n");
    assert_eq!(lines, vec!["7DA03621F9A00000000", "7DA2100FF7900000000"]);
}

#[test]
fn test_drops_prompt() {
    let mut buffer = LineBuffer::new();
    let lines = push_all(&mut buffer, b"\r\r>7DA03621F>9A00000000\r>");
    assert_eq!(lines, vec!["7DA03621F9A00000000"]);
    assert!(buffer.pending().is_empty());
}

#[test]
fn test_trims_and_skips_empty() {
    let mut buffer = LineBuffer::new();
    let lines = push_all(&mut buffer, b"  OK \r   \r\r");
    assert_eq!(lines, vec!["OK"]);
}

#[test]
fn test_partial_line_kept_until_terminator() {
    let mut buffer = LineBuffer::new();
    assert!(push_all(&mut buffer, b"7DA0362").is_empty());
    assert_eq!(buffer.pending(), b"7DA0362");
    let lines = push_all(&mut buffer, b"1F9A00000000\r");
    assert_eq!(lines, vec!["7DA03621F9A00000000"]);
}

#[test]
fn test_runaway_line_discarded() {
    let mut buffer = LineBuffer::new();
    let junk = vec![b'A'; MAX_LINE_LEN + 1];
    assert!(push_all(&mut buffer, &junk).is_empty());
    assert!(buffer.pending().is_empty());

    let lines = push_all(&mut buffer, b"BC\r");
    assert_eq!(lines, vec!["BC"]);
}

#[test]
fn test_line_at_limit_kept() {
    let mut buffer = LineBuffer::new();
    let mut data = vec![b'A'; MAX_LINE_LEN];
    data.push(b'\r');
    let lines = push_all(&mut buffer, &data);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].len(), MAX_LINE_LEN);
}

#[test]
fn test_clear() {
    let mut buffer = LineBuffer::new();
    push_all(&mut buffer, b"7DA03");
    buffer.clear();
    assert_eq!(push_all(&mut buffer, b"OK\r"), vec!["OK"]);
}

#[test]
fn test_high_bytes_count_once() {
    let mut buffer = LineBuffer::new();
    let high = vec![0xc4; 201];
    assert!(push_all(&mut buffer, &high).is_empty());
    assert_eq!(buffer.pending().len(), 201);

    let mut data = vec![0xc4; MAX_LINE_LEN - 201];
    data.push(b'\r');
    let lines = push_all(&mut buffer, &data);
    assert_eq!(lines.len(), 1);
}
