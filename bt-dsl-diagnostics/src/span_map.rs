//! Byte-offset -> line/column lookup for a single source file.

/// Maps byte offsets in a source string to 1-based line and 0-based column
/// (both counted in bytes, matching the UTF-8 byte-offset positions used
/// throughout the language-service API).
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Byte offset of the start of each line (line 0 always starts at 0).
    line_starts: Vec<u32>,
    len: u32,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            len: source.len() as u32,
        }
    }

    /// 1-based line, 0-based column, both in bytes.
    pub fn line_col(&self, byte_offset: u32) -> (u32, u32) {
        let offset = byte_offset.min(self.len);
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => (idx as u32 + 1, 0),
            Err(idx) => {
                let line_idx = idx - 1;
                let line_start = self.line_starts[line_idx];
                (line_idx as u32 + 1, offset - line_start)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line() {
        let map = SourceMap::new("abc\ndef\n");
        assert_eq!(map.line_col(0), (1, 0));
        assert_eq!(map.line_col(2), (1, 2));
    }

    #[test]
    fn second_line() {
        let map = SourceMap::new("abc\ndef\n");
        assert_eq!(map.line_col(4), (2, 0));
        assert_eq!(map.line_col(6), (2, 2));
    }

    #[test]
    fn clamps_past_end() {
        let map = SourceMap::new("abc");
        assert_eq!(map.line_col(1000), (1, 3));
    }
}
