/// Source location tracking.
///
/// Every token, instruction and diagnostic carries a [`Slice`] that records
/// where in its source text it came from. Slices are deliberately small
/// (two `u16`s) so the compiler can keep one per emitted bytecode byte.

/// A contiguous `(index, length)` region of a source string, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Slice {
    pub index: u16,
    pub length: u16,
}

impl Slice {
    pub const fn new(index: u16, length: u16) -> Self {
        Self { index, length }
    }

    /// Build a slice from `usize` bounds, saturating at `u16::MAX`.
    ///
    /// Sources longer than `u16::MAX` bytes are rejected before lexing, so
    /// saturation only ever affects hand-built slices.
    pub fn from_range(start: usize, end: usize) -> Self {
        let index = u16::try_from(start).unwrap_or(u16::MAX);
        let length = u16::try_from(end.saturating_sub(start)).unwrap_or(u16::MAX);
        Self { index, length }
    }

    /// Create a zero-length slice at a single offset.
    pub const fn point(index: u16) -> Self {
        Self { index, length: 0 }
    }

    pub const fn start(self) -> usize {
        self.index as usize
    }

    pub const fn end(self) -> usize {
        self.index as usize + self.length as usize
    }

    pub const fn is_empty(self) -> bool {
        self.length == 0
    }

    /// Merge two slices into one that covers both.
    pub fn merge(self, other: Slice) -> Slice {
        let start = self.start().min(other.start());
        let end = self.end().max(other.end());
        Slice::from_range(start, end)
    }

    /// The text this slice covers, or `""` when it is out of bounds.
    pub fn text(self, source: &str) -> &str {
        source.get(self.start()..self.end()).unwrap_or("")
    }

    /// 1-based `(line, column)` of the slice start within `source`.
    pub fn line_column(self, source: &str) -> (usize, usize) {
        let prefix = source.get(..self.start()).unwrap_or(source);
        let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
        let column = match prefix.rfind('\n') {
            Some(newline) => prefix.len() - newline,
            None => prefix.len() + 1,
        };
        (line, column)
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start(), self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let a = Slice::new(4, 2);
        let b = Slice::new(10, 3);
        assert_eq!(a.merge(b), Slice::new(4, 9));
        assert_eq!(b.merge(a), Slice::new(4, 9));
    }

    #[test]
    fn text_out_of_bounds_is_empty() {
        assert_eq!(Slice::new(2, 3).text("hello"), "llo");
        assert_eq!(Slice::new(4, 3).text("hello"), "");
    }

    #[test]
    fn line_column_counts_from_one() {
        let source = "a;\nbc;\n  d;";
        assert_eq!(Slice::point(0).line_column(source), (1, 1));
        assert_eq!(Slice::point(4).line_column(source), (2, 2));
        assert_eq!(Slice::point(9).line_column(source), (3, 3));
    }

    #[test]
    fn from_range_saturates() {
        let slice = Slice::from_range(70_000, 70_010);
        assert_eq!(slice.index, u16::MAX);
    }
}
