use std::fmt::Display;

/// Half-open byte range into a source string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        debug_assert!(start <= end);
        Self { start, end }
    }
    pub fn at(pos: u32) -> Span {
        Self {
            start: pos,
            end: pos,
        }
    }
    pub fn start(self) -> u32 {
        self.start
    }
    pub fn end(self) -> u32 {
        self.end
    }
    pub fn len(self) -> u32 {
        self.end - self.start
    }
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
    #[track_caller]
    pub fn as_str(self, src: &str) -> &str {
        &src[self.start as usize..self.end as usize]
    }
    /// Checks whether another span lies within this one, empty spans included.
    pub fn covers(self, span: Span) -> bool {
        self.start <= span.start && span.end <= self.end
    }
    /// Checks whether the spans share a byte, or whether an empty `span` falls strictly inside this one.
    pub fn touches(self, span: Span) -> bool {
        !(self.end <= span.start || self.start >= span.end)
    }
    /// The smallest span covering both.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[test]
fn test_touches() {
    let token = Span::new(4, 8);

    assert!(token.touches(Span::new(0, 5)));
    assert!(token.touches(Span::new(7, 12)));
    assert!(!token.touches(Span::new(0, 4)));
    assert!(!token.touches(Span::new(8, 10)));

    // pure deletions
    assert!(token.touches(Span::at(6)));
    assert!(!token.touches(Span::at(4)));
    assert!(!token.touches(Span::at(8)));
}
