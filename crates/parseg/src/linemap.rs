use std::fmt::Display;

use serde::Deserialize;

use crate::error::EditError;

/// The type of a byte offset in a string
pub type Offset = u32;

/// A location in the source as editors report it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Deserialize)]
pub struct Position {
    /// one-based line number
    pub line: u32,
    /// zero-based column offset relative to the start of the line, unicode code points (variable length)
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Position {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 0 }
    }
}

impl From<(u32, u32)> for Position {
    fn from((line, column): (u32, u32)) -> Self {
        Position { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column + 1)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LineInfo {
    /// zero-based index of the line within the file
    pub line: u32,
    /// byte offset of the start of the line
    pub line_start: Offset,
    /// Does the line contain non-ascii characters?
    pub is_unicode: bool,
}

/// Start offsets of every line in a string, used to translate between byte offsets and [`Position`]s.
pub struct LineMap {
    lines: Vec<(Offset, bool)>,
}

impl LineMap {
    pub fn new(src: &str) -> Self {
        assert!(src.len() <= Offset::MAX as usize);
        let mut lines = Vec::new();

        let mut line_start = 0;
        let mut saw_unicode = false;
        let mut bytes = src.bytes().enumerate().peekable();

        // a utf8 continuation byte is always >= 128, so scanning bytes for ascii line breaks is exact
        while let Some((mut i, b)) = bytes.next() {
            match b {
                // \r\n, \n and \r all end a line
                b'\n' | b'\r' => {
                    if b == b'\r' {
                        if let Some(&(next, b'\n')) = bytes.peek() {
                            bytes.next();
                            i = next;
                        }
                    }
                    lines.push((line_start, saw_unicode));
                    saw_unicode = false;
                    line_start = i as Offset + 1;
                }
                _ => saw_unicode |= b >= 128,
            }
        }

        lines.push((line_start, saw_unicode));

        Self { lines }
    }
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }
    /// Returns the position of `offset`, which is clamped to the end of `src`.
    pub fn offset_to_position(&self, src: &str, offset: Offset) -> Position {
        let offset = Offset::min(offset, src.len() as Offset);

        let LineInfo {
            line,
            line_start,
            is_unicode,
        } = self.offset_to_line(offset);

        assert!(src.is_char_boundary(offset as usize));
        let column = if is_unicode {
            src[line_start as usize..offset as usize].chars().count() as u32
        } else {
            offset - line_start
        };

        Position {
            line: line + 1,
            column,
        }
    }
    /// Returns the byte offset of the character pointed to by `pos`.
    ///
    /// Columns past the end of the line are clamped to the line break.
    pub fn position_to_offset(&self, src: &str, pos: Position) -> Result<Offset, EditError> {
        let Position { line, column } = pos;
        let Some((index, &(line_start, is_unicode))) = line
            .checked_sub(1)
            .and_then(|index| Some((index, self.lines.get(index as usize)?)))
        else {
            return Err(EditError::LineOutOfBounds {
                line,
                line_count: self.line_count(),
            });
        };

        let content = self.line_content(src, index);
        let end = line_start + content.len() as Offset;
        if is_unicode {
            let offset = content
                .char_indices()
                .nth(column as usize)
                .map(|(i, _)| line_start + i as Offset);
            Ok(offset.unwrap_or(end))
        } else {
            Ok(line_start.saturating_add(column).min(end))
        }
    }
    /// Find the line which contains the offset.
    pub fn offset_to_line(&self, offset: Offset) -> LineInfo {
        let line = match self.lines.binary_search_by_key(&offset, |a| a.0) {
            Ok(a) => a,
            Err(a) => a - 1,
        };
        let (line_start, is_unicode) = self.lines[line];
        debug_assert!(line_start <= offset);

        LineInfo {
            line: line as u32,
            line_start,
            is_unicode,
        }
    }
    pub fn line_start(&self, line: u32) -> Offset {
        self.lines[line as usize].0
    }
    pub fn line_end(&self, src: &str, line: u32) -> Offset {
        self.lines
            .get((line + 1) as usize)
            .map(|line| line.0)
            .unwrap_or(src.len() as Offset)
    }
    pub fn line_str<'a>(&self, src: &'a str, line: u32) -> &'a str {
        let start = self.line_start(line);
        let end = self.line_end(src, line);
        &src[start as usize..end as usize]
    }
    /// The line without its line break.
    pub fn line_content<'a>(&self, src: &'a str, line: u32) -> &'a str {
        let str = self.line_str(src, line);
        let str = str.strip_suffix('\n').unwrap_or(str);
        str.strip_suffix('\r').unwrap_or(str)
    }
}
