use std::path::Path;

use crate::error::{ExtractError, Result};

/// Opens and closes a COMMON block.
pub const COMMON_MARKER: &str = "*--*";
/// Opens and closes a GROUP block.
pub const GROUP_MARKER: &str = "*-*";
/// Conventional metadata file name inside a source directory.
pub const METADATA_FILE_NAME: &str = "README.txt";

// ---------------------------------------------------------------------------
// Parsed metadata
// ---------------------------------------------------------------------------

/// One cohesive set of subjects: every row is the active common row followed
/// by the subject's own fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub rows: Vec<Vec<String>>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shared header plus the groups in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub header: Vec<String>,
    pub groups: Vec<Group>,
}

impl Metadata {
    /// Read and parse a metadata file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        parse_bytes(&bytes)
    }

    /// Select a group by its 1-based position in the file.
    pub fn group(&self, number: usize) -> Result<&Group> {
        number
            .checked_sub(1)
            .and_then(|idx| self.groups.get(idx))
            .ok_or(ExtractError::Range {
                requested: number,
                available: self.groups.len(),
            })
    }
}

// ---------------------------------------------------------------------------
// Parser state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Common,
    Group,
}

impl Marker {
    fn detect(line: &str) -> Option<Marker> {
        let trimmed = line.trim();
        if trimmed.starts_with(COMMON_MARKER) {
            Some(Marker::Common)
        } else if trimmed.starts_with(GROUP_MARKER) {
            Some(Marker::Group)
        } else {
            None
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Marker::Common => COMMON_MARKER,
            Marker::Group => GROUP_MARKER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Common { first_line: bool },
    Group { first_line: bool },
}

fn split_fields(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',').map(str::to_string)
}

/// Decode `bytes` as UTF-8 and parse them.
pub fn parse_bytes(bytes: &[u8]) -> Result<Metadata> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::Format(format!("metadata is not valid UTF-8: {e}")))?;
    parse(text)
}

/// Parse metadata text into a header and its groups.
///
/// A COMMON block's first line replaces the header and its last data line
/// becomes the common row. A GROUP block's first line extends the header and
/// each following line becomes one row prefixed by the common row. Reopening
/// COMMON overwrites both header and common row for every later group.
///
/// A block left open at end of input is a format error. Blocks never nest:
/// a marker of the other kind inside an open block is rejected as a format
/// error rather than read as closing this block and opening the other one.
pub fn parse(text: &str) -> Result<Metadata> {
    let mut header: Vec<String> = Vec::new();
    let mut common: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut groups: Vec<Group> = Vec::new();

    let mut state = State::Outside;
    let mut opened_at = 0;

    for (idx, line) in text.split_terminator('\n').enumerate() {
        let line_no = idx + 1;
        state = match (state, Marker::detect(line)) {
            (State::Outside, Some(Marker::Common)) => {
                opened_at = line_no;
                State::Common { first_line: true }
            }
            (State::Outside, Some(Marker::Group)) => {
                opened_at = line_no;
                State::Group { first_line: true }
            }
            (State::Common { .. }, Some(Marker::Common)) => State::Outside,
            (State::Group { .. }, Some(Marker::Group)) => {
                groups.push(Group {
                    rows: std::mem::take(&mut rows),
                });
                State::Outside
            }
            (State::Common { .. }, Some(inner)) | (State::Group { .. }, Some(inner)) => {
                return Err(ExtractError::Format(format!(
                    "line {line_no}: `{}` opens a block inside the block opened at line {opened_at}",
                    inner.as_str()
                )));
            }
            (State::Outside, None) => State::Outside,
            (State::Common { first_line: true }, None) => {
                header = split_fields(line).collect();
                State::Common { first_line: false }
            }
            (State::Common { first_line: false }, None) => {
                common = split_fields(line).collect();
                State::Common { first_line: false }
            }
            (State::Group { first_line: true }, None) => {
                header.extend(split_fields(line));
                for name in header.iter_mut().filter(|name| name.as_str() == "feed") {
                    *name = "diet".to_string();
                }
                State::Group { first_line: false }
            }
            (State::Group { first_line: false }, None) => {
                rows.push(common.iter().cloned().chain(split_fields(line)).collect());
                State::Group { first_line: false }
            }
        };
    }

    match state {
        State::Outside => Ok(Metadata { header, groups }),
        State::Common { .. } => Err(ExtractError::Format(format!(
            "COMMON block opened at line {opened_at} is never closed"
        ))),
        State::Group { .. } => Err(ExtractError::Format(format!(
            "GROUP block opened at line {opened_at} is never closed"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
*--*
id,sex
A,1
*--*
*-*
feed,weight
x,10
y,20
*-*
";

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_common_and_group_block() {
        let meta = parse(SIMPLE).unwrap();
        assert_eq!(meta.header, strings(&["id", "sex", "diet", "weight"]));
        assert_eq!(meta.groups.len(), 1);
        assert_eq!(
            meta.groups[0].rows,
            vec![strings(&["A", "1", "x", "10"]), strings(&["A", "1", "y", "20"])]
        );
    }

    #[test]
    fn header_width_matches_every_row() {
        let text = "\
notes outside blocks are ignored
*--*
ID,strain,sex
1,N2,herm
*--*
*-*
feed,age
OP50,3
HB101,4
*-*
*--*
ID,strain,sex
2,CB4856,male
*--*
*-*
feed,age
OP50,5
*-*
";
        let meta = parse(text).unwrap();
        assert_eq!(meta.groups.len(), 2);
        for group in &meta.groups {
            for row in &group.rows {
                assert_eq!(row.len(), meta.header.len());
            }
        }
        assert_eq!(meta.groups[1].rows[0], strings(&["2", "CB4856", "male", "OP50", "5"]));
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse(SIMPLE).unwrap(), parse(SIMPLE).unwrap());
    }

    #[test]
    fn last_common_block_wins() {
        let text = "\
*--*
a,b
1,2
*--*
*--*
c,d
3,4
5,6
*--*
*-*
e
x
*-*
";
        let meta = parse(text).unwrap();
        assert_eq!(meta.header, strings(&["c", "d", "e"]));
        assert_eq!(meta.groups[0].rows, vec![strings(&["5", "6", "x"])]);
    }

    #[test]
    fn group_header_keeps_growing_without_new_common_block() {
        let text = "*--*\nid\n7\n*--*\n*-*\nfeed\nx\n*-*\n*-*\nweight\n3\n*-*\n";
        let meta = parse(text).unwrap();
        assert_eq!(meta.header, strings(&["id", "diet", "weight"]));
        assert_eq!(meta.groups[1].rows, vec![strings(&["7", "3"])]);
    }

    #[test]
    fn empty_group_is_kept() {
        let text = "*--*\nid\n1\n*--*\n*-*\nweight\n*-*\n*-*\n*-*\n";
        let meta = parse(text).unwrap();
        assert_eq!(meta.groups.len(), 2);
        assert!(meta.groups.iter().all(Group::is_empty));
    }

    #[test]
    fn markers_are_matched_after_trimming_and_never_become_content() {
        let text = "  *--* common  \nid\n1\n\t*--*\n *-* group\nweight\n5\n*-* end\n";
        let meta = parse(text).unwrap();
        assert_eq!(meta.header, strings(&["id", "weight"]));
        assert_eq!(meta.groups[0].rows, vec![strings(&["1", "5"])]);
    }

    #[test]
    fn delimiter_has_no_quoting() {
        let text = "*-*\nname\n\"a,b\"\n*-*\n";
        let meta = parse(text).unwrap();
        assert_eq!(meta.groups[0].rows, vec![strings(&["\"a", "b\""])]);
    }

    #[test]
    fn only_newline_is_stripped() {
        let text = "*-*\nname\r\nvalue \r\n*-*\r\n";
        let meta = parse(text).unwrap();
        assert_eq!(meta.header, strings(&["name\r"]));
        assert_eq!(meta.groups[0].rows, vec![strings(&["value \r"])]);
    }

    #[test]
    fn unclosed_block_is_a_format_error() {
        let err = parse("*--*\nid\n1\n*--*\n*-*\nweight\n5\n").unwrap_err();
        assert!(matches!(err, ExtractError::Format(msg) if msg.contains("line 5")));
    }

    #[test]
    fn nested_block_is_a_format_error() {
        let err = parse("*--*\nid\n*-*\n").unwrap_err();
        assert!(matches!(err, ExtractError::Format(_)));
    }

    #[test]
    fn invalid_utf8_is_a_format_error() {
        let err = parse_bytes(&[b'*', b'-', b'*', b'\n', 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ExtractError::Format(_)));
    }

    #[test]
    fn group_selection_is_one_based() {
        let meta = parse(SIMPLE).unwrap();
        assert_eq!(meta.group(1).unwrap().len(), 2);
        assert!(matches!(
            meta.group(0),
            Err(ExtractError::Range { requested: 0, available: 1 })
        ));
        assert!(matches!(
            meta.group(2),
            Err(ExtractError::Range { requested: 2, available: 1 })
        ));
    }
}
