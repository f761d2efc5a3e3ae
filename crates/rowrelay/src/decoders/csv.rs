//! 📄 CSV decoding: the spreadsheet's native tongue.
//!
//! Header row first. Comma separated. `"` quotes, `""` escapes a quote, quoted
//! cells may span lines. `\n` and `\r\n` both end a record. Blank lines are skipped.
//! Extra cells beyond the header are tolerated only when they are empty (the
//! trailing-comma export special). Missing trailing cells are simply absent.

use memchr::{memchr, memchr3};
use serde_json::{Map, Value};

use crate::common::RawRow;
use crate::error::DecodeError;

const BOM: char = '\u{feff}';

/// 🔄 Decode a CSV blob into rows keyed by header, nesting on `.` in header names.
pub fn decode_csv(bytes: &[u8]) -> Result<Vec<RawRow>, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8 {
        offset: e.valid_up_to(),
    })?;
    let text = text.strip_prefix(BOM).unwrap_or(text);

    let mut reader = RecordReader::new(text);
    let headers = match reader.next_record()? {
        Some((_, cells)) => header_paths(cells)?,
        None => return Err(DecodeError::MissingHeader),
    };

    let mut rows = Vec::new();
    while let Some((line, cells)) = reader.next_record()? {
        if cells.len() > headers.len() && cells[headers.len()..].iter().any(|c| !c.is_empty()) {
            return Err(DecodeError::TooManyFields {
                line,
                expected: headers.len(),
                found: cells.len(),
            });
        }
        let mut row = Map::new();
        for (path, cell) in headers.iter().zip(cells) {
            insert_path(&mut row, path, Value::String(cell))?;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// 🏷️ Split header names into nesting paths and prove they do not trip over each other.
fn header_paths(cells: Vec<String>) -> Result<Vec<Vec<String>>, DecodeError> {
    let paths: Vec<Vec<String>> = cells
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            if name.is_empty() {
                // -- 🙈 nameless columns get the name a spreadsheet tool would give them
                vec![format!("field{}", i + 1)]
            } else {
                name.split('.').map(str::to_string).collect()
            }
        })
        .collect();

    // -- 🧪 dry run: a row with every column present surfaces `a` vs `a.b` conflicts up front
    let mut probe = Map::new();
    for path in &paths {
        insert_path(&mut probe, path, Value::Null)?;
    }
    Ok(paths)
}

fn insert_path(row: &mut RawRow, path: &[String], value: Value) -> Result<(), DecodeError> {
    let conflict = || DecodeError::ConflictingHeader {
        column: path.join("."),
    };
    let (leaf, parents) = path.split_last().ok_or_else(conflict)?;

    let mut node = row;
    for parent in parents {
        let child = node
            .entry(parent.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match child {
            Value::Object(map) => map,
            _ => return Err(conflict()),
        };
    }
    if node.contains_key(leaf) {
        return Err(conflict());
    }
    node.insert(leaf.clone(), value);
    Ok(())
}

/// 📖 Pulls one record at a time out of the text, tracking 1-based line numbers.
struct RecordReader<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> RecordReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
        }
    }

    /// Returns `(starting line, cells)` for the next non-blank record, or `None` at EOF.
    fn next_record(&mut self) -> Result<Option<(usize, Vec<String>)>, DecodeError> {
        loop {
            if self.pos >= self.text.len() {
                return Ok(None);
            }
            let start_line = self.line;
            let (cells, any_quoted) = self.read_cells(start_line)?;
            let blank = !any_quoted && cells.len() == 1 && cells[0].trim().is_empty();
            if !blank {
                return Ok(Some((start_line, cells)));
            }
        }
    }

    fn read_cells(&mut self, start_line: usize) -> Result<(Vec<String>, bool), DecodeError> {
        let bytes = self.text.as_bytes();
        let mut cells = Vec::new();
        let mut any_quoted = false;

        loop {
            let mut cell = String::new();
            if bytes.get(self.pos) == Some(&b'"') {
                any_quoted = true;
                self.pos += 1;
                loop {
                    let rest = &bytes[self.pos..];
                    let Some(offset) = memchr(b'"', rest) else {
                        return Err(DecodeError::UnterminatedQuote { line: start_line });
                    };
                    let chunk = &self.text[self.pos..self.pos + offset];
                    self.line += memchr::memchr_iter(b'\n', chunk.as_bytes()).count();
                    cell.push_str(chunk);
                    self.pos += offset + 1;
                    if bytes.get(self.pos) == Some(&b'"') {
                        cell.push('"');
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }

            // -- 🔍 unquoted cell, or whatever trails a closing quote, up to the next delimiter
            let rest = &bytes[self.pos..];
            let end = memchr3(b',', b'\n', b'\r', rest).map_or(bytes.len(), |i| self.pos + i);
            cell.push_str(&self.text[self.pos..end]);
            self.pos = end;
            cells.push(cell);

            match bytes.get(self.pos) {
                Some(b',') => self.pos += 1,
                Some(b'\r') => {
                    self.pos += 1;
                    if bytes.get(self.pos) == Some(&b'\n') {
                        self.pos += 1;
                    }
                    self.line += 1;
                    return Ok((cells, any_quoted));
                }
                Some(b'\n') => {
                    self.pos += 1;
                    self.line += 1;
                    return Ok((cells, any_quoted));
                }
                _ => return Ok((cells, any_quoted)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(rows: Vec<RawRow>) -> Value {
        Value::Array(rows.into_iter().map(Value::Object).collect())
    }

    #[test]
    fn the_one_where_a_plain_csv_becomes_plain_rows() -> anyhow::Result<()> {
        let rows = decode_csv(b"userId,event\nu1,Signed Up\nu2,Logged In\n")?;
        assert_eq!(
            as_json(rows),
            json!([
                {"userId": "u1", "event": "Signed Up"},
                {"userId": "u2", "event": "Logged In"},
            ])
        );
        Ok(())
    }

    #[test]
    fn the_one_where_quotes_hide_commas_and_newlines() -> anyhow::Result<()> {
        let rows = decode_csv(b"id,note\r\n1,\"hello, world\"\r\n2,\"line one\nline \"\"two\"\"\"\r\n")?;
        assert_eq!(
            as_json(rows),
            json!([
                {"id": "1", "note": "hello, world"},
                {"id": "2", "note": "line one\nline \"two\""},
            ])
        );
        Ok(())
    }

    #[test]
    fn the_one_where_dots_in_headers_build_nests() -> anyhow::Result<()> {
        let rows = decode_csv(b"name.first,name.last,plan\nA,B,gold")?;
        assert_eq!(as_json(rows), json!([{"name": {"first": "A", "last": "B"}, "plan": "gold"}]));
        Ok(())
    }

    #[test]
    fn the_one_where_excel_leaves_a_bom_and_blank_lines() -> anyhow::Result<()> {
        let rows = decode_csv("\u{feff}a,b\n\n1,2\n\n".as_bytes())?;
        assert_eq!(as_json(rows), json!([{"a": "1", "b": "2"}]));
        Ok(())
    }

    #[test]
    fn the_one_where_short_rows_just_have_less_to_say() -> anyhow::Result<()> {
        let rows = decode_csv(b"a,b,c\n1\n1,2,3,\n")?;
        assert_eq!(as_json(rows), json!([{"a": "1"}, {"a": "1", "b": "2", "c": "3"}]));
        Ok(())
    }

    #[test]
    fn the_one_where_long_rows_are_called_out_by_line() {
        assert_eq!(
            decode_csv(b"a,b\n1,2\n1,2,3\n"),
            Err(DecodeError::TooManyFields {
                line: 3,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn the_one_where_nothing_is_not_a_csv() {
        assert_eq!(decode_csv(b""), Err(DecodeError::MissingHeader));
        assert_eq!(decode_csv(b"\n\n"), Err(DecodeError::MissingHeader));
    }

    #[test]
    fn the_one_where_a_quote_never_closes() {
        assert_eq!(
            decode_csv(b"a\n\"oops\n"),
            Err(DecodeError::UnterminatedQuote { line: 2 })
        );
    }

    #[test]
    fn the_one_where_headers_disagree_about_shape() {
        assert!(matches!(
            decode_csv(b"name,name.first\nx,y\n"),
            Err(DecodeError::ConflictingHeader { .. })
        ));
        assert!(matches!(
            decode_csv(b"a,a\n1,2\n"),
            Err(DecodeError::ConflictingHeader { .. })
        ));
    }

    #[test]
    fn the_one_where_invalid_utf8_is_located() {
        assert_eq!(
            decode_csv(b"a\n\xff\n"),
            Err(DecodeError::InvalidUtf8 { offset: 2 })
        );
    }

    #[test]
    fn the_one_where_nameless_columns_get_a_placeholder() -> anyhow::Result<()> {
        let rows = decode_csv(b"a,\n1,2\n")?;
        assert_eq!(as_json(rows), json!([{"a": "1", "field2": "2"}]));
        Ok(())
    }
}
