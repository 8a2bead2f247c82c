//! Minimal delimited-text helpers for the registry reader and the CSV writers.

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Decode file contents as UTF-8, falling back to ISO-8859-1.
///
/// Latin-1 maps every byte to the code point with the same value, so the
/// fallback never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encode as ISO-8859-1, replacing anything outside the Latin-1 range with `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
        .collect()
}

/// Split one line into fields, honouring double-quoted fields and `""` escapes.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == QUOTE {
            if in_quotes && chars.peek() == Some(&QUOTE) {
                current.push(QUOTE);
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if c == DELIMITER && !in_quotes {
            fields.push(current.trim().to_string());
            current = String::new();
        } else {
            current.push(c);
        }
    }

    fields.push(current.trim().to_string());
    fields
}

/// Parse a whole document into a header and data rows. Blank lines are skipped.
pub fn parse_document(text: &str) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = parse_line(lines.next()?);
    let rows = lines.map(parse_line).collect();
    Some((header, rows))
}

fn escape_field(field: &str) -> String {
    if field.contains([DELIMITER, QUOTE, '\n', '\r']) {
        format!("{QUOTE}{}{QUOTE}", field.replace(QUOTE, "\"\""))
    } else {
        field.to_string()
    }
}

/// Append one CSV record, terminated by a newline.
pub fn write_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<String> = fields.iter().map(|f| escape_field(f.as_ref())).collect();
    out.push_str(&line.join(&DELIMITER.to_string()));
    out.push('\n');
}
