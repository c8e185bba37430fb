//! Mount snapshot reader (spec §4.6): parses one `findmnt -P` line into a `MountSnapshotEntry`.
//!
//! Hand-rolled state machine rather than `regex` — the escape-decoding rule (a quote ends a value
//! only when preceded by an even number of backslashes, followed by octal/hex/named escape
//! decoding) needs precise backslash counting that a regex alternation would only obscure.

use ssm_model::MountSnapshotEntry;
use std::path::PathBuf;

pub fn parse_findmnt_line(line: &str) -> Result<MountSnapshotEntry, String> {
    let tokens = tokenize(line)?;

    let mut target = None;
    let mut fs_type = None;
    let mut source = None;
    let mut options = None;

    for (key, value) in tokens {
        match key.as_str() {
            "TARGET" => target = Some(value),
            "FSTYPE" => fs_type = Some(value),
            "SOURCE" => source = Some(value),
            "OPTIONS" => options = Some(value),
            _ => {}
        }
    }

    let target = target.ok_or_else(|| format!("findmnt line missing TARGET: {line}"))?;
    let fs_type = fs_type.ok_or_else(|| format!("findmnt line missing FSTYPE: {line}"))?;

    Ok(MountSnapshotEntry {
        target: PathBuf::from(target),
        fs_type,
        source,
        options,
        is_healthy: None,
    })
}

fn tokenize(line: &str) -> Result<Vec<(String, String)>, String> {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(format!("unterminated key in findmnt line: {line}"));
        }
        let key = line[key_start..i].to_string();
        i += 1; // consume '='

        if i >= bytes.len() || bytes[i] != b'"' {
            return Err(format!("expected opening quote after key '{key}' in: {line}"));
        }
        i += 1; // consume opening quote

        let raw_start = i;
        let mut trailing_backslashes = 0usize;
        let mut close_index = None;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => trailing_backslashes += 1,
                b'"' if trailing_backslashes % 2 == 0 => {
                    close_index = Some(i);
                    break;
                }
                _ => trailing_backslashes = 0,
            }
            i += 1;
        }
        let Some(close) = close_index else {
            return Err(format!("unterminated value for key '{key}' in: {line}"));
        };

        let raw_value = &line[raw_start..close];
        let decoded = decode_escapes(raw_value);
        tokens.push((key, decoded));

        i = close + 1; // consume closing quote
    }

    Ok(tokens)
}

fn decode_escapes(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let next = bytes[i + 1];
        match next {
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'"' => {
                out.push(b'"');
                i += 2;
            }
            b'x' => {
                if let Some(byte) = parse_fixed_radix(bytes, i + 2, 2, 16) {
                    out.push(byte);
                    i += 4;
                } else {
                    out.push(b'\\');
                    out.push(next);
                    i += 2;
                }
            }
            b'0'..=b'7' => {
                let (value, consumed) = parse_octal(bytes, i + 1);
                out.push(value);
                i += 1 + consumed;
            }
            _ => {
                out.push(b'\\');
                out.push(next);
                i += 2;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn parse_fixed_radix(bytes: &[u8], start: usize, len: usize, radix: u32) -> Option<u8> {
    if start + len > bytes.len() {
        return None;
    }
    let slice = std::str::from_utf8(&bytes[start..start + len]).ok()?;
    u8::from_str_radix(slice, radix).ok()
}

fn parse_octal(bytes: &[u8], start: usize) -> (u8, usize) {
    let mut end = start;
    while end < bytes.len() && end < start + 3 && (b'0'..=b'7').contains(&bytes[end]) {
        end += 1;
    }
    let slice = std::str::from_utf8(&bytes[start..end]).unwrap_or("0");
    let value = u32::from_str_radix(slice, 8).unwrap_or(0);
    (value.min(255) as u8, end - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_line() {
        let line = r#"TARGET="/merged/One Piece" SOURCE="/branch-links/g1" FSTYPE="fuse.mergerfs" OPTIONS="threads=1,fsname=abc123""#;
        let entry = parse_findmnt_line(line).unwrap();
        assert_eq!(entry.target, PathBuf::from("/merged/One Piece"));
        assert_eq!(entry.fs_type, "fuse.mergerfs");
        assert_eq!(entry.fsname(), Some("abc123"));
    }

    #[test]
    fn decodes_escaped_quote_inside_value() {
        let line = r#"TARGET="/merged/Retry \"Title\"" FSTYPE="fuse.mergerfs""#;
        let entry = parse_findmnt_line(line).unwrap();
        assert_eq!(entry.target, PathBuf::from("/merged/Retry \"Title\""));
    }

    #[test]
    fn decodes_octal_and_hex_escapes() {
        let line = r#"TARGET="/merged/Tab\011End" FSTYPE="fuse.mergerfs" OPTIONS="note=\x41""#;
        let entry = parse_findmnt_line(line).unwrap();
        assert_eq!(entry.target, PathBuf::from("/merged/Tab\tEnd"));
        assert_eq!(entry.options.unwrap(), "note=A");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let line = r#"TARGET="/merged/Title""#;
        assert!(parse_findmnt_line(line).is_err());
    }

    #[test]
    fn round_trips_through_a_matching_encoder() {
        fn encode(value: &str) -> String {
            value.replace('\\', "\\\\").replace('"', "\\\"")
        }

        for value in ["plain", "has \"quotes\"", "back\\slash"] {
            let line = format!(r#"TARGET="{}" FSTYPE="fuse.mergerfs""#, encode(value));
            let entry = parse_findmnt_line(&line).unwrap();
            assert_eq!(entry.target, PathBuf::from(value));
        }
    }
}
