//! JSON rendering that matches Python's `json.dumps` defaults.
//!
//! Stored documents were written and searched by Python services, and both
//! the substring fallback and the self-reference ratio are defined over that
//! text: `", "` and `": "` separators, every character outside printable ASCII
//! escaped as lowercase `\uXXXX` (UTF-16 units).
//!
//! Object keys come out in sorted order, since `serde_json::Map` is a
//! `BTreeMap` here. Python keeps insertion order, so a multi-key object can
//! render with its keys in a different order than the original writer used.
//! Word counts and single-value substring hits are unaffected; a query
//! spanning two adjacent keys may match in one rendering and not the other.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Render `value` the way Python's `json.dumps(value)` would.
pub fn to_python_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PythonFormatter);
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}
