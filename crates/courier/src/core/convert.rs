//! Response body conversion according to the expected [`ResultKind`].

use std::path::PathBuf;

use bytes::Bytes;

use crate::data::ResultKind;
use crate::error::{Error, Result};

/// A response body after conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    Json(serde_json::Value),
    Text(String),
    Plist(plist::Value),
    /// Raw passthrough for `Image`, `File` and `Multipart` kinds.
    Bytes(Bytes),
    /// The body was streamed to disk at this path.
    File(PathBuf),
}

impl Converted {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Converted::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Converted::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_plist(&self) -> Option<&plist::Value> {
        match self {
            Converted::Plist(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Converted::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Converted::File(p) => Some(p),
            _ => None,
        }
    }
}

/// Convert `body` to `kind`, honouring a `charset` declared in `content_type`.
pub fn convert(kind: ResultKind, body: &Bytes, content_type: Option<&str>) -> Result<Converted> {
    match kind {
        ResultKind::Json => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Converted::Json(serde_json::Value::Null));
            }
            serde_json::from_slice(body)
                .map(Converted::Json)
                .map_err(|e| Error::Conversion(format!("invalid JSON: {e}")))
        }
        ResultKind::Text => decode_text(body, content_type.and_then(charset)).map(Converted::Text),
        ResultKind::Plist => plist::Value::from_reader(std::io::Cursor::new(body.as_ref()))
            .map(Converted::Plist)
            .map_err(|e| Error::Conversion(format!("invalid plist: {e}"))),
        ResultKind::Image | ResultKind::File | ResultKind::Multipart => Ok(Converted::Bytes(body.clone())),
    }
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

/// Decode with the declared charset, else a byte-order mark, else UTF-8
/// falling back to Latin-1.
fn decode_text(body: &[u8], declared: Option<String>) -> Result<String> {
    if let Some(charset) = declared {
        return match charset.as_str() {
            "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8(strip_utf8_bom(body).to_vec())
                .map_err(|e| Error::Conversion(format!("body is not valid {charset}: {e}"))),
            "iso-8859-1" | "latin1" | "latin-1" | "iso8859-1" => Ok(decode_latin1(body)),
            "utf-16le" => decode_utf16(strip_prefix(body, &[0xFF, 0xFE]), false),
            "utf-16be" => decode_utf16(strip_prefix(body, &[0xFE, 0xFF]), true),
            "utf-16" => match body {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, false),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, true),
                _ => decode_utf16(body, true),
            },
            other => Err(Error::Conversion(format!("unsupported charset `{other}`"))),
        };
    }

    match body {
        [0xEF, 0xBB, 0xBF, rest @ ..] => {
            String::from_utf8(rest.to_vec()).map_err(|e| Error::Conversion(format!("body is not valid utf-8: {e}")))
        }
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, false),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, true),
        _ => Ok(match std::str::from_utf8(body) {
            Ok(s) => s.to_string(),
            Err(_) => decode_latin1(body),
        }),
    }
}

fn strip_utf8_bom(body: &[u8]) -> &[u8] { strip_prefix(body, &[0xEF, 0xBB, 0xBF]) }

fn strip_prefix<'a>(body: &'a [u8], prefix: &[u8]) -> &'a [u8] { body.strip_prefix(prefix).unwrap_or(body) }

fn decode_latin1(body: &[u8]) -> String { body.iter().map(|&b| b as char).collect() }

fn decode_utf16(body: &[u8], big_endian: bool) -> Result<String> {
    if body.len() % 2 != 0 {
        return Err(Error::Conversion("utf-16 body has odd length".to_string()));
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|e| Error::Conversion(format!("invalid utf-16: {e}")))
}
