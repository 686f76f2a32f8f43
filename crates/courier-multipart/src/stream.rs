use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use bytes::Bytes;
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::mime::content_type_for_path;
use crate::{Error, Parameter, ParameterValue, Result};

const CRLF: &[u8] = b"\r\n";
const BOUNDARY_PREFIX: &str = "courier-";
const BOUNDARY_RANDOM_LEN: usize = 32;
const BOUNDARY_ATTEMPTS: usize = 8;

/// Encoder stages. Bytes are produced strictly in this order, with
/// `Headers → Body → Wrapup` repeated once per part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Headers,
    Body,
    Wrapup,
    Final,
    Done,
}

#[derive(Debug)]
enum PartBody {
    Memory(Bytes),
    File { path: PathBuf, len: u64 },
}

impl PartBody {
    fn len(&self) -> u64 {
        match self {
            PartBody::Memory(data) => data.len() as u64,
            PartBody::File { len, .. } => *len,
        }
    }
}

#[derive(Debug)]
struct Part {
    name:         String,
    filename:     Option<String>,
    content_type: Option<String>,
    body:         PartBody,
}

#[derive(Debug)]
enum Cursor {
    Memory { data: Bytes, pos: usize },
    File(FileCursor),
}

#[derive(Debug)]
struct FileCursor {
    file:      File,
    path:      PathBuf,
    remaining: u64,
    // Last `boundary.len() - 1` bytes seen, so a boundary split across two
    // reads is still detected.
    tail:      Vec<u8>,
}

/// A lazily produced `multipart/form-data` body.
///
/// Implements [`Read`]; once the closing boundary has been emitted every
/// further read returns `Ok(0)`.
#[derive(Debug)]
pub struct MultipartStream {
    parts:          Vec<Part>,
    boundary:       String,
    stage:          Stage,
    index:          usize,
    pending:        Vec<u8>,
    pending_pos:    usize,
    cursor:         Option<Cursor>,
    content_length: u64,
    produced:       u64,
}

impl MultipartStream {
    /// Build an encoder with a freshly generated boundary.
    ///
    /// A boundary that occurs inside any in-memory value is discarded and a
    /// new one drawn; [`Error::BoundaryCollision`] is returned only if every
    /// attempt collides. File contents are checked while streaming.
    pub fn new(parameters: &[Parameter]) -> Result<Self> {
        let parts = expand(parameters)?;
        for _ in 0..BOUNDARY_ATTEMPTS {
            let boundary = random_boundary();
            if !collides(&parts, &boundary) {
                return Ok(Self::assemble(parts, boundary));
            }
            tracing::debug!(%boundary, "multipart boundary collided, regenerating");
        }
        Err(Error::BoundaryCollision)
    }

    /// Build an encoder with a caller-chosen boundary.
    pub fn with_boundary(parameters: &[Parameter], boundary: impl Into<String>) -> Result<Self> {
        let boundary = boundary.into();
        let parts = expand(parameters)?;
        if boundary.is_empty() || collides(&parts, &boundary) {
            return Err(Error::BoundaryCollision);
        }
        Ok(Self::assemble(parts, boundary))
    }

    fn assemble(parts: Vec<Part>, boundary: String) -> Self {
        let mut stream = Self {
            parts,
            boundary,
            stage: Stage::Init,
            index: 0,
            pending: Vec::new(),
            pending_pos: 0,
            cursor: None,
            content_length: 0,
            produced: 0,
        };
        stream.content_length = stream.compute_length();
        stream
    }

    pub fn boundary(&self) -> &str { &self.boundary }

    pub fn stage(&self) -> Stage { self.stage }

    /// Exact number of bytes this stream yields, computed up front.
    pub fn content_length(&self) -> u64 { self.content_length }

    /// Bytes produced so far.
    pub fn produced(&self) -> u64 { self.produced }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn compute_length(&self) -> u64 {
        let parts: u64 = self
            .parts
            .iter()
            .map(|p| self.part_header(p).len() as u64 + p.body.len() + CRLF.len() as u64)
            .sum();
        parts + self.closing_boundary().len() as u64
    }

    fn part_header(&self, part: &Part) -> Vec<u8> {
        let mut header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(&part.name)
        );
        if let Some(filename) = &part.filename {
            header.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
        }
        header.push_str("\r\n");
        if let Some(content_type) = &part.content_type {
            header.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        header.push_str("\r\n");
        header.into_bytes()
    }

    fn closing_boundary(&self) -> Vec<u8> { format!("--{}--\r\n", self.boundary).into_bytes() }

    fn enter_part(&mut self, index: usize) {
        self.index = index;
        self.pending_pos = 0;
        if let Some(part) = self.parts.get(index) {
            self.pending = self.part_header(part);
            self.stage = Stage::Headers;
        } else {
            self.pending = self.closing_boundary();
            self.stage = Stage::Final;
        }
    }

    fn open_cursor(&mut self) -> io::Result<()> {
        let part = &self.parts[self.index];
        self.cursor = Some(match &part.body {
            PartBody::Memory(data) => Cursor::Memory {
                data: data.clone(),
                pos:  0,
            },
            PartBody::File { path, len } => Cursor::File(FileCursor {
                file:      File::open(path)?,
                path:      path.clone(),
                remaining: *len,
                tail:      Vec::new(),
            }),
        });
        Ok(())
    }

    fn read_body(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let boundary = self.boundary.as_bytes();
        match self.cursor.as_mut() {
            None => Ok(0),
            Some(Cursor::Memory { data, pos }) => {
                let n = (data.len() - *pos).min(buf.len());
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            Some(Cursor::File(cursor)) => {
                if cursor.remaining == 0 {
                    return Ok(0);
                }
                let want = (cursor.remaining.min(buf.len() as u64)) as usize;
                let n = cursor.file.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} shrank while streaming", cursor.path.display()),
                    ));
                }
                cursor.remaining -= n as u64;

                let mut window = std::mem::take(&mut cursor.tail);
                window.extend_from_slice(&buf[..n]);
                if contains(&window, boundary) {
                    return Err(io::Error::other(Error::BoundaryCollision));
                }
                let keep = boundary.len().saturating_sub(1).min(window.len());
                cursor.tail = window.split_off(window.len() - keep);
                Ok(n)
            }
        }
    }
}

impl Read for MultipartStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.pending_pos < self.pending.len() {
                let n = (self.pending.len() - self.pending_pos).min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }

            match self.stage {
                Stage::Init => self.enter_part(0),
                Stage::Headers => {
                    self.open_cursor()?;
                    self.stage = Stage::Body;
                }
                Stage::Body => {
                    let n = self.read_body(&mut buf[written..])?;
                    if n == 0 {
                        self.cursor = None;
                        self.pending = CRLF.to_vec();
                        self.pending_pos = 0;
                        self.stage = Stage::Wrapup;
                    }
                    written += n;
                }
                Stage::Wrapup => self.enter_part(self.index + 1),
                Stage::Final => self.stage = Stage::Done,
                Stage::Done => break,
            }
        }
        self.produced += written as u64;
        Ok(written)
    }
}

fn expand(parameters: &[Parameter]) -> Result<Vec<Part>> {
    let mut parts = Vec::with_capacity(parameters.len());
    for param in parameters {
        let explicit_type = param.content_type().map(str::to_string);
        match param.value() {
            ParameterValue::List(items) => {
                for item in items {
                    parts.push(Part {
                        name:         param.name().to_string(),
                        filename:     None,
                        content_type: explicit_type.clone(),
                        body:         PartBody::Memory(Bytes::from(item.clone())),
                    });
                }
            }
            ParameterValue::File(path) => {
                let len = param.content_length()?;
                parts.push(Part {
                    name:         param.name().to_string(),
                    filename:     param.filename().map(|f| f.into_owned()),
                    content_type: Some(
                        explicit_type.unwrap_or_else(|| content_type_for_path(path).to_string()),
                    ),
                    body:         PartBody::File {
                        path: path.clone(),
                        len,
                    },
                });
            }
            ParameterValue::Binary(data) => parts.push(Part {
                name:         param.name().to_string(),
                filename:     param.filename().map(|f| f.into_owned()),
                content_type: Some(
                    explicit_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                ),
                body:         PartBody::Memory(data.clone()),
            }),
            ParameterValue::Text(_) | ParameterValue::Number(_) => {
                let text = param.text_value(",").map(|t| t.into_owned()).unwrap_or_default();
                parts.push(Part {
                    name:         param.name().to_string(),
                    filename:     None,
                    content_type: explicit_type,
                    body:         PartBody::Memory(Bytes::from(text)),
                });
            }
        }
    }
    Ok(parts)
}

fn collides(parts: &[Part], boundary: &str) -> bool {
    let needle = boundary.as_bytes();
    parts.iter().any(|part| {
        contains(part.name.as_bytes(), needle)
            || part.filename.as_deref().is_some_and(|f| contains(f.as_bytes(), needle))
            || matches!(&part.body, PartBody::Memory(data) if contains(data, needle))
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn escape_quoted(value: &str) -> String {
    value.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

fn random_boundary() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", BOUNDARY_PREFIX, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stream: &mut MultipartStream, chunk: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    #[test]
    fn test_exact_layout_for_text_fields() {
        let params = [Parameter::text("user", "ada"), Parameter::number("age", 36.0)];
        let mut stream = MultipartStream::with_boundary(&params, "XYZ").unwrap();
        let body = drain(&mut stream, 7).unwrap();

        let expected = "--XYZ\r\nContent-Disposition: form-data; name=\"user\"\r\n\r\nada\r\n\
                        --XYZ\r\nContent-Disposition: form-data; name=\"age\"\r\n\r\n36\r\n\
                        --XYZ--\r\n";
        assert_eq!(String::from_utf8(body).unwrap(), expected);
        assert_eq!(stream.content_length(), expected.len() as u64);
        assert_eq!(stream.stage(), Stage::Done);
    }

    #[test]
    fn test_binary_part_headers() {
        let params = [Parameter::binary("blob", vec![1u8, 2, 3]).with_filename("b.bin")];
        let mut stream = MultipartStream::with_boundary(&params, "B").unwrap();
        let body = drain(&mut stream, 64).unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"blob\"; filename=\"b.bin\"\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n\r\n"));
    }

    #[test]
    fn test_empty_parameter_list() {
        let mut stream = MultipartStream::with_boundary(&[], "E").unwrap();
        let body = drain(&mut stream, 3).unwrap();
        assert_eq!(body, b"--E--\r\n");
        assert_eq!(stream.content_length(), 7);
    }

    #[test]
    fn test_reads_after_done_return_zero() {
        let mut stream = MultipartStream::with_boundary(&[Parameter::text("a", "b")], "Q").unwrap();
        drain(&mut stream, 16).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_explicit_boundary_collision() {
        let params = [Parameter::text("note", "contains --BOUND-- inside")];
        let err = MultipartStream::with_boundary(&params, "BOUND").unwrap_err();
        assert!(matches!(err, Error::BoundaryCollision));
    }

    #[test]
    fn test_list_becomes_repeated_fields() {
        let params = [Parameter::list("tag", ["a", "b"])];
        let mut stream = MultipartStream::with_boundary(&params, "L").unwrap();
        let body = String::from_utf8(drain(&mut stream, 5).unwrap()).unwrap();
        assert_eq!(body.matches("name=\"tag\"").count(), 2);
        assert_eq!(stream.content_length(), body.len() as u64);
    }

    #[test]
    fn test_quotes_in_names_are_escaped() {
        let params = [Parameter::text("a\"b", "v")];
        let mut stream = MultipartStream::with_boundary(&params, "Z").unwrap();
        let body = String::from_utf8(drain(&mut stream, 32).unwrap()).unwrap();
        assert!(body.contains("name=\"a%22b\""));
    }

    #[test]
    fn test_random_boundary_shape() {
        let stream = MultipartStream::new(&[Parameter::text("a", "b")]).unwrap();
        assert!(stream.boundary().starts_with(BOUNDARY_PREFIX));
        assert_eq!(stream.boundary().len(), BOUNDARY_PREFIX.len() + BOUNDARY_RANDOM_LEN);
        assert!(stream.content_type().ends_with(stream.boundary()));
    }
}
