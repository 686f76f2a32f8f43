use std::borrow::Cow;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::{Error, Result};

/// How a parameter travels: textual values can go in a query string or a
/// form field, the other two kinds only as multipart file parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    QueryString,
    File,
    BinaryData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Number(f64),
    /// Several values under one name, joined with a delimiter in query
    /// strings and sent as repeated fields in multipart bodies.
    List(Vec<String>),
    File(PathBuf),
    Binary(Bytes),
}

/// One named request parameter.
///
/// Names need not be unique; order is preserved wherever parameters are
/// encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name:         String,
    value:        ParameterValue,
    content_type: Option<String>,
    filename:     Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
            content_type: None,
            filename: None,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ParameterValue::Text(value.into()))
    }

    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, ParameterValue::Number(value))
    }

    pub fn list<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, ParameterValue::List(values.into_iter().map(Into::into).collect()))
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, ParameterValue::File(path.into()))
    }

    pub fn binary(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(name, ParameterValue::Binary(data.into()))
    }

    /// Override the part's `Content-Type` (file and binary kinds default to
    /// a type derived from the file extension).
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Override the `filename` sent in the part's `Content-Disposition`.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn value(&self) -> &ParameterValue { &self.value }

    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }

    pub fn kind(&self) -> ParameterKind {
        match self.value {
            ParameterValue::Text(_) | ParameterValue::Number(_) | ParameterValue::List(_) => {
                ParameterKind::QueryString
            }
            ParameterValue::File(_) => ParameterKind::File,
            ParameterValue::Binary(_) => ParameterKind::BinaryData,
        }
    }

    /// Textual form of a query-string value; list items are joined with
    /// `delimiter`. `None` for file and binary parameters.
    pub fn text_value(&self, delimiter: &str) -> Option<Cow<'_, str>> {
        match &self.value {
            ParameterValue::Text(s) => Some(Cow::Borrowed(s)),
            ParameterValue::Number(n) => Some(Cow::Owned(format_number(*n))),
            ParameterValue::List(items) => Some(Cow::Owned(items.join(delimiter))),
            ParameterValue::File(_) | ParameterValue::Binary(_) => None,
        }
    }

    /// Filename used for file and binary parts.
    pub fn filename(&self) -> Option<Cow<'_, str>> {
        if let Some(name) = &self.filename {
            return Some(Cow::Borrowed(name));
        }
        match &self.value {
            ParameterValue::File(path) => Some(
                path.file_name()
                    .map(|n| n.to_string_lossy())
                    .unwrap_or(Cow::Borrowed("file")),
            ),
            ParameterValue::Binary(_) => Some(Cow::Borrowed(&self.name)),
            _ => None,
        }
    }

    /// Path of a file parameter.
    pub fn path(&self) -> Option<&Path> {
        match &self.value {
            ParameterValue::File(path) => Some(path),
            _ => None,
        }
    }

    /// Byte length of the payload: the UTF-8 length of textual values
    /// (list items joined with `,`), the file size on disk, or the buffer length.
    pub fn content_length(&self) -> Result<u64> {
        match &self.value {
            ParameterValue::File(path) => std::fs::metadata(path)
                .map(|m| m.len())
                .map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                }),
            ParameterValue::Binary(data) => Ok(data.len() as u64),
            _ => Ok(self.text_value(",").map_or(0, |s| s.len() as u64)),
        }
    }
}

/// Integers print without a fractional part, everything else as `f64` does.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_kind_follows_value() {
        assert_eq!(Parameter::text("a", "b").kind(), ParameterKind::QueryString);
        assert_eq!(Parameter::number("n", 1.0).kind(), ParameterKind::QueryString);
        assert_eq!(Parameter::list("l", ["x"]).kind(), ParameterKind::QueryString);
        assert_eq!(Parameter::file("f", "/tmp/x").kind(), ParameterKind::File);
        assert_eq!(Parameter::binary("b", vec![1u8]).kind(), ParameterKind::BinaryData);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Parameter::number("id", 42.0).text_value(",").unwrap(), "42");
        assert_eq!(Parameter::number("ratio", 0.5).text_value(",").unwrap(), "0.5");
        assert_eq!(Parameter::number("neg", -3.0).text_value(",").unwrap(), "-3");
    }

    #[test]
    fn test_content_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        assert_eq!(Parameter::text("k", "héllo").content_length().unwrap(), 6);
        assert_eq!(Parameter::list("k", ["ab", "cd"]).content_length().unwrap(), 5);
        assert_eq!(Parameter::binary("b", vec![0u8; 9]).content_length().unwrap(), 9);
        assert_eq!(Parameter::file("f", &path).content_length().unwrap(), 1234);
    }

    #[test]
    fn test_missing_file_length_is_error() {
        let err = Parameter::file("f", "/definitely/not/here.bin").content_length().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_filename_defaults() {
        assert_eq!(Parameter::file("f", "/x/y/report.pdf").filename().unwrap(), "report.pdf");
        assert_eq!(Parameter::binary("avatar", vec![1u8]).filename().unwrap(), "avatar");
        assert_eq!(
            Parameter::binary("avatar", vec![1u8]).with_filename("me.png").filename().unwrap(),
            "me.png"
        );
        assert!(Parameter::text("a", "b").filename().is_none());
    }
}
