use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How a response body is converted. The string names are part of the
/// endpoint-definition format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultKind {
    #[serde(rename = "JSON")]
    Json,
    #[default]
    Text,
    Image,
    File,
    Plist,
    Multipart,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Json => "JSON",
            ResultKind::Text => "Text",
            ResultKind::Image => "Image",
            ResultKind::File => "File",
            ResultKind::Plist => "Plist",
            ResultKind::Multipart => "Multipart",
        }
    }
}

impl FromStr for ResultKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JSON" => Ok(ResultKind::Json),
            "Text" => Ok(ResultKind::Text),
            "Image" => Ok(ResultKind::Image),
            "File" => Ok(ResultKind::File),
            "Plist" => Ok(ResultKind::Plist),
            "Multipart" => Ok(ResultKind::Multipart),
            other => Err(Error::config(format!("unknown result type `{other}`"))),
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// How parameters become a request body when the method carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// `application/x-www-form-urlencoded`
    #[default]
    Text,
    #[serde(rename = "JSON")]
    Json,
    Multipart,
    /// The single file parameter's bytes, sent raw.
    File,
}

impl FromStr for BodyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Text" => Ok(BodyType::Text),
            "JSON" => Ok(BodyType::Json),
            "Multipart" => Ok(BodyType::Multipart),
            "File" => Ok(BodyType::File),
            other => Err(Error::config(format!("unknown body type `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Methods whose parameters are encoded into the URL query.
    pub fn uses_query(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Delete | Method::Options)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(Error::config(format!("unknown HTTP method `{other}`"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_kind_names_are_verbatim() {
        for kind in [
            ResultKind::Json,
            ResultKind::Text,
            ResultKind::Image,
            ResultKind::File,
            ResultKind::Plist,
            ResultKind::Multipart,
        ] {
            assert_eq!(kind.as_str().parse::<ResultKind>().unwrap(), kind);
        }
        assert!("json".parse::<ResultKind>().is_err());
    }

    #[test]
    fn test_result_kind_serde_name() {
        let kind: ResultKind = serde_json::from_str("\"JSON\"").unwrap();
        assert_eq!(kind, ResultKind::Json);
    }

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert!("FETCH".parse::<Method>().is_err());
    }

    #[test]
    fn test_query_methods() {
        assert!(Method::Get.uses_query());
        assert!(Method::Delete.uses_query());
        assert!(!Method::Post.uses_query());
        assert!(!Method::Put.uses_query());
    }
}
