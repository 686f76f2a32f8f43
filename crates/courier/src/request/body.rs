//! Turning a `RequestConfig` into the URL, headers and body the transport
//! sends.

use std::io::{self, Read};

use bytes::Bytes;
use courier_multipart::{MultipartStream, Parameter, ParameterKind, ParameterValue, content_type_for_path};
use url::Url;

use super::config::{Body, RequestConfig};
use crate::core::{append_query, form_body};
use crate::data::{BodyType, HeaderList};
use crate::effects::{BoxStream, OutgoingBody};
use crate::error::{Error, Result};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
pub(crate) struct Prepared {
    pub url:     Url,
    pub headers: HeaderList,
    pub body:    OutgoingBody,
}

/// Validate the configuration and build the wire form of the request.
///
/// Called once per attempt: a streamed body cannot be replayed.
pub(crate) fn prepare(config: &RequestConfig) -> Result<Prepared> {
    config.validate()?;
    let mut url = config
        .url
        .clone()
        .ok_or_else(|| Error::config("request has no url"))?;
    let mut headers = config.headers.clone();

    let body = match &config.body {
        Some(body) => explicit_body(body, &mut headers)?,
        None if config.method.uses_query() || config.parameters.is_empty() => OutgoingBody::Empty,
        None => parameter_body(config, &mut headers)?,
    };
    if config.method.uses_query() {
        append_query(&mut url, &config.parameters, &config.query_encoding);
    }

    Ok(Prepared { url, headers, body })
}

fn set_default(headers: &mut HeaderList, name: &str, value: &str) {
    if !headers.contains(name) {
        headers.set(name, value);
    }
}

fn explicit_body(body: &Body, headers: &mut HeaderList) -> Result<OutgoingBody> {
    match body {
        Body::Bytes { data, content_type } => {
            if let Some(ct) = content_type {
                set_default(headers, "Content-Type", ct);
            }
            Ok(OutgoingBody::Bytes(data.clone()))
        }
        Body::Json(value) => {
            set_default(headers, "Content-Type", "application/json");
            let encoded = serde_json::to_vec(value).map_err(|e| Error::config(format!("unencodable JSON body: {e}")))?;
            Ok(OutgoingBody::Bytes(Bytes::from(encoded)))
        }
        Body::File(path) => {
            let length = courier_fs::file_len(path)?;
            let file = std::fs::File::open(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
            set_default(headers, "Content-Type", content_type_for_path(path));
            Ok(OutgoingBody::Stream {
                length,
                stream: reader_stream(file.take(length)),
            })
        }
    }
}

fn parameter_body(config: &RequestConfig, headers: &mut HeaderList) -> Result<OutgoingBody> {
    let params = &config.parameters;
    let has_payload = params.iter().any(|p| p.kind() != ParameterKind::QueryString);

    match config.body_type {
        BodyType::File => {
            let [param] = params.as_slice() else {
                return Err(Error::config("a File body needs exactly one file parameter"));
            };
            match param.value() {
                ParameterValue::File(path) => explicit_body(&Body::File(path.clone()), headers),
                ParameterValue::Binary(data) => {
                    set_default(headers, "Content-Type", param.content_type().unwrap_or("application/octet-stream"));
                    Ok(OutgoingBody::Bytes(data.clone()))
                }
                _ => Err(Error::config("a File body needs a file or binary parameter")),
            }
        }
        BodyType::Multipart => multipart_body(params, headers),
        _ if has_payload => multipart_body(params, headers),
        BodyType::Json => {
            set_default(headers, "Content-Type", "application/json");
            let object = json_object(params);
            let encoded = serde_json::to_vec(&object).map_err(|e| Error::config(format!("unencodable JSON body: {e}")))?;
            Ok(OutgoingBody::Bytes(Bytes::from(encoded)))
        }
        BodyType::Text => {
            set_default(headers, "Content-Type", "application/x-www-form-urlencoded");
            Ok(OutgoingBody::Bytes(Bytes::from(form_body(params, &config.query_encoding))))
        }
    }
}

fn multipart_body(params: &[Parameter], headers: &mut HeaderList) -> Result<OutgoingBody> {
    let stream = MultipartStream::new(params)?;
    // The boundary is ours, so any caller supplied Content-Type is replaced.
    headers.set("Content-Type", stream.content_type());
    Ok(OutgoingBody::Stream {
        length: stream.content_length(),
        stream: reader_stream(stream),
    })
}

fn json_object(params: &[Parameter]) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for param in params {
        let value = match param.value() {
            ParameterValue::Text(s) => serde_json::Value::String(s.clone()),
            ParameterValue::Number(n) => serde_json::Number::from_f64(*n).map_or(serde_json::Value::Null, Into::into),
            ParameterValue::List(items) => items.iter().cloned().map(serde_json::Value::String).collect(),
            ParameterValue::File(_) | ParameterValue::Binary(_) => continue,
        };
        object.insert(param.name().to_string(), value);
    }
    serde_json::Value::Object(object)
}

/// Drive a blocking reader on the blocking pool, one chunk per item.
pub(crate) fn reader_stream<R>(reader: R) -> BoxStream<'static, io::Result<Bytes>>
where
    R: Read + Send + 'static,
{
    Box::pin(futures_util::stream::try_unfold(reader, |mut reader| async move {
        let (reader, chunk) = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            let n = reader.read(&mut buf)?;
            buf.truncate(n);
            Ok::<_, io::Error>((reader, buf))
        })
        .await
        .map_err(io::Error::other)??;

        if chunk.is_empty() {
            Ok::<_, io::Error>(None)
        } else {
            Ok(Some((Bytes::from(chunk), reader)))
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::data::Method;

    fn url(s: &str) -> Url { Url::parse(s).unwrap() }

    async fn body_text(body: OutgoingBody) -> String {
        String::from_utf8(body.collect().await.unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_get_parameters_go_in_query() {
        let config = RequestConfig::get(url("https://api.test/search?lang=en"))
            .parameter(Parameter::text("q", "rust lang"))
            .parameter(Parameter::list("tags", ["a", "b"]));
        let prepared = prepare(&config).unwrap();
        assert_eq!(prepared.url.query(), Some("lang=en&q=rust+lang&tags=a%2Cb"));
        assert!(prepared.body.is_empty());
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let err = prepare(&RequestConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_get_with_body_rejected() {
        let config = RequestConfig::get(url("https://api.test/")).body(Body::text("x"));
        assert!(matches!(prepare(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_body_and_parameters_are_ambiguous() {
        let config = RequestConfig::post(url("https://api.test/"))
            .body(Body::text("x"))
            .parameter(Parameter::text("a", "b"));
        assert!(matches!(prepare(&config), Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_form_body_from_text_parameters() {
        let config = RequestConfig::post(url("https://api.test/login"))
            .parameter(Parameter::text("user", "ada"))
            .parameter(Parameter::number("attempt", 2.0));
        let prepared = prepare(&config).unwrap();
        assert_eq!(prepared.headers.get("content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(body_text(prepared.body).await, "user=ada&attempt=2");
    }

    #[tokio::test]
    async fn test_json_body_from_parameters() {
        let config = RequestConfig::post(url("https://api.test/users"))
            .body_type(BodyType::Json)
            .parameter(Parameter::text("name", "Ada"))
            .parameter(Parameter::number("age", 36.0));
        let prepared = prepare(&config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body_text(prepared.body).await).unwrap();
        assert_eq!(value, serde_json::json!({"name": "Ada", "age": 36.0}));
    }

    #[tokio::test]
    async fn test_file_parameter_forces_multipart() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"photo bytes").unwrap();

        let config = RequestConfig::post(url("https://api.test/upload"))
            .parameter(Parameter::text("caption", "hi"))
            .parameter(Parameter::file("ufile", file.path()));
        let prepared = prepare(&config).unwrap();
        let content_type = prepared.headers.get("content-type").unwrap().to_string();
        assert!(content_type.starts_with("multipart/form-data; boundary=courier-"));

        let length = prepared.body.len();
        let text = body_text(prepared.body).await;
        assert_eq!(text.len() as u64, length);
        assert!(text.contains("name=\"ufile\""));
        assert!(text.contains("photo bytes"));
    }

    #[tokio::test]
    async fn test_explicit_file_body_streams_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; READ_CHUNK + 10]).unwrap();

        let config = RequestConfig::new(Method::Put, url("https://api.test/blob")).body(Body::File(file.path().into()));
        let prepared = prepare(&config).unwrap();
        assert_eq!(prepared.body.len(), (READ_CHUNK + 10) as u64);
        assert_eq!(prepared.body.collect().await.unwrap().len(), READ_CHUNK + 10);
    }
}
