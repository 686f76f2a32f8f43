use courier_multipart::Parameter;
use url::Url;
use url::form_urlencoded::byte_serialize;

/// How parameters are rendered into `key=value&...` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEncoding {
    /// Joins the items of list parameters.
    pub delimiter: String,
    /// Percent-encode keys and values.
    pub encode:    bool,
}

impl Default for QueryEncoding {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            encode:    true,
        }
    }
}

/// Render the textual parameters; file and binary parameters are skipped.
pub fn query_string(parameters: &[Parameter], encoding: &QueryEncoding) -> String {
    let mut pairs = Vec::with_capacity(parameters.len());
    for param in parameters {
        let Some(value) = param.text_value(&encoding.delimiter) else {
            continue;
        };
        if encoding.encode {
            pairs.push(format!(
                "{}={}",
                byte_serialize(param.name().as_bytes()).collect::<String>(),
                byte_serialize(value.as_bytes()).collect::<String>()
            ));
        } else {
            pairs.push(format!("{}={}", param.name(), value));
        }
    }
    pairs.join("&")
}

/// Add the parameters to `url`, after any query it already has.
pub fn append_query(url: &mut Url, parameters: &[Parameter], encoding: &QueryEncoding) {
    let rendered = query_string(parameters, encoding);
    if rendered.is_empty() {
        return;
    }
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{rendered}"),
        _ => rendered,
    };
    url.set_query(Some(&query));
}

/// An `application/x-www-form-urlencoded` body.
pub fn form_body(parameters: &[Parameter], encoding: &QueryEncoding) -> Vec<u8> {
    query_string(parameters, &QueryEncoding {
        delimiter: encoding.delimiter.clone(),
        encode:    true,
    })
    .into_bytes()
}
