use crate::error::{Error, Result};

/// Fill every `{placeholder}` in `template`, in order, with `values`.
///
/// Values are percent-encoded as path segments. The number of values must
/// match the number of placeholders exactly.
pub fn substitute(template: &str, values: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut used = 0;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| Error::config(format!("unclosed placeholder in `{template}`")))?;
        let name = &after[..close];
        let value = values.get(used).ok_or_else(|| {
            Error::config(format!(
                "`{template}` needs a value for `{{{name}}}` but only {} were given",
                values.len()
            ))
        })?;
        out.push_str(&encode_segment(value));
        used += 1;
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    if used != values.len() {
        return Err(Error::config(format!(
            "`{template}` has {used} placeholders but {} values were given",
            values.len()
        )));
    }
    Ok(out)
}

/// Number of `{placeholder}`s in a template.
pub fn placeholder_count(template: &str) -> usize { template.matches('{').count() }

fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
