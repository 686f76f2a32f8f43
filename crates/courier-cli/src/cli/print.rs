use std::io::Write;

use anyhow::{Result, bail};
use courier::{Converted, Response};

/// Write the converted body to stdout, or fail with the request's error.
pub fn response(response: &Response) -> Result<()> {
    if let Some(status) = response.status() {
        tracing::debug!(status, "response received");
    }
    if let Some(url) = response.redirected_url() {
        eprintln!("redirected to {url}");
    }
    match response.result() {
        Ok(converted) => converted_body(converted),
        Err(error) => {
            if let Some(payload) = response.error_payload() {
                let _ = converted_body(payload);
            }
            bail!("{error}")
        }
    }
}

fn converted_body(converted: &Converted) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match converted {
        Converted::Json(value) => writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?,
        Converted::Text(text) => writeln!(stdout, "{text}")?,
        Converted::Plist(value) => writeln!(stdout, "{value:#?}")?,
        Converted::Bytes(bytes) => stdout.write_all(bytes)?,
        Converted::File(path) => writeln!(stdout, "{}", path.display())?,
    }
    Ok(())
}
