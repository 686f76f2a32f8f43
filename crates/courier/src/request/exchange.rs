use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::body::prepare;
use super::config::RequestConfig;
use super::lifecycle::Request;
use super::response::Response;
use crate::core::{convert, is_error_status, Converted};
use crate::data::TlsPolicy;
use crate::effects::{BoxStream, OutgoingBody, TransportError, TransportRequest, TransportResponse, TrustMode};
use crate::error::{Error, Result};
use crate::trust::resolve_challenge;

type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

impl Request {
    /// One full exchange, bounded by the configured timeout.
    pub(super) async fn exchange(&self) -> Response {
        let config = self.config();
        let attempt = async {
            match self.send_and_receive(&config).await {
                Ok(response) => response,
                Err(error) => Response::failed(error),
            }
        };
        match config.timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Response::failed(Error::Timeout)),
            None => attempt.await,
        }
    }

    async fn send_and_receive(&self, config: &RequestConfig) -> Result<Response> {
        let (requested_url, response, uploading) = self.send(config).await?;

        let status = response.status;
        let headers = response.headers.clone();
        let redirected_url = (response.url != requested_url).then(|| response.url.clone());
        let partial = |result: Result<Converted>| Response {
            result,
            error_payload: None,
            status: Some(status),
            headers: headers.clone(),
            redirected_url: redirected_url.clone(),
            data: None,
            file: None,
        };

        let total = response.content_length.filter(|n| *n > 0);
        let report = !uploading;
        let content_type = response.headers.get("content-type").map(str::to_string);

        if let Some(target) = config.target_file.as_deref().filter(|_| !is_error_status(status)) {
            return Ok(
                match self
                    .receive_to_file(response.body, total, report, target, config.copy_to_target_atomically)
                    .await
                {
                    Ok(path) => Response {
                        file: Some(path.clone()),
                        ..partial(Ok(Converted::File(path)))
                    },
                    Err(error) => partial(Err(error)),
                },
            );
        }

        let data = match self.receive_to_memory(response.body, total, report).await {
            Ok(data) => data,
            Err(error) => return Ok(partial(Err(error))),
        };
        let converted = convert(config.result_kind, &data, content_type.as_deref());
        let (result, error_payload) = if is_error_status(status) {
            (Err(Error::Http { status }), converted.ok())
        } else {
            (converted, None)
        };
        Ok(Response {
            error_payload,
            data: Some(data),
            ..partial(result)
        })
    }

    /// Send the request, resolving certificate challenges by re-sending
    /// with the approved fingerprint accepted.
    async fn send(&self, config: &RequestConfig) -> Result<(url::Url, TransportResponse, bool)> {
        let env = self.env();
        let policy = config.tls_policy;
        let mut accepted: HashSet<String> = match policy {
            TlsPolicy::PromptAndCache => env.trust.fingerprints().into_iter().collect(),
            _ => HashSet::new(),
        };

        loop {
            let prepared = prepare(config)?;
            let requested_url = prepared.url.clone();
            let uploading = !prepared.body.is_empty();
            let trust = match policy {
                TlsPolicy::TrustAll => TrustMode::AcceptAll,
                _ => TrustMode::Verify {
                    accepted: accepted.clone(),
                },
            };
            tracing::debug!(
                request_id = self.id(),
                method = %config.method,
                url = %requested_url,
                body_len = prepared.body.len(),
                "sending request"
            );
            let request = TransportRequest {
                method: config.method,
                url: prepared.url,
                headers: prepared.headers,
                body: self.track_upload(prepared.body),
                trust,
            };

            match env.transport.execute(request).await {
                Ok(response) => return Ok((requested_url, response, uploading)),
                Err(TransportError::Challenge(challenge)) => {
                    let fingerprint = challenge.fingerprint();
                    let host = challenge.host().to_string();
                    if accepted.contains(&fingerprint) {
                        return Err(Error::Tls(format!("approved certificate for {host} was still rejected")));
                    }
                    if !resolve_challenge(policy, config.challenge_handler.as_ref(), &env.trust, challenge).await {
                        return Err(Error::Tls(format!("certificate for {host} is not trusted")));
                    }
                    tracing::debug!(request_id = self.id(), %host, "certificate approved, retrying");
                    accepted.insert(fingerprint);
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn track_upload(&self, body: OutgoingBody) -> OutgoingBody {
        match body {
            OutgoingBody::Stream { length, stream } if length > 0 => {
                let request = self.clone();
                let mut sent = 0u64;
                let stream = stream.inspect(move |chunk| {
                    if let Ok(chunk) = chunk {
                        sent += chunk.len() as u64;
                        request.report_progress(sent as f32 / length as f32);
                    }
                });
                OutgoingBody::Stream {
                    length,
                    stream: Box::pin(stream),
                }
            }
            other => other,
        }
    }

    fn received(&self, report: bool, received: u64, total: Option<u64>) {
        if let (true, Some(total)) = (report, total) {
            self.report_progress(received as f32 / total as f32);
        }
    }

    async fn receive_to_memory(&self, mut body: BodyStream, total: Option<u64>, report: bool) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(total.and_then(|n| usize::try_from(n).ok()).unwrap_or(0));
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
            self.received(report, buf.len() as u64, total);
        }
        Ok(buf.freeze())
    }

    async fn receive_to_file(
        &self,
        body: BodyStream,
        total: Option<u64>,
        report: bool,
        target: &Path,
        atomic: bool,
    ) -> Result<PathBuf> {
        if !atomic {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.write_stream(body, total, report, target).await?;
            return Ok(target.to_path_buf());
        }

        // Dropping the staged file on any error path removes it.
        let staged = courier_fs::StagedFile::new(target)?;
        self.write_stream(body, total, report, staged.path()).await?;
        tokio::task::spawn_blocking(move || staged.commit())
            .await
            .map_err(|e| Error::Io(e.to_string()))?
            .map_err(|e| Error::CacheWrite {
                path:    target.to_path_buf(),
                message: e.to_string(),
            })
    }

    async fn write_stream(&self, mut body: BodyStream, total: Option<u64>, report: bool, path: &Path) -> Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            self.received(report, written, total);
        }
        file.flush().await?;
        Ok(())
    }
}
