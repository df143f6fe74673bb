//! Storage-endpoint transfer operations.
//!
//! Three requests against the storage host, all authenticated with the
//! `x-nos-token` header: the offset probe (resume position), the chunk POST
//! (one contiguous byte range per request, body streamed so progress can be
//! observed in flight), and the single-shot multipart form upload.

use bytes::Bytes;
use futures::StreamExt;
use nosup_core::models::{ChunkAck, OffsetProbe};
use nosup_core::UploadError;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

pub const NOS_TOKEN_HEADER: &str = "x-nos-token";
const PROTOCOL_VERSION: &str = "1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Granularity of in-flight progress callbacks while a body streams out.
const BODY_PIECE_SIZE: usize = 64 * 1024;

/// One chunk request: the byte range `[offset, offset + length)` of the file,
/// addressed to `bucket`/`object` with the current auth token and, after the
/// first acknowledged chunk, the server's resume context.
pub struct ChunkSpec<'a> {
    pub bucket: &'a str,
    pub object: &'a str,
    pub token: &'a str,
    pub offset: u64,
    pub length: u64,
    /// True when this chunk's end reaches the file size.
    pub complete: bool,
    pub context: Option<&'a str>,
}

pub struct TransferClient {
    client: reqwest::Client,
    host: String,
}

impl TransferClient {
    pub fn new(host: impl Into<String>) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    /// Ask the server how many bytes it holds for a partial upload.
    /// Returns 0 when the server has no record of the context.
    pub async fn query_offset(
        &self,
        bucket: &str,
        object: &str,
        context: &str,
        token: &str,
    ) -> Result<u64, UploadError> {
        let url = format!(
            "{}/{}/{}?uploadContext&version={}&context={}",
            self.host,
            bucket,
            urlencoding::encode(object),
            PROTOCOL_VERSION,
            urlencoding::encode(context),
        );

        let response = self
            .client
            .get(&url)
            .header(NOS_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| UploadError::Network(format!("Offset query failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::RemoteVerification(format!(
                "Offset query returned HTTP {status}"
            )));
        }

        let probe: OffsetProbe = response
            .json()
            .await
            .map_err(|e| UploadError::MalformedResponse(format!("Offset query response: {e}")))?;
        Ok(probe.offset)
    }

    /// Send one chunk and return the server's acknowledgment.
    ///
    /// `on_sent` receives the cumulative bytes handed to the transport for
    /// this chunk. A non-parseable body on a success status is fatal: the
    /// loop must not guess the new offset.
    pub async fn upload_chunk(
        &self,
        path: &Path,
        spec: ChunkSpec<'_>,
        on_sent: impl FnMut(u64) + Send + 'static,
    ) -> Result<ChunkAck, UploadError> {
        let mut file = fs::File::open(path).await?;
        file.seek(SeekFrom::Start(spec.offset)).await?;
        let mut chunk = vec![0u8; spec.length as usize];
        file.read_exact(&mut chunk).await?;

        let mut url = format!(
            "{}/{}/{}?offset={}&complete={}",
            self.host,
            spec.bucket,
            urlencoding::encode(spec.object),
            spec.offset,
            spec.complete,
        );
        if let Some(context) = spec.context {
            url.push_str("&context=");
            url.push_str(&urlencoding::encode(context));
        }
        url.push_str("&version=");
        url.push_str(PROTOCOL_VERSION);

        let response = self
            .client
            .post(&url)
            .header(NOS_TOKEN_HEADER, spec.token)
            .header(reqwest::header::CONTENT_LENGTH, spec.length)
            .body(reqwest::Body::wrap_stream(progress_stream(chunk, on_sent)))
            .send()
            .await
            .map_err(|e| UploadError::Network(format!("Chunk upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::RemoteVerification(format!(
                "Chunk upload returned HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::MalformedResponse(format!("Chunk acknowledgment: {e}")))
    }

    /// Single multipart form submission: the caller's pre-signed policy
    /// fields plus the raw file. Success is exactly HTTP 200.
    pub async fn upload_form(
        &self,
        fields: &HashMap<String, String>,
        path: &Path,
        file_name: &str,
        size: u64,
        mut on_sent: impl FnMut(u64) + Send + 'static,
    ) -> Result<(), UploadError> {
        let file = fs::File::open(path).await?;
        let mut sent: u64 = 0;
        let stream = ReaderStream::with_capacity(file, BODY_PIECE_SIZE).map(move |piece| {
            if let Ok(bytes) = &piece {
                sent += bytes.len() as u64;
                on_sent(sent);
            }
            piece
        });

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(stream),
            size,
        )
        .file_name(file_name.to_string());

        let mut form = reqwest::multipart::Form::new();
        for (key, value) in fields {
            form = form.text(key.clone(), value.clone());
        }
        let form = form.part("file", part);

        let response = self
            .client
            .post(&self.host)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(format!("Form upload failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UploadError::RemoteVerification(format!(
                "Form upload returned HTTP {status}"
            )));
        }
        Ok(())
    }
}

/// Stream a buffered chunk in small pieces, reporting the cumulative byte
/// count as each piece is handed to the transport.
fn progress_stream(
    chunk: Vec<u8>,
    on_sent: impl FnMut(u64) + Send + 'static,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send {
    let chunk = Bytes::from(chunk);
    futures::stream::unfold((chunk, 0usize, on_sent), |(chunk, pos, mut on_sent)| async move {
        if pos >= chunk.len() {
            return None;
        }
        let end = (pos + BODY_PIECE_SIZE).min(chunk.len());
        let piece = chunk.slice(pos..end);
        on_sent(end as u64);
        Some((Ok(piece), (chunk, end, on_sent)))
    })
}
