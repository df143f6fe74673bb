//! Signing-endpoint client.
//!
//! Exchanges file metadata (and a resume hint, when one exists) for an upload
//! token, target bucket, and object name. The endpoint speaks an envelope
//! protocol where `code == 200` is the only application-level success; any
//! other code fails the session before a single byte is transferred.

use nosup_core::models::{AuthGrant, FileDescriptor, ResumeRecord, SignEnvelope, SignRequest};
use nosup_core::UploadError;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SigningClient {
    client: reqwest::Client,
    sign_url: String,
    upload_type: String,
}

impl SigningClient {
    pub fn new(
        sign_url: impl Into<String>,
        upload_type: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UploadError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            sign_url: sign_url.into(),
            upload_type: upload_type.into(),
        })
    }

    /// Request authorization for `file`. A resume hint attaches the previous
    /// remote object name so the endpoint can mint a token for it.
    ///
    /// Transport failures surface as [`UploadError::Network`]; non-200
    /// application codes as [`UploadError::Authorization`] carrying the
    /// endpoint's code and message.
    pub async fn authorize(
        &self,
        file: &FileDescriptor,
        hint: Option<&ResumeRecord>,
    ) -> Result<AuthGrant, UploadError> {
        let request = SignRequest {
            upload_type: self.upload_type.clone(),
            object: hint.map(|h| h.object_name.clone()),
            origin_name: file.name.clone(),
        };

        let response = self
            .client
            .post(&self.sign_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| UploadError::Network(format!("Signing request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Network(format!(
                "Signing endpoint returned HTTP {status}"
            )));
        }

        let envelope: SignEnvelope = response
            .json()
            .await
            .map_err(|e| UploadError::MalformedResponse(format!("Signing response: {e}")))?;

        if envelope.code != 200 {
            return Err(UploadError::Authorization {
                code: envelope.code,
                message: envelope.msg.unwrap_or_default(),
            });
        }

        let grant = envelope.result.ok_or_else(|| {
            UploadError::MalformedResponse("Signing response has code 200 but no result".to_string())
        })?;

        tracing::debug!(
            bucket = %grant.bucket,
            object = %grant.object,
            direct_upload = grant.direct_upload,
            resumed = hint.is_some(),
            "Upload authorized"
        );
        Ok(grant)
    }
}
