//! Configuration module
//!
//! Upload engine settings with the original protocol's defaults: 4 MiB
//! transfer chunks, a 100 MiB size limit, any extension allowed, and 2 MiB
//! hash windows (independent of the chunk size).

use std::collections::HashMap;
use std::env;

const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
const DEFAULT_LIMIT_SIZE: u64 = 100 * 1024 * 1024;
const DEFAULT_HASH_WINDOW_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_UPLOAD_TYPE: &str = "common";

/// Extension whitelist: `Any` corresponds to the protocol's `*` wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionFilter {
    Any,
    List(Vec<String>),
}

impl ExtensionFilter {
    /// Parse a comma-separated whitelist; `*` or an empty string means any.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return ExtensionFilter::Any;
        }
        ExtensionFilter::List(
            raw.split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Case-insensitive membership test. `Any` allows everything.
    pub fn allows(&self, extension: &str) -> bool {
        match self {
            ExtensionFilter::Any => true,
            ExtensionFilter::List(exts) => {
                exts.iter().any(|e| e.eq_ignore_ascii_case(extension))
            }
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        ExtensionFilter::Any
    }
}

/// Upload engine configuration.
///
/// `form_params` selects the transfer path: when present, the engine performs
/// a single pre-signed multipart form submission and the chunked-transfer
/// settings (`sign_url`, `chunk_size`) are unused.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Storage service base URL (chunk and offset-probe requests).
    pub host: String,
    /// Signing endpoint URL (chunked path only).
    pub sign_url: String,
    /// Upload-type tag forwarded to the signing endpoint.
    pub upload_type: String,
    /// Transfer chunk size in bytes.
    pub chunk_size: u64,
    /// Maximum accepted file size in bytes.
    pub limit_size: u64,
    /// Extension whitelist.
    pub allowed_extensions: ExtensionFilter,
    /// Window size for content hashing, independent of `chunk_size`.
    pub hash_window_size: usize,
    /// Pre-built form fields; presence selects the form-upload path.
    pub form_params: Option<HashMap<String, String>>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            sign_url: String::new(),
            upload_type: DEFAULT_UPLOAD_TYPE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            limit_size: DEFAULT_LIMIT_SIZE,
            allowed_extensions: ExtensionFilter::default(),
            hash_window_size: DEFAULT_HASH_WINDOW_SIZE,
            form_params: None,
        }
    }
}

impl UploadConfig {
    /// Build a configuration from `NOSUP_*` environment variables, falling
    /// back to defaults for everything unset.
    ///
    /// Recognized: `NOSUP_HOST`, `NOSUP_SIGN_URL`, `NOSUP_UPLOAD_TYPE`,
    /// `NOSUP_CHUNK_SIZE`, `NOSUP_LIMIT_SIZE`, `NOSUP_ALLOWED_EXTENSIONS`
    /// (comma-separated, or `*`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = env::var("NOSUP_HOST") {
            config.host = host;
        }
        if let Ok(url) = env::var("NOSUP_SIGN_URL") {
            config.sign_url = url;
        }
        if let Ok(t) = env::var("NOSUP_UPLOAD_TYPE") {
            config.upload_type = t;
        }
        if let Some(n) = env::var("NOSUP_CHUNK_SIZE").ok().and_then(|v| v.parse().ok()) {
            config.chunk_size = n;
        }
        if let Some(n) = env::var("NOSUP_LIMIT_SIZE").ok().and_then(|v| v.parse().ok()) {
            config.limit_size = n;
        }
        if let Ok(exts) = env::var("NOSUP_ALLOWED_EXTENSIONS") {
            config.allowed_extensions = ExtensionFilter::parse(&exts);
        }
        config
    }
}
