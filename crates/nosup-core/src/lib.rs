//! NOSUP core library
//!
//! This crate provides the domain models, configuration, and error taxonomy
//! shared by the NOSUP upload engine crates. It contains no I/O; the engine
//! lives in `nosup-client` and persistence in `nosup-store`.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{ExtensionFilter, UploadConfig};
pub use error::UploadError;
pub use models::{
    AuthGrant, ChunkAck, ContentDigest, FileDescriptor, OffsetProbe, ResumeRecord, SignEnvelope,
    SignRequest, UploadStatus,
};
