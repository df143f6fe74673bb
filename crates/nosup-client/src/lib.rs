//! Resumable chunked-upload engine for NOS-style object storage.
//!
//! One [`UploadSession`] drives one file: validation, content hashing,
//! authorization against a signing endpoint, and either a single pre-signed
//! form submission or the resumable chunk-transfer loop. Progress and the
//! terminal outcome are delivered over an event channel; resume bookkeeping
//! lives behind the injected [`nosup_store::ResumeStore`] so an interrupted
//! transfer can be picked up by a brand-new session at the server's
//! acknowledged offset.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nosup_client::{UploadEvent, UploadSession};
//! use nosup_core::UploadConfig;
//! use nosup_store::MemoryResumeStore;
//!
//! # async fn example() {
//! let config = UploadConfig {
//!     host: "https://nosup-eastchina1.126.net".to_string(),
//!     sign_url: "https://api.example.com/sign".to_string(),
//!     ..Default::default()
//! };
//! let store = Arc::new(MemoryResumeStore::new());
//! let (handle, mut events) = UploadSession::spawn("video.mp4", config, store);
//! while let Some(event) = events.recv().await {
//!     if let UploadEvent::Progress(fraction) = event {
//!         println!("{:.1}%", fraction * 100.0);
//!     }
//! }
//! # let _ = handle;
//! # }
//! ```

pub mod hasher;
pub mod session;
pub mod sign;
pub mod token;
pub mod transfer;

pub use hasher::{compute_digest, HashOutcome};
pub use session::{UploadEvent, UploadHandle, UploadReceipt, UploadSession};
pub use sign::SigningClient;
pub use transfer::{ChunkSpec, TransferClient};
