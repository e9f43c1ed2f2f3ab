//! # gemini-sheets
//!
//! 面向电子表格公式的 Gemini 作业运行时：指纹去重、限流批处理、重试退避与分块响应缓存。
//!
//! A job runtime that lets a stateless, repeatedly re-invoked spreadsheet
//! formula behave like an asynchronous, rate-limited, deduplicated and cached
//! call to the Gemini text-generation API.
//!
//! ## Overview
//!
//! Each formula evaluation calls [`SheetsGateway::submit_prompt`]. The call
//! never blocks on the network: it looks the request up by [`Fingerprint`],
//! answers from the processing table or the response cache when it can, and
//! otherwise enqueues the request and returns a provisional string. A
//! background drain releases queued requests in tier-sized batches, retries
//! transient upstream failures with exponential backoff and writes results
//! back for the next evaluation to pick up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gemini_sheets::SheetsGateway;
//!
//! #[tokio::main]
//! async fn main() -> gemini_sheets::Result<()> {
//!     let gateway = SheetsGateway::builder().build().await?;
//!     gateway.set_credential("your-api-key").await;
//!
//!     // first evaluation: "⏳ Loading... (#1 in queue, ~0s)"
//!     println!("{}", gateway.submit_prompt("Explain gravity", None, None, None).await);
//!
//!     gateway.wait_idle().await;
//!     // re-evaluation: the generated text
//!     println!("{}", gateway.submit_prompt("Explain gravity", None, None, None).await);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`fingerprint`] | Deterministic request identity |
//! | [`cache`] | Response cache with chunked storage for large values |
//! | [`store`] | Durable key/value store for the state snapshot |
//! | [`state`] | Processing table, durable snapshot, history and stats |
//! | [`resilience`] | Retry with exponential backoff |
//! | [`queue`] | Rate-limited batch queue and its background drain |
//! | [`upstream`] | Upstream seam and the Gemini HTTP implementation |
//! | [`models`] | Model catalog and legacy name migration |
//! | [`config`] | Gateway configuration, tiers, YAML and env loading |
//! | [`gateway`] | The formula-facing entry point |
//! | [`telemetry`] | Tracing setup and failure diagnostics |

pub mod cache;
pub mod config;
pub mod error_code;
pub mod fingerprint;
pub mod gateway;
pub mod models;
pub mod queue;
pub mod resilience;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod upstream;

// Re-export main types for convenience
pub use config::{GatewayConfig, Tier, TierProfile};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use gateway::{Settings, SettingsUpdate, SetupOutcome, SheetsGateway, SheetsGatewayBuilder};
pub use state::{ProcessingRecord, ProcessingStatus, Stats};
pub use upstream::{GenerationRequest, Upstream};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
