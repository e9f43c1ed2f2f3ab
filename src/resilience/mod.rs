//! 弹性模式模块：对上游调用进行有界指数退避重试。
//!
//! # Resilience Module
//!
//! Transient upstream failures (timeouts, HTTP 408/429/5xx) are retried with
//! exponential backoff; permanent failures propagate on first occurrence.
//!
//! ```rust,no_run
//! use gemini_sheets::resilience::{retry_with_backoff, RetryPolicy};
//!
//! # async fn demo() -> gemini_sheets::Result<()> {
//! let policy = RetryPolicy::default(); // 3 attempts, 1s base delay
//! let text = retry_with_backoff(&policy, "generate", || async {
//!     Ok::<_, gemini_sheets::Error>("hello".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Both the backoff sleeps and the queue's inter-batch pause are the only
//! suspension points of a drain; there is no overall deadline across attempts.

mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
