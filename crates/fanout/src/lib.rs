//! Concurrent notification fan-out.
//!
//! A [`Dispatcher`] takes one [`NotificationRequest`] and delivers it through
//! every enabled [`Channel`] of a [`ChannelRegistry`] in parallel, bounded by a
//! worker limit. Each channel runs its own retry sequence with backoff and
//! jitter, failures stay contained to the channel that produced them, and the
//! caller always gets a complete [`DispatchReport`] back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fanout::{Channel, ChannelRegistry, Dispatcher, NotificationRequest};
//!
//! # async fn run(channels: Vec<Arc<dyn Channel>>) -> fanout::Result<()> {
//! let dispatcher = Dispatcher::new(ChannelRegistry::new(channels));
//! let report = dispatcher
//!     .dispatch(NotificationRequest::new("Backup finished", "3 files, 12 MB"))
//!     .await?;
//! println!("{} ok, {} failed", report.succeeded_count, report.failed_count);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod engine;
pub mod error;
pub mod registry;
pub mod report;
pub mod request;
pub mod retry;

pub use channel::{Channel, ChannelDescriptor, SendResult};
pub use engine::{DispatchConfig, Dispatcher};
pub use error::{ChannelError, DispatchError, ErrorKind, Result};
pub use registry::{ChannelRegistry, RegisteredChannel};
pub use report::{AttemptOutcome, ChannelResult, ChannelSummary, DispatchReport, ReportAggregator};
pub use request::{Attachment, NotificationRequest};
pub use retry::{RetryDecision, RetryPolicy, RetryState, RetryStrategy, StopReason};
