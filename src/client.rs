//! HTTP client for the remote item API: transport seam, retry policy and
//! logging, tuning options, and request metrics.

pub mod http;
pub mod metrics;
pub mod options;
pub mod retry;

pub use http::{ClientError, HttpTransport, ItemClient, RawResponse, ReqwestTransport};
pub use metrics::ClientMetricsSnapshot;
pub use options::ClientOptions;
