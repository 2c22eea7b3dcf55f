//! Prediction reporting to a remote collector.

pub mod coordinates;
pub mod payload;
pub mod reporter;
pub mod transport;

pub use coordinates::CoordinateGenerator;
pub use payload::{ReportPayload, prediction_token};
pub use reporter::Reporter;
#[cfg(feature = "report-http")]
pub use transport::HttpTransport;
pub use transport::{MemoryTransport, ReportTransport};
