//! Best-effort prediction reporting.
//!
//! `report` never blocks the caller and never fails: the submission runs as a
//! task on the async runtime and any error ends up in the log.

use crate::defaults;
use crate::error::Result;
use crate::report::coordinates::CoordinateGenerator;
use crate::report::payload::ReportPayload;
use crate::report::transport::ReportTransport;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct Reporter {
    transport: Arc<dyn ReportTransport>,
    coordinates: Arc<CoordinateGenerator>,
    runtime: Handle,
    in_flight: Arc<Semaphore>,
}

impl Reporter {
    /// Reporter spawning submissions onto `runtime`.
    pub fn new(transport: Arc<dyn ReportTransport>, runtime: Handle) -> Self {
        Self {
            transport,
            coordinates: Arc::new(CoordinateGenerator::new()),
            runtime,
            in_flight: Arc::new(Semaphore::new(defaults::REPORT_MAX_IN_FLIGHT)),
        }
    }

    /// Limit concurrent submissions; reports beyond the limit are dropped.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(limit));
        self
    }

    pub fn with_coordinates(mut self, generator: CoordinateGenerator) -> Self {
        self.coordinates = Arc::new(generator);
        self
    }

    /// Labels that never produce a submission.
    pub fn is_reportable(label: &str) -> bool {
        label != defaults::NONE_LABEL && label != defaults::NO_PREDICTION_LABEL
    }

    /// Fire-and-forget submission.
    ///
    /// Returns the task handle when a submission was started, `None` for
    /// sentinel labels or when too many submissions are already in flight.
    pub fn report(&self, label: &str) -> Option<JoinHandle<()>> {
        if !Self::is_reportable(label) {
            return None;
        }

        let Ok(permit) = self.in_flight.clone().try_acquire_owned() else {
            tracing::debug!("dropping report for '{label}': too many in flight");
            return None;
        };

        let transport = self.transport.clone();
        let coordinates = self.coordinates.clone();
        let label = label.to_string();

        Some(self.runtime.spawn(async move {
            let _permit = permit;
            if let Err(e) = send(transport.as_ref(), &coordinates, &label).await {
                tracing::warn!("report for '{label}' dropped: {e}");
            }
        }))
    }

    /// Submit inline. `Ok(false)` means the label was a sentinel and nothing
    /// was sent.
    pub async fn submit(&self, label: &str) -> Result<bool> {
        send(self.transport.as_ref(), &self.coordinates, label).await
    }
}

async fn send(
    transport: &dyn ReportTransport,
    coordinates: &CoordinateGenerator,
    label: &str,
) -> Result<bool> {
    if !Reporter::is_reportable(label) {
        return Ok(false);
    }
    let payload = ReportPayload::new(label, coordinates.next_pair())?;
    let body = payload.to_wire()?;
    tracing::debug!("reporting via {}: {body}", transport.name());
    transport.post(body).await?;
    Ok(true)
}
