//! Label sets for Prometheus metrics
//!
//! Label values are closed enums so that every series name is known up front.
//! They are exported under their variant names, e.g. `reason="QueueTimeout"`.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};

/// Why an inbound record was skipped before counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum RejectReason {
    InvalidInput,
    InvalidTimestamp,
}

/// Why an update never reached the outbound transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum DropReason {
    QueueTimeout,
    DeliveryFailure,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct RejectLabels {
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct DropLabels {
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct PartitionLabels {
    pub partition: String,
}

impl PartitionLabels {
    pub fn new(partition: i32) -> Self {
        Self {
            partition: partition.to_string(),
        }
    }
}
