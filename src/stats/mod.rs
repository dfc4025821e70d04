//! Delivery metrics

pub mod metrics;

pub use metrics::{
    AdminMetrics, ReceiveMetrics, ReceiverMetricsSnapshot, RunningAverage, SendMetrics,
    SenderMetricsSnapshot,
};
