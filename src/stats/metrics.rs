//! Send and receive metrics
//!
//! Counters are monotonic and averages incremental; both only reset when the
//! owning entry is created, so tearing down and recreating a sender or
//! receiver starts from zero.

use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

/// Incremental mean
///
/// `avg += (x - avg) / n` with `n` counted after the new sample, identical for
/// every metric on both the send and receive side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    value: f64,
    samples: u64,
}

impl RunningAverage {
    pub fn add(&mut self, sample: f64) {
        self.samples += 1;
        self.value += (sample - self.value) / self.samples as f64;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Per message type send statistics
#[derive(Debug, Clone, Default)]
pub struct SendMetrics {
    pub nr_of_messages_sent: u64,
    pub nr_of_messages_send_failed: u64,
    pub nr_of_serialization_errors: u64,
    pub last_message_sent: Option<Instant>,
    /// Seconds
    pub average_time_between_messages: RunningAverage,
    /// Seconds
    pub average_serialization_time: RunningAverage,
}

impl SendMetrics {
    pub fn record_sent(&mut self, serialization_time: Duration, now: Instant) {
        self.nr_of_messages_sent += 1;
        self.record_attempt(serialization_time, now);
    }

    pub fn record_send_failed(&mut self, serialization_time: Duration, now: Instant) {
        self.nr_of_messages_send_failed += 1;
        self.record_attempt(serialization_time, now);
    }

    pub fn record_serialization_error(&mut self) {
        self.nr_of_serialization_errors += 1;
    }

    fn record_attempt(&mut self, serialization_time: Duration, now: Instant) {
        self.average_serialization_time
            .add(serialization_time.as_secs_f64());
        if let Some(last) = self.last_message_sent {
            self.average_time_between_messages
                .add(now.saturating_duration_since(last).as_secs_f64());
        }
        self.last_message_sent = Some(now);
    }
}

/// Per (message type, origin) receive statistics
#[derive(Debug, Clone)]
pub struct ReceiveMetrics {
    pub msg_type_id: u32,
    pub origin: Uuid,
    pub nr_of_messages_received: u64,
    pub nr_of_serialization_errors: u64,
    /// Frames dropped because their version is incompatible with the codec
    pub nr_of_version_mismatches: u64,
    pub last_message_received: Option<Instant>,
    /// Seconds
    pub average_time_between_messages: RunningAverage,
    /// Seconds
    pub average_serialization_time: RunningAverage,
    /// Send-to-receive delay in seconds; negative under clock skew
    pub average_delay: RunningAverage,
    pub min_delay: f64,
    pub max_delay: f64,
    pub last_seq_nr: Option<u32>,
    pub nr_of_missing_seq_numbers: u64,
}

impl ReceiveMetrics {
    pub fn new(msg_type_id: u32, origin: Uuid) -> Self {
        Self {
            msg_type_id,
            origin,
            nr_of_messages_received: 0,
            nr_of_serialization_errors: 0,
            nr_of_version_mismatches: 0,
            last_message_received: None,
            average_time_between_messages: RunningAverage::default(),
            average_serialization_time: RunningAverage::default(),
            average_delay: RunningAverage::default(),
            min_delay: f64::INFINITY,
            max_delay: f64::NEG_INFINITY,
            last_seq_nr: None,
            nr_of_missing_seq_numbers: 0,
        }
    }

    pub fn record_received(
        &mut self,
        seq_nr: u32,
        send_time: SystemTime,
        received_at: SystemTime,
        deserialization_time: Duration,
        now: Instant,
    ) {
        self.nr_of_messages_received += 1;
        self.average_serialization_time
            .add(deserialization_time.as_secs_f64());

        let delay = match received_at.duration_since(send_time) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        };
        self.average_delay.add(delay);
        self.min_delay = self.min_delay.min(delay);
        self.max_delay = self.max_delay.max(delay);

        if let Some(last) = self.last_message_received {
            self.average_time_between_messages
                .add(now.saturating_duration_since(last).as_secs_f64());
        }
        self.last_message_received = Some(now);

        self.observe_seq_nr(seq_nr);
    }

    pub fn record_serialization_error(&mut self) {
        self.nr_of_serialization_errors += 1;
    }

    pub fn record_version_mismatch(&mut self) {
        self.nr_of_version_mismatches += 1;
    }

    /// Returns the number of sequence numbers skipped by this frame
    ///
    /// Only forward jumps below 2^31 count as a gap; anything else (duplicate,
    /// backwards, huge jump) is taken as a publisher restart and re-anchors.
    pub fn observe_seq_nr(&mut self, seq_nr: u32) -> u32 {
        let missing = match self.last_seq_nr {
            Some(last) => {
                let incr = seq_nr.wrapping_sub(last);
                if incr > 1 && incr < (1 << 31) {
                    incr - 1
                } else {
                    0
                }
            }
            None => 0,
        };
        self.nr_of_missing_seq_numbers += missing as u64;
        self.last_seq_nr = Some(seq_nr);
        missing
    }
}

/// Point-in-time view of one sender message type
#[derive(Debug, Clone)]
pub struct SenderMetricsSnapshot {
    pub scope: Option<String>,
    pub topic: String,
    pub component: u64,
    pub msg_type_id: u32,
    pub msg_fqn: String,
    pub metrics: SendMetrics,
}

/// Point-in-time view of one receiver (subscriber, type, origin) triple
#[derive(Debug, Clone)]
pub struct ReceiverMetricsSnapshot {
    pub scope: Option<String>,
    pub topic: String,
    pub component: u64,
    pub msg_fqn: String,
    pub metrics: ReceiveMetrics,
}

/// Every sender and receiver metric of one admin
#[derive(Debug, Clone, Default)]
pub struct AdminMetrics {
    pub senders: Vec<SenderMetricsSnapshot>,
    pub receivers: Vec<ReceiverMetricsSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::default();
        for x in [2.0, 4.0, 6.0] {
            avg.add(x);
        }
        assert_eq!(avg.samples(), 3);
        assert!((avg.value() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_sequence_gap() {
        let mut metrics = ReceiveMetrics::new(1, Uuid::new_v4());

        assert_eq!(metrics.observe_seq_nr(1), 0);
        assert_eq!(metrics.observe_seq_nr(2), 0);
        assert_eq!(metrics.observe_seq_nr(4), 1);
        assert_eq!(metrics.nr_of_missing_seq_numbers, 1);

        // Publisher restart
        assert_eq!(metrics.observe_seq_nr(1), 0);
        assert_eq!(metrics.observe_seq_nr(5), 3);
        assert_eq!(metrics.nr_of_missing_seq_numbers, 4);
    }

    #[test]
    fn test_sequence_wraps_without_gap() {
        let mut metrics = ReceiveMetrics::new(1, Uuid::new_v4());
        metrics.observe_seq_nr(u32::MAX);
        assert_eq!(metrics.observe_seq_nr(0), 0);
        assert_eq!(metrics.nr_of_missing_seq_numbers, 0);
    }

    #[test]
    fn test_receive_delay_bounds() {
        let mut metrics = ReceiveMetrics::new(1, Uuid::new_v4());
        assert_eq!(metrics.min_delay, f64::INFINITY);
        assert_eq!(metrics.max_delay, f64::NEG_INFINITY);

        let sent = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let start = Instant::now();
        metrics.record_received(1, sent, sent + Duration::from_millis(10), Duration::ZERO, start);
        metrics.record_received(
            2,
            sent,
            sent + Duration::from_millis(30),
            Duration::ZERO,
            start + Duration::from_millis(5),
        );

        assert_eq!(metrics.nr_of_messages_received, 2);
        assert!((metrics.min_delay - 0.010).abs() < 1e-9);
        assert!((metrics.max_delay - 0.030).abs() < 1e-9);
        assert!((metrics.average_delay.value() - 0.020).abs() < 1e-9);
        assert_eq!(metrics.average_time_between_messages.samples(), 1);
    }

    #[test]
    fn test_negative_delay_under_skew() {
        let mut metrics = ReceiveMetrics::new(1, Uuid::new_v4());
        let sent = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        metrics.record_received(1, sent, sent - Duration::from_secs(1), Duration::ZERO, Instant::now());
        assert!((metrics.min_delay + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_send_metrics() {
        let mut metrics = SendMetrics::default();
        let start = Instant::now();

        metrics.record_sent(Duration::from_micros(10), start);
        metrics.record_send_failed(Duration::from_micros(30), start + Duration::from_millis(100));
        metrics.record_serialization_error();

        assert_eq!(metrics.nr_of_messages_sent, 1);
        assert_eq!(metrics.nr_of_messages_send_failed, 1);
        assert_eq!(metrics.nr_of_serialization_errors, 1);
        assert!((metrics.average_serialization_time.value() - 20e-6).abs() < 1e-12);
        assert!((metrics.average_time_between_messages.value() - 0.1).abs() < 1e-9);
    }
}
