//! Diagnostic dump

use std::fmt::Write;

use crate::endpoint::scope_or_default;
use crate::receiver::ConnectionListing;
use crate::stats::AdminMetrics;

/// One sender as shown in the dump
#[derive(Debug, Clone)]
pub struct SenderSummary {
    pub scope: Option<String>,
    pub topic: String,
    pub serialization_type: String,
    pub uri: String,
    pub connected: bool,
}

/// One receiver as shown in the dump
#[derive(Debug, Clone)]
pub struct ReceiverSummary {
    pub scope: Option<String>,
    pub topic: String,
    pub serialization_type: String,
    pub uri: String,
    pub connections: ConnectionListing,
}

/// Render the admin state
///
/// ```text
/// Topic Senders:
/// |- Topic Sender s/t
///    |- serializer type = json
///    |- uri = /pubsub/s/t
///    |- connected = true
/// ```
pub fn render(
    serialization_types: &[String],
    senders: &[SenderSummary],
    receivers: &[ReceiverSummary],
    metrics: Option<&AdminMetrics>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Serializers:");
    for serialization_type in serialization_types {
        let _ = writeln!(out, "|- {serialization_type}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Topic Senders:");
    for sender in senders {
        let _ = writeln!(
            out,
            "|- Topic Sender {}/{}",
            scope_or_default(sender.scope.as_deref()),
            sender.topic
        );
        let _ = writeln!(out, "   |- serializer type = {}", sender.serialization_type);
        let _ = writeln!(out, "   |- uri = {}", sender.uri);
        let _ = writeln!(out, "   |- connected = {}", sender.connected);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Topic Receivers:");
    for receiver in receivers {
        let _ = writeln!(
            out,
            "|- Topic Receiver {}/{}",
            scope_or_default(receiver.scope.as_deref()),
            receiver.topic
        );
        let _ = writeln!(out, "   |- serializer type = {}", receiver.serialization_type);
        let _ = writeln!(out, "   |- uri = {}", receiver.uri);
        for remote in &receiver.connections.connected {
            let _ = writeln!(out, "   |- connected endpoint = {remote}");
        }
        for remote in &receiver.connections.unconnected {
            let _ = writeln!(out, "   |- unconnected endpoint = {remote}");
        }
    }

    if let Some(metrics) = metrics {
        render_metrics(&mut out, metrics);
    }

    out
}

fn render_metrics(out: &mut String, metrics: &AdminMetrics) {
    let _ = writeln!(out);
    let _ = writeln!(out, "Sender Metrics:");
    for s in &metrics.senders {
        let m = &s.metrics;
        let _ = writeln!(
            out,
            "|- {}/{} component {} msg {} (id {})",
            scope_or_default(s.scope.as_deref()),
            s.topic,
            s.component,
            s.msg_fqn,
            s.msg_type_id
        );
        let _ = writeln!(
            out,
            "   |- sent = {}, failed = {}, serialization errors = {}",
            m.nr_of_messages_sent, m.nr_of_messages_send_failed, m.nr_of_serialization_errors
        );
        let _ = writeln!(
            out,
            "   |- avg serialization = {:.3} us, avg interval = {:.3} ms",
            m.average_serialization_time.value() * 1e6,
            m.average_time_between_messages.value() * 1e3
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Receiver Metrics:");
    for r in &metrics.receivers {
        let m = &r.metrics;
        let _ = writeln!(
            out,
            "|- {}/{} component {} msg {} (id {}) from {}",
            scope_or_default(r.scope.as_deref()),
            r.topic,
            r.component,
            r.msg_fqn,
            m.msg_type_id,
            m.origin
        );
        let _ = writeln!(
            out,
            "   |- received = {}, serialization errors = {}, version mismatches = {}, missing seq = {}",
            m.nr_of_messages_received,
            m.nr_of_serialization_errors,
            m.nr_of_version_mismatches,
            m.nr_of_missing_seq_numbers
        );
        if m.nr_of_messages_received > 0 {
            let _ = writeln!(
                out,
                "   |- delay avg/min/max = {:.3}/{:.3}/{:.3} ms",
                m.average_delay.value() * 1e3,
                m.min_delay * 1e3,
                m.max_delay * 1e3
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_senders_and_receivers() {
        let senders = vec![SenderSummary {
            scope: None,
            topic: "t".into(),
            serialization_type: "json".into(),
            uri: "/pubsub/default/t".into(),
            connected: false,
        }];
        let receivers = vec![ReceiverSummary {
            scope: Some("s".into()),
            topic: "t".into(),
            serialization_type: "json".into(),
            uri: "/pubsub/s/t".into(),
            connections: ConnectionListing {
                connected: vec!["10.0.0.1:5000".into()],
                unconnected: vec!["10.0.0.2:5000 (static)".into()],
            },
        }];

        let out = render(&["json".to_string()], &senders, &receivers, None);

        assert!(out.contains("|- Topic Sender default/t\n"));
        assert!(out.contains("   |- uri = /pubsub/default/t\n"));
        assert!(out.contains("|- Topic Receiver s/t\n"));
        assert!(out.contains("   |- connected endpoint = 10.0.0.1:5000\n"));
        assert!(out.contains("   |- unconnected endpoint = 10.0.0.2:5000 (static)\n"));
        assert!(!out.contains("Metrics"));
    }

    #[test]
    fn test_render_metrics_section() {
        let out = render(&[], &[], &[], Some(&AdminMetrics::default()));
        assert!(out.contains("Sender Metrics:"));
        assert!(out.contains("Receiver Metrics:"));
    }
}
