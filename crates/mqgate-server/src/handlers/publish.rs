//! PUBLISH packet handling.
//!
//! Routing and subscription matching are not wired in; a decoded QoS 0
//! PUBLISH carries no acknowledgement, so handling amounts to recording
//! the delivery attempt.

use log::debug;

use mqgate_core::packet::{Publish, QoS};

/// Handle a decoded PUBLISH.
pub fn handle_publish(client_id: Option<&str>, publish: &Publish) {
    debug!(
        "PUBLISH from {} topic={} qos={:?} retain={} dup={} payload={}B",
        client_id.unwrap_or("<unconnected>"),
        publish.topic,
        publish.qos,
        publish.retain,
        publish.dup,
        publish.payload.len()
    );

    if publish.qos != QoS::AtMostOnce {
        // This core never grants QoS above 0, so an acknowledgement flow
        // is not started for higher levels.
        debug!(
            "ignoring acknowledgement for packet id {:?} (QoS {:?} not granted)",
            publish.packet_id, publish.qos
        );
    }
}
