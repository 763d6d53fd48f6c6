//! CONNECT packet handling: CONNACK construction from the broker's
//! capability snapshot.

use mqgate_core::packet::{reason_code, Connack, Connect};
use mqgate_core::properties::ConnackProperties;

use crate::config::MqttConfig;

/// Build the CONNACK for a decoded CONNECT.
///
/// The reason code is the first failing check: QoS above the broker
/// maximum, then retain requested while unavailable. A successful
/// CONNACK advertises every disabled capability.
///
/// `session_present` is supplied by the caller; without a session store
/// it is always false, but the hook lets one be wired in later without
/// protocol changes.
pub fn build_connack(connect: &Connect, caps: &MqttConfig, session_present: bool) -> Connack {
    let mut properties = ConnackProperties::default();

    let will_qos = connect.will.as_ref().map(|w| w.qos as u8).unwrap_or(0);
    let will_retain = connect.will.as_ref().map(|w| w.retain).unwrap_or(false);

    let reason_code = if will_qos > caps.max_qos {
        properties.maximum_qos = Some(caps.max_qos);
        reason_code::QOS_NOT_SUPPORTED
    } else {
        if !caps.retain_available {
            properties.retain_available = Some(false);
        }
        if will_retain && !caps.retain_available {
            reason_code::RETAIN_NOT_SUPPORTED
        } else {
            if !caps.wildcard_subscriptions {
                properties.wildcard_subscription_available = Some(false);
            }
            if !caps.subscription_identifiers {
                properties.subscription_identifiers_available = Some(false);
            }
            if !caps.shared_subscriptions {
                properties.shared_subscription_available = Some(false);
            }
            reason_code::SUCCESS
        }
    };

    Connack {
        session_present,
        reason_code,
        properties,
    }
}

/// Build the CONNACK sent when the CONNECT itself failed to decode. The
/// property block is empty; the reason code carries the rejection class.
pub fn build_error_connack(reason_code: u8) -> Connack {
    Connack {
        session_present: false,
        reason_code,
        properties: ConnackProperties::default(),
    }
}
