//! Sync-discovery decoder.
//!
//! The payload is a (possibly chunked) JSON array of already-built
//! `DeviceUpdate` values forwarded from an external sync feed. Anything
//! that isn't a non-empty array of `DeviceUpdate` — an empty array, a
//! health-check object, garbage — is silently skipped rather than treated
//! as a decode error.

use serviceradar_common::{DeviceUpdate, Result};

use crate::decoders::DecodeOutput;

pub fn decode(message: &[u8]) -> Result<DecodeOutput> {
    let chunks: Vec<Vec<DeviceUpdate>> = serviceradar_common::chunked::decode_concatenated(message);

    let mut output = DecodeOutput::default();
    for chunk in chunks {
        output.device_updates.extend(chunk);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_is_skipped() {
        let output = decode(b"[]").unwrap();
        assert!(output.device_updates.is_empty());
    }

    #[test]
    fn health_check_object_is_skipped() {
        let output = decode(br#"{"status":"ok"}"#).unwrap();
        assert!(output.device_updates.is_empty());
    }

    #[test]
    fn forwards_device_updates_from_array() {
        let payload = br#"[{
            "device_id": "default:10.0.0.1",
            "ip": "10.0.0.1",
            "partition": "default",
            "source": "armis",
            "agent_id": "",
            "poller_id": "",
            "timestamp": 1700000000000,
            "is_available": true,
            "metadata": {},
            "confidence": 100
        }]"#;

        let output = decode(payload).unwrap();
        assert_eq!(output.device_updates.len(), 1);
        assert_eq!(output.device_updates[0].ip, "10.0.0.1");
    }

    #[test]
    fn garbage_input_is_skipped_not_errored() {
        let output = decode(b"not json").unwrap();
        assert!(output.device_updates.is_empty());
    }
}
