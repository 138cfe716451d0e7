//! SNMP-discovery decoder.
//!
//! Produces three kinds of output from a single discovery run: a
//! `DeviceUpdate` per discovered device (classified via [`crate::classify`]),
//! raw interface rows tied to the provisional device ID, and a correlation
//! `DeviceUpdate` per device carrying the union of non-loopback IPs seen
//! across its interfaces as `metadata.alternate_ips`.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serviceradar_common::{CoreError, DeviceUpdate, DiscoveredInterface, DiscoverySource, Result, TopologyDiscoveryEvent};

use crate::builder::DeviceUpdateBuilder;
use crate::classify::classify_device_type;
use crate::decoders::{DecodeContext, DecodeOutput};

#[derive(Debug, Clone, Deserialize)]
struct DiscoveredDevice {
    ip: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    sys_descr: String,
    #[serde(default)]
    sys_object_id: String,
    #[serde(default)]
    mac: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InterfacePayload {
    device_ip: String,
    #[serde(default)]
    if_index: i64,
    #[serde(default)]
    if_name: String,
    #[serde(default)]
    ip_addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnmpDiscoveryPayload {
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    poller_id: String,
    #[serde(default)]
    devices: Vec<DiscoveredDevice>,
    #[serde(default)]
    interfaces: Vec<InterfacePayload>,
    #[serde(default)]
    topology: Vec<TopologyDiscoveryEvent>,
}

fn is_loopback(ip: &str) -> bool {
    ip == "127.0.0.1" || ip == "::1" || ip.starts_with("127.")
}

pub fn decode(ctx: &DecodeContext, message: &[u8]) -> Result<DecodeOutput> {
    let payload: SnmpDiscoveryPayload = serde_json::from_slice(message)
        .map_err(|e| CoreError::decode("snmp-discovery", e.to_string()))?;

    let agent_id = if payload.agent_id.is_empty() { ctx.agent_id.clone() } else { payload.agent_id };
    let poller_id = if payload.poller_id.is_empty() { ctx.poller_id.clone() } else { payload.poller_id };

    let mut output = DecodeOutput::default();

    for device in &payload.devices {
        let device_type = classify_device_type(&device.hostname, &device.sys_descr, &device.sys_object_id);
        let update = DeviceUpdateBuilder::new(&ctx.partition, &device.ip, DiscoverySource::Mapper)
            .agent_id(agent_id.clone())
            .poller_id(poller_id.clone())
            .timestamp(ctx.timestamp)
            .mac(device.mac.clone())
            .hostname(if device.hostname.is_empty() { None } else { Some(device.hostname.clone()) })
            .metadata("device_type", device_type)
            .metadata("sys_descr", device.sys_descr.clone())
            .metadata("sys_object_id", device.sys_object_id.clone())
            .build();
        output.device_updates.push(update);
    }

    let mut by_device: HashMap<String, HashSet<String>> = HashMap::new();
    for iface in &payload.interfaces {
        let entry = by_device.entry(iface.device_ip.clone()).or_default();
        for ip in &iface.ip_addresses {
            if !is_loopback(ip) {
                entry.insert(ip.clone());
            }
        }

        output.interfaces.push(DiscoveredInterface {
            device_id: DeviceUpdate::provisional_id(&ctx.partition, &iface.device_ip),
            device_ip: iface.device_ip.clone(),
            if_index: iface.if_index,
            if_name: iface.if_name.clone(),
            ip_addresses: iface.ip_addresses.clone(),
        });
    }

    for (device_ip, ips) in by_device {
        let alternates: Vec<String> = ips.into_iter().filter(|ip| ip != &device_ip).collect();
        if alternates.is_empty() {
            continue;
        }

        let mut update = DeviceUpdateBuilder::new(&ctx.partition, &device_ip, DiscoverySource::Mapper)
            .agent_id(agent_id.clone())
            .poller_id(poller_id.clone())
            .timestamp(ctx.timestamp)
            .build();
        update.set_alternate_ips(&alternates);
        output.device_updates.push(update);
    }

    output.topology_events.extend(payload.topology);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext {
            poller_id: "poller1".to_string(),
            agent_id: "agent1".to_string(),
            partition: "default".to_string(),
            source_ip: "10.0.0.10".to_string(),
            timestamp: 1_700_000_000_000,
            service_name: "mapper".to_string(),
        }
    }

    #[test]
    fn decodes_devices_with_classification() {
        let payload = br#"{
            "devices": [{"ip": "10.0.0.1", "hostname": "usw-core", "sys_descr": "", "sys_object_id": ""}],
            "interfaces": [],
            "topology": []
        }"#;

        let output = decode(&ctx(), payload).unwrap();
        assert_eq!(output.device_updates.len(), 1);
        assert_eq!(
            output.device_updates[0].metadata.get("device_type").unwrap(),
            "switch"
        );
    }

    #[test]
    fn correlation_update_carries_alternate_ips_across_interfaces() {
        let payload = br#"{
            "devices": [],
            "interfaces": [
                {"device_ip": "10.0.0.1", "if_index": 1, "if_name": "eth0", "ip_addresses": ["10.0.0.1", "10.0.0.2"]},
                {"device_ip": "10.0.0.1", "if_index": 2, "if_name": "eth1", "ip_addresses": ["127.0.0.1"]}
            ],
            "topology": []
        }"#;

        let output = decode(&ctx(), payload).unwrap();
        assert_eq!(output.interfaces.len(), 2);

        let correlation = output
            .device_updates
            .iter()
            .find(|u| u.ip == "10.0.0.1")
            .unwrap();
        assert_eq!(correlation.alternate_ips(), vec!["10.0.0.2".to_string()]);
    }

    #[test]
    fn topology_events_pass_through() {
        let payload = br#"{
            "devices": [], "interfaces": [],
            "topology": [{
                "agent_id": "agent1", "poller_id": "poller1",
                "local_device_id": "default:10.0.0.1", "local_if_index": 1,
                "neighbor_device_id": "default:10.0.0.2", "neighbor_if_index": 2,
                "protocol": "lldp"
            }]
        }"#;

        let output = decode(&ctx(), payload).unwrap();
        assert_eq!(output.topology_events.len(), 1);
        assert_eq!(output.topology_events[0].protocol, "lldp");
    }
}
