//! Device-type classification for SNMP-discovered devices.

/// Classify a discovered device from whatever identifying strings are
/// available. Priority order, first match wins:
///
/// 1. hostname patterns (`usw|unifi` → switch/switch_poe, `nano+hd|u6|u7` → wireless_ap)
/// 2. Ubiquiti `sys_descr` heuristics
/// 3. generic `sys_descr` keyword matches
/// 4. `sys_object_id` vendor prefixes
/// 5. `network_device` default
pub fn classify_device_type(hostname: &str, sys_descr: &str, sys_object_id: &str) -> &'static str {
    let hostname_lower = hostname.to_lowercase();
    let descr_lower = sys_descr.to_lowercase();

    if hostname_lower.contains("usw") || hostname_lower.contains("unifi") {
        return if hostname_lower.contains("poe") {
            "switch_poe"
        } else {
            "switch"
        };
    }

    if hostname_lower.contains("nanohd")
        || hostname_lower.contains("nano hd")
        || hostname_lower.contains("u6")
        || hostname_lower.contains("u7")
    {
        return "wireless_ap";
    }

    let is_ubiquiti = descr_lower.contains("ubiquiti") || descr_lower.contains("unifi");
    if is_ubiquiti {
        if descr_lower.contains("switch") {
            return "switch";
        }
        if descr_lower.contains("access point") || descr_lower.contains("wireless") {
            return "wireless_ap";
        }
        if descr_lower.contains("gateway") || descr_lower.contains("router") {
            return "router";
        }
    }

    if descr_lower.contains("switch") {
        return "switch";
    }
    if descr_lower.contains("router") {
        return "router";
    }
    if descr_lower.contains("access point") || descr_lower.contains("wireless") {
        return "wireless_ap";
    }
    if descr_lower.contains("firewall") {
        return "firewall";
    }
    if descr_lower.contains("server") {
        return "server";
    }
    if descr_lower.contains("linux") {
        return "linux_host";
    }
    if descr_lower.contains("windows") {
        return "windows_host";
    }
    if descr_lower.contains("host") {
        return "host";
    }

    if sys_object_id.starts_with("1.3.6.1.4.1.9") {
        return "cisco_device";
    }
    if sys_object_id.contains(".11") {
        return "hp_device";
    }
    if sys_object_id.contains(".41112") {
        return "ubiquiti_device";
    }

    "network_device"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_unifi_switch() {
        assert_eq!(classify_device_type("usw-24-poe", "", ""), "switch_poe");
        assert_eq!(classify_device_type("usw-lite-8", "", ""), "switch");
    }

    #[test]
    fn hostname_wireless_ap() {
        assert_eq!(classify_device_type("u6-lr-01", "", ""), "wireless_ap");
        assert_eq!(classify_device_type("nanohd-office", "", ""), "wireless_ap");
    }

    #[test]
    fn ubiquiti_sys_descr_switch() {
        assert_eq!(
            classify_device_type("device01", "UniFi Switch 24", ""),
            "switch"
        );
    }

    #[test]
    fn generic_sys_descr_router() {
        assert_eq!(
            classify_device_type("router01", "Generic Router firmware v1", ""),
            "router"
        );
    }

    #[test]
    fn sys_object_id_cisco() {
        assert_eq!(
            classify_device_type("", "", "1.3.6.1.4.1.9.1.1"),
            "cisco_device"
        );
    }

    #[test]
    fn default_is_network_device() {
        assert_eq!(classify_device_type("", "", ""), "network_device");
    }

    #[test]
    fn priority_hostname_beats_sys_descr() {
        // hostname pattern matches first even though sys_descr says router.
        assert_eq!(
            classify_device_type("usw-core", "Acme Router 9000", ""),
            "switch"
        );
    }
}
