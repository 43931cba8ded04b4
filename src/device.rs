//! Binding a user's sessions to the workstation they enrolled on.

use anyhow::{bail, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sysinfo::Networks;

/// MAC addresses of every interface with a real hardware address,
/// formatted `aa:bb:cc:dd:ee:ff`.
pub fn local_mac_addresses() -> Vec<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut macs: Vec<String> = networks
        .list()
        .values()
        .map(|data| data.mac_address())
        .filter(|mac| !mac.is_unspecified())
        .map(|mac| mac.to_string().to_ascii_lowercase())
        .collect();
    macs.sort();
    macs.dedup();
    macs
}

fn normalize(mac: &str) -> String {
    mac.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceBinding {
    pub enabled: bool,
    /// Any common notation; separators and case are ignored.
    pub registered_mac: Option<String>,
}

impl DeviceBinding {
    pub fn bound_to(mac: impl Into<String>) -> Self {
        Self {
            enabled: true,
            registered_mac: Some(mac.into()),
        }
    }

    /// Checks the binding against this machine's interfaces.
    pub fn verify(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.verify_against(&local_mac_addresses())
    }

    pub fn verify_against(&self, local_macs: &[String]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let Some(registered) = self.registered_mac.as_deref() else {
            bail!("device binding enabled but no MAC address is registered");
        };

        let wanted = normalize(registered);
        if wanted.is_empty() {
            bail!("registered MAC address {registered:?} is not valid");
        }

        if local_macs.iter().any(|mac| normalize(mac) == wanted) {
            info!("device binding verified ({registered})");
            Ok(())
        } else {
            warn!(
                "device binding failed: {registered} not among {} local interfaces",
                local_macs.len()
            );
            bail!("this workstation is not the device registered for the user")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macs() -> Vec<String> {
        vec!["3c:22:fb:01:02:03".to_string(), "a0:b1:c2:d3:e4:f5".to_string()]
    }

    #[test]
    fn disabled_binding_always_passes() {
        let binding = DeviceBinding::default();
        assert!(binding.verify_against(&[]).is_ok());
        assert!(binding.verify().is_ok());
    }

    #[test]
    fn matches_regardless_of_notation() {
        assert!(DeviceBinding::bound_to("A0-B1-C2-D3-E4-F5")
            .verify_against(&macs())
            .is_ok());
        assert!(DeviceBinding::bound_to("3c22fb010203")
            .verify_against(&macs())
            .is_ok());
    }

    #[test]
    fn foreign_mac_is_rejected() {
        let err = DeviceBinding::bound_to("00:11:22:33:44:55")
            .verify_against(&macs())
            .unwrap_err();
        assert!(err.to_string().contains("not the device registered"));
    }

    #[test]
    fn enabled_without_registration_fails() {
        let binding = DeviceBinding {
            enabled: true,
            registered_mac: None,
        };
        assert!(binding.verify_against(&macs()).is_err());
    }

    #[test]
    fn local_addresses_are_well_formed() {
        for mac in local_mac_addresses() {
            assert_eq!(normalize(&mac).len(), 12, "{mac}");
            assert_ne!(mac, "00:00:00:00:00:00");
        }
    }
}
