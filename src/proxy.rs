//! Proxy security policy
//!
//! Requests served in a relay role are classified by origin and passkey
//! before the per-file keystamp check runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Proxy permissiveness, ordered from strictest to most open
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ProxyModeRepr", into = "String")]
#[repr(u8)]
pub enum ProxyMode {
    /// No proxied requests allowed
    Disabled = 1,
    /// Local networks with passkey
    LocalNetworksProtected = 2,
    /// Any request from local networks
    LocalNetworksOpen = 3,
    /// Any network with passkey (not recommended)
    AllNetworksProtected = 4,
    /// Any request from any network (very not recommended)
    AllNetworksOpen = 5,
}

impl Default for ProxyMode {
    fn default() -> Self {
        ProxyMode::Disabled
    }
}

impl ProxyMode {
    pub const MIN: u8 = ProxyMode::Disabled as u8;
    pub const MAX: u8 = ProxyMode::AllNetworksOpen as u8;

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Disabled => "disabled",
            ProxyMode::LocalNetworksProtected => "local_networks_protected",
            ProxyMode::LocalNetworksOpen => "local_networks_open",
            ProxyMode::AllNetworksProtected => "all_networks_protected",
            ProxyMode::AllNetworksOpen => "all_networks_open",
        }
    }

    /// Human readable description for logs
    pub fn description(&self) -> &'static str {
        match self {
            ProxyMode::Disabled => "disabled",
            ProxyMode::LocalNetworksProtected => "local networks with passkey",
            ProxyMode::LocalNetworksOpen => "open for local networks",
            ProxyMode::AllNetworksProtected => "all networks with passkey",
            ProxyMode::AllNetworksOpen => "open for all networks",
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ProxyMode {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(ProxyMode::Disabled),
            2 => Ok(ProxyMode::LocalNetworksProtected),
            3 => Ok(ProxyMode::LocalNetworksOpen),
            4 => Ok(ProxyMode::AllNetworksProtected),
            5 => Ok(ProxyMode::AllNetworksOpen),
            _ => Err(format!(
                "Proxy mode {} out of range {}..={}",
                level,
                ProxyMode::MIN,
                ProxyMode::MAX
            )),
        }
    }
}

impl FromStr for ProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = s.trim().parse::<u8>() {
            return ProxyMode::try_from(level);
        }
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "disabled" => Ok(ProxyMode::Disabled),
            "local_networks_protected" => Ok(ProxyMode::LocalNetworksProtected),
            "local_networks_open" => Ok(ProxyMode::LocalNetworksOpen),
            "all_networks_protected" => Ok(ProxyMode::AllNetworksProtected),
            "all_networks_open" => Ok(ProxyMode::AllNetworksOpen),
            _ => Err(format!("Unknown proxy mode: {}", s)),
        }
    }
}

impl From<ProxyMode> for String {
    fn from(mode: ProxyMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Config files may give the mode by name or by level
#[derive(Deserialize)]
#[serde(untagged)]
enum ProxyModeRepr {
    Level(u8),
    Name(String),
}

impl TryFrom<ProxyModeRepr> for ProxyMode {
    type Error = String;

    fn try_from(repr: ProxyModeRepr) -> Result<Self, Self::Error> {
        match repr {
            ProxyModeRepr::Level(level) => ProxyMode::try_from(level),
            ProxyModeRepr::Name(name) => name.parse(),
        }
    }
}

/// Outcome of the proxy policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyDecision {
    Reject,
    RequirePasskeyNotSatisfied,
    Allow,
}

pub fn classify(origin_is_local: bool, has_passkey: bool, mode: ProxyMode) -> ProxyDecision {
    match mode {
        ProxyMode::Disabled => ProxyDecision::Reject,
        ProxyMode::LocalNetworksProtected => match (origin_is_local, has_passkey) {
            (true, true) => ProxyDecision::Allow,
            (true, false) => ProxyDecision::RequirePasskeyNotSatisfied,
            (false, _) => ProxyDecision::Reject,
        },
        ProxyMode::LocalNetworksOpen => {
            if origin_is_local {
                ProxyDecision::Allow
            } else {
                ProxyDecision::Reject
            }
        }
        ProxyMode::AllNetworksProtected => {
            if has_passkey {
                ProxyDecision::Allow
            } else {
                ProxyDecision::RequirePasskeyNotSatisfied
            }
        }
        ProxyMode::AllNetworksOpen => ProxyDecision::Allow,
    }
}

/// Whether an address belongs to a loopback, private or link-local network
pub fn is_local_origin(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_local_v4(v4);
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
                || v6 == Ipv6Addr::UNSPECIFIED
        }
    }
}

fn is_local_v4(v4: Ipv4Addr) -> bool {
    v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProxyDecision::*;

    #[test]
    fn test_modes_are_ordered() {
        assert!(ProxyMode::Disabled < ProxyMode::LocalNetworksProtected);
        assert!(ProxyMode::LocalNetworksProtected < ProxyMode::LocalNetworksOpen);
        assert!(ProxyMode::LocalNetworksOpen < ProxyMode::AllNetworksProtected);
        assert!(ProxyMode::AllNetworksProtected < ProxyMode::AllNetworksOpen);
        assert_eq!(ProxyMode::default(), ProxyMode::Disabled);
    }

    #[test]
    fn test_classify() {
        // (local, passkey) for each mode
        let table = [
            (ProxyMode::Disabled, [Reject, Reject, Reject, Reject]),
            (
                ProxyMode::LocalNetworksProtected,
                [Allow, RequirePasskeyNotSatisfied, Reject, Reject],
            ),
            (ProxyMode::LocalNetworksOpen, [Allow, Allow, Reject, Reject]),
            (
                ProxyMode::AllNetworksProtected,
                [Allow, RequirePasskeyNotSatisfied, Allow, RequirePasskeyNotSatisfied],
            ),
            (ProxyMode::AllNetworksOpen, [Allow, Allow, Allow, Allow]),
        ];
        let inputs = [(true, true), (true, false), (false, true), (false, false)];

        for (mode, expected) in table {
            for ((local, passkey), want) in inputs.iter().zip(expected) {
                assert_eq!(classify(*local, *passkey, mode), want, "{:?} {} {}", mode, local, passkey);
            }
        }
    }

    #[test]
    fn test_parse_proxy_mode() {
        assert_eq!("disabled".parse::<ProxyMode>().unwrap(), ProxyMode::Disabled);
        assert_eq!("Local-Networks-Open".parse::<ProxyMode>().unwrap(), ProxyMode::LocalNetworksOpen);
        assert_eq!("4".parse::<ProxyMode>().unwrap(), ProxyMode::AllNetworksProtected);
        assert!("0".parse::<ProxyMode>().is_err());
        assert!("6".parse::<ProxyMode>().is_err());
        assert!("wide_open".parse::<ProxyMode>().is_err());
        assert_eq!(ProxyMode::AllNetworksOpen.to_string(), "all_networks_open");
        assert_eq!(ProxyMode::LocalNetworksProtected.description(), "local networks with passkey");
    }

    #[test]
    fn test_deserialize_proxy_mode() {
        let mode: ProxyMode = serde_yaml::from_str("3").unwrap();
        assert_eq!(mode, ProxyMode::LocalNetworksOpen);
        let mode: ProxyMode = serde_yaml::from_str("all_networks_protected").unwrap();
        assert_eq!(mode, ProxyMode::AllNetworksProtected);
        assert!(serde_yaml::from_str::<ProxyMode>("9").is_err());
        assert_eq!(serde_yaml::to_string(&ProxyMode::Disabled).unwrap().trim(), "disabled");
    }

    #[test]
    fn test_is_local_origin() {
        for local in ["127.0.0.1", "10.1.2.3", "172.16.0.9", "192.168.1.1", "169.254.0.1", "::1", "fd00::1", "fe80::1", "::ffff:192.168.0.1"] {
            assert!(is_local_origin(local.parse().unwrap()), "{}", local);
        }
        for remote in ["8.8.8.8", "172.32.0.1", "2001:db8::1", "::ffff:1.1.1.1"] {
            assert!(!is_local_origin(remote.parse().unwrap()), "{}", remote);
        }
    }
}
