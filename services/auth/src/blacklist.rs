//! Login IP blacklist
//!
//! Entries are separated by commas, semicolons or newlines. Each entry is an
//! exact address, a dotted pattern with `*` segments (`10.1.*.*`), a CIDR
//! block (`10.0.0.0/8`, `fd00::/8`) or an IPv4 range (`10.0.0.1-10.0.0.9`).

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use common::cache::CacheStore;
use ipnetwork::IpNetwork;
use tracing::warn;

use crate::error::AuthResult;

/// Store key an administrator can write to override the configured list
pub const BLACKLIST_CONFIG_KEY: &str = "sys_config:sys.login.blackIPList";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Exact(IpAddr),
    Wildcard(Vec<String>),
    Network(IpNetwork),
    Range(Ipv4Addr, Ipv4Addr),
}

impl Entry {
    fn parse(raw: &str) -> Option<Self> {
        if let Ok(ip) = IpAddr::from_str(raw) {
            return Some(Entry::Exact(ip));
        }
        if raw.contains('/') {
            return IpNetwork::from_str(raw).ok().map(Entry::Network);
        }
        if let Some((start, end)) = raw.split_once('-') {
            let start = Ipv4Addr::from_str(start.trim()).ok()?;
            let end = Ipv4Addr::from_str(end.trim()).ok()?;
            return (start <= end).then_some(Entry::Range(start, end));
        }
        if raw.contains('*') {
            let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
            let well_formed = segments
                .iter()
                .all(|s| s == "*" || s.parse::<u8>().is_ok());
            return (well_formed && segments.len() <= 4).then_some(Entry::Wildcard(segments));
        }
        None
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (Entry::Exact(blocked), ip) => *blocked == ip,
            (Entry::Network(network), ip) => network.contains(ip),
            (Entry::Range(start, end), IpAddr::V4(v4)) => *start <= v4 && v4 <= *end,
            (Entry::Wildcard(pattern), IpAddr::V4(v4)) => {
                let octets: Vec<String> = v4.octets().iter().map(u8::to_string).collect();
                wildcard_matches(pattern, &octets)
            }
            _ => false,
        }
    }
}

/// `10.1.*` matches any address under 10.1; `10.*.0.1` fixes the outer octets
fn wildcard_matches(pattern: &[String], octets: &[String]) -> bool {
    let positional = pattern
        .iter()
        .zip(octets)
        .all(|(p, o)| p == "*" || p == o);
    positional && (pattern.len() == octets.len() || pattern.last().is_some_and(|p| p == "*"))
}

#[derive(Debug, Clone, Default)]
pub struct IpBlacklist {
    entries: Vec<Entry>,
}

impl IpBlacklist {
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split([',', ';', '\n', '\r'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                let entry = Entry::parse(s);
                if entry.is_none() {
                    warn!("Ignoring malformed blacklist entry {:?}", s);
                }
                entry
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, ip: &str) -> bool {
        match IpAddr::from_str(ip.trim()) {
            Ok(ip) => self.entries.iter().any(|entry| entry.matches(ip)),
            Err(_) => false,
        }
    }
}

/// Reads the current blacklist on every check so edits apply immediately
#[derive(Clone)]
pub struct BlacklistSource {
    store: Arc<dyn CacheStore>,
    fallback: String,
}

impl BlacklistSource {
    pub fn new(store: Arc<dyn CacheStore>, fallback: &str) -> Self {
        Self {
            store,
            fallback: fallback.to_string(),
        }
    }

    pub async fn current(&self) -> AuthResult<IpBlacklist> {
        let raw = self.store.get(BLACKLIST_CONFIG_KEY).await?;
        Ok(IpBlacklist::parse(raw.as_deref().unwrap_or(&self.fallback)))
    }
}
