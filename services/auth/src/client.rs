//! Client metadata captured at login: browser, OS and rough location

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use ipnetwork::IpNetwork;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

pub const UNKNOWN: &str = "Unknown";
pub const INTRANET_IP: &str = "Intranet IP";

/// Caller facts the HTTP layer hands to the login pipeline
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Peers allowed to report the original client through `X-Forwarded-For`.
///
/// Entries are CIDR blocks or bare addresses, comma separated. Empty means
/// no proxy is trusted and the header is ignored.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Vec<IpNetwork>);

impl TrustedProxies {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                IpNetwork::from_str(entry)
                    .with_context(|| format!("invalid trusted proxy entry `{}`", entry))
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Self)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|network| network.contains(ip))
    }

    /// Resolve the caller address.
    ///
    /// The header is only read when the socket peer is trusted. Hops are
    /// walked right to left past further trusted proxies; the first other
    /// address is the client. Anything unparsable falls back to the peer.
    pub fn client_ip(&self, forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
        let Some(peer) = peer else {
            return UNKNOWN.to_string();
        };
        if !self.contains(peer) {
            return peer.to_string();
        }

        let mut client = peer;
        for hop in forwarded_for.unwrap_or_default().rsplit(',').map(str::trim) {
            match IpAddr::from_str(hop) {
                Ok(ip) => {
                    client = ip;
                    if !self.contains(ip) {
                        break;
                    }
                }
                Err(_) => {
                    if !hop.is_empty() && !hop.eq_ignore_ascii_case("unknown") {
                        warn!("Ignoring malformed X-Forwarded-For hop {:?}", hop);
                    }
                    return peer.to_string();
                }
            }
        }
        client.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: String,
    pub os: String,
}

/// Ordered: Edge and Opera carry a Chrome token, Chrome carries a Safari token
fn browser_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"Edg(?:e|A|iOS)?/(\d+)", "Edge"),
            (r"(?:OPR|Opera)/(\d+)", "Opera"),
            (r"Firefox/(\d+)", "Firefox"),
            (r"(?:Chrome|CriOS)/(\d+)", "Chrome"),
            (r"Version/(\d+)[^ ]* (?:Mobile/\S+ )?Safari/", "Safari"),
            (r"MSIE (\d+)", "Internet Explorer"),
            (r"Trident/.*rv:(\d+)", "Internet Explorer"),
        ]
        .into_iter()
        .map(|(pattern, name)| {
            (
                Regex::new(pattern).expect("Failed to compile browser regex"),
                name,
            )
        })
        .collect()
    })
}

fn os_name(user_agent: &str) -> &'static str {
    static WINDOWS: OnceLock<Regex> = OnceLock::new();
    let windows = WINDOWS.get_or_init(|| {
        Regex::new(r"Windows NT (\d+\.\d+)").expect("Failed to compile windows regex")
    });

    if let Some(caps) = windows.captures(user_agent) {
        return match &caps[1] {
            "10.0" => "Windows 10",
            "6.3" => "Windows 8.1",
            "6.2" => "Windows 8",
            "6.1" => "Windows 7",
            _ => "Windows",
        };
    }
    if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Mac OS X") {
        "Mac OS X"
    } else if user_agent.contains("CrOS") {
        "Chrome OS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        UNKNOWN
    }
}

impl UserAgentInfo {
    pub fn parse(user_agent: &str) -> Self {
        let browser = browser_patterns()
            .iter()
            .find_map(|(regex, name)| {
                regex
                    .captures(user_agent)
                    .map(|caps| format!("{} {}", name, &caps[1]))
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            browser,
            os: os_name(user_agent).to_string(),
        }
    }
}

/// Loopback, private, link-local and unique-local addresses
pub fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    pro: String,
    #[serde(default)]
    city: String,
}

/// Maps an IP to a coarse location label
#[derive(Clone)]
pub struct AddressResolver {
    lookup_url: Option<String>,
    client: reqwest::Client,
}

impl AddressResolver {
    pub fn new(lookup_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self { lookup_url, client })
    }

    /// Never fails; anything unresolvable is `Unknown`
    pub async fn resolve(&self, ip: &str) -> String {
        let Ok(addr) = IpAddr::from_str(ip.trim()) else {
            return UNKNOWN.to_string();
        };
        if is_internal_ip(&addr) {
            return INTRANET_IP.to_string();
        }
        let Some(url) = &self.lookup_url else {
            return UNKNOWN.to_string();
        };

        match self.lookup(url, ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!("Location lookup for {} failed: {}", ip, e);
                UNKNOWN.to_string()
            }
        }
    }

    async fn lookup(&self, url: &str, ip: &str) -> anyhow::Result<String> {
        let response: LookupResponse = self
            .client
            .get(url)
            .query(&[("ip", ip), ("json", "true")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let location = format!("{} {}", response.pro.trim(), response.city.trim());
        let location = location.trim();
        Ok(if location.is_empty() {
            UNKNOWN.to_string()
        } else {
            location.to_string()
        })
    }
}
