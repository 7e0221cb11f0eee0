use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// CIDR block that callers must claim an address in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix: u8,
}

impl TrustedSubnet {
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for TrustedSubnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in CIDR notation", s))?;
        let network: IpAddr = addr
            .parse()
            .map_err(|e| format!("invalid network address '{}': {}", addr, e))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| format!("invalid prefix length '{}': {}", prefix, e))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(format!("prefix /{} exceeds /{}", prefix, max));
        }
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
