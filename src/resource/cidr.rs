//! IPv4 CIDR blocks for data-plane address checks.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing a CIDR literal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("missing '/' prefix length in {0:?}")]
    MissingPrefix(String),
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),
    #[error("invalid prefix length {0:?}")]
    InvalidPrefix(String),
}

/// An IPv4 network in `a.b.c.d/n` notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Build a CIDR from an address and prefix length (0-32)
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, CidrError> {
        if prefix_len > 32 {
            return Err(CidrError::InvalidPrefix(prefix_len.to_string()));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Const constructor for compile-time defaults; prefix lengths above 32 are clamped
    pub const fn from_parts(address: Ipv4Addr, prefix_len: u8) -> Self {
        let prefix_len = if prefix_len > 32 { 32 } else { prefix_len };
        Self {
            address,
            prefix_len,
        }
    }

    /// The address as written (host bits preserved)
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        }
    }

    /// Network address with host bits cleared
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & self.mask())
    }

    /// Whether `ip` falls inside this network
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.network())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::MissingPrefix(s.to_string()))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| CidrError::InvalidAddress(address.to_string()))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(prefix.to_string()))?;
        Self::new(address, prefix_len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len)
    }
}
