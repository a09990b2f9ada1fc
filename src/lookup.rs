use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use trust_dns_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, RData, RecordType};

use crate::error::{Error, Result};

/// What the `info` and `scan` commands report about an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub ip: IpAddr,
    pub host_name: Option<String>,
}

impl HostReport {
    /// The address is considered reachable when its reverse lookup resolved.
    pub fn is_reachable(&self) -> bool {
        self.host_name.is_some()
    }
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IP Address: {}", self.ip)?;
        writeln!(f, "Host Name: {}", self.host_name.as_deref().unwrap_or("Not found"))?;
        write!(f, "Is Reachable: {}", if self.is_reachable() { "Yes" } else { "No" })
    }
}

/// Reverse (PTR) lookups against a single nameserver over UDP.
pub struct HostLookup {
    nameserver: SocketAddr,
    timeout: Duration,
}

impl HostLookup {
    pub fn new(nameserver: &str, timeout: Duration) -> Result<Self> {
        let nameserver = nameserver
            .parse::<SocketAddr>()
            .map_err(|e| Error::Lookup(format!("bad nameserver address '{}': {}", nameserver, e)))?;
        Ok(HostLookup { nameserver, timeout })
    }

    pub fn report(&self, ip: IpAddr) -> Result<HostReport> {
        let host_name = self.reverse_lookup(ip)?;
        Ok(HostReport { ip, host_name })
    }

    /// Text the `scan` command forwards: the report, or `Error: ...` when the
    /// address is invalid or the lookup fails.
    pub fn scan_message(&self, ip: &str) -> String {
        let report = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| Error::Lookup(format!("'{}' is not an IP address: {}", ip.trim(), e)))
            .and_then(|ip| self.report(ip));
        match report {
            Ok(report) => report.to_string(),
            Err(e) => {
                warn!("Lookup of {} failed: {}", ip, e);
                format!("Error: {}", e)
            }
        }
    }

    pub fn reverse_lookup(&self, ip: IpAddr) -> Result<Option<String>> {
        let id = query_id();
        let query = ptr_query(ip, id)?;

        let local = if self.nameserver.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        let bind_addr = SocketAddr::new(local, 0);
        let socket = UdpSocket::bind(bind_addr).map_err(io_error)?;
        socket.set_read_timeout(Some(self.timeout)).map_err(io_error)?;
        socket.send_to(&query, self.nameserver).map_err(io_error)?;
        debug!("PTR query {} for {} sent to {}", id, ip, self.nameserver);

        let mut buffer = [0u8; 4096];
        let (len, _) = socket.recv_from(&mut buffer).map_err(io_error)?;
        parse_ptr_response(&buffer[..len], id)
    }
}

fn io_error(e: std::io::Error) -> Error {
    Error::Lookup(e.to_string())
}

fn query_id() -> u16 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos ^ std::process::id()) as u16
}

/// `in-addr.arpa.` / `ip6.arpa.` name for an address.
pub fn reverse_name(ip: IpAddr) -> Result<Name> {
    let name = match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(72);
            for byte in v6.octets().iter().rev() {
                name.push_str(&format!("{:x}.{:x}.", byte & 0x0f, byte >> 4));
            }
            name.push_str("ip6.arpa.");
            name
        }
    };
    Name::from_ascii(&name).map_err(|e| Error::Lookup(e.to_string()))
}

pub fn ptr_query(ip: IpAddr, id: u16) -> Result<Vec<u8>> {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(reverse_name(ip)?, RecordType::PTR));
    message.to_vec().map_err(|e| Error::Lookup(e.to_string()))
}

/// First PTR answer, trailing dot trimmed. NXDOMAIN is a clean "not found".
pub fn parse_ptr_response(bytes: &[u8], id: u16) -> Result<Option<String>> {
    let message = Message::from_vec(bytes).map_err(|e| Error::Lookup(e.to_string()))?;
    if message.id() != id || message.message_type() != MessageType::Response {
        return Err(Error::Lookup(format!("unexpected DNS message (id {})", message.id())));
    }

    match message.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => return Ok(None),
        code => return Err(Error::Lookup(format!("nameserver answered {}", code))),
    }

    let host = message.answers().iter().find_map(|record| match record.data() {
        Some(RData::PTR(ptr)) => Some(ptr.0.to_string().trim_end_matches('.').to_string()),
        _ => None,
    });
    Ok(host)
}
