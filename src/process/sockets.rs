//! Socket table enumeration.
//!
//! Reads the OS socket table through `netstat2` and reduces every entry to a
//! `RawSocket`: the local/remote endpoints, the TCP state and the pids the OS
//! associates with the socket. No process metadata is resolved here.

use std::net::IpAddr;

use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, TcpState};

use crate::binding::{ConnectionState, Protocol};
use crate::error::ScanError;

/// One entry of the OS socket table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocket {
    pub protocol: Protocol,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote: Option<(IpAddr, u16)>,
    pub state: ConnectionState,
    /// Owning pids as reported by the OS; may be empty when ownership is
    /// hidden (insufficient privilege) or the owner already exited.
    pub pids: Vec<u32>,
}

impl RawSocket {
    /// `ip:port` rendering of the local endpoint (IPv6 in brackets).
    pub fn local_endpoint(&self) -> String {
        format_endpoint(&self.local_addr, self.local_port)
    }

    /// `ip:port` of the peer; empty when unconnected.
    pub fn remote_endpoint(&self) -> String {
        match &self.remote {
            Some((addr, port)) if !addr.is_unspecified() && *port != 0 => {
                format_endpoint(addr, *port)
            }
            _ => String::new(),
        }
    }
}

fn format_endpoint(addr: &IpAddr, port: u16) -> String {
    match addr {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

/// Source of the current socket table.
pub trait SocketSource: Send + Sync {
    /// Enumerates all inet sockets at this instant. Failing here fails the
    /// whole cycle.
    fn enumerate(&self) -> Result<Vec<RawSocket>, ScanError>;
}

/// `SocketSource` backed by the `netstat2` crate (IPv4 + IPv6, TCP + UDP).
#[derive(Debug, Default, Clone, Copy)]
pub struct NetstatSocketSource;

impl SocketSource for NetstatSocketSource {
    fn enumerate(&self) -> Result<Vec<RawSocket>, ScanError> {
        let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let proto_flags = ProtocolFlags::TCP | ProtocolFlags::UDP;

        let sockets = get_sockets_info(af_flags, proto_flags)
            .map_err(|e| ScanError::EnumerationFailure(e.to_string()))?;

        let raw = sockets
            .into_iter()
            .map(|socket| match socket.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp) => RawSocket {
                    protocol: Protocol::Tcp,
                    local_addr: tcp.local_addr,
                    local_port: tcp.local_port,
                    remote: Some((tcp.remote_addr, tcp.remote_port)),
                    state: map_tcp_state(&tcp.state),
                    pids: socket.associated_pids,
                },
                ProtocolSocketInfo::Udp(udp) => RawSocket {
                    protocol: Protocol::Udp,
                    local_addr: udp.local_addr,
                    local_port: udp.local_port,
                    remote: None,
                    state: ConnectionState::None,
                    pids: socket.associated_pids,
                },
            })
            .collect();

        Ok(raw)
    }
}

fn map_tcp_state(state: &TcpState) -> ConnectionState {
    match state {
        TcpState::Closed => ConnectionState::Closed,
        TcpState::Listen => ConnectionState::Listen,
        TcpState::SynSent => ConnectionState::SynSent,
        TcpState::SynReceived => ConnectionState::SynReceived,
        TcpState::Established => ConnectionState::Established,
        TcpState::FinWait1 => ConnectionState::FinWait1,
        TcpState::FinWait2 => ConnectionState::FinWait2,
        TcpState::CloseWait => ConnectionState::CloseWait,
        TcpState::Closing => ConnectionState::Closing,
        TcpState::LastAck => ConnectionState::LastAck,
        TcpState::TimeWait => ConnectionState::TimeWait,
        TcpState::DeleteTcb => ConnectionState::DeleteTcb,
        TcpState::Unknown => ConnectionState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_endpoint_formatting() {
        let sock = RawSocket {
            protocol: Protocol::Tcp,
            local_addr: IpAddr::V6(Ipv6Addr::LOCALHOST),
            local_port: 8080,
            remote: Some((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)),
            state: ConnectionState::Listen,
            pids: vec![42],
        };
        assert_eq!(sock.local_endpoint(), "[::1]:8080");
        assert_eq!(sock.remote_endpoint(), "");
    }

    #[test]
    fn test_remote_endpoint_connected() {
        let sock = RawSocket {
            protocol: Protocol::Tcp,
            local_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: 51000,
            remote: Some((IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 443)),
            state: ConnectionState::Established,
            pids: vec![],
        };
        assert_eq!(sock.remote_endpoint(), "10.0.0.7:443");
    }
}
