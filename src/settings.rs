//! Server-wide tunables (spec §6), grouped the way the teacher groups its
//! `DockerClientConfig`/`DockerResolverConfig` structs: a plain data struct
//! with a `Default` impl, constructed once and handed to the pieces that
//! need it.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Both,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub address: String,
    pub port: u16,
    pub transport: Transport,
    pub tcp_read_timeout: Duration,
    pub tcp_idle_timeout: Duration,
    /// Bounds the number of in-flight UDP datagrams dispatched concurrently
    /// (spec §7's worker-pool model). `1` serializes UDP handling entirely.
    pub worker_count: usize,
    pub udp_max_message_bytes: usize,
    /// Default `case_sensitive` for rules registered without an explicit
    /// override (spec §3).
    pub case_sensitive_default: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 9953,
            transport: Transport::Both,
            tcp_read_timeout: Duration::from_secs(5),
            tcp_idle_timeout: Duration::from_secs(30),
            worker_count: 1,
            udp_max_message_bytes: 512,
            case_sensitive_default: false,
        }
    }
}

impl Settings {
    /// Resolves `address:port` to a concrete [`SocketAddr`](std::net::SocketAddr).
    /// Tried first as a literal IP (the common case); falls back to a
    /// one-shot synchronous hostname lookup (e.g. `localhost`, the
    /// documented default) since this only ever runs once at bind time.
    pub fn socket_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        use std::net::ToSocketAddrs;

        if let Ok(ip) = self.address.parse::<std::net::IpAddr>() {
            return Ok(std::net::SocketAddr::new(ip, self.port));
        }

        (self.address.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} resolved to no addresses", self.address),
                )
            })
    }
}
