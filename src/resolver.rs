use crate::error::{Error, Result};
use dns_lookup::{AddrInfo, AddrInfoHints, SockType};
use socket2::{Domain, Protocol, Type};
use std::net::SocketAddr;

/// One concrete address a connection attempt can be made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCandidate {
    pub domain: Domain,
    pub socket_type: Type,
    pub protocol: Option<Protocol>,
    pub addr: SocketAddr,
}

impl From<AddrInfo> for ConnectionCandidate {
    fn from(info: AddrInfo) -> Self {
        Self {
            domain: Domain::from(info.address),
            socket_type: Type::from(info.socktype),
            protocol: (info.protocol != 0).then(|| Protocol::from(info.protocol)),
            addr: info.sockaddr,
        }
    }
}

/// Resolves `host`/`service` into stream-socket candidates with the system
/// `getaddrinfo`, preserving its order. `service` is a port number or any
/// name from the system services database.
pub fn resolve(host: &str, service: &str) -> Result<impl Iterator<Item = ConnectionCandidate>> {
    let resolution_error = |reason: String| Error::Resolution {
        host: host.to_owned(),
        port: service.to_owned(),
        reason,
    };

    let hints = AddrInfoHints {
        socktype: SockType::Stream.into(),
        ..AddrInfoHints::default()
    };
    let mut candidates = dns_lookup::getaddrinfo(Some(host), Some(service), Some(hints))
        .map_err(|e| resolution_error(std::io::Error::from(e).to_string()))?
        .filter_map(|info| match info {
            Ok(info) => Some(ConnectionCandidate::from(info)),
            Err(e) => {
                log::warn!("skipping unusable address: {}", e);
                None
            }
        })
        .peekable();

    if candidates.peek().is_none() {
        return Err(resolution_error("no addresses found".to_owned()));
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ip_literal_with_numeric_port() {
        let candidates = resolve("127.0.0.1", "8080").unwrap().collect::<Vec<_>>();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(candidates[0].domain, Domain::IPV4);
        assert_eq!(candidates[0].socket_type, Type::STREAM);
    }

    #[test]
    fn service_names_come_from_the_system_database() {
        for (service, port) in [("domain", 53), ("finger", 79), ("whois", 43)] {
            let candidate = resolve("127.0.0.1", service).unwrap().next().unwrap();
            assert_eq!(candidate.addr.port(), port, "{}", service);
        }
    }

    #[test]
    fn unknown_service_is_resolution_error() {
        let Err(Error::Resolution { host, port, .. }) = resolve("127.0.0.1", "bogus-service")
        else {
            panic!("expected resolution error");
        };
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, "bogus-service");
    }

    #[test]
    fn unresolvable_host_is_resolution_error() {
        let result = resolve("host.invalid", "80");
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }
}
