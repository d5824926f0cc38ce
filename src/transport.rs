use crate::types::DeviceAddress;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens byte streams to a unit
///
/// The client owns one connector and asks it for a fresh stream on every
/// connect and reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by a successful connect
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Whether host names go through [`lookup`](Self::lookup) first
    ///
    /// When set, each attempt on a non-literal host reports
    /// `DnsLookup` followed by `DnsResolved` or `DnsFailed`.
    const LOOKS_UP_HOST: bool = false;

    /// Resolve the unit's host name
    async fn lookup(&self, address: &DeviceAddress) -> io::Result<Vec<SocketAddr>> {
        let resolved = tokio::net::lookup_host((address.host.as_str(), address.port)).await?;
        Ok(resolved.collect())
    }

    /// Open a stream to the unit at `address`
    ///
    /// `resolved` holds the lookup result, empty when no lookup ran.
    async fn connect(
        &self,
        address: &DeviceAddress,
        resolved: &[SocketAddr],
    ) -> io::Result<Self::Stream>;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    const LOOKS_UP_HOST: bool = true;

    async fn connect(
        &self,
        address: &DeviceAddress,
        resolved: &[SocketAddr],
    ) -> io::Result<TcpStream> {
        let stream = if resolved.is_empty() {
            tracing::debug!("Opening TCP connection to {}:{}", address.host, address.port);
            TcpStream::connect((address.host.as_str(), address.port)).await?
        } else {
            tracing::debug!("Opening TCP connection to {:?}", resolved);
            TcpStream::connect(resolved).await?
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;
    use tokio::net::TcpListener;

    fn address(host: &str, port: u16) -> DeviceAddress {
        DeviceAddress::new(host, port, DeviceId::new(1).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_resolves_localhost() {
        let resolved = TcpConnector.lookup(&address("localhost", 2202)).await.unwrap();
        assert!(!resolved.is_empty());
        assert!(resolved.iter().all(|a| a.port() == 2202 && a.ip().is_loopback()));
    }

    #[tokio::test]
    async fn test_connect_tries_resolved_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let resolved = [local];

        let target = address("unit.example", local.port());
        let (stream, accepted) = tokio::join!(
            TcpConnector.connect(&target, &resolved),
            listener.accept()
        );
        assert!(stream.unwrap().nodelay().unwrap());
        accepted.unwrap();
    }
}
