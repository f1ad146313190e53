//! Implementation of [Connector] for TCP.

use crate::probe::{Connector, ProbeError};

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Checks that an address completes a TCP handshake.
#[derive(Clone, Debug, Default)]
pub struct TcpConnector {}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: SocketAddr) -> Result<(), ProbeError> {
        // NOTE: We deliberately send nothing. Whatever protocol the backend
        // speaks, an accepted handshake is all we are checking for.
        let stream = TcpStream::connect(address).await?;
        drop(stream);
        Ok(())
    }
}
