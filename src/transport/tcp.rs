//! Plain TCP transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::packet::Packet;

use super::codec::StanzaCodec;
use super::{Connector, PacketReader, PacketWriter, Transport, TransportInfo};

/// Connects over plain TCP. Negotiates neither TLS nor compression; both
/// are reported as absent in [`TransportInfo`].
#[derive(Debug, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Transport, TransportError> {
        let address = format!("{}:{}", config.host, config.port);

        debug!(address = %address, "opening TCP transport");

        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        let (read_half, write_half) = stream.into_split();

        Ok(Transport {
            reader: Box::new(TcpReader {
                inner: FramedRead::new(read_half, StanzaCodec::new()),
            }),
            writer: Box::new(TcpWriter {
                inner: FramedWrite::new(write_half, StanzaCodec::new()),
            }),
            info: TransportInfo {
                peer: address,
                secure: false,
                compressed: false,
            },
        })
    }
}

struct TcpReader {
    inner: FramedRead<OwnedReadHalf, StanzaCodec>,
}

#[async_trait]
impl PacketReader for TcpReader {
    async fn read_packet(&mut self) -> Result<Option<Packet>, TransportError> {
        self.inner.next().await.transpose()
    }
}

struct TcpWriter {
    inner: FramedWrite<OwnedWriteHalf, StanzaCodec>,
}

#[async_trait]
impl PacketWriter for TcpWriter {
    async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        self.inner.send(packet).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<&Packet>::close(&mut self.inner).await
    }
}
