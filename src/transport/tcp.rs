//! TCP SCPI transport.
//!
//! Talks to the instrument's raw SCPI socket (port 5025 on most TCP
//! instruments). Commands go out newline-terminated; replies are read up to
//! the newline. Every operation is wrapped in `tokio::time::timeout` so
//! nothing here can block indefinitely.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{
    truncated, ScpiTransport, TransportConnector, TransportTimeouts, WireDirection, WireTap,
};
use crate::config::SweepConfig;
use crate::error::VnaError;

/// Line terminator appended to every outbound command.
const TERMINATOR: &str = "\n";

/// SCPI transport over a raw TCP socket.
pub struct TcpTransport {
    stream: BufReader<TcpStream>,
    timeouts: TransportTimeouts,
    tap: Option<WireTap>,
}

impl TcpTransport {
    /// Connect to `host:port` within the configured connect timeout.
    pub async fn open(
        host: &str,
        port: u16,
        timeouts: TransportTimeouts,
        tap: Option<WireTap>,
    ) -> Result<Self, VnaError> {
        let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                VnaError::Connection(format!(
                    "Host {host}:{port} not reachable within {:?}",
                    timeouts.connect
                ))
            })?
            .map_err(|err| VnaError::Connection(format!("Failed to connect to {host}:{port}: {err}")))?;
        // Command/reply exchanges are tiny; don't let Nagle delay them.
        let _ = stream.set_nodelay(true);

        Ok(Self {
            stream: BufReader::new(stream),
            timeouts,
            tap,
        })
    }

    fn tap(&self, direction: WireDirection, text: &str) {
        if let Some(tap) = &self.tap {
            tap(direction, truncated(text));
        }
    }

    async fn write_command(&mut self, command: &str) -> Result<(), VnaError> {
        let framed = format!("{command}{TERMINATOR}");
        tokio::time::timeout(
            self.timeouts.write,
            self.stream.get_mut().write_all(framed.as_bytes()),
        )
        .await
        .map_err(|_| VnaError::Timeout(self.timeouts.write))?
        .map_err(|err| VnaError::Connection(format!("Write failed: {err}")))?;
        self.tap(WireDirection::Tx, command);
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<String, VnaError> {
        let mut line = String::new();
        let read = tokio::time::timeout(self.timeouts.read, self.stream.read_line(&mut line))
            .await
            .map_err(|_| VnaError::Timeout(self.timeouts.read))?
            .map_err(|err| VnaError::Connection(format!("Read failed: {err}")))?;
        if read == 0 {
            return Err(VnaError::Connection(
                "Connection closed by instrument".into(),
            ));
        }
        let reply = line.trim_end_matches(['\r', '\n']).to_string();
        self.tap(WireDirection::Rx, &reply);
        Ok(reply)
    }
}

#[async_trait]
impl ScpiTransport for TcpTransport {
    async fn send(&mut self, command: &str) -> Result<(), VnaError> {
        self.write_command(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String, VnaError> {
        self.write_command(command).await?;
        self.read_reply().await
    }

    async fn close(&mut self) -> Result<(), VnaError> {
        self.stream
            .get_mut()
            .shutdown()
            .await
            .map_err(|err| VnaError::Connection(format!("Close failed: {err}")))
    }
}

/// Default connector: dials the raw SCPI socket named in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    /// Timeouts applied to the opened transport.
    pub timeouts: TransportTimeouts,
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(
        &self,
        config: &SweepConfig,
        tap: Option<WireTap>,
    ) -> Result<Box<dyn ScpiTransport>, VnaError> {
        let transport = TcpTransport::open(&config.host, config.scpi_port, self.timeouts, tap).await?;
        Ok(Box::new(transport))
    }
}
