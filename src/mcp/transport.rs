use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::mcp::{
    errors::{MCPError, MCPResult, ProtocolError, TransportError},
    protocol::{MCPMessage, MessageParser},
};

#[async_trait]
pub trait MCPTransport: Send + Sync {
    async fn send(&mut self, message: MCPMessage) -> MCPResult<()>;

    /// Next inbound message. A line that fails to parse is returned as an
    /// `Err` protocol error so the server can answer it; a closed input is
    /// a transport error.
    async fn receive(&mut self) -> MCPResult<MCPMessage>;

    async fn close(&mut self) -> MCPResult<()>;

    fn is_connected(&self) -> bool;
}

/// Newline-delimited JSON-RPC over a byte stream pair, normally stdin/stdout
///
/// `is_connected` tracks the output side; end of input shows up as
/// [`TransportError::Closed`] from `receive` once queued lines are consumed.
pub struct StdioTransport {
    sender: Option<mpsc::UnboundedSender<MCPMessage>>,
    receiver: mpsc::UnboundedReceiver<MCPResult<MCPMessage>>,
    writer: Option<JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }

    pub fn with_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let is_connected = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(writer, outbound_rx, is_connected.clone()));
        tokio::spawn(read_loop(reader, inbound_tx));

        Self {
            sender: Some(outbound_tx),
            receiver: inbound_rx,
            writer: Some(writer),
            is_connected,
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<MCPMessage>,
    is_connected: Arc<AtomicBool>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(message) = outbound.recv().await {
        let mut line = match MessageParser::serialize_message(&message) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = write_line(&mut writer, &line).await {
            error!("Failed to write to output: {}", e);
            is_connected.store(false, Ordering::SeqCst);
            break;
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}

async fn read_loop<R>(reader: R, inbound: mpsc::UnboundedSender<MCPResult<MCPMessage>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => {
                debug!("Input closed");
                break;
            }
            Ok(_) => {
                let parsed = match decode_line(&buffer) {
                    Some(parsed) => parsed,
                    None => continue,
                };
                if let Err(e) = &parsed {
                    warn!("Rejected inbound message: {}", e);
                }
                if inbound.send(parsed).is_err() {
                    debug!("Receiver dropped, closing input");
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        }
    }
}

/// Parse one raw input line. Blank lines yield `None`; bytes that are not
/// UTF-8 are a parse error like malformed JSON.
fn decode_line(raw: &[u8]) -> Option<MCPResult<MCPMessage>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            return Some(Err(MCPError::Protocol(ProtocolError::ParseError(format!(
                "input is not valid UTF-8: {}",
                e
            )))));
        }
    };
    if line.is_empty() {
        return None;
    }
    Some(MessageParser::parse_message(line.as_bytes()))
}

#[async_trait]
impl MCPTransport for StdioTransport {
    async fn send(&mut self, message: MCPMessage) -> MCPResult<()> {
        let sender = match &self.sender {
            Some(sender) if self.is_connected() => sender,
            _ => return Err(MCPError::Transport(TransportError::Closed)),
        };

        sender.send(message).map_err(|_| {
            MCPError::Transport(TransportError::ConnectionLost(
                "output channel closed".to_string(),
            ))
        })
    }

    async fn receive(&mut self) -> MCPResult<MCPMessage> {
        match self.receiver.recv().await {
            Some(parsed) => parsed,
            None => Err(MCPError::Transport(TransportError::Closed)),
        }
    }

    /// Stop accepting messages and wait until queued output is written
    async fn close(&mut self) -> MCPResult<()> {
        self.sender.take();
        if let Some(writer) = self.writer.take() {
            writer.await.map_err(|e| {
                MCPError::Transport(TransportError::ConnectionLost(e.to_string()))
            })?;
        }
        self.is_connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lines_in_and_out() {
        let (mut client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, mut client_out) = tokio::io::duplex(4096);
        let mut transport = StdioTransport::with_io(server_in, server_out);

        client_in
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\nnot json\n")
            .await
            .unwrap();

        let first = transport.receive().await.unwrap();
        assert_eq!(first.method.as_deref(), Some("ping"));

        let second = transport.receive().await;
        assert!(matches!(
            second,
            Err(MCPError::Protocol(ProtocolError::ParseError(_)))
        ));

        transport
            .send(MCPMessage::response(json!(1), json!({})))
            .await
            .unwrap();

        let mut line = String::new();
        BufReader::new(&mut client_out)
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_the_session() {
        let (mut client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, _client_out) = tokio::io::duplex(4096);
        let mut transport = StdioTransport::with_io(server_in, server_out);

        client_in.write_all(b"\xff\xfe{}\n").await.unwrap();
        client_in
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .await
            .unwrap();

        assert!(matches!(
            transport.receive().await,
            Err(MCPError::Protocol(ProtocolError::ParseError(_)))
        ));
        let next = transport.receive().await.unwrap();
        assert_eq!(next.method.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn test_closed_input_ends_receive() {
        let (client_in, server_in) = tokio::io::duplex(64);
        let (server_out, _client_out) = tokio::io::duplex(64);
        let mut transport = StdioTransport::with_io(server_in, server_out);

        drop(client_in);
        assert!(matches!(
            transport.receive().await,
            Err(MCPError::Transport(TransportError::Closed))
        ));
    }
}
