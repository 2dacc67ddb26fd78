//! MCP Transport Layer
//!
//! Line-delimited JSON-RPC over any async reader/writer pair; stdio in
//! production, in-memory buffers in tests.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// One line read from the client
#[derive(Debug)]
pub enum Incoming {
    Request(JsonRpcRequest),
    /// Line that is not a JSON-RPC request
    Malformed(serde_json::Error),
    /// Blank line
    Empty,
}

pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next line; `None` at end of input
    pub async fn read(&mut self) -> io::Result<Option<Incoming>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let line = line.trim();
        if line.is_empty() {
            return Ok(Some(Incoming::Empty));
        }

        Ok(Some(match serde_json::from_str(line) {
            Ok(request) => Incoming::Request(request),
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC request: {}", e);
                Incoming::Malformed(e)
            }
        }))
    }

    /// Write one response line and flush
    pub async fn write(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_requests_blank_and_malformed_lines() {
        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\nnot json\n";
        let mut transport = LineTransport::new(input, Vec::new());

        match transport.read().await.unwrap() {
            Some(Incoming::Request(request)) => assert_eq!(request.method, "ping"),
            other => panic!("expected request, got {:?}", other),
        }
        assert!(matches!(transport.read().await.unwrap(), Some(Incoming::Empty)));
        assert!(matches!(
            transport.read().await.unwrap(),
            Some(Incoming::Malformed(_))
        ));
        assert!(transport.read().await.unwrap().is_none());
    }

    #[test]
    fn test_writes_one_line_per_response() {
        let input: &[u8] = b"";
        let mut transport = LineTransport::new(input, Vec::new());
        tokio_test::block_on(async {
            let response = JsonRpcResponse::success(Some(json!(7)), json!({"ok": true}));
            transport.write(&response).await.unwrap();
            transport.write(&response).await.unwrap();
        });

        let written = String::from_utf8(transport.into_writer()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["id"], json!(7));
        assert_eq!(parsed["jsonrpc"], json!("2.0"));
    }
}
