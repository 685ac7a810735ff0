//! Minimal Tor control protocol client.
//!
//! Only what a single onion service needs: cookie authentication, command
//! replies (including `250-` continuation and `250+` data lines), and
//! asynchronous `650` events.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

const ASYNC_EVENT_CODE: &str = "650";

/// Reply to a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Value of the first `KEY=value` line with the given key.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
    }
}

pub struct ControlConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    events: VecDeque<String>,
}

impl ControlConnection {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            SessionError::tool("tor", format!("cannot reach control port {}: {}", addr, e))
        })?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read),
            writer: write,
            events: VecDeque::new(),
        })
    }

    /// Authenticate using the cookie file tor wrote.
    pub async fn authenticate_with_cookie(&mut self, cookie_path: &Path) -> Result<()> {
        let cookie = tokio::fs::read(cookie_path).await.map_err(|e| {
            SessionError::resource(
                format!("Error reading tor auth cookie {}", cookie_path.display()),
                e,
            )
        })?;
        self.expect_ok(&format!("AUTHENTICATE {}", hex::encode_upper(cookie)))
            .await?;
        Ok(())
    }

    /// Send a command and fail unless tor answers with a 2xx reply.
    pub async fn expect_ok(&mut self, command: &str) -> Result<Reply> {
        let reply = self.command(command).await?;
        if !reply.is_ok() {
            let verb = command.split_whitespace().next().unwrap_or(command);
            return Err(SessionError::tool(
                "tor",
                format!("{} rejected: {} {}", verb, reply.code, reply.lines.join(" ")),
            ));
        }
        Ok(reply)
    }

    /// Send a command and read its reply, queueing any events that arrive first.
    pub async fn command(&mut self, command: &str) -> Result<Reply> {
        trace!("control > {}", redact(command));
        self.writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .map_err(control_io)?;
        self.writer.flush().await.map_err(control_io)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let (code, sep, body) = split_line(&line)?;

            if code == ASYNC_EVENT_CODE {
                self.events.push_back(body.to_string());
                continue;
            }

            match sep {
                '+' => {
                    lines.push(body.to_string());
                    loop {
                        let data = self.read_line().await?;
                        if data == "." {
                            break;
                        }
                        lines.push(data.strip_prefix('.').unwrap_or(&data).to_string());
                    }
                }
                '-' => lines.push(body.to_string()),
                _ => {
                    lines.push(body.to_string());
                    let code = code.parse().map_err(|_| malformed(&line))?;
                    return Ok(Reply { code, lines });
                }
            }
        }
    }

    /// Wait for the next asynchronous event (the text after "650 ").
    pub async fn next_event(&mut self) -> Result<String> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }
        loop {
            let line = self.read_line().await?;
            let (code, _, body) = split_line(&line)?;
            if code == ASYNC_EVENT_CODE {
                return Ok(body.to_string());
            }
            debug!("Ignoring unsolicited control reply: {}", line);
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.map_err(control_io)?;
        if read == 0 {
            return Err(SessionError::tool("tor", "control connection closed"));
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!("control < {}", line);
        Ok(line)
    }
}

/// Parse "PORT=127.0.0.1:9051" as written by `ControlPortWriteToFile`.
pub fn parse_control_port_file(content: &str) -> Option<SocketAddr> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("PORT="))
        .and_then(|addr| addr.parse().ok())
}

fn split_line(line: &str) -> Result<(&str, char, &str)> {
    if line.len() < 4 || !line.is_char_boundary(3) || !line.is_char_boundary(4) {
        return Err(malformed(line));
    }
    let code = &line[..3];
    let sep = line[3..4].chars().next().unwrap_or(' ');
    if !code.chars().all(|c| c.is_ascii_digit()) || !matches!(sep, ' ' | '-' | '+') {
        return Err(malformed(line));
    }
    Ok((code, sep, &line[4..]))
}

fn malformed(line: &str) -> SessionError {
    SessionError::tool("tor", format!("malformed control reply: {:?}", line))
}

fn control_io(e: std::io::Error) -> SessionError {
    SessionError::tool("tor", format!("control connection error: {}", e))
}

fn redact(command: &str) -> &str {
    if command.starts_with("AUTHENTICATE") {
        "AUTHENTICATE <cookie>"
    } else {
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a scripted control port: for each expected command, write the canned response.
    async fn scripted(script: Vec<(&'static str, &'static str)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut reader = BufReader::new(read);
            for (expected, response) in script {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                assert!(line.starts_with(expected), "got {:?}", line);
                write.write_all(response.as_bytes()).await.unwrap();
            }
            let mut rest = Vec::new();
            let _ = reader.read_to_end(&mut rest).await;
        });
        addr
    }

    #[test]
    fn test_parse_control_port_file() {
        assert_eq!(
            parse_control_port_file("PORT=127.0.0.1:9151\n"),
            Some("127.0.0.1:9151".parse().unwrap())
        );
        assert_eq!(parse_control_port_file(""), None);
        assert_eq!(parse_control_port_file("PORT=garbage"), None);
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("250 OK").unwrap(), ("250", ' ', "OK"));
        assert_eq!(
            split_line("250-ServiceID=abc").unwrap(),
            ("250", '-', "ServiceID=abc")
        );
        assert!(split_line("25").is_err());
        assert!(split_line("abc def").is_err());
    }

    #[tokio::test]
    async fn test_add_onion_reply_with_interleaved_event() {
        let addr = scripted(vec![(
            "ADD_ONION",
            "650 HS_DESC CREATED abc UNKNOWN UNKNOWN\r\n250-ServiceID=abc\r\n250 OK\r\n",
        )])
        .await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        let reply = conn
            .expect_ok("ADD_ONION NEW:ED25519-V3 Port=80,127.0.0.1:1234")
            .await
            .unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.value("ServiceID"), Some("abc"));

        let event = conn.next_event().await.unwrap();
        assert!(event.starts_with("HS_DESC CREATED abc"));
    }

    #[tokio::test]
    async fn test_data_reply() {
        let addr = scripted(vec![(
            "GETINFO",
            "250+config-text=\r\nSocksPort auto\r\n..escaped\r\n.\r\n250 OK\r\n",
        )])
        .await;

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        let reply = conn.command("GETINFO config-text").await.unwrap();
        assert_eq!(
            reply.lines,
            vec!["config-text=", "SocksPort auto", ".escaped", "OK"]
        );
    }

    #[tokio::test]
    async fn test_rejected_command_is_external_tool_error() {
        let addr = scripted(vec![(
            "AUTHENTICATE",
            "515 Authentication failed: Wrong length on authentication cookie.\r\n",
        )])
        .await;

        let dir = tempfile::tempdir().unwrap();
        let cookie = dir.path().join("control_auth_cookie");
        std::fs::write(&cookie, [0u8; 32]).unwrap();

        let mut conn = ControlConnection::connect(addr).await.unwrap();
        let err = conn.authenticate_with_cookie(&cookie).await.unwrap_err();
        assert!(matches!(err, SessionError::ExternalTool { .. }));
        assert!(err.to_string().contains("515"));
    }
}
