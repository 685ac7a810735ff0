//! C-Tor onion service integration.
//!
//! # How it works
//!
//! 1. We spawn a tor process whose data directory lives in the session workspace
//! 2. Tor writes its control port address and auth cookie into that directory
//! 3. We authenticate on the control port
//! 4. Publishing binds a loopback listener and registers an ephemeral onion
//!    service for it with `ADD_ONION`, then waits for the descriptor upload
//! 5. Closing the service issues `DEL_ONION`; closing the client kills tor

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::control::{parse_control_port_file, ControlConnection};
use super::network::{
    AnonymityNetwork, HiddenService, NetworkClient, PublishOptions, PublishedService,
};
use crate::error::{Result, SessionError};
use crate::transcode::find_tool;

/// How long tor gets to open its control port after launch.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of tor log lines kept for error reports.
const STDERR_TAIL: usize = 20;

const CONTROL_PORT_FILE: &str = "control-port";
const COOKIE_FILE: &str = "control_auth_cookie";

/// Launches C-Tor clients.
#[derive(Debug, Clone)]
pub struct CTorNetwork {
    binary: PathBuf,
}

impl CTorNetwork {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Find the tor binary at an explicit path or in PATH.
    pub fn find_tor_binary(explicit: Option<&Path>) -> Option<PathBuf> {
        find_tool(explicit, "tor")
    }

    /// Generate a torrc configuration file.
    fn generate_torrc(data_dir: &Path) -> String {
        format!(
            r#"# torshare Tor configuration
# Auto-generated for a single session

DataDirectory {data_dir}
SocksPort auto
ControlPort auto
ControlPortWriteToFile {port_file}
CookieAuthentication 1
CookieAuthFile {cookie_file}

# Logging
Log notice stderr

# Safety settings
SafeLogging 1
"#,
            data_dir = data_dir.display(),
            port_file = data_dir.join(CONTROL_PORT_FILE).display(),
            cookie_file = data_dir.join(COOKIE_FILE).display(),
        )
    }
}

#[async_trait]
impl AnonymityNetwork for CTorNetwork {
    type Client = CTorClient;

    async fn start(&self, data_dir: &Path) -> Result<CTorClient> {
        let torrc_path = data_dir.join("torrc");
        tokio::fs::write(&torrc_path, Self::generate_torrc(data_dir))
            .await
            .map_err(|e| SessionError::resource("Error writing torrc", e))?;

        info!("Starting Tor...");
        debug!("Tor config: {}", torrc_path.display());

        let mut process = Command::new(&self.binary)
            .arg("-f")
            .arg(&torrc_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::tool("tor", format!("failed to execute: {}", e)))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
        if let Some(stderr) = process.stderr.take() {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("[warn]") || line.contains("[err]") {
                        warn!("Tor: {}", line);
                    } else {
                        debug!("Tor: {}", line);
                    }
                    let mut tail = tail.lock().await;
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        let mut client = CTorClient {
            process: Some(process),
            control: None,
            stderr_tail,
        };

        match client.connect_control(data_dir).await {
            Ok(control) => {
                client.control = Some(Arc::new(Mutex::new(control)));
                Ok(client)
            }
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    warn!("Failed to stop tor after startup failure: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// A running tor process with an authenticated control connection.
pub struct CTorClient {
    process: Option<Child>,
    control: Option<Arc<Mutex<ControlConnection>>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl CTorClient {
    /// Wait for tor to publish its control port, then connect and authenticate.
    async fn connect_control(&mut self, data_dir: &Path) -> Result<ControlConnection> {
        let port_file = data_dir.join(CONTROL_PORT_FILE);
        let start = Instant::now();

        let addr = loop {
            if let Ok(content) = tokio::fs::read_to_string(&port_file).await {
                if let Some(addr) = parse_control_port_file(&content) {
                    break addr;
                }
            }

            let exited = match self.process.as_mut() {
                Some(process) => process.try_wait().ok().flatten(),
                None => None,
            };
            if let Some(status) = exited {
                return Err(SessionError::tool(
                    "tor",
                    format!("exited during startup ({}): {}", status, self.tail().await),
                ));
            }

            if start.elapsed() > STARTUP_TIMEOUT {
                return Err(SessionError::Timeout {
                    what: "tor control port".to_string(),
                    after: STARTUP_TIMEOUT,
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        debug!("Tor control port at {}", addr);
        let mut control = ControlConnection::connect(addr).await?;
        control
            .authenticate_with_cookie(&data_dir.join(COOKIE_FILE))
            .await?;
        Ok(control)
    }

    async fn tail(&self) -> String {
        let tail = self.stderr_tail.lock().await;
        tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[async_trait]
impl NetworkClient for CTorClient {
    type Service = CTorHiddenService;

    async fn publish(&mut self, options: PublishOptions) -> Result<CTorHiddenService> {
        let control = self
            .control
            .clone()
            .ok_or_else(|| SessionError::tool("tor", "client is closed"))?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| SessionError::resource("Error binding local listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SessionError::resource("Error reading listener address", e))?;

        let mut conn = control.lock().await;
        conn.expect_ok("SETEVENTS HS_DESC").await?;

        let key_type = if options.use_latest_protocol_version {
            "NEW:ED25519-V3"
        } else {
            "NEW:BEST"
        };
        let reply = conn
            .expect_ok(&format!(
                "ADD_ONION {} Flags=DiscardPK Port={},{}",
                key_type, options.remote_port, local_addr
            ))
            .await?;
        let service_id = reply
            .value("ServiceID")
            .map(str::to_string)
            .ok_or_else(|| SessionError::tool("tor", "ADD_ONION reply had no ServiceID"))?;
        info!("Onion service {} created, waiting for descriptor upload", service_id);

        // A single successful upload to any HSDir makes the service reachable.
        loop {
            let event = conn.next_event().await?;
            let fields: Vec<&str> = event.split_whitespace().collect();
            match fields.as_slice() {
                ["HS_DESC", "UPLOADED", address, ..] if *address == service_id => break,
                ["HS_DESC", "FAILED", address, ..] if *address == service_id => {
                    debug!("Descriptor upload attempt failed: {}", event);
                }
                _ => debug!("Tor event: {}", event),
            }
        }
        drop(conn);

        info!("Onion service {} published", service_id);
        Ok(CTorHiddenService {
            published: PublishedService {
                address: service_id,
                bound_port: local_addr.port(),
            },
            listener: Some(listener),
            control,
            closed: false,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.control = None;
        if let Some(mut process) = self.process.take() {
            info!("Shutting down Tor process...");
            if let Ok(Some(_)) = process.try_wait() {
                return Ok(());
            }
            process
                .kill()
                .await
                .map_err(|e| SessionError::tool("tor", format!("failed to stop: {}", e)))?;
        }
        Ok(())
    }
}

/// An ephemeral onion service registered on a tor control connection.
pub struct CTorHiddenService {
    published: PublishedService,
    listener: Option<TcpListener>,
    control: Arc<Mutex<ControlConnection>>,
    closed: bool,
}

#[async_trait]
impl HiddenService for CTorHiddenService {
    fn published(&self) -> &PublishedService {
        &self.published
    }

    fn take_listener(&mut self) -> Option<TcpListener> {
        self.listener.take()
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.listener = None;

        info!("Removing onion service {}", self.published.address);
        self.control
            .lock()
            .await
            .expect_ok(&format!("DEL_ONION {}", self.published.address))
            .await?;
        Ok(())
    }
}
