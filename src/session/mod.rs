//! Session lifecycle.
//!
//! A session acquires its resources strictly in order:
//!
//! ```text
//! Init -> WorkspaceReady -> Transcoded -> NetworkReady -> ServicePublished -> Serving
//! ```
//!
//! then blocks in `Serving` until the time limit passes or the user asks to
//! stop. Any failure on the way jumps straight to `Draining`. Draining always
//! runs exactly once and releases whatever was acquired in reverse order:
//! HTTP server and onion service, then the tor client, then the workspace.

mod announce;
mod stop;

pub use announce::Announcer;
pub use stop::{is_stop, StopSignal, StopTrigger};

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{ReleaseError, Result, SessionError};
use crate::privacy::{AnonymityNetwork, HiddenService, NetworkClient, PublishOptions, PublishedService};
use crate::server::{ContentServer, ServerHandle};
use crate::transcode::{transcode, CompressionRequest, Encoder, SizeReport};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    WorkspaceReady,
    Transcoded,
    NetworkReady,
    ServicePublished,
    Serving,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::WorkspaceReady => "workspace-ready",
            SessionState::Transcoded => "transcoded",
            SessionState::NetworkReady => "network-ready",
            SessionState::ServicePublished => "service-published",
            SessionState::Serving => "serving",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    UserStop,
    Error,
}

/// Validated inputs for one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub source: PathBuf,
    pub timeout: Duration,
    pub quality_level: u8,
}

/// The record of one session as it moves through its states.
#[derive(Debug, Clone)]
pub struct Session {
    pub source: PathBuf,
    pub timeout: Duration,
    pub quality_level: u8,
    pub workspace_path: Option<PathBuf>,
    pub published: Option<PublishedService>,
    pub stop_reason: Option<StopReason>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl Session {
    fn new(request: &SessionRequest) -> Self {
        Self {
            source: request.source.clone(),
            timeout: request.timeout,
            quality_level: request.quality_level,
            workspace_path: None,
            published: None,
            stop_reason: None,
            state: SessionState::Init,
            history: vec![SessionState::Init],
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub session: Session,
    /// The failure that ended the session early, if any.
    pub error: Option<SessionError>,
    /// Teardown steps that could not release their resource.
    pub release_failures: Vec<ReleaseError>,
}

impl SessionReport {
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.session.stop_reason
    }

    /// 0 only when the session ended normally and every resource was released.
    pub fn exit_code(&self) -> i32 {
        match &self.error {
            Some(e) => e.exit_code(),
            None if !self.release_failures.is_empty() => 1,
            None => 0,
        }
    }
}

/// Resources acquired so far, released in reverse field order.
struct Held<C: NetworkClient> {
    workspace: Option<Workspace>,
    client: Option<C>,
    service: Option<C::Service>,
    server: Option<ServerHandle>,
}

impl<C: NetworkClient> Held<C> {
    fn new() -> Self {
        Self {
            workspace: None,
            client: None,
            service: None,
            server: None,
        }
    }
}

/// Drives a session from input validation to teardown.
pub struct SessionController<E, N> {
    encoder: E,
    network: N,
    settings: Settings,
    announcer: Announcer,
}

impl<E, N> SessionController<E, N>
where
    E: Encoder,
    N: AnonymityNetwork,
{
    pub fn new(encoder: E, network: N, settings: Settings, announcer: Announcer) -> Self {
        Self {
            encoder,
            network,
            settings,
            announcer,
        }
    }

    /// Run one session to completion. Teardown has always finished when this returns.
    pub async fn run(&mut self, request: SessionRequest, stop: StopSignal) -> SessionReport {
        let mut session = Session::new(&request);
        let mut held = Held::new();

        let error = match self.acquire_and_serve(&mut session, &mut held, stop).await {
            Ok(reason) => {
                session.stop_reason = Some(reason);
                None
            }
            Err(e) => {
                error!("Session failed in state {} ({}): {}", session.state(), e.kind(), e);
                self.announcer.failure(&e);
                session.stop_reason = Some(StopReason::Error);
                Some(e)
            }
        };

        session.advance(SessionState::Draining);
        let release_failures = self.drain(held).await;
        for failure in &release_failures {
            error!("{}", failure);
            self.announcer.release_failure(failure);
        }
        session.advance(SessionState::Closed);

        if let Some(reason) = session.stop_reason {
            self.announcer.stopped(reason);
        }

        SessionReport {
            session,
            error,
            release_failures,
        }
    }

    async fn acquire_and_serve(
        &mut self,
        session: &mut Session,
        held: &mut Held<N::Client>,
        stop: StopSignal,
    ) -> Result<StopReason> {
        let workspace = held
            .workspace
            .insert(Workspace::acquire(self.settings.temp_root.as_deref())?);
        session.workspace_path = Some(workspace.path().to_path_buf());
        session.advance(SessionState::WorkspaceReady);

        let video_path = workspace.video_path();
        let request = CompressionRequest::new(
            &session.source,
            &video_path,
            i64::from(session.quality_level),
        )?;
        if request.compresses() {
            self.announcer.compressing();
        }
        transcode(&self.encoder, &request).await?;
        if request.compresses() {
            self.announcer.sizes(&SizeReport::measure(&request)?);
        }
        session.advance(SessionState::Transcoded);

        self.announcer.connecting();
        let data_dir = workspace.tor_dir()?;
        let client = held.client.insert(self.network.start(&data_dir).await?);
        session.advance(SessionState::NetworkReady);

        self.announcer.starting_service();
        let options = PublishOptions {
            remote_port: self.settings.hidden_service_port,
            use_latest_protocol_version: true,
        };
        let deadline = self.settings.publish_timeout;
        let service = tokio::time::timeout(deadline, client.publish(options))
            .await
            .map_err(|_| SessionError::Timeout {
                what: "onion service to publish".to_string(),
                after: deadline,
            })??;
        let service = held.service.insert(service);
        let published = service.published().clone();
        info!("Onion service published at {}", published.url());
        session.advance(SessionState::ServicePublished);

        let listener = service
            .take_listener()
            .ok_or_else(|| SessionError::tool("tor", "onion service has no local listener"))?;
        held.server = Some(ContentServer::new(&video_path).spawn(listener));
        session.advance(SessionState::Serving);

        self.announcer.published(&published);
        session.published = Some(published);

        Ok(wait_for_stop(session.timeout, stop).await)
    }

    /// Release everything in `held`, newest first, collecting failures.
    async fn drain(&self, held: Held<N::Client>) -> Vec<ReleaseError> {
        let Held {
            workspace,
            client,
            service,
            server,
        } = held;
        let mut failures = Vec::new();

        if let Some(server) = server {
            server.stop(self.settings.server_grace).await;
        }

        if let Some(mut service) = service {
            if let Err(e) = service.close().await {
                warn!("Failed to close onion service: {}", e);
                failures.push(ReleaseError::new("onion service", e));
            }
        }

        if let Some(mut client) = client {
            if let Err(e) = client.close().await {
                warn!("Failed to close tor client: {}", e);
                failures.push(ReleaseError::new("tor client", e));
            }
        }

        if let Some(workspace) = workspace {
            let path = workspace.path().display().to_string();
            if let Err(e) = workspace.release() {
                failures.push(ReleaseError::new("workspace", format!("{}: {}", path, e)));
            }
        }

        failures
    }
}

/// Block until the time limit passes or a stop request arrives, whichever is first.
async fn wait_for_stop(timeout: Duration, stop: StopSignal) -> StopReason {
    let stop = stop.arm();
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            info!("Time limit of {:?} reached", timeout);
            StopReason::Timeout
        }
        Ok(()) = stop => {
            info!("Stop requested");
            StopReason::UserStop
        }
    }
}
