//! torshare - share a video once over a temporary Tor onion service.
//!
//! A session links or re-encodes the video into a private workspace, starts
//! tor, publishes an onion service, serves a small web player over it, and
//! tears everything down when the time limit passes or the user stops it.

pub mod cli;
pub mod config;
pub mod error;
pub mod privacy;
pub mod server;
pub mod session;
pub mod transcode;
pub mod utils;
pub mod workspace;

pub use config::Settings;
pub use error::{ReleaseError, Result, SessionError};
pub use session::{
    Announcer, Session, SessionController, SessionReport, SessionRequest, SessionState,
    StopReason, StopSignal,
};
