//! vrshell-session: session and multi-window engine coordination for a VR browser shell
//!
//! This library owns browsing sessions on top of an embedded browser engine,
//! fans engine callbacks out to UI listeners, survives engine handle
//! replacement and binds session output to window surfaces.

pub mod error;
pub mod config;

pub mod engine;
pub mod session;
pub mod window;
pub mod history;
pub mod overrides;
pub mod pages;

// Re-exports
pub use error::{Error, Result};
pub use config::ShellConfig;
pub use session::{Session, SessionId, SessionRegistry, SessionSettings};
pub use window::{CaptureOutcome, SurfaceGeometry, WindowId, WindowSurfaceBinding};

/// vrshell-session library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
