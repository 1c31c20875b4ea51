//! Common test utilities
//!
//! This module provides shared test helpers and fixtures for all integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vrshell_session::engine::{MockEngineHandle, MockEngineRuntime};
use vrshell_session::{
    Session, SessionRegistry, ShellConfig, SurfaceGeometry, WindowId, WindowSurfaceBinding,
};

/// Registry over a mock engine, plus the handles tests poke at
pub struct TestShell {
    pub runtime: Arc<MockEngineRuntime>,
    pub registry: Arc<SessionRegistry>,
    pub config: ShellConfig,
}

/// Setup a shell without page-stop captures, so capture counts stay deterministic
pub fn setup_shell() -> TestShell {
    setup_shell_with(ShellConfig {
        capture_on_page_stop: false,
        ..Default::default()
    })
}

pub fn setup_shell_with(config: ShellConfig) -> TestShell {
    let runtime = Arc::new(MockEngineRuntime::new());
    let registry = SessionRegistry::new(runtime.clone(), config.clone());
    TestShell {
        runtime,
        registry,
        config,
    }
}

impl TestShell {
    /// Create a session, navigate it and settle all engine callbacks
    pub async fn open_session(&self, uri: &str) -> Arc<Session> {
        let session = self
            .registry
            .create_session(false, None)
            .await
            .expect("create session");
        session.load_uri(Some(uri));
        self.settle().await;
        session
    }

    /// Process engine callbacks until none are left
    pub async fn settle(&self) {
        while self.registry.process_pending_events().await > 0 {}
    }

    /// Mock handle currently backing `session`
    pub fn handle_of(&self, session: &Session) -> Arc<MockEngineHandle> {
        let id = session.current_handle_id().expect("session has a handle");
        self.runtime.handle(id).expect("handle opened by the mock runtime")
    }

    pub fn window(&self, id: u32) -> WindowSurfaceBinding {
        WindowSurfaceBinding::new(WindowId(id), SurfaceGeometry::new(1280, 720), &self.config)
    }
}

/// Yield until `condition` holds, giving spawned tasks a chance to run
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
