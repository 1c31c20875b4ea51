//! Session scenario tests over the mock engine

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

use crate::config::{ShellConfig, DEFAULT_HOMEPAGE};
use crate::engine::*;
use crate::session::*;
use crate::Error;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    /// (old, new, new handle current and open when announced)
    replaced: Mutex<Vec<(HandleId, HandleId, bool)>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }

    fn clear(&self) {
        self.events.lock().clear();
    }
}

impl NavigationListener for Recorder {
    fn on_location_change(&self, _session: &Session, uri: &str) {
        self.push(format!("location:{}", uri));
    }

    fn on_can_go_back(&self, _session: &Session, can_go_back: bool) {
        self.push(format!("can_go_back:{}", can_go_back));
    }

    fn on_new_session(&self, _session: &Session, opened: &Arc<Session>) {
        self.push(format!("new_session:{}", opened.id()));
    }
}

impl ProgressListener for Recorder {
    fn on_page_start(&self, _session: &Session, uri: &str) {
        self.push(format!("page_start:{}", uri));
    }

    fn on_page_stop(&self, _session: &Session, success: bool) {
        self.push(format!("page_stop:{}", success));
    }
}

impl ContentListener for Recorder {
    fn on_title_change(&self, _session: &Session, title: Option<&str>) {
        self.push(format!("title:{}", title.unwrap_or("")));
    }

    fn on_full_screen(&self, _session: &Session, full_screen: bool) {
        self.push(format!("full_screen:{}", full_screen));
    }

    fn on_crash(&self, _session: &Session) {
        self.push("crash".to_string());
    }
}

impl MediaAvailabilityListener for Recorder {
    fn on_media_availability_change(&self, _session: &Session, available: bool) {
        self.push(format!("media:{}", available));
    }
}

impl SessionChangeListener for Recorder {
    fn on_session_replaced(&self, session: &Session, old: HandleId, new: HandleId) {
        let current = session
            .current_handle()
            .map_or(false, |h| h.id() == new && h.is_open());
        self.replaced.lock().push((old, new, current));
    }
}

struct Voter(AllowOrDeny);

impl NavigationListener for Voter {
    fn on_load_request(&self, _session: &Session, _request: &LoadRequest) -> BoxFuture<'static, AllowOrDeny> {
        futures::future::ready(self.0).boxed()
    }
}

/// Votes once its gate is opened
struct GatedVoter {
    gate: Mutex<Option<oneshot::Receiver<AllowOrDeny>>>,
}

impl NavigationListener for GatedVoter {
    fn on_load_request(&self, _session: &Session, _request: &LoadRequest) -> BoxFuture<'static, AllowOrDeny> {
        let gate = self.gate.lock().take();
        async move {
            match gate {
                Some(gate) => gate.await.unwrap_or(AllowOrDeny::Deny),
                None => AllowOrDeny::Deny,
            }
        }
        .boxed()
    }
}

struct PanickingListener;

impl NavigationListener for PanickingListener {
    fn on_location_change(&self, _session: &Session, _uri: &str) {
        panic!("broken listener");
    }
}

struct FixedPrompt;

impl PromptDelegate for FixedPrompt {
    fn on_prompt(&self, _session: &Session, _request: PromptRequest) -> BoxFuture<'static, PromptResponse> {
        futures::future::ready(PromptResponse::Text("typed".to_string())).boxed()
    }
}

/// Runtime whose next open parks until the gate is opened, once armed
#[derive(Debug, Default)]
struct GatedRuntime {
    inner: MockEngineRuntime,
    armed: AtomicBool,
    entered: Notify,
    gate: Notify,
}

#[async_trait]
impl EngineRuntime for GatedRuntime {
    async fn open_handle(
        &self,
        settings: &EngineSettings,
        sink: EventSink,
    ) -> Result<Arc<dyn EngineHandle>, Error> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.open_handle(settings, sink).await
    }

    fn alternate_engine_available(&self) -> bool {
        self.inner.alternate_engine_available()
    }

    async fn clear_data(&self, flags: ClearDataFlags) -> Result<(), Error> {
        self.inner.clear_data(flags).await
    }
}

fn setup_with(config: ShellConfig) -> (Arc<MockEngineRuntime>, Arc<SessionRegistry>) {
    let runtime = Arc::new(MockEngineRuntime::new());
    let registry = SessionRegistry::new(runtime.clone(), config);
    (runtime, registry)
}

fn setup() -> (Arc<MockEngineRuntime>, Arc<SessionRegistry>) {
    setup_with(ShellConfig::default())
}

fn current_mock(runtime: &MockEngineRuntime, session: &Session) -> Arc<MockEngineHandle> {
    runtime
        .handle(session.current_handle_id().unwrap())
        .unwrap()
}

async fn loaded_session(registry: &SessionRegistry, uri: &str) -> Arc<Session> {
    let session = registry.create_session(false, None).await.unwrap();
    session.load_uri(Some(uri));
    registry.process_pending_events().await;
    session
}

#[tokio::test]
async fn test_create_loads_home_page() {
    let (_runtime, registry) = setup();

    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;

    assert_eq!(session.current_uri(), DEFAULT_HOMEPAGE);
    assert_eq!(session.handle_state(), HandleState::Open);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn test_private_session_never_loads_home_page() {
    let (runtime, registry) = setup();

    let session = registry.create_session(true, None).await.unwrap();
    registry.process_pending_events().await;
    assert!(session.is_private_mode());
    assert_eq!(session.current_uri(), session.private_page_uri());

    session.load_uri(Some("https://example.com/"));
    session.load_uri(None);
    registry.process_pending_events().await;

    let handle = current_mock(&runtime, &session);
    assert!(!handle.loaded_uris().iter().any(|u| u == DEFAULT_HOMEPAGE));
    assert_eq!(session.current_uri(), session.private_page_uri());
}

#[tokio::test]
async fn test_late_listener_gets_state_replay() {
    let (_runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;

    let recorder = Recorder::new();
    session.add_navigation_listener(recorder.clone());
    session.add_progress_listener(recorder.clone());
    session.add_content_listener(recorder.clone());

    assert_eq!(
        recorder.events(),
        vec![
            "can_go_back:true",
            "location:https://example.com/",
            "page_stop:true",
            "title:example.com",
        ]
    );
}

#[tokio::test]
async fn test_recreate_announces_one_atomic_replacement() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let recorder = Recorder::new();
    session.add_session_change_listener(recorder.clone());

    let before = current_mock(&runtime, &session);

    for _ in 0..3 {
        session.recreate().await.unwrap();
        registry.process_pending_events().await;
    }

    let replaced = recorder.replaced.lock().clone();
    assert_eq!(replaced.len(), 3);
    assert!(replaced.iter().all(|(_, _, current_and_open)| *current_and_open));
    assert_eq!(replaced[0].0, before.id());
    assert_eq!(replaced[1].0, replaced[0].1);

    assert!(!before.is_open());
    assert_eq!(session.current_uri(), "https://example.com/");
    assert!(before.calls().ends_with(&[
        HandleCall::SetActive(false),
        HandleCall::Stop,
        HandleCall::Close
    ]));
}

#[tokio::test]
async fn test_recreate_failure_keeps_old_handle() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let recorder = Recorder::new();
    session.add_session_change_listener(recorder.clone());
    let before = session.current_handle_id();

    runtime.fail_next_opens(1);
    let result = session.recreate().await;

    assert!(matches!(result, Err(Error::EngineUnavailable(_))));
    assert_eq!(session.current_handle_id(), before);
    assert!(current_mock(&runtime, &session).is_open());
    assert!(recorder.replaced.lock().is_empty());
}

#[tokio::test]
async fn test_set_multiprocess_reverts_on_failure() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();

    runtime.fail_next_opens(1);
    assert!(session.set_multiprocess(false).await.is_err());
    assert!(session.settings().multiprocess);

    session.set_multiprocess(false).await.unwrap();
    assert!(!session.settings().multiprocess);
    assert!(!current_mock(&runtime, &session).settings().multiprocess);

    // Unchanged value does not rebuild
    let opened = runtime.open_count();
    session.set_multiprocess(false).await.unwrap();
    assert_eq!(runtime.open_count(), opened);
}

#[tokio::test]
async fn test_toggle_alternate_engine() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let old = current_mock(&runtime, &session);

    assert!(session.toggle_alternate_engine().await);
    registry.process_pending_events().await;

    let new = current_mock(&runtime, &session);
    assert!(new.is_alternate());
    assert!(session.settings().alternate_engine);
    assert_eq!(new.loaded_uris(), vec!["https://example.com/".to_string()]);
    assert_eq!(session.current_uri(), "https://example.com/");
    assert!(!old.is_open());
}

#[tokio::test]
async fn test_toggle_alternate_engine_failure_is_silent() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let recorder = Recorder::new();
    session.add_session_change_listener(recorder.clone());
    let before = session.current_handle_id();

    runtime.set_alternate_available(false);
    assert!(!session.toggle_alternate_engine().await);

    runtime.set_alternate_available(true);
    runtime.fail_next_opens(1);
    assert!(!session.toggle_alternate_engine().await);

    assert_eq!(session.current_handle_id(), before);
    assert!(!session.settings().alternate_engine);
    assert!(recorder.replaced.lock().is_empty());
}

#[tokio::test]
async fn test_crash_resets_to_home_page() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let recorder = Recorder::new();
    session.add_content_listener(recorder.clone());

    let crashed = current_mock(&runtime, &session);
    crashed.emit(EngineEventKind::Crash);
    registry.process_pending_events().await;

    assert_eq!(recorder.count("crash"), 1);
    assert_eq!(session.current_uri(), DEFAULT_HOMEPAGE);

    let recovered = current_mock(&runtime, &session);
    assert_ne!(recovered.id(), crashed.id());
    assert!(recovered.is_open());
    assert!(!crashed.is_open());

    // The crashed page is never brought back
    assert!(!recovered
        .calls()
        .iter()
        .any(|c| matches!(c, HandleCall::RestoreState(_))));
    assert_eq!(recovered.loaded_uris(), vec![DEFAULT_HOMEPAGE.to_string()]);
}

#[tokio::test]
async fn test_shutdown_during_recreate_stays_closed() {
    let runtime = Arc::new(GatedRuntime::default());
    let registry = SessionRegistry::new(runtime.clone(), ShellConfig::default());
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;

    runtime.armed.store(true, Ordering::SeqCst);
    let recreating = tokio::spawn({
        let session = session.clone();
        async move { session.recreate().await }
    });
    runtime.entered.notified().await;

    session.shutdown();
    runtime.gate.notify_one();

    let result = recreating.await.unwrap();
    assert!(matches!(result, Err(Error::SessionClosed(_))));
    assert!(session.current_handle().is_none());
    assert_eq!(session.handle_state(), HandleState::Closed);
    assert_eq!(runtime.inner.open_count(), 2);
    assert!(runtime.inner.handles().iter().all(|h| !h.is_open()));
}

#[tokio::test]
async fn test_shutdown_during_engine_toggle_stays_closed() {
    let runtime = Arc::new(GatedRuntime::default());
    let registry = SessionRegistry::new(runtime.clone(), ShellConfig::default());
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;

    runtime.armed.store(true, Ordering::SeqCst);
    let toggling = tokio::spawn({
        let session = session.clone();
        async move { session.toggle_alternate_engine().await }
    });
    runtime.entered.notified().await;

    registry.shutdown_all();
    runtime.gate.notify_one();

    assert!(!toggling.await.unwrap());
    assert!(session.is_closed());
    assert!(session.current_handle().is_none());
    assert!(runtime.inner.handles().iter().all(|h| !h.is_open()));
}

#[tokio::test]
async fn test_clear_cache_rebuilds_handle() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    session.load_uri(Some("https://example.com/next"));
    registry.process_pending_events().await;
    let recorder = Recorder::new();
    session.add_session_change_listener(recorder.clone());
    let old = current_mock(&runtime, &session);

    session.clear_cache(ClearDataFlags::ALL_CACHES).await.unwrap();
    registry.process_pending_events().await;

    // Storage was wiped with no handle open
    assert_eq!(runtime.cleared_data(), vec![(ClearDataFlags::ALL_CACHES, 0)]);

    let new = current_mock(&runtime, &session);
    assert_ne!(new.id(), old.id());
    assert!(!old.is_open());
    assert_eq!(
        old.calls().iter().filter(|c| **c == HandleCall::Close).count(),
        1
    );
    assert!(new
        .calls()
        .iter()
        .any(|c| matches!(c, HandleCall::RestoreState(_))));
    assert_eq!(session.current_uri(), "https://example.com/next");
    assert!(session.can_go_back());

    let replaced = recorder.replaced.lock().clone();
    assert_eq!(replaced, vec![(old.id(), new.id(), true)]);
}

#[tokio::test]
async fn test_clear_cache_failures() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;

    // A failed wipe still leaves a working handle
    runtime.set_fail_clear(true);
    let result = session.clear_cache(ClearDataFlags::ALL).await;
    assert!(matches!(result, Err(Error::Internal(_))));
    assert_eq!(session.handle_state(), HandleState::Open);
    assert!(current_mock(&runtime, &session).is_open());

    runtime.set_fail_clear(false);
    runtime.fail_next_opens(1);
    let result = session.clear_cache(ClearDataFlags::ALL).await;
    assert!(result.unwrap_err().is_engine_unavailable());
    assert!(session.current_handle().is_none());
    assert_eq!(session.handle_state(), HandleState::Unopened);
    assert!(!session.is_closed());
    assert!(runtime.handles().iter().all(|h| !h.is_open()));

    session.shutdown();
    assert!(session.clear_cache(ClearDataFlags::ALL).await.is_err());
}

#[tokio::test]
async fn test_stale_handle_events_are_dropped() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let old = current_mock(&runtime, &session);

    session.recreate().await.unwrap();
    registry.process_pending_events().await;

    let recorder = Recorder::new();
    session.add_navigation_listener(recorder.clone());
    recorder.clear();

    old.emit(EngineEventKind::LocationChange {
        uri: "https://stale.example/".to_string(),
    });
    let (tx, rx) = oneshot::channel();
    old.emit(EngineEventKind::Permission {
        request: PermissionRequest::Content {
            uri: None,
            permission: ContentPermission::Geolocation,
        },
        responder: tx,
    });
    registry.process_pending_events().await;

    assert_eq!(session.current_uri(), "https://example.com/");
    assert!(recorder.events().is_empty());
    assert_eq!(rx.await.unwrap(), PermissionResponse::Deny);
}

#[tokio::test]
async fn test_restore_round_trip() {
    let (_runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    session.load_uri(Some("https://example.com/next"));
    registry.process_pending_events().await;

    let persisted = session.persist();
    assert!(persisted.has_engine_state());
    let json = persisted.to_json().unwrap();

    let (_runtime, restored_registry) = setup();
    let restored = restored_registry
        .restore_session(PersistedSession::from_json(&json).unwrap())
        .await
        .unwrap();
    restored_registry.process_pending_events().await;

    assert_eq!(restored.id(), session.id());
    assert_eq!(restored.current_uri(), "https://example.com/next");
    assert!(restored.can_go_back());
}

#[tokio::test]
async fn test_restore_without_state_loads_home() {
    let (_runtime, registry) = setup();
    let persisted = PersistedSession {
        id: None,
        settings: SessionSettings::default(),
        uri: "https://example.com/".to_string(),
        title: None,
        region: None,
        engine_state: Some(EngineStateBlob::default()),
    };

    let session = registry.restore_session(persisted).await.unwrap();
    registry.process_pending_events().await;

    assert_eq!(session.current_uri(), DEFAULT_HOMEPAGE);
}

#[tokio::test]
async fn test_restore_corrupt_state_loads_home() {
    let (runtime, registry) = setup();
    runtime.set_reject_restore(true);

    let persisted = PersistedSession {
        id: None,
        settings: SessionSettings::default(),
        uri: "https://example.com/".to_string(),
        title: None,
        region: None,
        engine_state: Some(EngineStateBlob::new(b"garbage".to_vec())),
    };

    let session = registry.restore_session(persisted).await.unwrap();
    registry.process_pending_events().await;

    assert_eq!(session.current_uri(), DEFAULT_HOMEPAGE);
}

#[tokio::test]
async fn test_restore_fails_without_engine() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://example.com/").await;
    let persisted = session.persist();

    runtime.fail_next_opens(1);
    let result = registry.restore_session(persisted).await;
    assert!(matches!(result, Err(Error::EngineUnavailable(_))));
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    let handle = current_mock(&runtime, &session);
    session.add_navigation_listener(Recorder::new());

    session.shutdown();
    session.shutdown();

    let closes = handle
        .calls()
        .iter()
        .filter(|c| **c == HandleCall::Close)
        .count();
    assert_eq!(closes, 1);
    assert_eq!(session.handle_state(), HandleState::Closed);
    assert!(session.current_handle().is_none());
    assert_eq!(session.listeners.total(), 0);

    // Operations on a shut down session are dropped
    session.load_uri(Some("https://example.com/"));
    assert!(session.recreate().await.is_err());
}

#[tokio::test]
async fn test_load_request_votes() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;
    let handle = current_mock(&runtime, &session);

    async fn ask(registry: &SessionRegistry, handle: &MockEngineHandle, uri: &str) -> AllowOrDeny {
        let (tx, rx) = oneshot::channel();
        handle.emit(EngineEventKind::LoadRequest {
            request: LoadRequest::new(uri),
            responder: tx,
        });
        registry.process_pending_events().await;
        rx.await.unwrap()
    }

    // No listeners: allow
    assert_eq!(ask(&registry, &handle, "https://a.example/").await, AllowOrDeny::Allow);

    session.add_navigation_listener(Arc::new(Voter(AllowOrDeny::Deny)));
    session.add_navigation_listener(Arc::new(Voter(AllowOrDeny::Deny)));
    assert_eq!(ask(&registry, &handle, "https://a.example/").await, AllowOrDeny::Deny);

    session.add_navigation_listener(Arc::new(Voter(AllowOrDeny::Allow)));
    assert_eq!(ask(&registry, &handle, "https://a.example/").await, AllowOrDeny::Allow);

    // The private placeholder is never a navigation target
    assert_eq!(ask(&registry, &handle, "about:privatebrowsing").await, AllowOrDeny::Deny);
}

#[tokio::test]
async fn test_load_request_waits_for_every_listener() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    let handle = current_mock(&runtime, &session);

    let (gate_tx, gate_rx) = oneshot::channel();
    session.add_navigation_listener(Arc::new(Voter(AllowOrDeny::Deny)));
    session.add_navigation_listener(Arc::new(GatedVoter {
        gate: Mutex::new(Some(gate_rx)),
    }));

    let (tx, mut rx) = oneshot::channel();
    handle.emit(EngineEventKind::LoadRequest {
        request: LoadRequest::new("https://slow.example/"),
        responder: tx,
    });
    registry.process_pending_events().await;

    tokio_test::assert_pending!(tokio_test::task::spawn(&mut rx).poll());

    gate_tx.send(AllowOrDeny::Allow).unwrap();
    assert_eq!(rx.await.unwrap(), AllowOrDeny::Allow);
}

#[tokio::test]
async fn test_panicking_listener_does_not_block_others() {
    let (_runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();

    let recorder = Recorder::new();
    session.add_navigation_listener(Arc::new(PanickingListener));
    session.add_navigation_listener(recorder.clone());
    recorder.clear();

    session.load_uri(Some("https://example.com/"));
    registry.process_pending_events().await;

    assert!(recorder.count("location:https://example.com/") >= 1);
}

#[tokio::test]
async fn test_back_exits_full_screen_first() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://a.example/").await;
    session.load_uri(Some("https://b.example/"));
    registry.process_pending_events().await;
    let handle = current_mock(&runtime, &session);

    handle.emit(EngineEventKind::FullScreen(true));
    registry.process_pending_events().await;
    assert!(session.is_in_full_screen());

    session.go_back();
    registry.process_pending_events().await;
    assert!(!session.is_in_full_screen());
    assert_eq!(session.current_uri(), "https://b.example/");
    assert!(handle.calls().contains(&HandleCall::ExitFullScreen));
    assert!(!handle.calls().contains(&HandleCall::GoBack));

    session.go_back();
    registry.process_pending_events().await;
    assert_eq!(session.current_uri(), "https://a.example/");
}

#[tokio::test]
async fn test_back_history_only_policy() {
    let config = ShellConfig {
        back_policy: BackPolicy::HistoryOnly,
        ..Default::default()
    };
    let (runtime, registry) = setup_with(config);
    let session = loaded_session(&registry, "https://a.example/").await;
    session.load_uri(Some("https://b.example/"));
    registry.process_pending_events().await;
    let handle = current_mock(&runtime, &session);

    handle.emit(EngineEventKind::FullScreen(true));
    registry.process_pending_events().await;

    session.go_back();
    registry.process_pending_events().await;
    assert!(!handle.calls().contains(&HandleCall::ExitFullScreen));
    assert_eq!(session.current_uri(), "https://a.example/");
}

#[tokio::test]
async fn test_region_redirects_home_page() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;

    registry.set_region(Some("DE"));
    registry.process_pending_events().await;

    assert_eq!(session.home_uri(), "https://webxr.today/?region=de");
    assert_eq!(session.current_uri(), "https://webxr.today/?region=de");
    let handle = current_mock(&runtime, &session);
    assert!(handle
        .loaded_uris()
        .iter()
        .any(|u| u.starts_with("javascript:window.location.replace(")));
}

#[tokio::test]
async fn test_region_redirect_after_plain_homepage_load() {
    let (_runtime, registry) = setup();
    registry.set_region(Some("fr"));
    let session = loaded_session(&registry, DEFAULT_HOMEPAGE).await;

    assert_eq!(session.current_uri(), "https://webxr.today/?region=fr");
}

#[tokio::test]
async fn test_region_ignored_for_custom_homepage() {
    let config = ShellConfig {
        homepage: "https://start.example.org/".to_string(),
        ..Default::default()
    };
    let (_runtime, registry) = setup_with(config);
    registry.set_region(Some("fr"));

    let session = loaded_session(&registry, "https://start.example.org/").await;
    assert_eq!(session.current_uri(), "https://start.example.org/");
}

#[tokio::test]
async fn test_desktop_mode_drops_mobile_host() {
    let (runtime, registry) = setup();
    let session = loaded_session(&registry, "https://m.example.com/news").await;
    let handle = current_mock(&runtime, &session);

    session.set_user_agent_mode(UserAgentMode::Desktop);

    assert_eq!(
        handle.calls().last(),
        Some(&HandleCall::LoadUri {
            uri: "https://example.com/news".to_string(),
            flags: LoadFlags::BYPASS_CACHE | LoadFlags::REPLACE_HISTORY,
        })
    );
    assert_eq!(handle.settings().viewport_mode, ViewportMode::Desktop);
    assert_eq!(session.settings().user_agent_mode, UserAgentMode::Desktop);
}

#[tokio::test]
async fn test_media_availability() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    let handle = current_mock(&runtime, &session);
    let recorder = Recorder::new();
    session.add_media_availability_listener(recorder.clone());

    handle.emit(EngineEventKind::MediaAdd(MediaElementId(1)));
    handle.emit(EngineEventKind::MediaAdd(MediaElementId(2)));
    handle.emit(EngineEventKind::MediaPlayback {
        element: MediaElementId(2),
        playing: true,
    });
    handle.emit(EngineEventKind::MediaFullScreen {
        element: MediaElementId(2),
        full_screen: true,
    });
    registry.process_pending_events().await;

    assert!(session.is_media_playing());
    assert_eq!(session.full_screen_video().map(|m| m.element), Some(MediaElementId(2)));

    handle.emit(EngineEventKind::MediaRemove(MediaElementId(1)));
    handle.emit(EngineEventKind::MediaRemove(MediaElementId(2)));
    registry.process_pending_events().await;

    assert!(!session.has_media());
    assert_eq!(recorder.events(), vec!["media:true", "media:false"]);
}

#[tokio::test]
async fn test_prompts_and_permissions() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    let handle = current_mock(&runtime, &session);

    let alert = || PromptRequest::Alert {
        title: None,
        message: Some("hello".to_string()),
    };

    let (tx, rx) = oneshot::channel();
    handle.emit(EngineEventKind::Prompt {
        request: alert(),
        responder: tx,
    });
    registry.process_pending_events().await;
    assert_eq!(rx.await.unwrap(), PromptResponse::Dismiss);

    session.set_prompt_delegate(Some(Arc::new(FixedPrompt)));
    let (tx, rx) = oneshot::channel();
    handle.emit(EngineEventKind::Prompt {
        request: alert(),
        responder: tx,
    });
    registry.process_pending_events().await;
    assert_eq!(rx.await.unwrap(), PromptResponse::Text("typed".to_string()));

    let (tx, rx) = oneshot::channel();
    handle.emit(EngineEventKind::Permission {
        request: PermissionRequest::Platform {
            permissions: vec!["camera".to_string()],
        },
        responder: tx,
    });
    registry.process_pending_events().await;
    assert_eq!(rx.await.unwrap(), PermissionResponse::Deny);
}

#[tokio::test]
async fn test_load_error_answers_error_page() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    let handle = current_mock(&runtime, &session);

    let (tx, rx) = oneshot::channel();
    handle.emit(EngineEventKind::LoadError {
        uri: "https://down.example/".to_string(),
        error: LoadError {
            category: LoadErrorCategory::Network,
            code: 2,
        },
        responder: tx,
    });
    registry.process_pending_events().await;

    let page = rx.await.unwrap().unwrap();
    assert!(page.starts_with("data:text/html"));
}

#[tokio::test]
async fn test_window_open_creates_sibling_session() {
    let (runtime, registry) = setup();
    let opener = registry.create_session(true, None).await.unwrap();
    registry.process_pending_events().await;
    let recorder = Recorder::new();
    opener.add_navigation_listener(recorder.clone());
    recorder.clear();

    let (tx, rx) = oneshot::channel();
    current_mock(&runtime, &opener).emit(EngineEventKind::NewSession {
        uri: "https://popup.example/".to_string(),
        responder: tx,
    });
    registry.process_pending_events().await;

    let handle = rx.await.unwrap().expect("new session handle");
    let opened = registry.session_for_handle(handle).unwrap();
    assert_ne!(opened.id(), opener.id());
    assert!(opened.is_private_mode());
    assert_eq!(registry.session_count(), 2);
    assert_eq!(recorder.events(), vec![format!("new_session:{}", opened.id())]);
    // The engine navigates the new handle itself
    assert!(current_mock(&runtime, &opened).loaded_uris().is_empty());
}

#[tokio::test]
async fn test_content_blocked_not_fanned_out() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;
    let recorder = Recorder::new();
    session.add_content_listener(recorder.clone());
    session.add_progress_listener(recorder.clone());
    recorder.clear();

    current_mock(&runtime, &session).emit(EngineEventKind::ContentBlocked(ContentBlockEvent {
        uri: "https://tracker.example/pixel.gif".to_string(),
        categories: BlockCategories::AD | BlockCategories::ANALYTIC,
    }));
    registry.process_pending_events().await;

    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_visits_recorded_outside_private_mode() {
    use crate::history::{InMemoryHistoryStore, VisitRecorder};

    let (runtime, registry) = setup();
    let store = Arc::new(InMemoryHistoryStore::new());
    let public = registry.create_session(false, None).await.unwrap();
    let private = registry.create_session(true, None).await.unwrap();
    for session in [&public, &private] {
        session.set_history_delegate(Some(Arc::new(VisitRecorder::new(store.clone()))));
    }

    async fn visit(registry: &SessionRegistry, handle: &MockEngineHandle, url: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        handle.emit(EngineEventKind::Visited {
            url: url.to_string(),
            last_visited_url: None,
            flags: VisitFlags::TOP_LEVEL,
            responder: tx,
        });
        registry.process_pending_events().await;
        rx.await.unwrap()
    }

    assert!(visit(&registry, &current_mock(&runtime, &public), "https://seen.example/").await);
    assert!(!visit(&registry, &current_mock(&runtime, &private), "https://hidden.example/").await);

    assert_eq!(store.visits_for("https://seen.example/").len(), 1);
    assert!(store.visits_for("https://hidden.example/").is_empty());

    let (tx, rx) = oneshot::channel();
    current_mock(&runtime, &private).emit(EngineEventKind::GetVisited {
        urls: vec!["https://seen.example/".to_string()],
        responder: tx,
    });
    registry.process_pending_events().await;
    assert!(rx.await.unwrap().is_empty());
}

async fn request_load(
    registry: &SessionRegistry,
    handle: &MockEngineHandle,
    request: LoadRequest,
) -> AllowOrDeny {
    let (tx, rx) = oneshot::channel();
    handle.emit(EngineEventKind::LoadRequest {
        request,
        responder: tx,
    });
    registry.process_pending_events().await;
    rx.await.unwrap()
}

#[tokio::test]
async fn test_user_agent_override_follows_load_requests() {
    let mut config = ShellConfig::default();
    config
        .user_agent_overrides
        .insert("video.example".to_string(), "Desktop/1.0".to_string());
    let (runtime, registry) = setup_with(config);
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;
    let handle = current_mock(&runtime, &session);

    let verdict = request_load(&registry, &handle, LoadRequest::new("https://www.video.example/v/1")).await;
    assert_eq!(verdict, AllowOrDeny::Allow);
    assert_eq!(handle.settings().user_agent_override.as_deref(), Some("Desktop/1.0"));
    assert_eq!(session.settings().user_agent_override.as_deref(), Some("Desktop/1.0"));

    // Leaving the site drops the override, once
    for _ in 0..2 {
        request_load(&registry, &handle, LoadRequest::new("https://other.example/")).await;
    }
    assert!(handle.settings().user_agent_override.is_none());
    assert!(session.settings().user_agent_override.is_none());
    let overrides = handle
        .calls()
        .iter()
        .filter(|c| matches!(c, HandleCall::SetUserAgentOverride(_)))
        .count();
    assert_eq!(overrides, 2);
}

#[tokio::test]
async fn test_user_agent_override_untouched_without_table() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;
    let handle = current_mock(&runtime, &session);

    session.set_user_agent_override(Some("Custom/1.0"));
    request_load(&registry, &handle, LoadRequest::new("https://example.com/")).await;

    assert_eq!(session.settings().user_agent_override.as_deref(), Some("Custom/1.0"));
}

#[tokio::test]
async fn test_youtube_request_is_rewritten() {
    let (runtime, registry) = setup();
    let session = registry.create_session(false, None).await.unwrap();
    registry.process_pending_events().await;
    session.add_navigation_listener(Arc::new(Voter(AllowOrDeny::Allow)));
    let handle = current_mock(&runtime, &session);

    let verdict =
        request_load(&registry, &handle, LoadRequest::new("http://m.youtube.com/watch?v=abc")).await;

    assert_eq!(verdict, AllowOrDeny::Deny);
    assert_eq!(
        handle.loaded_uris().last().map(String::as_str),
        Some("https://www.youtube.com/watch?v=abc&disable_polymer=1")
    );
    assert_eq!(session.current_uri(), "https://www.youtube.com/watch?v=abc&disable_polymer=1");

    // The rewritten uri goes through, as do loads into new windows
    let verdict = request_load(
        &registry,
        &handle,
        LoadRequest::new("https://www.youtube.com/watch?v=abc&disable_polymer=1"),
    )
    .await;
    assert_eq!(verdict, AllowOrDeny::Allow);

    let popup = LoadRequest {
        target: LoadTarget::New,
        ..LoadRequest::new("https://youtube.com/")
    };
    let loads = handle.loaded_uris().len();
    assert_eq!(request_load(&registry, &handle, popup).await, AllowOrDeny::Allow);
    assert_eq!(handle.loaded_uris().len(), loads);
}
