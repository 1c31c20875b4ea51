//! Engine event handling
//!
//! Events reach a session only on the control context. State is updated
//! first, then listeners see it. Answers that depend on listeners or
//! delegates are computed on spawned tasks that never touch session state.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::engine::{
    AllowOrDeny, BlockCategories, ContentBlockEvent, EngineEvent, EngineEventKind, LoadFlags,
    LoadRequest, LoadTarget, PermissionResponse, PromptResponse,
};
use crate::overrides;
use crate::pages::{self, PRIVATE_BROWSING_URI};
use crate::session::browsing::Session;
use crate::session::state::Media;
use tokio::sync::oneshot;

/// Combine load-request votes: a single allow wins, no votes allow
pub fn aggregate_votes(votes: &[AllowOrDeny]) -> AllowOrDeny {
    if votes.is_empty() || votes.iter().any(|v| *v == AllowOrDeny::Allow) {
        AllowOrDeny::Allow
    } else {
        AllowOrDeny::Deny
    }
}

impl Session {
    /// Apply one engine callback
    ///
    /// Callbacks from a handle that is no longer current are dropped, with any
    /// responder answered by its fail-safe default.
    #[instrument(skip(self, event), fields(session = %self.id(), event = event.kind.name()))]
    pub async fn handle_event(&self, event: EngineEvent) {
        // Wait out an in-flight handle replacement
        drop(self.replacing.lock().await);

        if self.is_closed() {
            debug!("Session closed, dropping {}", event.kind.name());
            event.kind.respond_default();
            return;
        }

        if self.current_handle_id() != Some(event.handle) {
            debug!("Dropping {} from stale {}", event.kind.name(), event.handle);
            event.kind.respond_default();
            return;
        }

        match event.kind {
            EngineEventKind::LocationChange { uri } => self.on_location_change(uri),
            EngineEventKind::CanGoBack(can_go_back) => {
                self.state.write().navigation.can_go_back = can_go_back;
                self.listeners
                    .navigation
                    .dispatch(|l| l.on_can_go_back(self, can_go_back));
            }
            EngineEventKind::CanGoForward(can_go_forward) => {
                self.state.write().navigation.can_go_forward = can_go_forward;
                self.listeners
                    .navigation
                    .dispatch(|l| l.on_can_go_forward(self, can_go_forward));
            }
            EngineEventKind::LoadRequest { request, responder } => {
                self.on_load_request(request, responder)
            }
            EngineEventKind::LoadError {
                uri,
                error,
                responder,
            } => {
                debug!("Load error for {}: {} ({})", uri, error.category.as_str(), error.code);
                let _ = responder.send(Some(pages::error_page_uri(&uri, &error)));
            }
            kind @ EngineEventKind::NewSession { .. } => {
                // Only the registry can open sessions
                debug!("New session request reached the session directly, refusing");
                kind.respond_default();
            }
            EngineEventKind::PageStart { uri } => {
                self.state.write().navigation.loading = true;
                self.listeners.progress.dispatch(|l| l.on_page_start(self, &uri));
            }
            EngineEventKind::PageStop { success } => {
                self.state.write().navigation.loading = false;
                self.listeners.progress.dispatch(|l| l.on_page_stop(self, success));
            }
            EngineEventKind::SecurityChange(security) => {
                self.state.write().navigation.security = security.clone();
                self.listeners
                    .progress
                    .dispatch(|l| l.on_security_change(self, &security));
            }
            EngineEventKind::SessionStateChange(blob) => {
                self.state.write().navigation.engine_state = Some(blob);
            }
            EngineEventKind::TitleChange(title) => {
                self.state.write().navigation.title = title.clone();
                self.listeners
                    .content
                    .dispatch(|l| l.on_title_change(self, title.as_deref()));
            }
            EngineEventKind::FullScreen(full_screen) => {
                self.state.write().navigation.full_screen = full_screen;
                self.listeners
                    .content
                    .dispatch(|l| l.on_full_screen(self, full_screen));
            }
            EngineEventKind::ContextMenu { x, y, element } => {
                self.listeners
                    .content
                    .dispatch(|l| l.on_context_menu(self, x, y, &element));
            }
            EngineEventKind::Crash => self.recover_from_crash().await,
            EngineEventKind::FirstComposite => {
                self.listeners.content.dispatch(|l| l.on_first_composite(self));
            }
            EngineEventKind::FirstContentfulPaint => {
                self.listeners
                    .content
                    .dispatch(|l| l.on_first_contentful_paint(self));
            }
            EngineEventKind::RestartInput(reason) => {
                self.listeners
                    .text_input
                    .dispatch(|l| l.on_restart_input(self, reason));
            }
            EngineEventKind::ShowSoftInput => {
                self.state.write().navigation.input_active = true;
                self.listeners.text_input.dispatch(|l| l.on_show_soft_input(self));
            }
            EngineEventKind::HideSoftInput => {
                self.state.write().navigation.input_active = false;
                self.listeners.text_input.dispatch(|l| l.on_hide_soft_input(self));
            }
            EngineEventKind::UpdateSelection(selection) => {
                self.listeners
                    .text_input
                    .dispatch(|l| l.on_update_selection(self, &selection));
            }
            EngineEventKind::ContentBlocked(blocked) => self.log_content_blocked(&blocked),
            EngineEventKind::Prompt { request, responder } => {
                let delegate = self.prompt_delegate.read().clone();
                match delegate {
                    Some(delegate) => {
                        let answer = delegate.on_prompt(self, request);
                        tokio::spawn(async move {
                            let _ = responder.send(answer.await);
                        });
                    }
                    None => {
                        debug!("No prompt delegate, dismissing {} prompt", request.kind());
                        let _ = responder.send(PromptResponse::Dismiss);
                    }
                }
            }
            EngineEventKind::Permission { request, responder } => {
                let delegate = self.permission_delegate.read().clone();
                match delegate {
                    Some(delegate) => {
                        let answer = delegate.on_permission_request(self, request);
                        tokio::spawn(async move {
                            let _ = responder.send(answer.await);
                        });
                    }
                    None => {
                        debug!("No permission delegate, denying {:?}", request);
                        let _ = responder.send(PermissionResponse::Deny);
                    }
                }
            }
            EngineEventKind::MediaAdd(element) => {
                let first = {
                    let mut state = self.state.write();
                    state.media.push(Media::new(element));
                    state.media.len() == 1
                };
                if first {
                    self.listeners
                        .media_availability
                        .dispatch(|l| l.on_media_availability_change(self, true));
                }
            }
            EngineEventKind::MediaRemove(element) => {
                let last = {
                    let mut state = self.state.write();
                    let before = state.media.len();
                    state.media.retain(|m| m.element != element);
                    before > 0 && state.media.is_empty()
                };
                if last {
                    self.listeners
                        .media_availability
                        .dispatch(|l| l.on_media_availability_change(self, false));
                }
            }
            EngineEventKind::MediaFullScreen {
                element,
                full_screen,
            } => {
                if let Some(media) = self.state.write().media_mut(element) {
                    media.full_screen = full_screen;
                }
                self.listeners
                    .media_availability
                    .dispatch(|l| l.on_media_full_screen(self, element, full_screen));
            }
            EngineEventKind::MediaPlayback { element, playing } => {
                if let Some(media) = self.state.write().media_mut(element) {
                    media.playing = playing;
                }
                self.listeners
                    .media_availability
                    .dispatch(|l| l.on_media_playback(self, element, playing));
            }
            EngineEventKind::HistoryStateChange(entries) => {
                let delegate = self.history_delegate.read().clone();
                if let Some(delegate) = delegate {
                    delegate.on_history_state_change(self, &entries);
                }
            }
            EngineEventKind::Visited {
                url,
                last_visited_url,
                flags,
                responder,
            } => {
                let delegate = self.history_delegate.read().clone();
                match delegate {
                    Some(delegate) => {
                        let recorded =
                            delegate.on_visited(self, &url, last_visited_url.as_deref(), flags);
                        tokio::spawn(async move {
                            let _ = responder.send(recorded.await);
                        });
                    }
                    None => {
                        let _ = responder.send(false);
                    }
                }
            }
            EngineEventKind::GetVisited { urls, responder } => {
                let delegate = self.history_delegate.read().clone();
                match delegate {
                    Some(delegate) => {
                        let visited = delegate.get_visited(self, urls);
                        tokio::spawn(async move {
                            let _ = responder.send(visited.await);
                        });
                    }
                    None => {
                        let _ = responder.send(Vec::new());
                    }
                }
            }
        }
    }

    fn on_location_change(&self, uri: String) {
        {
            let mut state = self.state.write();
            let previous = std::mem::replace(&mut state.navigation.uri, uri.clone());
            state.navigation.previous_uri = Some(previous);
        }

        self.listeners
            .navigation
            .dispatch(|l| l.on_location_change(self, &uri));

        // The homepage finished loading after the region became known
        let redirect = self.state.read().region.is_some()
            && uri.eq_ignore_ascii_case(&self.config().homepage);
        if redirect {
            let home = self.home_uri();
            if home != uri {
                if let Some(handle) = self.current_handle() {
                    handle.load_uri(&pages::redirect_script(&home), LoadFlags::NONE);
                }
            }
        }
    }

    fn on_load_request(&self, request: LoadRequest, responder: oneshot::Sender<AllowOrDeny>) {
        if request.target == LoadTarget::Current {
            if let Some(target) = overrides::youtube_override(&request.uri) {
                debug!("Redirecting {} to {}", request.uri, target);
                if let Some(handle) = self.current_handle() {
                    handle.load_uri(&target, LoadFlags::NONE);
                }
                let _ = responder.send(AllowOrDeny::Deny);
                return;
            }
        }

        self.apply_user_agent_override(&request.uri);

        if request.uri.eq_ignore_ascii_case(PRIVATE_BROWSING_URI) {
            debug!("Denying navigation to {}", request.uri);
            let _ = responder.send(AllowOrDeny::Deny);
            return;
        }

        let votes = self
            .listeners
            .navigation
            .collect(|l| l.on_load_request(self, &request));

        if votes.is_empty() {
            let _ = responder.send(AllowOrDeny::Allow);
            return;
        }

        tokio::spawn(async move {
            let verdicts = join_all(votes).await;
            let _ = responder.send(aggregate_votes(&verdicts));
        });
    }

    /// Present the configured user agent for the site about to load
    fn apply_user_agent_override(&self, uri: &str) {
        if self.user_agent_overrides.is_empty() {
            return;
        }

        let user_agent = self.user_agent_overrides.lookup(uri).map(String::from);
        let handle = {
            let mut state = self.state.write();
            if state.settings.user_agent_override == user_agent {
                return;
            }
            state.settings.user_agent_override = user_agent.clone();
            state.handle.clone()
        };

        if let Some(handle) = handle {
            debug!("User agent override for {}: {:?}", uri, user_agent);
            handle.set_user_agent_override(user_agent.as_deref());
        }
    }

    fn log_content_blocked(&self, blocked: &ContentBlockEvent) {
        let categories = [
            (BlockCategories::AD, "ad"),
            (BlockCategories::ANALYTIC, "analytic"),
            (BlockCategories::CONTENT, "content"),
            (BlockCategories::SOCIAL, "social"),
        ];
        for (category, name) in categories {
            if blocked.categories.contains(category) {
                info!("Blocking {}: {}", name, blocked.uri);
            }
        }
    }

    /// Tell navigation listeners that page content opened `opened`
    pub(crate) fn notify_new_session(&self, opened: &Arc<Session>) {
        self.listeners
            .navigation
            .dispatch(|l| l.on_new_session(self, opened));
    }
}
