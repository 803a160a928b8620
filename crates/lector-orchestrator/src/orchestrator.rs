//! The central coordinator: the read-to-playback pipeline, user command
//! handling, and renderer event handling over per-tab state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use async_trait::async_trait;
use lector_core::ports::{SpeechSynthesizer, StateStore, SynthesizedAudio};
use lector_core::protocol::{renderer_envelope, PageMessage, RendererCommand, RendererEvent, UserCommand};
use lector_core::{PlaybackPhase, PlaybackState, TabId};
use lector_messaging::{reply_is_ok, Destination, MessagePort, Messenger, Routes};

use crate::config::RetryPolicy;
use crate::lanes::TabLanes;
use crate::lifecycle::{RendererLifecycle, RendererPlatform, RendererSetupError};
use crate::platform::PageDirectory;

// ── Routing ────────────────────────────────────────────────────────

/// [`Routes`] over the page directory and the renderer platform. Resolution
/// doubles as the liveness probe: a closed tab or an absent renderer resolves
/// to `None` before any delivery is attempted.
struct Switchboard {
    pages: Arc<dyn PageDirectory>,
    platform: Arc<dyn RendererPlatform>,
}

#[async_trait]
impl Routes for Switchboard {
    async fn resolve(&self, destination: Destination) -> Option<Arc<dyn MessagePort>> {
        match destination {
            Destination::Tab(tab) => self.pages.agent_port(tab).await,
            Destination::Renderer => self.platform.renderer_port().await,
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// The coordinator. Cheap to clone via `Arc`; all entry points serialize
/// state-mutating work on the owning tab's lane.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    policy: RetryPolicy,
    store: Arc<dyn StateStore>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    pages: Arc<dyn PageDirectory>,
    platform: Arc<dyn RendererPlatform>,
    lifecycle: RendererLifecycle,
    messenger: Messenger,
    lanes: TabLanes,
    active_audio: Mutex<HashSet<TabId>>,
}

impl Orchestrator {
    pub fn new(
        policy: RetryPolicy,
        store: Arc<dyn StateStore>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        pages: Arc<dyn PageDirectory>,
        platform: Arc<dyn RendererPlatform>,
    ) -> Arc<Self> {
        let routes: Arc<dyn Routes> = Arc::new(Switchboard {
            pages: Arc::clone(&pages),
            platform: Arc::clone(&platform),
        });
        let lifecycle = RendererLifecycle::new(Arc::clone(&platform), policy.renderer_ready_timeout);
        Arc::new(Self {
            inner: Arc::new(Inner {
                policy,
                store,
                synthesizer,
                pages,
                platform,
                lifecycle,
                messenger: Messenger::new(routes),
                lanes: TabLanes::new(),
                active_audio: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Drive renderer events into the orchestrator for the life of `events`.
    pub fn spawn_event_pump(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<RendererEvent>) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                orchestrator.renderer_event(event).await;
            }
            debug!("renderer event pump stopped");
        });
    }

    /// Read `text` aloud for `tab`; resolves when the pipeline settles.
    pub async fn read_text(&self, tab: TabId, text: impl Into<String>) {
        let inner = Arc::clone(&self.inner);
        let text = text.into();
        let done = self
            .inner
            .lanes
            .run(tab, async move { inner.read_text_on_lane(tab, text).await });
        let _ = done.await;
    }

    /// Apply a user command relayed by the tab's page agent.
    pub async fn user_command(&self, tab: TabId, command: UserCommand) {
        let inner = Arc::clone(&self.inner);
        let done = self
            .inner
            .lanes
            .run(tab, async move { inner.user_command_on_lane(tab, command).await });
        let _ = done.await;
    }

    /// Apply a renderer event. Events naming a tab run on that tab's lane;
    /// the ready signal is the lifecycle's concern and is ignored here.
    pub async fn renderer_event(&self, event: RendererEvent) {
        let Some(tab) = event.tab_id() else {
            debug!("renderer ready signal observed outside lifecycle");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let done = self
            .inner
            .lanes
            .run(tab, async move { inner.renderer_event_on_lane(tab, event).await });
        let _ = done.await;
    }

    /// The stored state for a tab, or an empty object when none exists.
    pub async fn get_state(&self, tab: TabId) -> Value {
        match self.inner.store.load(tab).await {
            Ok(Some(state)) => {
                serde_json::to_value(state).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
            }
            Ok(None) => Value::Object(serde_json::Map::new()),
            Err(e) => {
                error!(%tab, error = %e, "state load failed");
                Value::Object(serde_json::Map::new())
            }
        }
    }

    /// The tab was closed.
    pub async fn tab_removed(&self, tab: TabId) {
        self.inner.cleanup_tab(tab, "removed").await;
    }

    /// The tab started navigating to a new page.
    pub async fn tab_navigating(&self, tab: TabId) {
        self.inner.cleanup_tab(tab, "navigating").await;
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

impl Inner {
    async fn read_text_on_lane(&self, tab: TabId, text: String) {
        if text.trim().is_empty() {
            warn!(%tab, "read request with no text");
            let mut state = PlaybackState::loading(String::new());
            state.fail("No text selected");
            self.persist(tab, &state).await;
            self.push_error(tab, "No text selected").await;
            return;
        }

        match self.pages.page_url(tab).await {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                debug!(%tab, url, "tab verified");
            }
            Some(url) => {
                warn!(%tab, url, "refusing to read on unsupported page");
                return;
            }
            None => {
                warn!(%tab, "tab is not accessible");
                return;
            }
        }

        info!(%tab, chars = text.len(), "read request accepted");
        let loading = PlaybackState::loading(text.clone());
        self.persist(tab, &loading).await;

        // Unreachable agent means degraded mode: audio without page UI.
        let mut page_ui = self.ensure_agent_ready(tab).await;
        if page_ui {
            page_ui = self.push_state(tab, &loading).await;
            if !page_ui {
                warn!(%tab, "loading state push failed, downgrading to audio-only");
            }
        } else {
            warn!(%tab, "page agent unreachable, continuing without page UI");
        }

        if let Err(e) = self.ensure_renderer_with_retry().await {
            error!(%tab, error = %e, "renderer setup exhausted");
            self.fail_request(tab, &text, "Failed to set up audio renderer", page_ui)
                .await;
            return;
        }

        let audio = match self.synthesizer.synthesize(&text).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(%tab, error = %e, "speech synthesis failed");
                self.fail_request(tab, &text, &e.to_string(), page_ui).await;
                return;
            }
        };

        let mut playing = PlaybackState::loading(text.clone());
        playing.begin_playing();
        self.persist(tab, &playing).await;

        if !self.dispatch_play(tab, &audio, playing.speed).await {
            self.fail_request(tab, &text, "Failed to start audio playback", page_ui)
                .await;
            return;
        }

        self.active_audio
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(tab);
        info!(%tab, "audio playback started");

        // Playback already runs; a failed final push never undoes it.
        if page_ui && !self.push_state(tab, &playing).await {
            warn!(%tab, "final state push failed, audio continues without page UI");
        }
    }

    /// Probe-inject-reprobe rounds until the agent answers or the budget is
    /// spent. `false` means degraded mode, not failure.
    async fn ensure_agent_ready(&self, tab: TabId) -> bool {
        for attempt in 1..=self.policy.agent_attempts {
            debug!(%tab, attempt, total = self.policy.agent_attempts, "probing page agent");
            if self.agent_responds(tab).await {
                return true;
            }
            if !self.pages.inject_agent(tab).await {
                warn!(%tab, "agent injection failed");
                return false;
            }
            // Progressively longer settle time after injection.
            tokio::time::sleep(self.policy.agent_retry_unit * attempt).await;
            if self.agent_responds(tab).await {
                return true;
            }
            tokio::time::sleep(self.policy.agent_grace).await;
            if self.agent_responds(tab).await {
                return true;
            }
        }
        false
    }

    async fn agent_responds(&self, tab: TabId) -> bool {
        let payload = match serde_json::to_value(PageMessage::Ping) {
            Ok(payload) => payload,
            Err(_) => return false,
        };
        match self
            .messenger
            .request(Destination::Tab(tab), payload, self.policy.agent_probe_timeout)
            .await
        {
            Ok(Some(reply)) => reply_is_ok(&reply),
            Ok(None) => false,
            Err(e) => {
                debug!(%tab, error = %e, "agent probe failed");
                false
            }
        }
    }

    async fn ensure_renderer_with_retry(&self) -> Result<(), RendererSetupError> {
        let mut last = RendererSetupError::ReadyTimeout;
        for attempt in 1..=self.policy.renderer_attempts {
            match self.lifecycle.ensure().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, total = self.policy.renderer_attempts, error = %e, "renderer setup attempt failed");
                    last = e;
                }
            }
            if attempt < self.policy.renderer_attempts {
                tokio::time::sleep(self.policy.renderer_backoff_base * 2u32.pow(attempt - 1))
                    .await;
            }
        }
        Err(last)
    }

    /// Bounded playback dispatch. If the renderer vanished between attempts,
    /// re-ensure it before retrying.
    async fn dispatch_play(&self, tab: TabId, audio: &SynthesizedAudio, speed: f64) -> bool {
        let payload = renderer_envelope(&RendererCommand::PlayAudio {
            tab_id: tab,
            audio_base64: audio.audio_base64.clone(),
            speed,
            mime_type: audio.mime_type.clone(),
        });

        for attempt in 1..=self.policy.dispatch_attempts {
            match self
                .messenger
                .request(Destination::Renderer, payload.clone(), self.policy.request_timeout)
                .await
            {
                Ok(Some(reply)) if reply_is_ok(&reply) => return true,
                Ok(Some(reply)) => warn!(%tab, attempt, %reply, "renderer rejected playback"),
                Ok(None) => warn!(%tab, attempt, "renderer unavailable for playback dispatch"),
                Err(e) => warn!(%tab, attempt, error = %e, "playback dispatch failed"),
            }
            if attempt < self.policy.dispatch_attempts {
                tokio::time::sleep(self.policy.dispatch_retry_unit * attempt).await;
                if !self.platform.renderer_exists().await {
                    info!("renderer vanished between dispatch attempts, recreating");
                    if let Err(e) = self.lifecycle.ensure().await {
                        warn!(error = %e, "could not recreate renderer for retry");
                    }
                }
            }
        }
        false
    }

    // ── User commands ──────────────────────────────────────────────

    async fn user_command_on_lane(&self, tab: TabId, command: UserCommand) {
        let Some(mut state) = self.load_state(tab).await else {
            warn!(%tab, ?command, "command for a tab with no state, discarding");
            return;
        };

        match command {
            UserCommand::Play | UserCommand::Pause => {
                let resume = matches!(command, UserCommand::Play);
                state.phase = if resume {
                    PlaybackPhase::Playing
                } else {
                    PlaybackPhase::Paused
                };
                self.persist(tab, &state).await;
                let forward = if resume {
                    RendererCommand::ResumeAudio
                } else {
                    RendererCommand::PauseAudio
                };
                self.forward_to_renderer(&forward).await;
                self.push_state(tab, &state).await;
            }
            UserCommand::Skip { value } => {
                // Pure pass-through; the renderer owns the finiteness check.
                self.forward_to_renderer(&RendererCommand::SeekAudio { time: value })
                    .await;
            }
            UserCommand::Speed { value } => {
                if !value.is_finite() || value <= 0.0 {
                    warn!(%tab, value, "ignoring non-finite playback speed");
                    return;
                }
                state.speed = value;
                self.persist(tab, &state).await;
                self.forward_to_renderer(&RendererCommand::SetSpeed { value })
                    .await;
                self.push_state(tab, &state).await;
            }
            UserCommand::StopAudio => {
                self.active_audio
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&tab);
                self.forward_to_renderer(&RendererCommand::StopAudio { tab_id: Some(tab) })
                    .await;
            }
        }
    }

    // ── Renderer events ────────────────────────────────────────────

    async fn renderer_event_on_lane(&self, tab: TabId, event: RendererEvent) {
        let Some(mut state) = self.load_state(tab).await else {
            warn!(%tab, ?event, "renderer event for a tab with no state, discarding");
            return;
        };

        match event {
            RendererEvent::AudioEnded { .. } => {
                self.active_audio
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&tab);
                state.finish();
                self.persist(tab, &state).await;
                self.push_state(tab, &state).await;
            }
            RendererEvent::AudioTimeUpdate { current_time, .. } => {
                // Forwarded every tick; not re-persisted, the durable record
                // is refreshed by coarser events.
                self.push_to_tab(tab, &PageMessage::TimeUpdate { time: current_time })
                    .await;
            }
            RendererEvent::UpdateDuration { duration, .. } => {
                state.duration = duration;
                self.persist(tab, &state).await;
                self.push_to_tab(tab, &PageMessage::UpdateDuration { duration })
                    .await;
            }
            RendererEvent::AudioError { error, .. } => {
                error!(%tab, error, "renderer reported a playback error");
                state.fail(error.clone());
                self.persist(tab, &state).await;
                self.push_error(tab, &error).await;
            }
            RendererEvent::Ready => {}
        }
    }

    // ── Cleanup ────────────────────────────────────────────────────

    async fn cleanup_tab(&self, tab: TabId, reason: &str) {
        info!(%tab, reason, "cleaning up tab");
        self.lanes.remove(tab);
        if let Err(e) = self.store.remove(tab).await {
            warn!(%tab, error = %e, "state removal failed");
        }
        let was_active = self
            .active_audio
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&tab);
        if was_active {
            self.forward_to_renderer(&RendererCommand::StopAudio { tab_id: Some(tab) })
                .await;
        }
    }

    // ── Shared helpers ─────────────────────────────────────────────

    async fn load_state(&self, tab: TabId) -> Option<PlaybackState> {
        match self.store.load(tab).await {
            Ok(state) => state,
            Err(e) => {
                error!(%tab, error = %e, "state load failed");
                None
            }
        }
    }

    async fn persist(&self, tab: TabId, state: &PlaybackState) {
        if let Err(e) = self.store.save(tab, state.clone()).await {
            error!(%tab, error = %e, "state save failed");
        }
    }

    async fn fail_request(&self, tab: TabId, text: &str, message: &str, page_ui: bool) {
        let mut state = PlaybackState::loading(text);
        state.fail(message);
        self.persist(tab, &state).await;
        if page_ui {
            self.push_error(tab, message).await;
        } else {
            debug!(%tab, message, "failure not surfaced, no page UI");
        }
    }

    /// Push a full state refresh to the tab; `false` on any failure.
    async fn push_state(&self, tab: TabId, state: &PlaybackState) -> bool {
        self.push_to_tab(
            tab,
            &PageMessage::UpdateState {
                state: state.clone(),
            },
        )
        .await
    }

    async fn push_error(&self, tab: TabId, message: &str) {
        self.push_to_tab(
            tab,
            &PageMessage::Error {
                message: message.to_owned(),
            },
        )
        .await;
    }

    /// Best-effort delivery to the page agent; failures only log.
    async fn push_to_tab(&self, tab: TabId, message: &PageMessage) -> bool {
        let Ok(payload) = serde_json::to_value(message) else {
            return false;
        };
        match self
            .messenger
            .request(Destination::Tab(tab), payload, self.policy.request_timeout)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(%tab, "page agent unavailable for push");
                false
            }
            Err(e) => {
                warn!(%tab, error = %e, "page push failed");
                false
            }
        }
    }

    /// Best-effort delivery to the renderer; failures only log.
    async fn forward_to_renderer(&self, command: &RendererCommand) {
        let payload = renderer_envelope(command);
        match self
            .messenger
            .request(Destination::Renderer, payload, self.policy.request_timeout)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!("renderer unavailable, command dropped"),
            Err(e) => warn!(error = %e, "renderer command failed"),
        }
    }
}
