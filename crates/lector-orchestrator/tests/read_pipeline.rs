//! End-to-end pipeline scenarios: a real orchestrator, lifecycle, and
//! renderer task, with mock pages, synthesis, and audio output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use lector_core::ports::{SpeechSynthesizer, StateStore, SynthesisError, SynthesizedAudio};
use lector_core::protocol::UserCommand;
use lector_core::{PlaybackPhase, TabId};
use lector_messaging::{ChannelPort, Envelope, MessagePort};
use lector_orchestrator::{
    LocalRendererPlatform, MemoryStateStore, Orchestrator, PageDirectory, RetryPolicy,
};
use lector_renderer::{AudioOutput, DecodedAudio, OutputFactory, PlaybackError};

// ── Mock audio output ──────────────────────────────────────────────

struct Playing {
    begun: Instant,
    base: f64,
    speed: f64,
    paused: bool,
    duration: f64,
}

impl Playing {
    fn position(&self) -> f64 {
        let pos = if self.paused {
            self.base
        } else {
            self.base + self.begun.elapsed().as_secs_f64() * self.speed
        };
        pos.min(self.duration)
    }
}

#[derive(Default)]
struct MockOutput {
    playing: Mutex<Option<Playing>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    seeks: Mutex<Vec<f64>>,
}

impl AudioOutput for MockOutput {
    fn start(&self, audio: &DecodedAudio, speed: f64) -> Result<(), PlaybackError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.playing.lock().unwrap() = Some(Playing {
            begun: Instant::now(),
            base: 0.0,
            speed,
            paused: false,
            duration: audio.duration_secs(),
        });
        Ok(())
    }

    fn pause(&self) {
        if let Some(p) = self.playing.lock().unwrap().as_mut() {
            p.base = p.position();
            p.paused = true;
        }
    }

    fn resume(&self) {
        if let Some(p) = self.playing.lock().unwrap().as_mut() {
            p.begun = Instant::now();
            p.paused = false;
        }
    }

    fn set_speed(&self, speed: f64) {
        if let Some(p) = self.playing.lock().unwrap().as_mut() {
            p.base = p.position();
            p.begun = Instant::now();
            p.speed = speed;
        }
    }

    fn seek(&self, position: Duration) -> Result<(), PlaybackError> {
        self.seeks.lock().unwrap().push(position.as_secs_f64());
        if let Some(p) = self.playing.lock().unwrap().as_mut() {
            p.base = position.as_secs_f64();
            p.begun = Instant::now();
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        self.playing
            .lock()
            .unwrap()
            .as_ref()
            .map_or(Duration::ZERO, |p| Duration::from_secs_f64(p.position()))
    }

    fn is_finished(&self) -> bool {
        self.playing
            .lock()
            .unwrap()
            .as_ref()
            .is_none_or(|p| !p.paused && p.position() >= p.duration)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.playing.lock().unwrap() = None;
    }
}

#[derive(Default)]
struct MockFactory {
    outputs: Mutex<Vec<Arc<MockOutput>>>,
}

impl MockFactory {
    fn output(&self, index: usize) -> Arc<MockOutput> {
        Arc::clone(&self.outputs.lock().unwrap()[index])
    }

    fn created(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }
}

impl OutputFactory for MockFactory {
    fn new_output(&self) -> Result<Arc<dyn AudioOutput>, PlaybackError> {
        let output = Arc::new(MockOutput::default());
        self.outputs.lock().unwrap().push(Arc::clone(&output));
        Ok(output)
    }
}

// ── Mock page directory ────────────────────────────────────────────

type AgentLog = Arc<Mutex<Vec<Value>>>;

#[derive(Default)]
struct MockPages {
    urls: Mutex<HashMap<TabId, String>>,
    agents: Mutex<HashMap<TabId, mpsc::UnboundedSender<Envelope>>>,
    inject_ok: AtomicBool,
    injections: AtomicUsize,
}

impl MockPages {
    fn new() -> Arc<Self> {
        let pages = Arc::new(Self::default());
        pages.inject_ok.store(true, Ordering::SeqCst);
        pages
    }

    fn add_tab(&self, tab: TabId, url: &str) {
        self.urls.lock().unwrap().insert(tab, url.to_owned());
    }

    /// Attach a live agent that acknowledges everything and logs payloads.
    fn attach_agent(&self, tab: TabId) -> AgentLog {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let log: AgentLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                sink.lock().unwrap().push(envelope.payload.clone());
                envelope.reply.settle(json!({"ok": true}));
            }
        });
        self.agents.lock().unwrap().insert(tab, tx);
        log
    }
}

#[async_trait]
impl PageDirectory for MockPages {
    async fn page_url(&self, tab: TabId) -> Option<String> {
        self.urls.lock().unwrap().get(&tab).cloned()
    }

    async fn agent_port(&self, tab: TabId) -> Option<Arc<dyn MessagePort>> {
        if !self.urls.lock().unwrap().contains_key(&tab) {
            return None;
        }
        let sender = self.agents.lock().unwrap().get(&tab).cloned();
        let sender = sender.unwrap_or_else(|| {
            // Tab exists but no agent lives in it: a dead inbox.
            let (tx, _rx) = mpsc::unbounded_channel();
            tx
        });
        Some(Arc::new(ChannelPort::new(sender)))
    }

    async fn inject_agent(&self, tab: TabId) -> bool {
        let _ = tab;
        self.injections.fetch_add(1, Ordering::SeqCst);
        self.inject_ok.load(Ordering::SeqCst)
    }
}

// ── Mock synthesizer ───────────────────────────────────────────────

enum SynthBehavior {
    Audio(SynthesizedAudio),
    Http(u16, String),
}

struct MockSynthesizer {
    behavior: SynthBehavior,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    fn pcm(seconds: f64) -> Self {
        let sample_count = (seconds * 24_000.0) as usize;
        let bytes: Vec<u8> = (0..sample_count)
            .flat_map(|i| (i16::try_from(i % 100).unwrap()).to_le_bytes())
            .collect();
        Self {
            behavior: SynthBehavior::Audio(SynthesizedAudio {
                audio_base64: STANDARD.encode(bytes),
                mime_type: Some("audio/L16;codec=pcm;rate=24000".to_owned()),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    fn http_error(status: u16, message: &str) -> Self {
        Self {
            behavior: SynthBehavior::Http(status, message.to_owned()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SynthBehavior::Audio(audio) => Ok(audio.clone()),
            SynthBehavior::Http(status, message) => Err(SynthesisError::Http {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryStateStore>,
    pages: Arc<MockPages>,
    factory: Arc<MockFactory>,
    synthesizer: Arc<MockSynthesizer>,
}

fn harness(synthesizer: MockSynthesizer) -> Harness {
    let factory = Arc::new(MockFactory::default());
    let (platform, renderer_events) =
        LocalRendererPlatform::new(Arc::clone(&factory) as Arc<dyn OutputFactory>);
    let store = Arc::new(MemoryStateStore::new());
    let pages = MockPages::new();
    let synthesizer = Arc::new(synthesizer);

    let orchestrator = Orchestrator::new(
        RetryPolicy::default(),
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&synthesizer) as Arc<dyn SpeechSynthesizer>,
        Arc::clone(&pages) as Arc<dyn PageDirectory>,
        platform,
    );
    orchestrator.spawn_event_pump(renderer_events);

    Harness {
        orchestrator,
        store,
        pages,
        factory,
        synthesizer,
    }
}

async fn wait_for_phase(store: &MemoryStateStore, tab: TabId, phase: PlaybackPhase) {
    for _ in 0..400 {
        if let Some(state) = store.load(tab).await.unwrap() {
            if state.phase == phase {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("tab {tab:?} never reached {phase:?}");
}

fn actions_of(log: &AgentLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|p| p.get("action").and_then(Value::as_str).map(str::to_owned))
        .collect()
}

fn pushed_phases(log: &AgentLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|p| p["action"] == "updateState")
        .filter_map(|p| p["state"]["phase"].as_str().map(str::to_owned))
        .collect()
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn happy_path_reads_text_and_plays_to_completion() {
    let h = harness(MockSynthesizer::pcm(0.3));
    let tab = TabId(7);
    h.pages.add_tab(tab, "https://example.com/article");
    let log = h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "hello world").await;

    // One output, started once; no injection was needed.
    assert_eq!(h.factory.created(), 1);
    assert_eq!(h.factory.output(0).starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.pages.injections.load(Ordering::SeqCst), 0);

    // The widget saw loading first, then playing.
    let phases = pushed_phases(&log);
    assert_eq!(phases[0], "loading");
    assert!(phases.contains(&"playing".to_owned()), "got {phases:?}");

    wait_for_phase(&h.store, tab, PlaybackPhase::Ended).await;

    let actions = actions_of(&log);
    assert!(actions.contains(&"updateDuration".to_owned()), "got {actions:?}");
    assert!(actions.contains(&"timeUpdate".to_owned()), "got {actions:?}");

    let state = h.store.load(tab).await.unwrap().unwrap();
    assert_eq!(state.time, 0.0);
    assert!((state.duration - 0.3).abs() < 1e-6);
    assert_eq!(h.factory.output(0).stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn synthesis_http_failure_surfaces_in_state_and_widget() {
    let h = harness(MockSynthesizer::http_error(403, "API key invalid"));
    let tab = TabId(2);
    h.pages.add_tab(tab, "https://example.com");
    let log = h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "some text").await;

    let state = h.store.load(tab).await.unwrap().unwrap();
    assert_eq!(state.phase, PlaybackPhase::Error);
    let message = state.error_message.unwrap();
    assert!(message.contains("403"), "got {message}");
    assert!(message.contains("API key invalid"), "got {message}");

    // The widget received the error; no audio was ever started.
    let errors: Vec<_> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|p| p["action"] == "error")
        .cloned()
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]["message"].as_str().unwrap().contains("403"));
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_agent_degrades_to_audio_only() {
    let h = harness(MockSynthesizer::pcm(0.2));
    let tab = TabId(4);
    // The tab exists on a supported page, but no agent lives in it and
    // injection (although reported successful) never produces one.
    h.pages.add_tab(tab, "https://example.com");

    h.orchestrator.read_text(tab, "read me anyway").await;

    // All probe rounds were spent, then playback proceeded without UI.
    assert_eq!(h.pages.injections.load(Ordering::SeqCst), 3);
    assert_eq!(h.factory.created(), 1);
    assert_eq!(h.factory.output(0).starts.load(Ordering::SeqCst), 1);

    wait_for_phase(&h.store, tab, PlaybackPhase::Ended).await;
}

#[tokio::test(start_paused = true)]
async fn failed_injection_breaks_out_of_the_probe_loop() {
    let h = harness(MockSynthesizer::pcm(0.2));
    let tab = TabId(5);
    h.pages.add_tab(tab, "https://example.com");
    h.pages.inject_ok.store(false, Ordering::SeqCst);

    h.orchestrator.read_text(tab, "still audible").await;

    // One failed injection ends the probing; audio still plays.
    assert_eq!(h.pages.injections.load(Ordering::SeqCst), 1);
    assert_eq!(h.factory.output(0).starts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_selection_is_an_error_without_synthesis() {
    let h = harness(MockSynthesizer::pcm(1.0));
    let tab = TabId(3);
    h.pages.add_tab(tab, "https://example.com");
    let log = h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "   ").await;

    let state = h.store.load(tab).await.unwrap().unwrap();
    assert_eq!(state.phase, PlaybackPhase::Error);
    assert_eq!(state.error_message.as_deref(), Some("No text selected"));
    assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 0);
    assert!(actions_of(&log).contains(&"error".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn system_pages_are_refused_without_state() {
    let h = harness(MockSynthesizer::pcm(1.0));
    let tab = TabId(9);
    h.pages.add_tab(tab, "chrome://settings");

    h.orchestrator.read_text(tab, "cannot read this").await;

    assert!(h.store.load(tab).await.unwrap().is_none());
    assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn rapid_skips_are_forwarded_in_arrival_order() {
    let h = harness(MockSynthesizer::pcm(30.0));
    let tab = TabId(1);
    h.pages.add_tab(tab, "https://example.com");
    h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "long article").await;

    tokio::join!(
        h.orchestrator.user_command(tab, UserCommand::Skip { value: 5.0 }),
        h.orchestrator.user_command(tab, UserCommand::Skip { value: 15.0 }),
    );

    assert_eq!(*h.factory.output(0).seeks.lock().unwrap(), vec![5.0, 15.0]);
}

#[tokio::test(start_paused = true)]
async fn pause_and_play_flip_phase_and_reach_the_renderer() {
    let h = harness(MockSynthesizer::pcm(30.0));
    let tab = TabId(1);
    h.pages.add_tab(tab, "https://example.com");
    let log = h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "long article").await;

    h.orchestrator.user_command(tab, UserCommand::Pause).await;
    let state = h.store.load(tab).await.unwrap().unwrap();
    assert_eq!(state.phase, PlaybackPhase::Paused);

    h.orchestrator.user_command(tab, UserCommand::Play).await;
    let state = h.store.load(tab).await.unwrap().unwrap();
    assert_eq!(state.phase, PlaybackPhase::Playing);

    let phases = pushed_phases(&log);
    assert!(phases.contains(&"paused".to_owned()), "got {phases:?}");
}

#[tokio::test(start_paused = true)]
async fn commands_for_an_unknown_tab_are_discarded() {
    let h = harness(MockSynthesizer::pcm(1.0));
    h.pages.add_tab(TabId(1), "https://example.com");

    // No read request ever ran for tab 8; nothing must reach the renderer.
    h.orchestrator
        .user_command(TabId(8), UserCommand::Speed { value: 1.5 })
        .await;
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn tab_removal_deletes_state_and_stops_its_audio() {
    let h = harness(MockSynthesizer::pcm(30.0));
    let tab = TabId(7);
    h.pages.add_tab(tab, "https://example.com");
    h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "long article").await;
    assert!(h.store.load(tab).await.unwrap().is_some());

    h.orchestrator.tab_removed(tab).await;

    assert!(h.store.load(tab).await.unwrap().is_none());
    assert_eq!(h.factory.output(0).stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn navigation_clears_state_without_stopping_ended_audio() {
    let h = harness(MockSynthesizer::pcm(1.0));
    let tab = TabId(4);
    h.pages.add_tab(tab, "https://example.com");
    h.pages.attach_agent(tab);

    h.orchestrator.read_text(tab, "short note").await;
    wait_for_phase(&h.store, tab, PlaybackPhase::Ended).await;
    let stops_after_end = h.factory.output(0).stops.load(Ordering::SeqCst);

    h.orchestrator.tab_navigating(tab).await;

    // State is gone, but ended audio gets no redundant stop command.
    assert!(h.store.load(tab).await.unwrap().is_none());
    assert_eq!(
        h.factory.output(0).stops.load(Ordering::SeqCst),
        stops_after_end
    );
}

#[tokio::test(start_paused = true)]
async fn get_state_returns_the_stored_state_or_an_empty_object() {
    let h = harness(MockSynthesizer::pcm(30.0));
    let tab = TabId(1);
    h.pages.add_tab(tab, "https://example.com");
    h.pages.attach_agent(tab);

    assert_eq!(h.orchestrator.get_state(tab).await, json!({}));

    h.orchestrator.read_text(tab, "long article").await;
    let state = h.orchestrator.get_state(tab).await;
    assert_eq!(state["phase"], "playing");
    assert_eq!(state["text"], "long article");
}
