use crate::chart::{build_chart, ChartData};
use crate::ipc::Event;
use crate::playback_engine::{PlaybackEngine, PlaybackPlan};
use crate::scheduler::{BeatSchedule, BeatScheduler, ScheduleRequest};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use solfa_domain_score::{ConfigError, Speed, TimelineModel};
use solfa_ports::capture::{
    CapturePort, CaptureRequest, CompletionCallback, PitchSample, RenderedSpan, ServiceCompletion,
    SessionToken, TimingPort,
};
use solfa_ports::playback::{LeadInPolicy, PlaybackError};
use solfa_ports::storage::PracticeSettings;
use solfa_ports::timeline::MeasureRange;
use solfa_ports::types::Beat;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CANCELLED_MESSAGE: &str = "Recording canceled!";

const COMPLETION_QUEUE_CAPACITY: usize = 256;
const TIME_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    CountingIn,
    Recording,
    Processing,
    Ready,
    Cancelled,
}

impl SessionPhase {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionPhase::CountingIn | SessionPhase::Recording | SessionPhase::Processing
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("stale completion for session {token:?} (current {current:?})")]
    StaleSession {
        token: SessionToken,
        current: Option<SessionToken>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub speed: Speed,
    pub lead_in: LeadInPolicy,
    pub click_enabled: bool,
    pub latency_compensation: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &PracticeSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            speed: Speed::from_percent(settings.speed_percent)?,
            lead_in: settings.lead_in,
            click_enabled: settings.click_enabled,
            latency_compensation: Duration::from_millis(settings.latency_compensation_ms as u64),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            speed: Speed::NORMAL,
            lead_in: LeadInPolicy::default(),
            click_enabled: true,
            latency_compensation: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub token: SessionToken,
    pub phase: SessionPhase,
    pub range: MeasureRange,
    pub start_beat: Beat,
    pub end_beat: Beat,
    pub speed: f64,
}

struct ActiveSession {
    session: RecordingSession,
    schedule: BeatSchedule,
    counting_from: Instant,
    capture_started: bool,
    countdown: Option<u32>,
    pitches: Option<Vec<PitchSample>>,
    span: Option<RenderedSpan>,
}

/// Count-in, capture and analysis of one practice take at a time. The host
/// calls `tick` from its control thread and drains the queued events.
pub struct SessionController {
    timeline: Arc<TimelineModel>,
    scheduler: BeatScheduler,
    capture: Arc<dyn CapturePort>,
    timing: Arc<dyn TimingPort>,
    playback: PlaybackEngine,
    config: SessionConfig,
    last_token: u64,
    active: Option<ActiveSession>,
    completion_tx: Arc<Mutex<Producer<ServiceCompletion>>>,
    completion_rx: Consumer<ServiceCompletion>,
    events: VecDeque<Event>,
    chart: Option<ChartData>,
    last_error: Option<String>,
    replaying: bool,
}

impl SessionController {
    pub fn new(
        timeline: Arc<TimelineModel>,
        capture: Arc<dyn CapturePort>,
        timing: Arc<dyn TimingPort>,
        playback: PlaybackEngine,
        config: SessionConfig,
    ) -> Self {
        let (producer, consumer) = RingBuffer::new(COMPLETION_QUEUE_CAPACITY);
        Self {
            scheduler: BeatScheduler::new(timeline.clone()),
            timeline,
            capture,
            timing,
            playback,
            config,
            last_token: 0,
            active: None,
            completion_tx: Arc::new(Mutex::new(producer)),
            completion_rx: consumer,
            events: VecDeque::new(),
            chart: None,
            last_error: None,
            replaying: false,
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    // Applies to sessions started afterwards.
    pub fn set_timeline(&mut self, timeline: Arc<TimelineModel>) {
        self.scheduler = BeatScheduler::new(timeline.clone());
        self.timeline = timeline;
    }

    pub fn timeline(&self) -> &Arc<TimelineModel> {
        &self.timeline
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.playback
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.active.as_ref().map(|a| a.session.token)
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn phase(&self) -> SessionPhase {
        self.active
            .as_ref()
            .map_or(SessionPhase::Idle, |a| a.session.phase)
    }

    pub fn schedule(&self) -> Option<&BeatSchedule> {
        self.active.as_ref().map(|a| &a.schedule)
    }

    pub fn countdown(&self) -> Option<u32> {
        self.active.as_ref().and_then(|a| a.countdown)
    }

    pub fn chart(&self) -> Option<&ChartData> {
        self.chart.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn replay_available(&self) -> bool {
        self.phase() == SessionPhase::Ready && self.chart.is_some()
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn completion_callback(&self) -> CompletionCallback {
        completion_sender(&self.completion_tx)
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn start(&mut self, range: MeasureRange, now: Instant) -> Result<SessionToken, SessionError> {
        let request = ScheduleRequest::for_range(
            &self.timeline,
            range,
            self.config.speed.get(),
            self.config.lead_in,
            self.config.click_enabled,
        )?;
        let schedule = self.scheduler.schedule(&request)?;

        self.supersede_previous();

        self.last_token += 1;
        let token = SessionToken(self.last_token);
        self.chart = None;
        self.last_error = None;
        self.replaying = false;
        self.active = Some(ActiveSession {
            session: RecordingSession {
                token,
                phase: SessionPhase::CountingIn,
                range,
                start_beat: request.start_beat,
                end_beat: request.end_beat,
                speed: self.config.speed.get(),
            },
            schedule,
            counting_from: now,
            capture_started: false,
            countdown: None,
            pitches: None,
            span: None,
        });
        tracing::info!(session = token.0, start = range.start, end = range.end, "session started");
        self.emit_phase();

        if self.config.click_enabled {
            if let Err(err) = self.start_playback(now) {
                self.fail(err.to_string());
                return Err(err.into());
            }
        }

        self.tick(now);
        Ok(token)
    }

    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if !active.session.phase.is_busy() {
            return false;
        }

        self.playback.stop();
        let capture_started = active.capture_started;
        active.session.phase = SessionPhase::Cancelled;
        let token = active.session.token;

        if capture_started {
            if let Err(err) = self.capture.cancel_capture() {
                tracing::warn!(session = token.0, %err, "cancel capture failed");
            }
        }
        tracing::info!(session = token.0, "session cancelled");
        self.last_error = Some(CANCELLED_MESSAGE.to_string());
        self.emit_phase();
        self.events.push_back(Event::Cancelled {
            token,
            message: CANCELLED_MESSAGE.to_string(),
        });
        true
    }

    pub fn start_replay(&mut self) -> bool {
        if !self.replay_available() {
            return false;
        }
        self.replaying = true;
        self.events.push_back(Event::ReplayChanged { replaying: true });
        true
    }

    pub fn stop_replay(&mut self) {
        if self.replaying {
            self.replaying = false;
            self.events.push_back(Event::ReplayChanged { replaying: false });
        }
    }

    pub fn tick(&mut self, now: Instant) {
        while let Ok(completion) = self.completion_rx.pop() {
            if let Err(err) = self.handle_completion(completion) {
                tracing::debug!(%err, "completion discarded");
            }
        }

        let was_playing = self.playback.is_playing();
        let played = self.playback.tick(now);
        if was_playing && !self.playback.is_playing() {
            self.events
                .push_back(Event::PlaybackStateChanged { playing: false });
        }
        if let Err(err) = played {
            if self.phase().is_busy() {
                self.fail(err.to_string());
            } else {
                tracing::warn!(%err, "playback failed");
            }
        }

        if matches!(
            self.phase(),
            SessionPhase::CountingIn | SessionPhase::Recording
        ) {
            self.advance_count_in(now);
        }
    }

    pub fn handle_completion(&mut self, completion: ServiceCompletion) -> Result<(), SessionError> {
        let token = completion.token();
        let phase = self.check_current(token)?;

        match completion {
            ServiceCompletion::Captured { result, .. } => {
                if phase != SessionPhase::Recording {
                    return Err(self.stale(token));
                }
                match result {
                    Ok(()) => self.begin_processing(),
                    Err(err) => self.fail(err.to_string()),
                }
            }
            ServiceCompletion::Pitches { result, .. } => {
                if phase != SessionPhase::Processing {
                    return Err(self.stale(token));
                }
                match result {
                    Ok(pitches) => {
                        if let Some(active) = self.active.as_mut() {
                            active.pitches = Some(pitches);
                        }
                        self.try_finish();
                    }
                    Err(err) => self.fail(err.to_string()),
                }
            }
            ServiceCompletion::Span { result, .. } => {
                if phase != SessionPhase::Processing {
                    return Err(self.stale(token));
                }
                match result {
                    Ok(span) => {
                        if let Some(active) = self.active.as_mut() {
                            active.span = Some(span);
                        }
                        self.try_finish();
                    }
                    Err(err) => self.fail(err.to_string()),
                }
            }
        }
        Ok(())
    }

    fn check_current(&self, token: SessionToken) -> Result<SessionPhase, SessionError> {
        match self.active.as_ref() {
            Some(active) if active.session.token == token && active.session.phase.is_busy() => {
                Ok(active.session.phase)
            }
            _ => Err(self.stale(token)),
        }
    }

    fn stale(&self, token: SessionToken) -> SessionError {
        SessionError::StaleSession {
            token,
            current: self.current_token(),
        }
    }

    fn supersede_previous(&mut self) {
        self.playback.stop();
        if let Some(previous) = self.active.as_ref() {
            if previous.session.phase.is_busy() && previous.capture_started {
                if let Err(err) = self.capture.cancel_capture() {
                    tracing::warn!(session = previous.session.token.0, %err, "cancel capture failed");
                }
            }
        }
    }

    fn start_playback(&mut self, now: Instant) -> Result<(), PlaybackError> {
        let Some(active) = self.active.as_ref() else {
            return Ok(());
        };
        let plan = PlaybackPlan {
            timeline: self.timeline.clone(),
            schedule: active.schedule.clone(),
            start_beat: active.session.start_beat,
            end_beat: active.session.end_beat,
            speed: self.config.speed,
            click_enabled: self.config.click_enabled,
        };
        self.playback.prepare(&plan)?;
        self.playback.start(now)?;
        self.events
            .push_back(Event::PlaybackStateChanged { playing: true });
        Ok(())
    }

    fn advance_count_in(&mut self, now: Instant) {
        let threshold = self.config.latency_compensation.as_secs_f64();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let token = active.session.token;
        let elapsed = now.saturating_duration_since(active.counting_from).as_secs_f64();
        let remaining = active.schedule.lead_in_seconds - elapsed;

        // A beat counts down once its whole interval has passed.
        let lead_in = active.schedule.lead_in();
        let beats_left = lead_in
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let ends = lead_in
                    .get(i + 1)
                    .map_or(active.schedule.lead_in_seconds, |next| next.time);
                ends > elapsed + TIME_EPSILON
            })
            .count() as u32;
        if active.countdown != Some(beats_left) {
            active.countdown = Some(beats_left);
            self.events.push_back(Event::CountdownUpdated {
                token,
                remaining_beats: beats_left,
            });
        }

        if active.capture_started || remaining > threshold + TIME_EPSILON {
            return;
        }
        active.capture_started = true;
        let request = CaptureRequest {
            range: active.session.range,
            speed: active.session.speed,
        };
        tracing::info!(session = token.0, remaining, "capture requested");
        let done = completion_sender(&self.completion_tx);
        if let Err(err) = self.capture.begin_capture(token, request, done) {
            self.fail(err.to_string());
            return;
        }
        self.events.push_back(Event::RecordingStarted { token });

        if let Some(active) = self.active.as_mut() {
            active.session.phase = SessionPhase::Recording;
        }
        self.emit_phase();
    }

    fn begin_processing(&mut self) {
        let callback = self.completion_callback();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.session.phase = SessionPhase::Processing;
        let token = active.session.token;
        let range = active.session.range;
        let speed = active.session.speed;
        self.emit_phase();

        if let Err(err) = self.capture.extract_pitches(token, range, callback.clone()) {
            self.fail(err.to_string());
            return;
        }
        if let Err(err) = self.timing.rendered_span(token, range, speed, callback) {
            self.fail(err.to_string());
        }
    }

    fn try_finish(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let (Some(pitches), Some(span)) = (active.pitches.as_ref(), active.span) else {
            return;
        };

        let chart = build_chart(
            &self.timeline,
            active.session.start_beat,
            active.session.end_beat,
            pitches,
            Some(span),
        );
        active.session.phase = SessionPhase::Ready;
        let token = active.session.token;
        tracing::info!(session = token.0, points = chart.len(), "chart ready");

        self.chart = Some(chart.clone());
        self.emit_phase();
        self.events.push_back(Event::ChartReady { token, chart });
    }

    fn fail(&mut self, message: String) {
        self.playback.stop();
        if let Some(active) = self.active.as_mut() {
            tracing::warn!(session = active.session.token.0, %message, "session failed");
            active.session.phase = SessionPhase::Idle;
        }
        self.emit_phase();
        self.last_error = Some(message.clone());
        self.events.push_back(Event::ErrorSurfaced { message });
    }

    fn emit_phase(&mut self) {
        if let Some(active) = self.active.as_ref() {
            self.events.push_back(Event::PhaseChanged {
                token: active.session.token,
                phase: active.session.phase,
            });
        }
    }
}

fn completion_sender(tx: &Arc<Mutex<Producer<ServiceCompletion>>>) -> CompletionCallback {
    let tx = tx.clone();
    Arc::new(move |completion: ServiceCompletion| {
        if tx.lock().push(completion).is_err() {
            tracing::warn!("completion queue full, result dropped");
        }
    })
}
