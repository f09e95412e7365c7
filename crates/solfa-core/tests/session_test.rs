mod support;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use solfa_core::{
    AccentGains, Event, PlaybackEngine, SessionConfig, SessionController, SessionError,
    SessionPhase, CANCELLED_MESSAGE,
};
use solfa_domain_score::{ConfigError, TimelineModel};
use solfa_ports::audio::VoiceId;
use solfa_ports::capture::{
    CapturePort, CaptureRequest, CompletionCallback, PitchSample, RenderedSpan,
    ServiceCompletion, ServiceError, SessionToken, TimingPort,
};
use solfa_ports::playback::{LeadInPolicy, RenderMode};
use solfa_ports::timeline::{MeasureRange, ReferenceNote};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{two_bar_timeline, RecordingSink, SinkCall};

const RANGE: MeasureRange = MeasureRange { start: 1, end: 2 };

#[derive(Default)]
struct FakeCapture {
    begins: Mutex<Vec<(SessionToken, CaptureRequest)>>,
    extracts: Mutex<Vec<SessionToken>>,
    cancels: AtomicUsize,
    fail_begin: AtomicBool,
    done: Mutex<Option<CompletionCallback>>,
}

impl FakeCapture {
    fn begin_count(&self) -> usize {
        self.begins.lock().len()
    }

    fn finish(&self, completion: ServiceCompletion) {
        let done = self.done.lock().clone().expect("capture was requested");
        done(completion);
    }
}

impl CapturePort for FakeCapture {
    fn begin_capture(
        &self,
        token: SessionToken,
        request: CaptureRequest,
        done: CompletionCallback,
    ) -> Result<(), ServiceError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("no microphone".to_string()));
        }
        self.begins.lock().push((token, request));
        *self.done.lock() = Some(done);
        Ok(())
    }

    fn cancel_capture(&self) -> Result<(), ServiceError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn extract_pitches(
        &self,
        token: SessionToken,
        _range: MeasureRange,
        done: CompletionCallback,
    ) -> Result<(), ServiceError> {
        self.extracts.lock().push(token);
        *self.done.lock() = Some(done);
        Ok(())
    }
}

#[derive(Default)]
struct FakeTiming {
    requests: Mutex<Vec<(SessionToken, f64)>>,
}

impl TimingPort for FakeTiming {
    fn rendered_span(
        &self,
        token: SessionToken,
        _range: MeasureRange,
        speed: f64,
        _done: CompletionCallback,
    ) -> Result<(), ServiceError> {
        self.requests.lock().push((token, speed));
        Ok(())
    }
}

struct Harness {
    controller: SessionController,
    sink: Arc<RecordingSink>,
    capture: Arc<FakeCapture>,
    timing: Arc<FakeTiming>,
    t0: Instant,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        Self::with_mode(config, RenderMode::Offline)
    }

    fn with_mode(config: SessionConfig, mode: RenderMode) -> Self {
        let timeline = two_bar_timeline();
        let timeline = Arc::new(TimelineModel::clone(&timeline).with_reference_notes(vec![
            ReferenceNote {
                offset: 0.0,
                duration: 4.0,
                pitch: 60,
            },
            ReferenceNote {
                offset: 4.0,
                duration: 4.0,
                pitch: 62,
            },
        ]));
        let sink = RecordingSink::new(1_000);
        let capture = Arc::new(FakeCapture::default());
        let timing = Arc::new(FakeTiming::default());
        let engine = PlaybackEngine::with_mode(sink.clone(), mode, AccentGains::default());
        let controller =
            SessionController::new(timeline, capture.clone(), timing.clone(), engine, config);
        Self {
            controller,
            sink,
            capture,
            timing,
            t0: Instant::now(),
        }
    }

    fn at(&self, millis: u64) -> Instant {
        self.t0 + Duration::from_millis(millis)
    }

    fn tick(&mut self, millis: u64) {
        let now = self.at(millis);
        self.controller.tick(now);
    }

    fn deliver(&mut self, completion: ServiceCompletion, millis: u64) {
        (self.controller.completion_callback())(completion);
        self.tick(millis);
    }

    fn start(&mut self, millis: u64) -> Result<SessionToken, SessionError> {
        let now = self.at(millis);
        self.controller.start(RANGE, now)
    }

    /// Start a take and run it until capture has been requested.
    fn record(&mut self, millis: u64) -> SessionToken {
        let token = self.start(millis).expect("session starts");
        self.tick(millis + 1_000);
        assert_eq!(self.controller.phase(), SessionPhase::Recording);
        token
    }

    fn finish_capture(&mut self, token: SessionToken, millis: u64) {
        self.capture.finish(ServiceCompletion::Captured {
            token,
            result: Ok(()),
        });
        self.tick(millis);
    }
}

fn pitches() -> Vec<PitchSample> {
    vec![
        PitchSample { time: 0.0, hz: 440.0 },
        PitchSample { time: 0.5, hz: 0.0 },
        PitchSample { time: 1.0, hz: 220.0 },
        PitchSample { time: 1.5, hz: 880.0 },
    ]
}

const SPAN: RenderedSpan = RenderedSpan {
    start_time: 1.25,
    duration: 4.0,
};

#[test]
fn full_take_reaches_ready_with_chart() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.record(0);
    assert_eq!(token, SessionToken(1));

    h.finish_capture(token, 3_000);
    assert_eq!(h.controller.phase(), SessionPhase::Processing);
    assert_eq!(*h.capture.extracts.lock(), vec![token]);
    assert_eq!(*h.timing.requests.lock(), vec![(token, 1.0)]);

    h.deliver(
        ServiceCompletion::Pitches {
            token,
            result: Ok(pitches()),
        },
        3_100,
    );
    assert_eq!(h.controller.phase(), SessionPhase::Processing);
    assert!(h.controller.chart().is_none());

    h.deliver(
        ServiceCompletion::Span {
            token,
            result: Ok(SPAN),
        },
        3_200,
    );
    assert_eq!(h.controller.phase(), SessionPhase::Ready);

    let chart = h.controller.chart().expect("chart").clone();
    assert_eq!(chart.beat_axis, vec![0.0, 2.0, 4.0, 6.0]);
    assert_eq!(chart.labels, vec!["Bar 1", "", "Bar 2", ""]);
    assert_eq!(
        chart.reference,
        vec![Some(60.0), Some(60.0), Some(60.0), Some(62.0)]
    );
    assert_eq!(chart.live, vec![Some(69.0), None, Some(57.0), Some(81.0)]);
    assert_eq!(chart.span, Some(SPAN));

    let events = h.controller.drain_events();
    assert!(events.contains(&Event::ChartReady { token, chart }));
    assert!(h.controller.replay_available());
}

#[test]
fn capture_starts_once_before_recording_phase() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.start(0).expect("start");
    assert_eq!(h.controller.phase(), SessionPhase::CountingIn);

    h.tick(500);
    assert_eq!(h.capture.begin_count(), 0);
    assert_eq!(h.controller.phase(), SessionPhase::CountingIn);

    // Two seconds of count-in, one second of latency compensation.
    h.tick(1_000);
    assert_eq!(h.capture.begin_count(), 1);
    assert_eq!(h.controller.phase(), SessionPhase::Recording);

    for millis in [1_500, 2_000, 2_500, 4_000] {
        h.tick(millis);
    }
    assert_eq!(h.capture.begin_count(), 1);
    assert_eq!(
        h.capture.begins.lock()[0],
        (token, CaptureRequest { range: RANGE, speed: 1.0 })
    );

    let events = h.controller.drain_events();
    let started = events
        .iter()
        .position(|e| *e == Event::RecordingStarted { token })
        .expect("recording started");
    let recording = events
        .iter()
        .position(|e| {
            *e == Event::PhaseChanged {
                token,
                phase: SessionPhase::Recording,
            }
        })
        .expect("recording phase");
    assert!(started < recording);
}

#[test]
fn countdown_counts_lead_in_beats() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.start(0).expect("start");
    assert_eq!(h.controller.countdown(), Some(4));

    // The first beat is still sounding.
    h.tick(250);
    assert_eq!(h.controller.countdown(), Some(4));
    h.tick(500);
    assert_eq!(h.controller.countdown(), Some(3));
    for millis in [1_000, 1_500, 1_750] {
        h.tick(millis);
    }
    assert_eq!(h.controller.countdown(), Some(1));
    h.tick(2_000);
    assert_eq!(h.controller.countdown(), Some(0));

    let countdown: Vec<u32> = h
        .controller
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::CountdownUpdated {
                token: t,
                remaining_beats,
            } if t == token => Some(remaining_beats),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![4, 3, 2, 1, 0]);
}

#[test]
fn new_session_invalidates_previous_token() {
    let mut h = Harness::new(SessionConfig::default());
    let first = h.record(0);
    h.finish_capture(first, 3_000);
    assert_eq!(h.controller.phase(), SessionPhase::Processing);

    let second = h.start(4_000).expect("restart");
    assert_eq!(second, SessionToken(2));
    assert_eq!(h.controller.current_token(), Some(second));

    h.deliver(
        ServiceCompletion::Pitches {
            token: first,
            result: Ok(pitches()),
        },
        4_100,
    );
    h.deliver(
        ServiceCompletion::Span {
            token: first,
            result: Ok(SPAN),
        },
        4_200,
    );

    assert!(h.controller.chart().is_none());
    assert_eq!(h.controller.phase(), SessionPhase::CountingIn);

    let err = h
        .controller
        .handle_completion(ServiceCompletion::Captured {
            token: first,
            result: Ok(()),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::StaleSession { token, current: Some(current) }
            if token == first && current == second
    ));
}

#[test]
fn restarting_while_recording_cancels_capture() {
    let mut h = Harness::new(SessionConfig::default());
    let first = h.record(0);
    h.start(1_500).expect("restart");

    assert_eq!(h.capture.cancels.load(Ordering::SeqCst), 1);

    // The old capture finishing late does not advance the new take.
    h.capture.finish(ServiceCompletion::Captured {
        token: first,
        result: Ok(()),
    });
    h.tick(1_600);
    assert_eq!(h.controller.phase(), SessionPhase::CountingIn);
    assert!(h.capture.extracts.lock().is_empty());
}

#[test]
fn cancel_stops_playback_and_ignores_late_results() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.record(0);
    assert!(h.controller.playback().is_playing());

    assert!(h.controller.cancel());
    assert!(!h.controller.playback().is_playing());
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stop(VoiceId(1))));
    assert_eq!(h.controller.phase(), SessionPhase::Cancelled);
    assert_eq!(h.capture.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.last_error(), Some(CANCELLED_MESSAGE));

    let events = h.controller.drain_events();
    assert!(events.contains(&Event::Cancelled {
        token,
        message: CANCELLED_MESSAGE.to_string(),
    }));

    h.finish_capture(token, 3_000);
    assert_eq!(h.controller.phase(), SessionPhase::Cancelled);
    assert!(h.capture.extracts.lock().is_empty());

    assert!(!h.controller.cancel());
}

#[test]
fn cancel_during_count_in_skips_capture() {
    let mut h = Harness::new(SessionConfig::default());
    h.start(0).expect("start");
    assert!(h.controller.cancel());

    h.tick(1_500);
    h.tick(2_500);
    assert_eq!(h.capture.begin_count(), 0);
    assert_eq!(h.capture.cancels.load(Ordering::SeqCst), 0);
    assert_eq!(h.controller.phase(), SessionPhase::Cancelled);
}

#[test]
fn capture_failure_surfaces_error_and_goes_idle() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.record(0);

    h.capture.finish(ServiceCompletion::Captured {
        token,
        result: Err(ServiceError::Capture("buffer overrun".to_string())),
    });
    h.tick(2_500);

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(!h.controller.playback().is_playing());
    let message = "capture failed: buffer overrun".to_string();
    assert_eq!(h.controller.last_error(), Some(message.as_str()));
    assert!(h
        .controller
        .drain_events()
        .contains(&Event::ErrorSurfaced { message }));
}

#[test]
fn extraction_failure_surfaces_error() {
    let mut h = Harness::new(SessionConfig::default());
    let token = h.record(0);
    h.finish_capture(token, 3_000);

    h.deliver(
        ServiceCompletion::Pitches {
            token,
            result: Err(ServiceError::Extraction("silent take".to_string())),
        },
        3_100,
    );
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(
        h.controller.last_error(),
        Some("pitch extraction failed: silent take")
    );

    // The span arriving afterwards changes nothing.
    h.deliver(
        ServiceCompletion::Span {
            token,
            result: Ok(SPAN),
        },
        3_200,
    );
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.controller.chart().is_none());
}

#[test]
fn begin_capture_error_fails_session() {
    let mut h = Harness::new(SessionConfig::default());
    h.capture.fail_begin.store(true, Ordering::SeqCst);
    h.start(0).expect("start");
    h.tick(1_000);

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(
        h.controller.last_error(),
        Some("service unavailable: no microphone")
    );
    assert!(!h.controller.playback().is_playing());
}

#[test]
fn playback_failure_mid_count_in_fails_session() {
    let mut h = Harness::with_mode(SessionConfig::default(), RenderMode::Realtime);
    h.start(0).expect("start");
    assert_eq!(h.sink.starts(), 1);
    assert!(h.controller.playback().is_playing());

    h.sink.fail_next_starts(true);
    h.tick(500);

    let message = "audio error: device unavailable: unplugged".to_string();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(!h.controller.playback().is_playing());
    assert_eq!(h.controller.last_error(), Some(message.as_str()));
    assert!(h
        .controller
        .drain_events()
        .contains(&Event::ErrorSurfaced { message }));

    // Nothing more happens once the take has failed.
    h.tick(1_000);
    assert_eq!(h.capture.begin_count(), 0);
}

#[test]
fn muted_click_records_without_playback() {
    let config = SessionConfig {
        click_enabled: false,
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config);
    h.start(0).expect("start");

    // One bar of lead-in minus the muted bar leaves nothing to count.
    assert_eq!(h.controller.phase(), SessionPhase::Recording);
    assert_eq!(h.capture.begin_count(), 1);
    assert!(h.sink.calls().is_empty());
    assert!(!h.controller.playback().is_playing());
}

#[test]
fn longer_lead_in_delays_capture() {
    let config = SessionConfig {
        lead_in: LeadInPolicy {
            bars: 2,
            ..LeadInPolicy::default()
        },
        ..SessionConfig::default()
    };
    let mut h = Harness::new(config);
    h.start(0).expect("start");

    h.tick(2_999);
    assert_eq!(h.capture.begin_count(), 0);
    h.tick(3_000);
    assert_eq!(h.capture.begin_count(), 1);
}

#[test]
fn invalid_range_is_rejected_before_any_side_effect() {
    let mut h = Harness::new(SessionConfig::default());
    let now = h.at(0);
    let err = h
        .controller
        .start(MeasureRange { start: 1, end: 5 }, now)
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Config(ConfigError::UnknownMeasure(5))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(h.controller.current_token(), None);
    assert!(h.sink.calls().is_empty());
}

#[test]
fn replay_only_when_ready() {
    let mut h = Harness::new(SessionConfig::default());
    assert!(!h.controller.start_replay());

    let token = h.record(0);
    assert!(!h.controller.start_replay());
    h.finish_capture(token, 3_000);
    h.deliver(
        ServiceCompletion::Pitches {
            token,
            result: Ok(pitches()),
        },
        3_100,
    );
    h.deliver(
        ServiceCompletion::Span {
            token,
            result: Ok(SPAN),
        },
        3_200,
    );

    assert!(h.controller.start_replay());
    assert!(h.controller.is_replaying());
    h.controller.stop_replay();
    assert!(!h.controller.is_replaying());

    let replay: Vec<Event> = h
        .controller
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::ReplayChanged { .. }))
        .collect();
    assert_eq!(
        replay,
        vec![
            Event::ReplayChanged { replaying: true },
            Event::ReplayChanged { replaying: false },
        ]
    );
}
