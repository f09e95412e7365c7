use crate::click::{render_click_track, AccentGains, ClickSample};
use crate::scheduler::{accent_at, first_grid_beat, BeatEvent, BeatSchedule};
use crate::task::ScheduledTask;
use solfa_domain_score::{Speed, TimelineModel, BEAT_EPSILON};
use solfa_ports::audio::{AudioSink, SampleBuffer, VoiceId};
use solfa_ports::playback::{PlaybackError, RenderMode};
use solfa_ports::timeline::TimeSignatureChange;
use solfa_ports::types::Beat;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Keeps a retime that lands exactly on a beat from clicking it twice.
const RETIME_NUDGE: Beat = 1e-6;

#[derive(Clone, Debug)]
pub struct PlaybackPlan {
    pub timeline: Arc<TimelineModel>,
    pub schedule: BeatSchedule,
    pub start_beat: Beat,
    pub end_beat: Beat,
    pub speed: Speed,
    pub click_enabled: bool,
}

#[derive(Debug)]
pub enum PlaybackHandle {
    Buffer { voice: VoiceId, ends_at: Instant },
    Timer(ScheduledTask),
}

pub trait PlaybackStrategy: Send {
    fn mode(&self) -> RenderMode;

    fn prepare(&mut self, plan: &PlaybackPlan) -> Result<(), PlaybackError>;

    fn start(&mut self, sink: &dyn AudioSink, now: Instant) -> Result<PlaybackHandle, PlaybackError>;

    // Ok(false) once playback has finished.
    fn poll(
        &mut self,
        sink: &dyn AudioSink,
        handle: &mut PlaybackHandle,
        now: Instant,
    ) -> Result<bool, PlaybackError>;

    fn stop(&mut self, sink: &dyn AudioSink, handle: PlaybackHandle);

    fn retime(
        &mut self,
        _handle: Option<&mut PlaybackHandle>,
        _timeline: Arc<TimelineModel>,
        _speed: Speed,
        _now: Instant,
    ) {
    }
}

pub struct OfflineClickTrack {
    click: ClickSample,
    gains: AccentGains,
    rendered: Option<(SampleBuffer, Duration)>,
}

impl OfflineClickTrack {
    pub fn new(click: ClickSample, gains: AccentGains) -> Self {
        Self {
            click,
            gains,
            rendered: None,
        }
    }

    pub fn rendered(&self) -> Option<&SampleBuffer> {
        self.rendered.as_ref().map(|(buffer, _)| buffer)
    }
}

impl PlaybackStrategy for OfflineClickTrack {
    fn mode(&self) -> RenderMode {
        RenderMode::Offline
    }

    fn prepare(&mut self, plan: &PlaybackPlan) -> Result<(), PlaybackError> {
        let samples = render_click_track(&plan.schedule, &self.click, self.gains);
        let duration = Duration::from_secs_f64(plan.schedule.total_seconds().max(0.0));
        self.rendered = Some((Arc::from(samples), duration));
        Ok(())
    }

    fn start(&mut self, sink: &dyn AudioSink, now: Instant) -> Result<PlaybackHandle, PlaybackError> {
        let (buffer, duration) = self.rendered.as_ref().ok_or(PlaybackError::NotPrepared)?;
        let voice = sink.start_voice(buffer.clone(), 1.0)?;
        Ok(PlaybackHandle::Buffer {
            voice,
            ends_at: now + *duration,
        })
    }

    fn poll(
        &mut self,
        _sink: &dyn AudioSink,
        handle: &mut PlaybackHandle,
        now: Instant,
    ) -> Result<bool, PlaybackError> {
        match handle {
            PlaybackHandle::Buffer { ends_at, .. } => Ok(now < *ends_at),
            PlaybackHandle::Timer(_) => Ok(false),
        }
    }

    fn stop(&mut self, sink: &dyn AudioSink, handle: PlaybackHandle) {
        match handle {
            PlaybackHandle::Buffer { voice, .. } => sink.stop_voice(voice),
            PlaybackHandle::Timer(task) => task.cancel(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BeatAnchor {
    at: Instant,
    beat: Beat,
}

struct RealtimeTiming {
    timeline: Arc<TimelineModel>,
    speed: Speed,
    start_beat: Beat,
    end_beat: Beat,
    click_enabled: bool,
    lead_in: Vec<BeatEvent>,
    lead_in_seconds: f64,
}

/// Fires one click per timer tick. Tempo and signature are read from the
/// timeline at each beat, so live edits apply from the next beat.
pub struct RealtimeClick {
    click: ClickSample,
    gains: AccentGains,
    timing: Option<RealtimeTiming>,
    started_at: Option<Instant>,
    next_lead_in: usize,
    anchor: Option<BeatAnchor>,
    next_beat: Beat,
    fired: u64,
}

impl RealtimeClick {
    pub fn new(click: ClickSample, gains: AccentGains) -> Self {
        Self {
            click,
            gains,
            timing: None,
            started_at: None,
            next_lead_in: 0,
            anchor: None,
            next_beat: 0.0,
            fired: 0,
        }
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    fn current_beat(timing: &RealtimeTiming, anchor: BeatAnchor, now: Instant) -> Beat {
        let elapsed = now.saturating_duration_since(anchor.at).as_secs_f64();
        timing.timeline.beats_after(anchor.beat, elapsed, timing.speed)
    }

    fn fire_lead_in(
        &mut self,
        sink: &dyn AudioSink,
        task: &mut ScheduledTask,
        now: Instant,
    ) -> Result<(), PlaybackError> {
        let (Some(timing), Some(started_at)) = (self.timing.as_ref(), self.started_at) else {
            return Err(PlaybackError::NotPrepared);
        };
        let event = timing.lead_in[self.next_lead_in];
        let drift = task.overshoot(now);
        sink.trigger(self.click.samples().clone(), self.gains.gain(event.accent))?;
        self.fired += 1;
        self.next_lead_in += 1;

        let next_time = timing
            .lead_in
            .get(self.next_lead_in)
            .map(|next| next.time)
            .unwrap_or(timing.lead_in_seconds);
        let interval = Duration::from_secs_f64((next_time - event.time).max(0.0));
        task.reschedule(now + interval.saturating_sub(drift));

        if self.next_lead_in == timing.lead_in.len() {
            let at = started_at + Duration::from_secs_f64(timing.lead_in_seconds);
            self.enter_main(at);
        }
        Ok(())
    }

    fn enter_main(&mut self, at: Instant) {
        let Some(timing) = self.timing.as_ref() else {
            return;
        };
        let ts = timing.timeline.time_signature_at(timing.start_beat);
        self.next_beat = first_grid_beat(&timing.timeline, timing.start_beat, ts);
        self.anchor = Some(BeatAnchor {
            at,
            beat: timing.start_beat,
        });
    }

    fn time_of(timing: &RealtimeTiming, anchor: BeatAnchor, beat: Beat) -> Instant {
        let seconds = timing
            .timeline
            .seconds_between(anchor.beat, beat, timing.speed)
            .max(0.0);
        anchor.at + Duration::from_secs_f64(seconds)
    }

    fn fire_main(
        &mut self,
        sink: &dyn AudioSink,
        task: &mut ScheduledTask,
        now: Instant,
    ) -> Result<bool, PlaybackError> {
        let (Some(timing), Some(anchor)) = (self.timing.as_ref(), self.anchor) else {
            return Err(PlaybackError::NotPrepared);
        };
        if !timing.click_enabled {
            // Muted: stay silent until the range has played out.
            let ends_at = Self::time_of(timing, anchor, timing.end_beat);
            if now >= ends_at {
                return Ok(false);
            }
            task.reschedule(ends_at);
            return Ok(true);
        }

        let beat = self.next_beat;
        if beat >= timing.end_beat - BEAT_EPSILON {
            return Ok(false);
        }
        let ts = timing.timeline.time_signature_at(beat);
        let accent = accent_at(&timing.timeline, beat, ts);
        sink.trigger(self.click.samples().clone(), self.gains.gain(accent))?;
        self.fired += 1;

        let next = following_beat(&timing.timeline, beat, ts);
        self.next_beat = next;
        task.reschedule(Self::time_of(timing, anchor, next));
        Ok(true)
    }
}

fn following_beat(timeline: &TimelineModel, beat: Beat, ts: &TimeSignatureChange) -> Beat {
    let candidate = beat + ts.signature().beat_unit();
    let idx = timeline.signature_index_at(beat);
    match timeline.signatures().get(idx + 1) {
        Some(change) if change.offset < candidate - BEAT_EPSILON => {
            first_grid_beat(timeline, change.offset, change)
        }
        _ => candidate,
    }
}

impl PlaybackStrategy for RealtimeClick {
    fn mode(&self) -> RenderMode {
        RenderMode::Realtime
    }

    fn prepare(&mut self, plan: &PlaybackPlan) -> Result<(), PlaybackError> {
        self.timing = Some(RealtimeTiming {
            timeline: plan.timeline.clone(),
            speed: plan.speed,
            start_beat: plan.start_beat,
            end_beat: plan.end_beat,
            click_enabled: plan.click_enabled,
            lead_in: plan.schedule.lead_in().to_vec(),
            lead_in_seconds: plan.schedule.lead_in_seconds,
        });
        Ok(())
    }

    fn start(&mut self, _sink: &dyn AudioSink, now: Instant) -> Result<PlaybackHandle, PlaybackError> {
        let timing = self.timing.as_ref().ok_or(PlaybackError::NotPrepared)?;
        let counts_in = !timing.lead_in.is_empty();
        let main_at = now + Duration::from_secs_f64(timing.lead_in_seconds);
        self.started_at = Some(now);
        self.next_lead_in = 0;
        self.fired = 0;
        self.anchor = None;
        if !counts_in {
            self.enter_main(main_at);
        }
        Ok(PlaybackHandle::Timer(ScheduledTask::new(now)))
    }

    fn poll(
        &mut self,
        sink: &dyn AudioSink,
        handle: &mut PlaybackHandle,
        now: Instant,
    ) -> Result<bool, PlaybackError> {
        let PlaybackHandle::Timer(task) = handle else {
            return Ok(false);
        };
        if task.is_cancelled() {
            return Ok(false);
        }
        if !task.is_due(now) {
            return Ok(true);
        }

        let in_lead_in = self
            .timing
            .as_ref()
            .map_or(false, |timing| self.next_lead_in < timing.lead_in.len());
        if in_lead_in {
            self.fire_lead_in(sink, task, now)?;
            Ok(true)
        } else {
            self.fire_main(sink, task, now)
        }
    }

    fn stop(&mut self, sink: &dyn AudioSink, handle: PlaybackHandle) {
        match handle {
            PlaybackHandle::Timer(task) => task.cancel(),
            PlaybackHandle::Buffer { voice, .. } => sink.stop_voice(voice),
        }
        self.started_at = None;
        self.anchor = None;
    }

    fn retime(
        &mut self,
        handle: Option<&mut PlaybackHandle>,
        timeline: Arc<TimelineModel>,
        speed: Speed,
        now: Instant,
    ) {
        let Some(timing) = self.timing.as_mut() else {
            return;
        };
        let anchor = match self.anchor {
            Some(anchor) if now >= anchor.at => anchor,
            waiting => {
                // Not in the main pass yet: the new values apply once it begins.
                timing.timeline = timeline;
                timing.speed = speed;
                if waiting.is_some() {
                    let ts = timing.timeline.time_signature_at(timing.start_beat);
                    self.next_beat = first_grid_beat(&timing.timeline, timing.start_beat, ts);
                }
                return;
            }
        };

        let beat = Self::current_beat(timing, anchor, now);
        timing.timeline = timeline;
        timing.speed = speed;
        let anchor = BeatAnchor { at: now, beat };
        self.anchor = Some(anchor);

        let ts = timing.timeline.time_signature_at(beat);
        self.next_beat = first_grid_beat(&timing.timeline, beat + RETIME_NUDGE, ts);
        if let Some(PlaybackHandle::Timer(task)) = handle {
            task.reschedule(Self::time_of(timing, anchor, self.next_beat));
        }
    }
}

/// Owns the single live playback handle; starting tears down the previous one.
pub struct PlaybackEngine {
    sink: Arc<dyn AudioSink>,
    strategy: Box<dyn PlaybackStrategy>,
    handle: Option<PlaybackHandle>,
}

impl PlaybackEngine {
    pub fn new(sink: Arc<dyn AudioSink>, strategy: Box<dyn PlaybackStrategy>) -> Self {
        Self {
            sink,
            strategy,
            handle: None,
        }
    }

    pub fn with_mode(sink: Arc<dyn AudioSink>, mode: RenderMode, gains: AccentGains) -> Self {
        let click = ClickSample::synth(sink.sample_rate_hz());
        let strategy: Box<dyn PlaybackStrategy> = match mode {
            RenderMode::Offline => Box::new(OfflineClickTrack::new(click, gains)),
            RenderMode::Realtime => Box::new(RealtimeClick::new(click, gains)),
        };
        Self::new(sink, strategy)
    }

    pub fn mode(&self) -> RenderMode {
        self.strategy.mode()
    }

    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.sink
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn PlaybackStrategy>) {
        self.stop();
        self.strategy = strategy;
    }

    pub fn prepare(&mut self, plan: &PlaybackPlan) -> Result<(), PlaybackError> {
        self.strategy.prepare(plan)
    }

    pub fn start(&mut self, now: Instant) -> Result<(), PlaybackError> {
        self.stop();
        let handle = self.strategy.start(self.sink.as_ref(), now)?;
        tracing::debug!(mode = ?self.strategy.mode(), "playback started");
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.strategy.stop(self.sink.as_ref(), handle);
            tracing::debug!("playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.handle.is_some()
    }

    pub fn tick(&mut self, now: Instant) -> Result<(), PlaybackError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        match self.strategy.poll(self.sink.as_ref(), handle, now) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.stop();
                Ok(())
            }
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    pub fn retime(&mut self, timeline: Arc<TimelineModel>, speed: Speed, now: Instant) {
        self.strategy
            .retime(self.handle.as_mut(), timeline, speed, now);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
