mod error;

use clap::{Args, Parser, Subcommand, ValueEnum};
use error::{AppError, Result};
use solfa_core::{
    export_diagnostics, AccentGains, AudioClock, AudioParams, BeatKind, BeatSchedule,
    BeatScheduler, MixerSink, NotePreview, PlaybackEngine, PlaybackPlan, ScheduleRequest,
};
use solfa_domain_score::{Speed, TimelineModel};
use solfa_infra_audio_cpal::CpalAudioOutputPort;
use solfa_infra_storage_fs::{FsStorage, JsonTimelineProvider};
use solfa_ports::audio::AudioOutputPort;
use solfa_ports::playback::{LeadInPattern, RenderMode};
use solfa_ports::storage::{PracticeSettings, StoragePort};
use solfa_ports::timeline::MeasureRange;
use solfa_ports::types::{AudioConfig, AudioOutputDevice, DeviceId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(2);
const RING_OUT: Duration = Duration::from_millis(250);
const PREVIEW_LENGTH: Duration = Duration::from_millis(1_100);

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(%err, "command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Count-in and click track practice tool", long_about = None)]
struct Cli {
    /// Settings directory (defaults to the platform config dir).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List audio output devices.
    Devices,
    /// Print the click schedule for a measure range.
    Schedule {
        #[command(flatten)]
        practice: PracticeArgs,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Play the count-in and click track through an output device.
    Play {
        #[command(flatten)]
        practice: PracticeArgs,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Output device id as printed by `devices`.
        #[arg(long)]
        device: Option<String>,
    },
    /// Sound the first reference note of the range.
    Preview {
        timeline: PathBuf,
        #[arg(long, default_value_t = 1)]
        from: u32,
        #[arg(long)]
        device: Option<String>,
    },
    /// Show or change stored practice settings.
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Write a diagnostics bundle.
    Diagnostics {
        /// Target directory (defaults to `<config>/diagnostics`).
        out: Option<PathBuf>,
        /// Include the schedule summary for this timeline file.
        #[arg(long)]
        timeline: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        speed: Option<u32>,
        #[arg(long)]
        click: Option<bool>,
        #[arg(long)]
        lead_in_bars: Option<u32>,
        #[arg(long)]
        latency_ms: Option<u32>,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        #[arg(long)]
        device: Option<String>,
    },
    Reset,
}

#[derive(Args, Debug, Clone)]
struct PracticeArgs {
    /// JSON timeline file.
    timeline: PathBuf,
    /// First measure, 1-based.
    #[arg(long, default_value_t = 1)]
    from: u32,
    /// Last measure, inclusive (defaults to the last measure).
    #[arg(long)]
    to: Option<u32>,
    /// Speed in percent of the written tempo.
    #[arg(long)]
    speed: Option<u32>,
    /// Count-in length in bars.
    #[arg(long)]
    lead_in_bars: Option<u32>,
    /// Count in a fixed number of beats per bar instead of the first measure.
    #[arg(long)]
    lead_in_beats: Option<u32>,
    /// Mute the click; the count-in is shortened by a bar.
    #[arg(long)]
    no_click: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Offline,
    Realtime,
}

impl From<ModeArg> for RenderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offline => RenderMode::Offline,
            ModeArg::Realtime => RenderMode::Realtime,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let storage = match cli.config_dir {
        Some(dir) => FsStorage::new(dir),
        None => FsStorage::default(),
    };
    let settings = storage.load_settings()?;

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Schedule { practice, json } => print_schedule(&settings, &practice, json),
        Commands::Play {
            practice,
            mode,
            device,
        } => play(&settings, &practice, mode.map(Into::into), device),
        Commands::Preview {
            timeline,
            from,
            device,
        } => preview(&settings, &timeline, from, device),
        Commands::Settings { action } => edit_settings(&storage, settings, action),
        Commands::Diagnostics { out, timeline } => {
            let dir = out.unwrap_or_else(|| storage.diagnostics_dir());
            diagnostics(&settings, &dir, timeline)
        }
    }
}

struct Prepared {
    timeline: Arc<TimelineModel>,
    request: ScheduleRequest,
    schedule: BeatSchedule,
    speed: Speed,
}

fn load_timeline(path: &Path) -> Result<Arc<TimelineModel>> {
    let provider = JsonTimelineProvider::load(path)?;
    Ok(Arc::new(TimelineModel::from_port(&provider)?))
}

fn prepare(settings: &PracticeSettings, args: &PracticeArgs) -> Result<Prepared> {
    let timeline = load_timeline(&args.timeline)?;
    let last = timeline
        .measures()
        .last()
        .map(|m| m.measure)
        .ok_or_else(|| AppError::Usage("timeline has no measures".to_string()))?;
    let range = MeasureRange {
        start: args.from,
        end: args.to.unwrap_or(last),
    };

    let speed = Speed::from_percent(args.speed.unwrap_or(settings.speed_percent))?;
    let mut lead_in = settings.lead_in;
    if let Some(bars) = args.lead_in_bars {
        lead_in.bars = bars;
    }
    if let Some(beats) = args.lead_in_beats {
        lead_in.pattern = LeadInPattern::FixedBeats(beats);
    }
    let click_enabled = settings.click_enabled && !args.no_click;

    let request =
        ScheduleRequest::for_range(&timeline, range, speed.get(), lead_in, click_enabled)?;
    let schedule = BeatScheduler::new(timeline.clone()).schedule(&request)?;
    tracing::info!(
        from = range.start,
        to = range.end,
        speed = speed.get(),
        events = schedule.events.len(),
        "schedule ready"
    );
    Ok(Prepared {
        timeline,
        request,
        schedule,
        speed,
    })
}

fn list_devices() -> Result<()> {
    let port = CpalAudioOutputPort::new();
    for device in port.list_outputs()? {
        println!(
            "{}\t{}\t{} Hz, {} ch",
            device.id, device.name, device.default_config.sample_rate_hz, device.default_config.channels
        );
    }
    Ok(())
}

fn print_schedule(settings: &PracticeSettings, args: &PracticeArgs, json: bool) -> Result<()> {
    let prepared = prepare(settings, args)?;
    let schedule = &prepared.schedule;
    if json {
        println!("{}", serde_json::to_string_pretty(schedule)?);
        return Ok(());
    }

    for (i, event) in schedule.events.iter().enumerate() {
        let what = match event.kind {
            BeatKind::LeadIn { bar, index } => format!("count-in {}.{}", bar + 1, index + 1),
            BeatKind::Main { beat } => {
                let measure = prepared
                    .timeline
                    .beat_to_measure(beat)
                    .map_or_else(|| "?".to_string(), |m| m.to_string());
                format!("bar {measure} beat {beat:.3}")
            }
        };
        let accent = format!("{:?}", event.accent);
        println!("{i:>4}  {:>9.3}s  {accent:<6}  {what}", event.time);
    }
    println!(
        "count-in {:.3}s, range {:.3}s, total {:.3}s, range starts {:.3}s into the score",
        schedule.lead_in_seconds,
        schedule.main_seconds,
        schedule.total_seconds(),
        prepared
            .timeline
            .beat_to_seconds(prepared.request.start_beat, prepared.speed)
    );
    Ok(())
}

fn pick_output(
    port: &dyn AudioOutputPort,
    requested: Option<&str>,
    settings: &PracticeSettings,
) -> Result<AudioOutputDevice> {
    let wanted = requested
        .map(|id| DeviceId(id.to_string()))
        .or_else(|| settings.selected_audio_out.clone());
    match wanted {
        Some(id) => port
            .list_outputs()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::Usage(format!("no output device {id}"))),
        None => Ok(port.default_output()?),
    }
}

fn open_sink(
    port: &CpalAudioOutputPort,
    device: Option<String>,
    settings: &PracticeSettings,
) -> Result<Arc<MixerSink>> {
    let output = pick_output(port, device.as_deref(), settings)?;
    let config = AudioConfig {
        sample_rate_hz: output.default_config.sample_rate_hz,
        channels: output.default_config.channels,
        buffer_size_frames: None,
    };
    let params = Arc::new(AudioParams::new(settings));
    let clock = Arc::new(AudioClock::new());
    Ok(Arc::new(MixerSink::open(port, &output.id, config, params, clock)?))
}

fn play(
    settings: &PracticeSettings,
    args: &PracticeArgs,
    mode: Option<RenderMode>,
    device: Option<String>,
) -> Result<()> {
    let prepared = prepare(settings, args)?;
    if prepared.schedule.events.is_empty() {
        println!("nothing to play");
        return Ok(());
    }

    let port = CpalAudioOutputPort::new();
    let sink = open_sink(&port, device, settings)?;
    let mode = mode.unwrap_or(settings.render_mode);
    let mut engine = PlaybackEngine::with_mode(
        sink.clone(),
        mode,
        AccentGains::from_settings(settings),
    );

    engine.prepare(&PlaybackPlan {
        timeline: prepared.timeline.clone(),
        schedule: prepared.schedule.clone(),
        start_beat: prepared.request.start_beat,
        end_beat: prepared.request.end_beat,
        speed: prepared.speed,
        click_enabled: prepared.request.click_enabled,
    })?;
    let started = Instant::now();
    engine.start(started)?;
    tracing::info!(?mode, seconds = prepared.schedule.total_seconds(), "playing");

    while engine.is_playing() {
        engine.tick(Instant::now())?;
        thread::sleep(TICK);
    }
    thread::sleep(RING_OUT);
    drop(engine);
    sink.close();
    tracing::info!(elapsed = ?started.elapsed(), "done");
    Ok(())
}

fn preview(settings: &PracticeSettings, path: &Path, from: u32, device: Option<String>) -> Result<()> {
    let timeline = load_timeline(path)?;
    let start = timeline.measure_to_beat(from)?;
    let notes: Vec<_> = timeline
        .reference_notes()
        .iter()
        .filter(|n| n.offset + n.duration > start)
        .copied()
        .collect();

    let port = CpalAudioOutputPort::new();
    let sink = open_sink(&port, device, settings)?;
    let mut preview = NotePreview::new();
    match preview.preview_note(sink.as_ref(), &notes)? {
        Some(note) => {
            println!("pitch {} at beat {:.3}", note.pitch, note.offset);
            thread::sleep(PREVIEW_LENGTH);
        }
        None => println!("no reference notes from measure {from}"),
    }
    preview.stop(sink.as_ref());
    sink.close();
    Ok(())
}

fn edit_settings(
    storage: &FsStorage,
    mut settings: PracticeSettings,
    action: Option<SettingsAction>,
) -> Result<()> {
    match action.unwrap_or(SettingsAction::Show) {
        SettingsAction::Show => {}
        SettingsAction::Set {
            speed,
            click,
            lead_in_bars,
            latency_ms,
            mode,
            device,
        } => {
            if let Some(speed) = speed {
                Speed::from_percent(speed)?;
                settings.speed_percent = speed;
            }
            if let Some(click) = click {
                settings.click_enabled = click;
            }
            if let Some(bars) = lead_in_bars {
                settings.lead_in.bars = bars;
            }
            if let Some(ms) = latency_ms {
                settings.latency_compensation_ms = ms;
            }
            if let Some(mode) = mode {
                settings.render_mode = mode.into();
            }
            if let Some(device) = device {
                settings.selected_audio_out = Some(DeviceId(device));
            }
            storage.save_settings(&settings)?;
            tracing::info!(path = %storage.settings_path().display(), "settings saved");
        }
        SettingsAction::Reset => {
            settings = PracticeSettings::default();
            storage.save_settings(&settings)?;
        }
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn diagnostics(settings: &PracticeSettings, dir: &Path, timeline: Option<PathBuf>) -> Result<()> {
    let schedule = timeline
        .map(|timeline| {
            let args = PracticeArgs {
                timeline,
                from: 1,
                to: None,
                speed: None,
                lead_in_bars: None,
                lead_in_beats: None,
                no_click: false,
            };
            prepare(settings, &args).map(|p| p.schedule)
        })
        .transpose()?;
    let outputs = CpalAudioOutputPort::new().list_outputs().unwrap_or_else(|err| {
        tracing::warn!(%err, "device listing failed");
        Vec::new()
    });
    export_diagnostics(dir, settings, outputs, schedule.as_ref(), &[])?;
    println!("{}", dir.display());
    Ok(())
}
