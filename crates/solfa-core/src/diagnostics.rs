use crate::ipc::Event;
use crate::scheduler::{Accent, BeatSchedule};
use serde::Serialize;
use solfa_ports::storage::{PracticeSettings, StorageError};
use solfa_ports::types::{AudioOutputDevice, Seconds};
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct AppVersion {
    name: String,
    version: String,
}

#[derive(Serialize)]
struct PlatformInfo {
    os: String,
    arch: String,
}

#[derive(Serialize)]
struct DeviceSnapshot {
    audio_outputs: Vec<AudioOutputDevice>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct ScheduleSummary {
    pub lead_in_beats: usize,
    pub main_beats: usize,
    pub strong_beats: usize,
    pub lead_in_seconds: Seconds,
    pub main_seconds: Seconds,
    pub total_seconds: Seconds,
}

impl ScheduleSummary {
    pub fn of(schedule: &BeatSchedule) -> Self {
        Self {
            lead_in_beats: schedule.lead_in().len(),
            main_beats: schedule.main().len(),
            strong_beats: schedule
                .events
                .iter()
                .filter(|e| e.accent == Accent::Strong)
                .count(),
            lead_in_seconds: schedule.lead_in_seconds,
            main_seconds: schedule.main_seconds,
            total_seconds: schedule.total_seconds(),
        }
    }
}

#[derive(Serialize)]
struct RecentEvents<'a> {
    events: &'a [Event],
}

pub fn export_diagnostics(
    dir: &Path,
    settings: &PracticeSettings,
    audio_outputs: Vec<AudioOutputDevice>,
    schedule: Option<&BeatSchedule>,
    recent_events: &[Event],
) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;

    let app_version = AppVersion {
        name: "Solfa".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let platform = PlatformInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    };

    write_json(&dir.join("app_version.json"), &app_version)?;
    write_json(&dir.join("platform.json"), &platform)?;
    write_json(&dir.join("settings.json"), settings)?;
    write_json(
        &dir.join("device_snapshot.json"),
        &DeviceSnapshot { audio_outputs },
    )?;
    write_json(
        &dir.join("schedule_summary.json"),
        &schedule.map(ScheduleSummary::of),
    )?;
    write_json(
        &dir.join("recent_events.json"),
        &RecentEvents {
            events: recent_events,
        },
    )?;

    tracing::info!(dir = %dir.display(), "diagnostics exported");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
}
