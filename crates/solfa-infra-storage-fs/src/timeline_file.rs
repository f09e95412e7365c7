use crate::read_json;
use serde::{Deserialize, Serialize};
use solfa_domain_score::{derive_measures, ConfigError};
use solfa_ports::storage::StorageError;
use solfa_ports::timeline::{
    MeasureInfo, ReferenceNote, ScoreTimelinePort, TempoChange, TimeSignatureChange,
};
use solfa_ports::types::Beat;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum TimelineLoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid timeline: {0}")]
    Config(#[from] ConfigError),
    #[error("timeline has no measures, notes or total_beats to size it")]
    UnknownLength,
}

/// On-disk timing tables of one score part.
///
/// `measures` may be omitted; the bar list is then derived from the
/// signature changes up to `total_beats`, or up to the end of the last note.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineFile {
    pub tempos: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignatureChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measures: Option<Vec<MeasureInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_beats: Option<Beat>,
    #[serde(default)]
    pub notes: Vec<ReferenceNote>,
}

impl TimelineFile {
    fn length_beats(&self) -> Option<Beat> {
        self.total_beats.or_else(|| {
            self.notes
                .iter()
                .map(|n| n.offset + n.duration)
                .reduce(f64::max)
        })
    }
}

/// Serves a timeline loaded from a JSON file.
#[derive(Clone, Debug)]
pub struct JsonTimelineProvider {
    tempos: Vec<TempoChange>,
    signatures: Vec<TimeSignatureChange>,
    measures: Vec<MeasureInfo>,
    notes: Vec<ReferenceNote>,
}

impl JsonTimelineProvider {
    pub fn load(path: &Path) -> Result<Self, TimelineLoadError> {
        let file: TimelineFile = read_json(path)?;
        let provider = Self::from_file(file)?;
        tracing::info!(
            path = %path.display(),
            measures = provider.measures.len(),
            notes = provider.notes.len(),
            "timeline loaded"
        );
        Ok(provider)
    }

    pub fn from_file(file: TimelineFile) -> Result<Self, TimelineLoadError> {
        if file.tempos.is_empty() {
            return Err(ConfigError::EmptyTempoTable.into());
        }
        let measures = match &file.measures {
            Some(measures) => measures.clone(),
            None => {
                let total = file.length_beats().ok_or(TimelineLoadError::UnknownLength)?;
                derive_measures(&file.time_signatures, total)?
            }
        };
        Ok(Self {
            tempos: file.tempos,
            signatures: file.time_signatures,
            measures,
            notes: file.notes,
        })
    }
}

impl ScoreTimelinePort for JsonTimelineProvider {
    fn tempo_timeline(&self) -> Vec<TempoChange> {
        self.tempos.clone()
    }

    fn time_signature_timeline(&self) -> Vec<TimeSignatureChange> {
        self.signatures.clone()
    }

    fn measures(&self) -> Vec<MeasureInfo> {
        self.measures.clone()
    }

    fn reference_notes(&self) -> Vec<ReferenceNote> {
        self.notes.clone()
    }
}
