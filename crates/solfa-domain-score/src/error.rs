use solfa_ports::types::Beat;

/// Malformed timing input. Fatal to the call that raised it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tempo table is empty")]
    EmptyTempoTable,
    #[error("time signature table is empty")]
    EmptyTimeSignatureTable,
    #[error("speed must be positive, got {0}")]
    NonPositiveSpeed(f64),
    #[error("tempo at beat {offset} must be positive, got {bpm}")]
    NonPositiveTempo { offset: Beat, bpm: f64 },
    #[error("invalid time signature {numerator}/{denominator} at beat {offset}")]
    InvalidTimeSignature {
        offset: Beat,
        numerator: u32,
        denominator: u32,
    },
    #[error("change point at beat {0} is negative or not finite")]
    InvalidOffset(Beat),
    #[error("measure {0} not found")]
    UnknownMeasure(u32),
    #[error("invalid beat range {start}..{end}")]
    InvalidRange { start: Beat, end: Beat },
}
