use pretty_assertions::assert_eq;
use solfa_domain_score::{derive_measures, is_contiguous, ConfigError, Speed, TimelineModel};
use solfa_ports::timeline::{
    MeasureInfo, MeasureRange, ReferenceNote, TempoChange, TimeSignatureChange,
};

fn tempo(offset: f64, bpm: f64) -> TempoChange {
    TempoChange { offset, bpm }
}

fn ts(offset: f64, numerator: u32, denominator: u32) -> TimeSignatureChange {
    TimeSignatureChange {
        offset,
        numerator,
        denominator,
    }
}

fn measure(measure: u32, start_beat: f64, duration_beats: f64) -> MeasureInfo {
    MeasureInfo {
        measure,
        start_beat,
        duration_beats,
    }
}

fn model() -> TimelineModel {
    TimelineModel::new(
        vec![tempo(8.0, 60.0), tempo(0.0, 120.0)],
        vec![ts(0.0, 4, 4), ts(8.0, 3, 4)],
        vec![
            measure(1, 0.0, 4.0),
            measure(2, 4.0, 4.0),
            measure(3, 8.0, 3.0),
            measure(4, 11.0, 3.0),
        ],
    )
    .expect("valid timeline")
}

#[test]
fn empty_tables_are_rejected() {
    let err = TimelineModel::new(vec![], vec![ts(0.0, 4, 4)], vec![]).unwrap_err();
    assert_eq!(err, ConfigError::EmptyTempoTable);

    let err = TimelineModel::new(vec![tempo(0.0, 120.0)], vec![], vec![]).unwrap_err();
    assert_eq!(err, ConfigError::EmptyTimeSignatureTable);
}

#[test]
fn bad_entries_are_rejected() {
    let err = TimelineModel::new(vec![tempo(0.0, 0.0)], vec![ts(0.0, 4, 4)], vec![]).unwrap_err();
    assert!(matches!(err, ConfigError::NonPositiveTempo { .. }));

    let err =
        TimelineModel::new(vec![tempo(0.0, 90.0)], vec![ts(0.0, 4, 3)], vec![]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidTimeSignature { denominator: 3, .. }));

    assert_eq!(Speed::new(0.0).unwrap_err(), ConfigError::NonPositiveSpeed(0.0));
    assert!(Speed::new(-1.0).is_err());
}

#[test]
fn lookups_return_latest_change_at_or_before_beat() {
    let model = model();
    assert_eq!(model.tempos()[0].offset, 0.0);
    assert_eq!(model.tempo_at(0.0).bpm, 120.0);
    assert_eq!(model.tempo_at(7.99).bpm, 120.0);
    assert_eq!(model.tempo_at(8.0).bpm, 60.0);
    assert_eq!(model.time_signature_at(9.0).numerator, 3);
}

#[test]
fn lookups_before_first_offset_use_first_entry() {
    let model =
        TimelineModel::new(vec![tempo(2.0, 100.0)], vec![ts(1.0, 6, 8)], vec![]).unwrap();
    assert_eq!(model.tempo_at(0.0).bpm, 100.0);
    assert_eq!(model.time_signature_at(0.0).denominator, 8);
}

#[test]
fn measure_boundary_belongs_to_later_measure() {
    let model = model();
    assert_eq!(model.beat_to_measure(0.0), Some(1));
    assert_eq!(model.beat_to_measure(3.999), Some(1));
    assert_eq!(model.beat_to_measure(4.0), Some(2));
    assert_eq!(model.beat_to_measure(11.0), Some(4));
    assert_eq!(model.beat_to_measure(100.0), Some(4));
    assert_eq!(model.measure_to_beat(3), Ok(8.0));
    assert_eq!(model.measure_to_beat(9), Err(ConfigError::UnknownMeasure(9)));
}

#[test]
fn range_covers_whole_end_measure() {
    let model = model();
    assert_eq!(
        model.range_beats(MeasureRange { start: 2, end: 3 }),
        Ok((4.0, 11.0))
    );
    assert!(model.range_beats(MeasureRange { start: 4, end: 2 }).is_err());
}

#[test]
fn seconds_integrate_across_tempo_changes() {
    let model = model();
    // 8 beats at 120 = 4s, then 2 beats at 60 = 2s.
    let secs = model.seconds_between(0.0, 10.0, Speed::NORMAL);
    assert!((secs - 6.0).abs() < 1e-9);

    let doubled = model.seconds_between(0.0, 10.0, Speed::new(2.0).unwrap());
    assert!((doubled - 3.0).abs() < 1e-9);

    let beat = model.beats_after(0.0, 6.0, Speed::NORMAL);
    assert!((beat - 10.0).abs() < 1e-9);
    let beat = model.beats_after(6.0, 1.0, Speed::NORMAL);
    assert!((beat - 8.0).abs() < 1e-9);
}

#[test]
fn beat_to_seconds_measures_from_score_start() {
    let model = model();
    assert_eq!(model.beat_to_seconds(0.0, Speed::NORMAL), 0.0);
    assert!((model.beat_to_seconds(8.0, Speed::NORMAL) - 4.0).abs() < 1e-9);
    assert!((model.beat_to_seconds(11.0, Speed::NORMAL) - 7.0).abs() < 1e-9);
    assert!((model.beat_to_seconds(11.0, Speed::new(2.0).unwrap()) - 3.5).abs() < 1e-9);
}

#[test]
fn reference_pitch_includes_note_end() {
    let model = model().with_reference_notes(vec![
        ReferenceNote {
            offset: 1.0,
            duration: 1.0,
            pitch: 60,
        },
        ReferenceNote {
            offset: 2.0,
            duration: 2.0,
            pitch: 62,
        },
    ]);
    assert_eq!(model.reference_pitch_at(0.5), None);
    assert_eq!(model.reference_pitch_at(2.0), Some(60));
    assert_eq!(model.reference_pitch_at(3.0), Some(62));
}

#[test]
fn derived_measures_follow_signature_changes() {
    let measures = derive_measures(&[ts(0.0, 4, 4), ts(6.0, 6, 8)], 12.0).unwrap();
    assert_eq!(
        measures,
        vec![
            measure(1, 0.0, 4.0),
            measure(2, 4.0, 2.0),
            measure(3, 6.0, 3.0),
            measure(4, 9.0, 3.0),
        ]
    );
    assert!(is_contiguous(&measures));
}
