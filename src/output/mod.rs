//! Per-job output artifacts.
//!
//! Persists one CSV row per detected event or species sub-segment plus a
//! trimmed WAV containing only the detected-event audio. Persistence is
//! best-effort from the queue's point of view; callers decide whether a
//! write failure fails the job.

use crate::constants::{PROB_DECIMAL_PLACES, output_extensions};
use crate::error::{Error, Result};
use crate::response::DetectedSpecies;
use crate::segment::DetectedEvent;
use crate::storage::Recording;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write the detected-events table for a recording.
///
/// Alongside the absolute event times the table carries running offsets into
/// the trimmed event audio, so species rows can be located in that file.
pub fn write_events_csv(
    dir: &Path,
    recording: &Recording,
    events: &[DetectedEvent],
) -> Result<PathBuf> {
    let path = dir.join(format!("{}{}", recording.id, output_extensions::EVENTS_CSV));
    ensure_dir(dir)?;

    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_err(&path, e))?;
    writer
        .write_record([
            "uuid",
            "datetime_recorded",
            "med_start_time",
            "med_stop_time",
            "med_prob",
            "msc_start_time",
            "msc_stop_time",
        ])
        .map_err(|e| csv_err(&path, e))?;

    let recorded = recording
        .recorded_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let mut offset = 0.0_f64;
    for event in events {
        let duration = event.duration();
        writer
            .write_record([
                recording.id.clone(),
                recorded.clone(),
                format!("{}", event.start_time),
                format!("{}", event.end_time),
                format!("{:.prec$}", event.mean_prob, prec = PROB_DECIMAL_PLACES),
                format!("{offset}"),
                format!("{}", offset + duration),
            ])
            .map_err(|e| csv_err(&path, e))?;
        offset += duration;
    }

    writer.flush()?;
    debug!(path = %path.display(), rows = events.len(), "wrote events table");
    Ok(path)
}

/// Write the detected-species table for a recording, one row per
/// sub-segment with one probability column per species.
pub fn write_species_csv(
    dir: &Path,
    recording: &Recording,
    species: &[DetectedSpecies],
) -> Result<PathBuf> {
    let path = dir.join(format!("{}{}", recording.id, output_extensions::SPECIES_CSV));
    ensure_dir(dir)?;

    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_err(&path, e))?;

    // All rows come from the same classifier, so the first row's label set
    // is the header for every row.
    let labels: Vec<String> = species
        .first()
        .map(|s| s.predictions.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = vec![
        "uuid".to_string(),
        "datetime_recorded".to_string(),
        "start".to_string(),
        "end".to_string(),
        "species".to_string(),
    ];
    header.extend(labels.iter().cloned());
    writer.write_record(&header).map_err(|e| csv_err(&path, e))?;

    let recorded = recording
        .recorded_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    for sub in species {
        let mut record = vec![
            recording.id.clone(),
            recorded.clone(),
            format!("{}", sub.start),
            format!("{}", sub.end),
            sub.species.clone(),
        ];
        for label in &labels {
            record.push(
                sub.predictions
                    .get(label)
                    .map(|p| format!("{p:.prec$}", prec = PROB_DECIMAL_PLACES))
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record).map_err(|e| csv_err(&path, e))?;
    }

    writer.flush()?;
    debug!(path = %path.display(), rows = species.len(), "wrote species table");
    Ok(path)
}

/// Write a WAV containing only the detected-event intervals, concatenated.
pub fn write_event_audio(
    dir: &Path,
    recording: &Recording,
    events: &[DetectedEvent],
) -> Result<PathBuf> {
    let path = dir.join(format!("{}{}", recording.id, output_extensions::EVENT_AUDIO));
    ensure_dir(dir)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: recording.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).map_err(|e| wav_err(&path, e))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    for event in events {
        let start = ((event.start_time * f64::from(recording.sample_rate)) as usize)
            .min(recording.samples.len());
        let end = ((event.end_time * f64::from(recording.sample_rate)) as usize)
            .min(recording.samples.len());
        for &sample in &recording.samples[start..end] {
            writer.write_sample(sample).map_err(|e| wav_err(&path, e))?;
        }
    }

    writer.finalize().map_err(|e| wav_err(&path, e))?;
    debug!(path = %path.display(), "wrote trimmed event audio");
    Ok(path)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

fn csv_err(path: &Path, source: csv::Error) -> Error {
    Error::CsvWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn wav_err(path: &Path, source: hound::Error) -> Error {
    Error::WavWrite {
        path: path.to_path_buf(),
        source,
    }
}
