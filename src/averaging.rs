/// Collapse one window of raw samples into one averaged record
use crate::models::{Average, AveragedRecord, RecordEntry, WindowBuffers};

/// Arithmetic mean, or `Unavailable` for an empty buffer
pub fn mean(samples: &[f64]) -> Average {
    if samples.is_empty() {
        return Average::Unavailable;
    }
    Average::Mean(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Average every column of the window
///
/// Each column is divided by its own sample count, so a sensor that missed
/// ticks does not drag the others down to its count. The entry list always
/// has one entry per schema column, whatever the buffers hold.
pub fn reduce(window: &WindowBuffers) -> AveragedRecord {
    let entries = window
        .schema
        .columns()
        .iter()
        .zip(&window.samples)
        .map(|(column, samples)| RecordEntry {
            column: *column,
            average: mean(samples),
            samples: samples.len(),
        })
        .collect();

    AveragedRecord {
        started: window.started,
        entries,
    }
}
