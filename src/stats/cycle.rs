//! Send interval estimation from noisy timestamps

use std::collections::HashMap;

/// Fewest timestamps worth looking at
pub const MIN_SAMPLES: usize = 25;

/// Fewest intervals, and fewest occurrences of the winning interval
pub const MIN_DELTAS: usize = 24;

/// Estimate a steady repetition interval in whole seconds
///
/// Timestamps are sorted, successive positive gaps are rounded to the
/// nearest second (halves to even) and the most frequent gap wins if it
/// occurs at least [`MIN_DELTAS`] times and makes up at least half of all
/// gaps. Of two equally frequent gaps the one seen first in time wins.
pub fn estimate_cycle(timestamps: &[f64]) -> Option<f64> {
    if timestamps.len() < MIN_SAMPLES {
        return None;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_by(f64::total_cmp);

    let deltas: Vec<i64> = sorted
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| (pair[1] - pair[0]).round_ties_even() as i64)
        .collect();
    if deltas.len() < MIN_DELTAS {
        return None;
    }

    // delta -> (occurrences, index of first occurrence)
    let mut frequency: HashMap<i64, (usize, usize)> = HashMap::new();
    for (index, delta) in deltas.iter().enumerate() {
        frequency.entry(*delta).or_insert((0, index)).0 += 1;
    }

    let (mode, (occurrences, _)) = frequency
        .into_iter()
        .max_by(|(_, (a, a_first)), (_, (b, b_first))| a.cmp(b).then(b_first.cmp(a_first)))?;

    if occurrences >= MIN_DELTAS && occurrences * 2 >= deltas.len() {
        Some(mode as f64)
    } else {
        None
    }
}
