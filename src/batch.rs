//! Bulk removal in fixed-size batches.
//!
//! [`BatchAccumulator`] collects ids and hands back a full batch each time
//! the configured size is reached; [`BatchAccumulator::finish`] flushes the
//! remainder. [`deregister_in_batches`] drives it over an inactive report
//! and runs the two-phase remover once per batch, strictly one batch after
//! another.
//!
//! CBC answers a batched device action with a single status, so every device
//! in a batch shares that batch's outcome. Results are still written one row
//! per device; [`BatchSummary`] is only the per-batch view of those rows.
//! Bulk removal does not precheck devices: a device that came back online
//! since the report was generated is removed anyway.

use std::io::Write;

use crate::client::CbcClient;
use crate::error::{CbcError, Result};
use crate::removal::{RemovalConfig, RemovalOutcome, remove_devices};
use crate::report::{CsvWriter, InactiveEntry};

/// Groups items into batches of at most `max` items.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    max: usize,
    current: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    /// # Panics
    ///
    /// Panics if `max` is zero.
    pub fn new(max: usize) -> Self {
        assert!(max > 0, "batch size must be at least 1");
        BatchAccumulator {
            max,
            current: Vec::with_capacity(max),
        }
    }

    /// Adds an item; returns the full batch once `max` items are held.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.current.push(item);
        if self.current.len() == self.max {
            Some(std::mem::replace(&mut self.current, Vec::with_capacity(self.max)))
        } else {
            None
        }
    }

    /// Returns the remaining partial batch, if any.
    pub fn finish(self) -> Option<Vec<T>> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    pub fn pending(&self) -> usize {
        self.current.len()
    }
}

/// Splits `items` into consecutive batches of at most `max` items.
pub fn batches<T>(items: impl IntoIterator<Item = T>, max: usize) -> Vec<Vec<T>> {
    let mut acc = BatchAccumulator::new(max);
    let mut out: Vec<Vec<T>> = items.into_iter().filter_map(|item| acc.push(item)).collect();
    out.extend(acc.finish());
    out
}

/// Per-batch view of a bulk run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// 1-based batch number.
    pub batch: usize,
    pub size: usize,
    pub outcome: RemovalOutcome,
}

/// Removes the devices of an inactive report in batches of `batch_size`.
///
/// Writes one row per device (`Batch,Device_Id,Device_Name,Result`) and
/// waits `config.batch_pause` between batches.
///
/// # Errors
///
/// `CbcError::Config` for a zero batch size, or a failure writing the
/// report. API failures are outcomes, never errors.
pub async fn deregister_in_batches<W: Write>(
    client: &CbcClient,
    entries: &[InactiveEntry],
    batch_size: usize,
    config: &RemovalConfig,
    report: &mut CsvWriter<W>,
) -> Result<Vec<BatchSummary>> {
    if batch_size == 0 {
        return Err(CbcError::Config("batch_size must be at least 1".to_string()));
    }

    let planned = batches(entries.iter(), batch_size);
    let mut summaries = Vec::with_capacity(planned.len());

    for (idx, batch) in planned.iter().enumerate() {
        if idx > 0 && !config.batch_pause.is_zero() {
            tokio::time::sleep(config.batch_pause).await;
        }

        let number = idx + 1;
        let ids: Vec<String> = batch.iter().map(|e| e.device_id.clone()).collect();
        tracing::info!(batch = number, devices = ids.len(), "removing batch");

        let outcome = remove_devices(client, &ids, config).await;
        tracing::info!(batch = number, %outcome, "batch processed");

        let label = number.to_string();
        for entry in batch {
            report.write_row(&[
                label.as_str(),
                entry.device_id.as_str(),
                entry.name.as_str(),
                outcome.as_str(),
            ])?;
        }
        summaries.push(BatchSummary {
            batch: number,
            size: batch.len(),
            outcome,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_emits_full_batches_then_remainder() {
        let mut acc = BatchAccumulator::new(3);
        assert_eq!(acc.push(1), None);
        assert_eq!(acc.push(2), None);
        assert_eq!(acc.push(3), Some(vec![1, 2, 3]));
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.push(4), None);
        assert_eq!(acc.finish(), Some(vec![4]));
    }

    #[test]
    fn finish_on_empty_accumulator_is_none() {
        let acc: BatchAccumulator<u8> = BatchAccumulator::new(50);
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn one_hundred_twenty_ids_make_three_batches() {
        let sizes: Vec<usize> = batches(0..120, 50).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_batch() {
        let sizes: Vec<usize> = batches(0..100, 50).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50]);
    }

    #[test]
    fn batches_preserve_order() {
        let out = batches(["a", "b", "c", "d", "e"], 2);
        assert_eq!(out, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn batch_size_one_is_single_device_mode() {
        assert_eq!(batches(0..3, 1).len(), 3);
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(batches(Vec::<u32>::new(), 50).is_empty());
    }

    #[test]
    #[should_panic(expected = "batch size")]
    fn zero_batch_size_panics() {
        let _ = BatchAccumulator::<u8>::new(0);
    }
}
