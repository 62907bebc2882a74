//! Bus classification into slack / PV / PQ index sets.

use gflow_core::{BusMode, Logger};
use num_complex::Complex64;
use serde::Serialize;

/// Disjoint index sets derived from the bus type vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusTypeSets {
    /// Slack (REF) buses
    pub slack: Vec<usize>,
    /// PQ buses, storage-dispatch buses included
    pub pq: Vec<usize>,
    pub pv: Vec<usize>,
    /// Sorted union of `pq` and `pv`
    pub pqpv: Vec<usize>,
    /// Storage-dispatch buses (informational; also listed in `pq`)
    pub sto: Vec<usize>,
}

impl BusTypeSets {
    pub fn has_slack(&self) -> bool {
        !self.slack.is_empty()
    }

    /// PV buses followed by PQ buses, the ordering of the real mismatch rows
    pub fn pvpq(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.pv.len() + self.pq.len());
        out.extend_from_slice(&self.pv);
        out.extend_from_slice(&self.pq);
        out
    }
}

/// Classify buses and guarantee a slack bus when a PV candidate exists.
///
/// With no REF bus the PV bus with the largest active injection is promoted
/// (the first PV bus when no injection is positive) and its entry in `types`
/// is overwritten. With no PV bus either a warning is logged and the slack set
/// stays empty.
pub fn classify(sbus: &[Complex64], types: &mut [BusMode], logger: &mut Logger) -> BusTypeSets {
    let mut sets = scan(types);

    if sets.slack.is_empty() {
        if sets.pv.is_empty() {
            logger.warn("classifier", "There are no slack nodes selected");
        } else {
            let (best_pos, best_p) = sets
                .pv
                .iter()
                .enumerate()
                .map(|(pos, &i)| (pos, sbus[i].re))
                .fold((0, f64::NEG_INFINITY), |acc, item| {
                    if item.1 > acc.1 {
                        item
                    } else {
                        acc
                    }
                });
            let pos = if best_p > 0.0 { best_pos } else { 0 };
            let promoted = sets.pv.remove(pos);
            types[promoted] = BusMode::Ref;
            sets.slack.push(promoted);
            logger.progress(format!("bus {} promoted to slack", promoted));
        }
    }

    let mut pqpv: Vec<usize> = sets.pq.iter().chain(sets.pv.iter()).copied().collect();
    pqpv.sort_unstable();
    sets.pqpv = pqpv;
    sets
}

fn scan(types: &[BusMode]) -> BusTypeSets {
    let mut sets = BusTypeSets::default();
    for (i, mode) in types.iter().enumerate() {
        match mode {
            BusMode::Ref => sets.slack.push(i),
            BusMode::PV => sets.pv.push(i),
            BusMode::PQ => sets.pq.push(i),
            BusMode::StoDispatch => {
                sets.sto.push(i);
                sets.pq.push(i);
            }
        }
    }
    sets
}
