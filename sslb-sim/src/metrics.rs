//! Load statistics and message counters
//!
//! One [`LoadStats`] row is recorded at the end of every cycle; the rows
//! export as CSV for plotting and as a JSON summary.

use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use sslb_core::{CycleOutcome, Load, Message, MessageOutcome};
use std::io::{self, Write};

/// Network-wide load statistics at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub cycle: u64,
    /// Mean squared deviation from the average load
    pub mse: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Largest load difference across any edge
    pub discrepancy: f64,
}

impl LoadStats {
    /// Compute statistics over `loads`, indexed by node id
    pub fn compute(cycle: u64, graph: &Graph, loads: &[Load]) -> Self {
        if loads.is_empty() {
            return Self {
                cycle,
                mse: 0.0,
                avg: 0.0,
                min: 0.0,
                max: 0.0,
                discrepancy: 0.0,
            };
        }

        let n = loads.len() as f64;
        let avg = loads.iter().sum::<Load>() as f64 / n;
        let min = loads.iter().copied().min().unwrap_or(0) as f64;
        let max = loads.iter().copied().max().unwrap_or(0) as f64;
        let mse = loads
            .iter()
            .map(|&v| {
                let diff = v as f64 - avg;
                diff * diff
            })
            .sum::<f64>()
            / n;

        let discrepancy = graph
            .links()
            .filter_map(|(i, j)| Some((loads.get(i)? - loads.get(j)?).abs()))
            .max()
            .unwrap_or(0) as f64;

        Self {
            cycle,
            mse,
            avg,
            min,
            max,
            discrepancy,
        }
    }
}

/// Protocol activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounters {
    pub proposals: u64,
    pub acks: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub acknowledged: u64,
    pub stray: u64,
    pub rounds_completed: u64,
    pub balanced_cycles: u64,
    pub isolated_cycles: u64,
    pub awaiting_cycles: u64,
}

/// Summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub cycles: usize,
    pub initial_mse: f64,
    pub final_mse: f64,
    pub final_discrepancy: f64,
    pub counters: MessageCounters,
}

/// Full metrics export format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsExport {
    pub scenario: String,
    pub summary: MetricsSummary,
    pub rows: Vec<LoadStats>,
}

/// Metrics collection
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub rows: Vec<LoadStats>,
    pub counters: MessageCounters,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stats: LoadStats) {
        self.rows.push(stats);
    }

    pub fn last(&self) -> Option<&LoadStats> {
        self.rows.last()
    }

    pub fn count_cycle(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Isolated => self.counters.isolated_cycles += 1,
            CycleOutcome::Balanced => self.counters.balanced_cycles += 1,
            CycleOutcome::AwaitingAcks { .. } => self.counters.awaiting_cycles += 1,
            CycleOutcome::Proposed { .. } => {}
        }
    }

    pub fn count_message(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Accepted { .. } => self.counters.accepted += 1,
            MessageOutcome::Rejected => self.counters.rejected += 1,
            MessageOutcome::Acknowledged { round_complete, .. } => {
                self.counters.acknowledged += 1;
                if *round_complete {
                    self.counters.rounds_completed += 1;
                }
            }
            MessageOutcome::Stray => self.counters.stray += 1,
        }
    }

    /// Count an outgoing message by kind
    pub fn count_sent(&mut self, message: &Message) {
        match message {
            Message::Proposal { .. } => self.counters.proposals += 1,
            Message::Ack { .. } => self.counters.acks += 1,
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let first = self.rows.first();
        let last = self.rows.last();
        MetricsSummary {
            cycles: self.rows.len(),
            initial_mse: first.map_or(0.0, |r| r.mse),
            final_mse: last.map_or(0.0, |r| r.mse),
            final_discrepancy: last.map_or(0.0, |r| r.discrepancy),
            counters: self.counters,
        }
    }

    /// Write the rows as CSV. `debug` adds average, minimum and maximum
    /// columns.
    pub fn write_csv<W: Write>(&self, mut out: W, debug: bool) -> io::Result<()> {
        if debug {
            writeln!(out, "Cycle,MSE,Avg,Min,Max,Discrepancy")?;
        } else {
            writeln!(out, "Cycle,MSE,Discrepancy")?;
        }
        for row in &self.rows {
            if debug {
                writeln!(
                    out,
                    "{},{:.6},{:.2},{:.2},{:.2},{:.2}",
                    row.cycle, row.mse, row.avg, row.min, row.max, row.discrepancy
                )?;
            } else {
                writeln!(out, "{},{:.6},{:.2}", row.cycle, row.mse, row.discrepancy)?;
            }
        }
        Ok(())
    }

    /// Export as CSV string
    pub fn export_csv(&self, debug: bool) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_csv(&mut out, debug);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Export as JSON string
    pub fn export_json(&self, scenario: &str) -> String {
        let export = MetricsExport {
            scenario: scenario.to_string(),
            summary: self.summary(),
            rows: self.rows.clone(),
        };
        serde_json::to_string_pretty(&export).unwrap_or_else(|_| "{}".to_string())
    }
}
