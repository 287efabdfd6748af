//! Correlates observed commands with observed results after the run.
//!
//! Commands and results are paired strictly in arrival order: the n-th
//! command drained is matched with the n-th result drained. A command with no
//! result left to pair is a hard error. Value mismatches and coverage gaps are
//! collected into the [`CheckReport`] so that a single run reports all of them.

use std::collections::HashSet;

use log::{error, info, warn};

use crate::error::{Result, TbError};
use crate::ops::{AluOp, AluResult, Command, Opcode};
use crate::tlm::NonblockingGetPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction<O = AluOp> {
    pub command: Command<O>,
    pub actual: AluResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch<O = AluOp> {
    pub command: Command<O>,
    pub actual: AluResult,
    pub expected: AluResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport<O = AluOp> {
    pub passes: Vec<Transaction<O>>,
    pub mismatches: Vec<Mismatch<O>>,
    /// Operations never seen on the command stream.
    pub missing_ops: Vec<O>,
    /// Results still buffered after every command was paired.
    pub orphan_results: usize,
}

impl<O> Default for CheckReport<O> {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            mismatches: Vec::new(),
            missing_ops: Vec::new(),
            orphan_results: 0,
        }
    }
}

impl<O> CheckReport<O> {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.missing_ops.is_empty() && self.orphan_results == 0
    }

    pub fn coverage_closed(&self) -> bool {
        self.missing_ops.is_empty()
    }

    /// Number of command/result pairs compared.
    pub fn checked(&self) -> usize {
        self.passes.len() + self.mismatches.len()
    }
}

pub struct Scoreboard<O: Opcode, P> {
    pub cmd_gp: NonblockingGetPort<Command<O>>,
    pub result_gp: NonblockingGetPort<AluResult>,
    predict: P,
}

impl<O, P> Scoreboard<O, P>
where
    O: Opcode,
    P: Fn(u8, u8, O) -> AluResult,
{
    pub fn new(predict: P) -> Self {
        Self {
            cmd_gp: NonblockingGetPort::new("scoreboard.cmd_gp"),
            result_gp: NonblockingGetPort::new("scoreboard.result_gp"),
            predict,
        }
    }

    /// Drains both buffers and checks every pair. Never suspends.
    pub fn check(&mut self) -> Result<CheckReport<O>> {
        let mut report = CheckReport::default();
        let mut covered = HashSet::new();

        while let Some(command) = self.cmd_gp.try_get()? {
            let Command { a, b, op } = command;
            covered.insert(op);

            let Some(actual) = self.result_gp.try_get()? else {
                error!("Missing result for command {command}");
                return Err(TbError::MissingResult {
                    a,
                    b,
                    op: op.name(),
                });
            };

            let expected = (self.predict)(a, b, op);
            if actual == expected {
                info!("PASSED: {a} {} {b} = {actual}", op.name());
                report.passes.push(Transaction { command, actual });
            } else {
                error!("FAILED: {a} {} {b} = {actual} - predicted {expected}", op.name());
                report.mismatches.push(Mismatch {
                    command,
                    actual,
                    expected,
                });
            }
        }

        while self.result_gp.try_get()?.is_some() {
            report.orphan_results += 1;
        }
        if report.orphan_results > 0 {
            warn!("{} results arrived without a command", report.orphan_results);
        }

        report.missing_ops = O::ALL
            .iter()
            .copied()
            .filter(|op| !covered.contains(op))
            .collect();
        if report.missing_ops.is_empty() {
            info!("Covered all operations");
        } else {
            let missed: Vec<_> = report.missing_ops.iter().map(|op| op.name()).collect();
            error!("Functional coverage error. Missed: {}", missed.join(", "));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::predict;
    use crate::tlm::{AnalysisFifo, AnalysisPort};

    struct Bench {
        cmd_ap: AnalysisPort<Command>,
        result_ap: AnalysisPort<AluResult>,
        scoreboard: Scoreboard<AluOp, fn(u8, u8, AluOp) -> AluResult>,
    }

    fn bench() -> Bench {
        let mut cmd_ap = AnalysisPort::new("cmd_ap");
        let mut result_ap = AnalysisPort::new("result_ap");
        let mut cmd_fifo = AnalysisFifo::new("cmd_mon_fifo");
        let mut result_fifo = AnalysisFifo::new("result_mon_fifo");
        let mut scoreboard = Scoreboard::new(predict as fn(u8, u8, AluOp) -> AluResult);
        cmd_ap.connect(&cmd_fifo);
        result_ap.connect(&result_fifo);
        scoreboard.cmd_gp.connect(&mut cmd_fifo).unwrap();
        scoreboard.result_gp.connect(&mut result_fifo).unwrap();
        Bench {
            cmd_ap,
            result_ap,
            scoreboard,
        }
    }

    #[test]
    fn test_pairs_in_arrival_order() {
        let mut bench = bench();
        let c1 = Command::new(1, 2, AluOp::Add);
        let c2 = Command::new(10, 20, AluOp::Add);
        bench.cmd_ap.write(c1).unwrap();
        bench.cmd_ap.write(c2).unwrap();
        bench.result_ap.write(3).unwrap();
        bench.result_ap.write(30).unwrap();

        let report = bench.scoreboard.check().unwrap();
        assert_eq!(
            report.passes,
            vec![
                Transaction { command: c1, actual: 3 },
                Transaction { command: c2, actual: 30 },
            ]
        );
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn test_full_coverage_passes() {
        let mut bench = bench();
        for &op in AluOp::ALL {
            bench.cmd_ap.write(Command::new(7, 5, op)).unwrap();
            bench.result_ap.write(predict(7, 5, op)).unwrap();
        }
        let report = bench.scoreboard.check().unwrap();
        assert!(report.passed());
        assert_eq!(report.checked(), AluOp::ALL.len());
    }

    #[test]
    fn test_mismatch_keeps_checking() {
        let mut bench = bench();
        bench.cmd_ap.write(Command::new(2, 3, AluOp::Mul)).unwrap();
        bench.cmd_ap.write(Command::new(2, 3, AluOp::Add)).unwrap();
        bench.cmd_ap.write(Command::new(2, 3, AluOp::Xor)).unwrap();
        bench.result_ap.write(7).unwrap();
        bench.result_ap.write(5).unwrap();
        bench.result_ap.write(0).unwrap();

        let report = bench.scoreboard.check().unwrap();
        assert!(!report.passed());
        assert_eq!(report.passes.len(), 1);
        assert_eq!(
            report.mismatches,
            vec![
                Mismatch {
                    command: Command::new(2, 3, AluOp::Mul),
                    actual: 7,
                    expected: 6,
                },
                Mismatch {
                    command: Command::new(2, 3, AluOp::Xor),
                    actual: 0,
                    expected: 1,
                },
            ]
        );
        assert_eq!(report.missing_ops, vec![AluOp::And]);
    }

    #[test]
    fn test_missing_result_is_an_error() {
        let mut bench = bench();
        bench.cmd_ap.write(Command::new(1, 1, AluOp::Add)).unwrap();
        bench.cmd_ap.write(Command::new(4, 4, AluOp::And)).unwrap();
        bench.result_ap.write(2).unwrap();

        match bench.scoreboard.check() {
            Err(TbError::MissingResult { a, b, op }) => {
                assert_eq!((a, b, op), (4, 4, "AND"));
            }
            other => panic!("expected missing result, got {other:?}"),
        }
    }

    #[test]
    fn test_orphan_results_fail_the_run() {
        let mut bench = bench();
        for &op in AluOp::ALL {
            bench.cmd_ap.write(Command::new(0, 0, op)).unwrap();
            bench.result_ap.write(0).unwrap();
        }
        bench.result_ap.write(99).unwrap();

        let report = bench.scoreboard.check().unwrap();
        assert_eq!(report.orphan_results, 1);
        assert!(report.coverage_closed());
        assert!(!report.passed());
    }

    #[test]
    fn test_empty_run_misses_everything() {
        let mut bench = bench();
        let report = bench.scoreboard.check().unwrap();
        assert_eq!(report.checked(), 0);
        assert_eq!(report.missing_ops, AluOp::ALL);
    }
}
