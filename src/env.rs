//! Environment assembly.
//!
//! An [`AluEnv`] steps through build, connect, run and check exactly once.
//! Which tester gets installed is decided by [`EnvConfig::stimulus`] before
//! anything is constructed.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};
use tokio::task::{self, JoinHandle, LocalSet};

use crate::bfm::AluBfm;
use crate::driver::Driver;
use crate::error::{Result, TbError};
use crate::monitor::{CommandProbe, Monitor, ResultProbe};
use crate::ops::{AluResult, Command};
use crate::scoreboard::{CheckReport, Scoreboard};
use crate::stimulus::{StimulusKind, Tester};
use crate::tlm::{AnalysisFifo, Objection, TlmFifo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Built,
    Connected,
    Ran,
    Checked,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Built => "build",
            Phase::Connected => "connect",
            Phase::Ran => "run",
            Phase::Checked => "check",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub stimulus: StimulusKind,
    /// Seed for the random tester; drawn fresh when `None`.
    pub seed: Option<u64>,
    /// No-op commands sent after the last real one.
    pub drain_ops: usize,
    pub relay_depth: usize,
    /// Consecutive scheduler yields without driver or monitor progress
    /// after which the flush stops waiting for missing observations.
    pub stall_rounds: u32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            stimulus: StimulusKind::Random,
            seed: None,
            drain_ops: 4,
            relay_depth: 1,
            stall_rounds: 4096,
        }
    }
}

pub struct AluEnv<B: AluBfm, P> {
    config: EnvConfig,
    phase: Phase,
    tester: Option<Tester<B::Op>>,
    driver: Option<Driver<B>>,
    cmd_monitor: Option<Monitor<B, CommandProbe>>,
    result_monitor: Option<Monitor<B, ResultProbe>>,
    cmd_fifo: TlmFifo<Command<B::Op>>,
    cmd_mon_fifo: AnalysisFifo<Command<B::Op>>,
    result_mon_fifo: AnalysisFifo<AluResult>,
    scoreboard: Scoreboard<B::Op, P>,
}

impl<B, P> AluEnv<B, P>
where
    B: AluBfm,
    P: Fn(u8, u8, B::Op) -> AluResult,
{
    pub fn build(bfm: Rc<B>, predict: P, config: EnvConfig) -> Self {
        debug!("env: build ({} stimulus)", config.stimulus);
        let tester = Tester::from_kind(config.stimulus, config.seed, config.drain_ops);
        Self {
            tester: Some(tester),
            driver: Some(Driver::new(Rc::clone(&bfm))),
            cmd_monitor: Some(Monitor::new(Rc::clone(&bfm))),
            result_monitor: Some(Monitor::new(bfm)),
            cmd_fifo: TlmFifo::new("cmd_fifo", config.relay_depth),
            cmd_mon_fifo: AnalysisFifo::new("cmd_mon_fifo"),
            result_mon_fifo: AnalysisFifo::new("result_mon_fifo"),
            scoreboard: Scoreboard::new(predict),
            phase: Phase::Built,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&self, requested: Phase, from: Phase) -> Result<()> {
        if self.phase != from {
            return Err(TbError::PhaseOrder {
                requested,
                current: self.phase,
            });
        }
        debug!("env: {requested} phase");
        Ok(())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.enter(Phase::Connected, Phase::Built)?;
        let (Some(tester), Some(driver), Some(cmd_monitor), Some(result_monitor)) = (
            self.tester.as_mut(),
            self.driver.as_mut(),
            self.cmd_monitor.as_mut(),
            self.result_monitor.as_mut(),
        ) else {
            return Err(TbError::PhaseOrder {
                requested: Phase::Connected,
                current: self.phase,
            });
        };

        tester.bpp.connect(&self.cmd_fifo);
        driver.bgp.connect(&mut self.cmd_fifo)?;
        cmd_monitor.ap.connect(&self.cmd_mon_fifo);
        result_monitor.ap.connect(&self.result_mon_fifo);
        self.scoreboard.cmd_gp.connect(&mut self.cmd_mon_fifo)?;
        self.scoreboard.result_gp.connect(&mut self.result_mon_fifo)?;

        self.phase = Phase::Connected;
        Ok(())
    }

    /// Runs every component as a local task until the tester's objection
    /// clears and the pipeline has flushed.
    ///
    /// Must be polled inside a [`LocalSet`].
    pub async fn run(&mut self) -> Result<()> {
        self.enter(Phase::Ran, Phase::Connected)?;
        let (Some(tester), Some(driver), Some(cmd_monitor), Some(result_monitor)) = (
            self.tester.take(),
            self.driver.take(),
            self.cmd_monitor.take(),
            self.result_monitor.take(),
        ) else {
            return Err(TbError::PhaseOrder {
                requested: Phase::Ran,
                current: self.phase,
            });
        };

        let objection = Rc::new(Objection::new());
        let submitted = driver.submitted();
        let activity = [cmd_monitor.published(), result_monitor.published()];

        let tester_task = task::spawn_local(tester.run(&objection));
        let mut driver_task = task::spawn_local(driver.run());
        let monitor_tasks = [
            task::spawn_local(cmd_monitor.run()),
            task::spawn_local(result_monitor.run()),
        ];

        objection.wait_for_clear().await;
        let outcome: Result<usize> = async {
            let issued = tester_task.await??;
            self.flush(issued, &submitted, &activity, &mut driver_task).await?;
            Ok(issued)
        }
        .await;
        driver_task.abort();
        for monitor in &monitor_tasks {
            monitor.abort();
        }
        let issued = outcome?;

        info!(
            "run complete: {issued} issued, {} submitted, {} commands and {} results observed",
            submitted.get(),
            activity[0].get(),
            activity[1].get()
        );
        self.phase = Phase::Ran;
        Ok(())
    }

    /// Waits until the command monitor has reported every issued command and
    /// the result monitor has reported one result per command. Gives up after
    /// `stall_rounds` scheduler yields without progress; the scoreboard then
    /// reports whatever is missing.
    async fn flush(
        &self,
        issued: usize,
        submitted: &Cell<usize>,
        activity: &[Rc<Cell<usize>>; 2],
        driver_task: &mut JoinHandle<Result<()>>,
    ) -> Result<()> {
        let progress = || (submitted.get(), activity[0].get(), activity[1].get());
        let mut last = progress();
        let mut stalled = 0;
        loop {
            let (sent, commands, results) = progress();
            if commands >= issued && results >= commands {
                debug!("env: flushed after {issued} commands");
                return Ok(());
            }
            if sent < issued && driver_task.is_finished() {
                return Err(driver_task.await?.err().unwrap_or(TbError::RelayClosed));
            }
            if stalled >= self.config.stall_rounds {
                warn!(
                    "env: no progress for {stalled} rounds, giving up with \
                     {commands}/{issued} commands and {results} results observed"
                );
                return Ok(());
            }

            task::yield_now().await;
            let now = progress();
            if now == last {
                stalled += 1;
            } else {
                stalled = 0;
                last = now;
            }
        }
    }

    pub fn check(&mut self) -> Result<CheckReport<B::Op>> {
        self.enter(Phase::Checked, Phase::Ran)?;
        self.phase = Phase::Checked;
        self.scoreboard.check()
    }
}

/// Builds, connects, runs and checks one environment on a fresh [`LocalSet`].
pub async fn run_test<B, P>(bfm: Rc<B>, predict: P, config: EnvConfig) -> Result<CheckReport<B::Op>>
where
    B: AluBfm,
    P: Fn(u8, u8, B::Op) -> AluResult,
{
    LocalSet::new()
        .run_until(async move {
            let mut env = AluEnv::build(bfm, predict, config);
            env.connect()?;
            env.run().await?;
            env.check()
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfm::TinyAluModel;
    use crate::ops::AluOp;
    use crate::reference::predict;

    fn env(config: EnvConfig) -> AluEnv<TinyAluModel, fn(u8, u8, AluOp) -> AluResult> {
        AluEnv::build(
            Rc::new(TinyAluModel::new()),
            predict as fn(u8, u8, AluOp) -> AluResult,
            config,
        )
    }

    #[test]
    fn test_check_before_run_is_rejected() {
        let mut env = env(EnvConfig::default());
        assert!(matches!(
            env.check(),
            Err(TbError::PhaseOrder {
                requested: Phase::Checked,
                current: Phase::Built
            })
        ));
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let mut env = env(EnvConfig::default());
        env.connect().unwrap();
        assert_eq!(env.phase(), Phase::Connected);
        assert!(matches!(env.connect(), Err(TbError::PhaseOrder { .. })));
    }

    #[tokio::test]
    async fn test_failed_run_stops_every_component() {
        use crate::tlm::BlockingPutPort;

        LocalSet::new()
            .run_until(async {
                let model = Rc::new(TinyAluModel::new());
                let mut env = AluEnv::build(
                    Rc::clone(&model),
                    predict as fn(u8, u8, AluOp) -> AluResult,
                    EnvConfig::default(),
                );
                env.connect().unwrap();
                if let Some(tester) = env.tester.as_mut() {
                    tester.bpp = BlockingPutPort::new("tester.bpp");
                }

                assert!(matches!(
                    env.run().await,
                    Err(TbError::Unconnected("tester.bpp"))
                ));
                for _ in 0..16 {
                    task::yield_now().await;
                }
                // Driver and both monitors dropped their handles on the model.
                assert_eq!(Rc::strong_count(&model), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_phases_in_order() {
        LocalSet::new()
            .run_until(async {
                let mut env = env(EnvConfig {
                    stimulus: StimulusKind::Max,
                    ..EnvConfig::default()
                });
                env.connect().unwrap();
                env.run().await.unwrap();
                assert_eq!(env.phase(), Phase::Ran);
                let report = env.check().unwrap();
                assert_eq!(env.phase(), Phase::Checked);
                assert!(report.passed());
            })
            .await;
    }
}
