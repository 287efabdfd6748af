//! Stimulus generation.
//!
//! Both testers run the same loop: one command per operation in enumeration
//! order, then a fixed number of drain commands. They differ only in how the
//! operands are chosen.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::ops::{AluOp, Command, Opcode};
use crate::tlm::{BlockingPutPort, Objection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum StimulusKind {
    /// Operands drawn uniformly from the full byte range.
    #[default]
    Random,
    /// Both operands fixed at 0xFF.
    Max,
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimulusKind::Random => f.write_str("random"),
            StimulusKind::Max => f.write_str("max"),
        }
    }
}

#[derive(Debug)]
enum OperandPolicy {
    Random(StdRng),
    Max,
}

impl OperandPolicy {
    fn next(&mut self) -> (u8, u8) {
        match self {
            OperandPolicy::Random(rng) => (rng.gen(), rng.gen()),
            OperandPolicy::Max => (u8::MAX, u8::MAX),
        }
    }
}

#[derive(Debug)]
pub struct Tester<O = AluOp> {
    policy: OperandPolicy,
    drain_ops: usize,
    pub bpp: BlockingPutPort<Command<O>>,
}

impl<O: Opcode> Tester<O> {
    /// Builds the tester for `kind`. A random tester without a seed picks
    /// one and logs it so a failing run can be replayed.
    pub fn from_kind(kind: StimulusKind, seed: Option<u64>, drain_ops: usize) -> Self {
        let policy = match kind {
            StimulusKind::Random => {
                let seed = seed.unwrap_or_else(rand::random);
                info!("random tester seed: {seed}");
                OperandPolicy::Random(StdRng::seed_from_u64(seed))
            }
            StimulusKind::Max => OperandPolicy::Max,
        };
        Self {
            policy,
            drain_ops,
            bpp: BlockingPutPort::new("tester.bpp"),
        }
    }

    /// The full command sequence for one run.
    pub fn sequence(&mut self) -> Vec<Command<O>> {
        let mut commands = Vec::with_capacity(O::ALL.len() + self.drain_ops);
        for &op in O::ALL {
            let (a, b) = self.policy.next();
            commands.push(Command::new(a, b, op));
        }
        commands.extend((0..self.drain_ops).map(|_| Command::new(0, 0, O::DRAIN)));
        commands
    }

    /// Raises an objection immediately and returns the task that pushes the
    /// sequence into the relay queue. The objection is dropped once the last
    /// drain command has been accepted; the task yields the number of
    /// commands pushed.
    pub fn run(mut self, objection: &Rc<Objection>) -> impl Future<Output = Result<usize>> {
        let guard = objection.raise();
        async move {
            let _guard = guard;
            let commands = self.sequence();
            let total = commands.len();
            for cmd in commands {
                debug!("tester: put {cmd}");
                self.bpp.put(cmd).await?;
            }
            debug!("tester: {total} commands sent");
            Ok(total)
        }
    }
}
