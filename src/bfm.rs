//! Bus-functional model boundary.
//!
//! [`AluBfm`] is everything the testbench needs from the unit under test.
//! [`TinyAluModel`] is a transaction-level stand-in for the TinyALU: it
//! accepts one operation at a time, reports it on the command stream, and
//! posts the result after the operation's pipeline latency.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use log::debug;
use tokio::sync::Notify;
use tokio::task;

use crate::ops::{AluOp, AluResult, Command, Opcode};

#[allow(async_fn_in_trait)]
pub trait AluBfm: 'static {
    type Op: Opcode;

    /// Puts the unit into a known state. Calling it again before any
    /// operation is submitted has no further effect.
    async fn reset(&self);

    async fn start(&self);

    /// Returns once the unit has accepted the operation.
    async fn send_op(&self, cmd: Command<Self::Op>);

    /// Next command the unit was seen to issue.
    async fn get_cmd(&self) -> Command<Self::Op>;

    /// Next result the unit was seen to produce.
    async fn get_result(&self) -> AluResult;
}

#[derive(Debug)]
struct Mailbox<T> {
    items: RefCell<VecDeque<T>>,
    ready: Notify,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            ready: Notify::new(),
        }
    }
}

impl<T> Mailbox<T> {
    fn push(&self, item: T) {
        self.items.borrow_mut().push_back(item);
        self.ready.notify_one();
    }

    async fn pop(&self) -> T {
        loop {
            let next = self.items.borrow_mut().pop_front();
            if let Some(item) = next {
                return item;
            }
            self.ready.notified().await;
        }
    }

    fn clear(&self) {
        self.items.borrow_mut().clear();
    }
}

/// Misbehaviour injected into [`TinyAluModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Flip bit 0 of every result of this operation.
    Corrupt(AluOp),
    /// Never post the result of the n-th accepted operation (0-based).
    DropResult(usize),
}

#[derive(Debug, Default)]
pub struct TinyAluModel {
    extra_latency: u32,
    fault: Option<Fault>,
    started: Cell<bool>,
    resets: Cell<u32>,
    accepted: Cell<usize>,
    commands: Mailbox<Command<AluOp>>,
    results: Mailbox<AluResult>,
}

impl TinyAluModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `ticks` scheduler yields to every operation's latency.
    pub fn with_latency(mut self, ticks: u32) -> Self {
        self.extra_latency = ticks;
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub fn reset_count(&self) -> u32 {
        self.resets.get()
    }

    /// Operations accepted since the last reset.
    pub fn accepted(&self) -> usize {
        self.accepted.get()
    }

    fn latency(&self, op: AluOp) -> u32 {
        let cycles = match op {
            AluOp::Mul => 3,
            AluOp::Add | AluOp::And | AluOp::Xor => 1,
        };
        cycles + self.extra_latency
    }

    fn execute(a: u8, b: u8, op: AluOp) -> AluResult {
        match op {
            AluOp::Add => u16::from(a).wrapping_add(u16::from(b)),
            AluOp::And => u16::from(a & b),
            AluOp::Xor => u16::from(a ^ b),
            AluOp::Mul => {
                // shift-and-add, one partial product per multiplier bit
                let mut product: u16 = 0;
                let multiplicand = u16::from(a);
                for bit in 0..8 {
                    if b & (1 << bit) != 0 {
                        product = product.wrapping_add(multiplicand << bit);
                    }
                }
                product
            }
        }
    }
}

impl AluBfm for TinyAluModel {
    type Op = AluOp;

    async fn reset(&self) {
        self.started.set(false);
        self.accepted.set(0);
        self.commands.clear();
        self.results.clear();
        self.resets.set(self.resets.get() + 1);
        task::yield_now().await;
    }

    async fn start(&self) {
        self.started.set(true);
        task::yield_now().await;
    }

    async fn send_op(&self, cmd: Command<AluOp>) {
        let index = self.accepted.get();
        self.accepted.set(index + 1);
        self.commands.push(cmd);

        for _ in 0..self.latency(cmd.op) {
            task::yield_now().await;
        }

        let mut result = Self::execute(cmd.a, cmd.b, cmd.op);
        match self.fault {
            Some(Fault::Corrupt(op)) if op == cmd.op => result ^= 1,
            Some(Fault::DropResult(n)) if n == index => {
                debug!("tinyalu: dropping result of {cmd}");
                return;
            }
            _ => {}
        }
        self.results.push(result);
    }

    async fn get_cmd(&self) -> Command<AluOp> {
        self.commands.pop().await
    }

    async fn get_result(&self) -> AluResult {
        self.results.pop().await
    }
}
