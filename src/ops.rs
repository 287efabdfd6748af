//! Operations and the transactions that flow through the testbench

use std::fmt;
use std::hash::Hash;

/// Value the ALU produces for one command.
pub type AluResult = u16;

/// A closed set of operations known when the environment is built.
///
/// `ALL` drives both stimulus generation and coverage checking, so the two
/// can never disagree about which operations exist.
pub trait Opcode: Copy + Eq + Hash + fmt::Debug + 'static {
    /// Every operation, in enumeration order.
    const ALL: &'static [Self];

    /// Operation carried by the pipeline-drain commands.
    const DRAIN: Self;

    fn name(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
#[repr(u8)]
pub enum AluOp {
    Add = 0x1,
    And = 0x2,
    Xor = 0x3,
    Mul = 0x4,
}

impl Opcode for AluOp {
    const ALL: &'static [Self] = &[AluOp::Add, AluOp::And, AluOp::Xor, AluOp::Mul];
    const DRAIN: Self = AluOp::Add;

    fn name(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::And => "AND",
            AluOp::Xor => "XOR",
            AluOp::Mul => "MUL",
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One operation request: two byte operands and an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command<O = AluOp> {
    pub a: u8,
    pub b: u8,
    pub op: O,
}

impl<O> Command<O> {
    pub fn new(a: u8, b: u8, op: O) -> Self {
        Self { a, b, op }
    }
}

impl<O: Opcode> fmt::Display for Command<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.a, self.b, self.op.name())
    }
}
