pub mod bfm;
pub mod driver;
pub mod env;
pub mod error;
pub mod monitor;
pub mod ops;
pub mod reference;
pub mod scoreboard;
pub mod stimulus;
pub mod tlm;

pub use bfm::{AluBfm, Fault, TinyAluModel};
pub use env::{run_test, AluEnv, EnvConfig, Phase};
pub use error::{Result, TbError};
pub use ops::{AluOp, AluResult, Command, Opcode};
pub use reference::predict;
pub use scoreboard::{CheckReport, Mismatch, Scoreboard, Transaction};
pub use stimulus::{StimulusKind, Tester};
