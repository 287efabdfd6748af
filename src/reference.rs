use crate::ops::{AluOp, AluResult};

/// Expected TinyALU output for `a op b`.
///
/// Operands are widened to the 16-bit result bus before the operation, so
/// neither addition nor multiplication of two bytes can overflow.
pub fn predict(a: u8, b: u8, op: AluOp) -> AluResult {
    let (a, b) = (AluResult::from(a), AluResult::from(b));
    match op {
        AluOp::Add => a + b,
        AluOp::And => a & b,
        AluOp::Xor => a ^ b,
        AluOp::Mul => a * b,
    }
}
