use std::rc::Rc;

use clap::Parser;
use eyre::Result;
use tinyalu_tb::{predict, run_test, AluOp, EnvConfig, Fault, StimulusKind, TinyAluModel};

#[derive(Parser, Debug)]
#[command(name = "tinyalu-tb", version, about = "Transaction-level TinyALU testbench")]
struct Cli {
    /// Operand policy of the tester.
    #[arg(long, value_enum, default_value_t = StimulusKind::Random)]
    stimulus: StimulusKind,

    /// Run the random and max tests back to back.
    #[arg(long, conflicts_with = "stimulus")]
    both: bool,

    /// Seed for the random tester.
    #[arg(long)]
    seed: Option<u64>,

    /// No-op commands sent after the last real one.
    #[arg(long, default_value_t = 4)]
    drain_ops: usize,

    /// Extra pipeline latency of the model, in scheduler ticks.
    #[arg(long, default_value_t = 0)]
    latency: u32,

    /// Flip the low result bit of this operation in the model.
    #[arg(long, value_enum)]
    corrupt: Option<AluOp>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    println!("🚀 TinyALU testbench starting...");

    let kinds = if cli.both {
        vec![StimulusKind::Random, StimulusKind::Max]
    } else {
        vec![cli.stimulus]
    };

    let mut failed = Vec::new();
    for kind in kinds {
        let mut model = TinyAluModel::new().with_latency(cli.latency);
        if let Some(op) = cli.corrupt {
            model = model.with_fault(Fault::Corrupt(op));
        }
        let config = EnvConfig {
            stimulus: kind,
            seed: cli.seed,
            drain_ops: cli.drain_ops,
            ..EnvConfig::default()
        };

        let report = run_test(Rc::new(model), predict, config).await?;
        if report.passed() {
            println!("✅ {kind} test passed ({} transactions)", report.checked());
        } else {
            println!(
                "❌ {kind} test failed ({} mismatches, {} uncovered ops, {} orphan results)",
                report.mismatches.len(),
                report.missing_ops.len(),
                report.orphan_results
            );
            failed.push(kind);
        }
    }

    if !failed.is_empty() {
        eyre::bail!("{} test(s) failed", failed.len());
    }
    println!("🎉 All tests passed!");
    Ok(())
}
