use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

use log::debug;

use crate::bfm::AluBfm;
use crate::error::Result;
use crate::ops::{AluResult, Command};
use crate::tlm::AnalysisPort;

/// Which observation stream of the model a [`Monitor`] follows.
#[allow(async_fn_in_trait)]
pub trait Probe<B: AluBfm>: 'static {
    type Item: Clone + std::fmt::Debug + 'static;

    const NAME: &'static str;

    async fn sample(bfm: &B) -> Self::Item;
}

#[derive(Debug)]
pub struct CommandProbe;

impl<B: AluBfm> Probe<B> for CommandProbe {
    type Item = Command<B::Op>;

    const NAME: &'static str = "cmd_monitor";

    async fn sample(bfm: &B) -> Self::Item {
        bfm.get_cmd().await
    }
}

#[derive(Debug)]
pub struct ResultProbe;

impl<B: AluBfm> Probe<B> for ResultProbe {
    type Item = AluResult;

    const NAME: &'static str = "result_monitor";

    async fn sample(bfm: &B) -> Self::Item {
        bfm.get_result().await
    }
}

/// Republishes everything its probe observes, in arrival order.
pub struct Monitor<B: AluBfm, P: Probe<B>> {
    bfm: Rc<B>,
    pub ap: AnalysisPort<P::Item>,
    published: Rc<Cell<usize>>,
    _probe: PhantomData<P>,
}

impl<B: AluBfm, P: Probe<B>> Monitor<B, P> {
    pub fn new(bfm: Rc<B>) -> Self {
        Self {
            bfm,
            ap: AnalysisPort::new(P::NAME),
            published: Rc::new(Cell::new(0)),
            _probe: PhantomData,
        }
    }

    pub fn published(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.published)
    }

    pub async fn run(self) -> Result<()> {
        loop {
            let datum = P::sample(&self.bfm).await;
            debug!("{}: {datum:?}", P::NAME);
            self.ap.write(datum)?;
            self.published.set(self.published.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfm::TinyAluModel;
    use crate::ops::AluOp;
    use crate::tlm::{AnalysisFifo, NonblockingGetPort};
    use tokio::task::{self, LocalSet};

    #[tokio::test]
    async fn test_monitors_follow_their_stream() {
        LocalSet::new()
            .run_until(async {
                let model = Rc::new(TinyAluModel::new());
                let mut cmd_monitor = Monitor::<_, CommandProbe>::new(Rc::clone(&model));
                let mut result_monitor = Monitor::<_, ResultProbe>::new(Rc::clone(&model));
                let mut cmd_fifo = AnalysisFifo::new("cmd_mon_fifo");
                let mut result_fifo = AnalysisFifo::new("result_mon_fifo");
                cmd_monitor.ap.connect(&cmd_fifo);
                result_monitor.ap.connect(&result_fifo);
                let mut cmd_gp = NonblockingGetPort::new("cmd_gp");
                let mut result_gp = NonblockingGetPort::new("result_gp");
                cmd_gp.connect(&mut cmd_fifo).unwrap();
                result_gp.connect(&mut result_fifo).unwrap();

                let cmds_seen = cmd_monitor.published();
                let results_seen = result_monitor.published();
                let cmd_task = task::spawn_local(cmd_monitor.run());
                let result_task = task::spawn_local(result_monitor.run());

                model.send_op(Command::new(2, 2, AluOp::Mul)).await;
                model.send_op(Command::new(9, 1, AluOp::Add)).await;
                while cmds_seen.get() < 2 || results_seen.get() < 2 {
                    task::yield_now().await;
                }
                cmd_task.abort();
                result_task.abort();

                assert_eq!(cmd_gp.try_get().unwrap(), Some(Command::new(2, 2, AluOp::Mul)));
                assert_eq!(cmd_gp.try_get().unwrap(), Some(Command::new(9, 1, AluOp::Add)));
                assert_eq!(cmd_gp.try_get().unwrap(), None);
                assert_eq!(result_gp.try_get().unwrap(), Some(4));
                assert_eq!(result_gp.try_get().unwrap(), Some(10));
                assert_eq!(result_gp.try_get().unwrap(), None);
            })
            .await;
    }
}
