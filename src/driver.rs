use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use crate::bfm::AluBfm;
use crate::error::Result;
use crate::ops::Command;
use crate::tlm::BlockingGetPort;

/// Moves commands from the relay queue into the bus-functional model.
#[derive(Debug)]
pub struct Driver<B: AluBfm> {
    bfm: Rc<B>,
    pub bgp: BlockingGetPort<Command<B::Op>>,
    submitted: Rc<Cell<usize>>,
}

impl<B: AluBfm> Driver<B> {
    pub fn new(bfm: Rc<B>) -> Self {
        Self {
            bfm,
            bgp: BlockingGetPort::new("driver.bgp"),
            submitted: Rc::new(Cell::new(0)),
        }
    }

    /// Count of commands the model has accepted, readable while the driver runs.
    pub fn submitted(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.submitted)
    }

    /// Resets and starts the model, then forwards commands until the relay
    /// queue closes or the task is aborted.
    pub async fn run(mut self) -> Result<()> {
        self.bfm.reset().await;
        self.bfm.start().await;
        debug!("driver: model reset and started");
        loop {
            let cmd = self.bgp.get().await?;
            self.bfm.send_op(cmd).await;
            self.submitted.set(self.submitted.get() + 1);
            debug!("driver: sent {cmd:?}");
        }
    }
}
