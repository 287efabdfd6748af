//! Transaction-level plumbing between testbench components.
//!
//! * [`TlmFifo`] is the bounded relay between the tester and the driver. A
//!   put into a full fifo suspends the putting task until the getter pops.
//! * [`AnalysisPort`] broadcasts every written value to each connected
//!   [`AnalysisFifo`]. Writes never block; the fifos are unbounded and are
//!   drained with non-blocking gets.
//! * [`Objection`] keeps the run phase open while any guard is alive.

use std::cell::Cell;
use std::rc::Rc;

use log::debug;
use tokio::sync::{mpsc, Notify};

use crate::error::{Result, TbError};

#[derive(Debug)]
pub struct TlmFifo<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    rx: Option<mpsc::Receiver<T>>,
}

impl<T> TlmFifo<T> {
    pub fn new(name: &'static str, depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        Self {
            name,
            tx,
            rx: Some(rx),
        }
    }

    /// Number of entries waiting to be taken.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }
}

#[derive(Debug)]
pub struct BlockingPutPort<T> {
    name: &'static str,
    tx: Option<mpsc::Sender<T>>,
}

impl<T> BlockingPutPort<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, tx: None }
    }

    pub fn connect(&mut self, fifo: &TlmFifo<T>) {
        debug!("{} -> {}", self.name, fifo.name);
        self.tx = Some(fifo.tx.clone());
    }

    /// Suspends while the fifo is full.
    pub async fn put(&self, item: T) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TbError::Unconnected(self.name))?;
        tx.send(item).await.map_err(|_| TbError::RelayClosed)
    }
}

#[derive(Debug)]
pub struct BlockingGetPort<T> {
    name: &'static str,
    rx: Option<mpsc::Receiver<T>>,
}

impl<T> BlockingGetPort<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, rx: None }
    }

    /// Takes the fifo's single get export.
    pub fn connect(&mut self, fifo: &mut TlmFifo<T>) -> Result<()> {
        let rx = fifo.rx.take().ok_or(TbError::ExportTaken(fifo.name))?;
        debug!("{} -> {}", fifo.name, self.name);
        self.rx = Some(rx);
        Ok(())
    }

    /// Suspends while the fifo is empty.
    pub async fn get(&mut self) -> Result<T> {
        let rx = self.rx.as_mut().ok_or(TbError::Unconnected(self.name))?;
        rx.recv().await.ok_or(TbError::RelayClosed)
    }
}

#[derive(Debug)]
pub struct AnalysisFifo<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
    rx: Option<mpsc::UnboundedReceiver<T>>,
}

impl<T> AnalysisFifo<T> {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx,
            rx: Some(rx),
        }
    }
}

#[derive(Debug)]
pub struct AnalysisPort<T> {
    name: &'static str,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> AnalysisPort<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Vec::new(),
        }
    }

    pub fn connect(&mut self, fifo: &AnalysisFifo<T>) {
        debug!("{} -> {}", self.name, fifo.name);
        self.subscribers.push(fifo.tx.clone());
    }

    /// Delivers `item` to every subscriber in publish order. Never suspends.
    pub fn write(&self, item: T) -> Result<()> {
        let Some((last, rest)) = self.subscribers.split_last() else {
            return Err(TbError::Unconnected(self.name));
        };
        for subscriber in rest {
            if subscriber.send(item.clone()).is_err() {
                debug!("{}: subscriber dropped", self.name);
            }
        }
        if last.send(item).is_err() {
            debug!("{}: subscriber dropped", self.name);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct NonblockingGetPort<T> {
    name: &'static str,
    rx: Option<mpsc::UnboundedReceiver<T>>,
}

impl<T> NonblockingGetPort<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, rx: None }
    }

    pub fn connect(&mut self, fifo: &mut AnalysisFifo<T>) -> Result<()> {
        let rx = fifo.rx.take().ok_or(TbError::ExportTaken(fifo.name))?;
        debug!("{} -> {}", fifo.name, self.name);
        self.rx = Some(rx);
        Ok(())
    }

    /// Next buffered value, or `None` if nothing is buffered right now.
    pub fn try_get(&mut self) -> Result<Option<T>> {
        let rx = self.rx.as_mut().ok_or(TbError::Unconnected(self.name))?;
        Ok(rx.try_recv().ok())
    }
}

/// Counter that holds the run phase open while it is non-zero.
#[derive(Debug, Default)]
pub struct Objection {
    count: Cell<usize>,
    cleared: Notify,
}

impl Objection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises one objection; it is dropped when the guard goes away.
    pub fn raise(self: &Rc<Self>) -> ObjectionGuard {
        self.count.set(self.count.get() + 1);
        ObjectionGuard {
            objection: Rc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Resolves once no objection is outstanding.
    pub async fn wait_for_clear(&self) {
        loop {
            let cleared = self.cleared.notified();
            if self.count.get() == 0 {
                return;
            }
            cleared.await;
        }
    }
}

#[must_use = "the objection is dropped as soon as the guard is"]
#[derive(Debug)]
pub struct ObjectionGuard {
    objection: Rc<Objection>,
}

impl Drop for ObjectionGuard {
    fn drop(&mut self) {
        let count = self.objection.count.get().saturating_sub(1);
        self.objection.count.set(count);
        if count == 0 {
            self.objection.cleared.notify_waiters();
        }
    }
}
