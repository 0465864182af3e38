//! Ordered, non-blocking hand-off of dominance index values to a consumer.
//!
//! The analysis worker pushes onto an unbounded queue and never waits on the
//! consumer. A dedicated dispatcher thread drains the queue in FIFO order and
//! invokes the [`DominanceListener`].

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use crate::{DominanceError, Result};

/// Outbound collaborator notified once per determinate frame.
pub trait DominanceListener: Send + 'static {
    fn on_dominance_index(&mut self, value: f32);

    /// Called when the frame source fails mid-run. No further values follow.
    fn on_failure(&mut self, _error: &DominanceError) {}

    /// Called once after the last value has been delivered.
    fn on_stopped(&mut self) {}
}

impl<F> DominanceListener for F
where
    F: FnMut(f32) + Send + 'static,
{
    fn on_dominance_index(&mut self, value: f32) {
        self(value)
    }
}

#[derive(Debug)]
pub(crate) enum Delivery {
    Value(f32),
    Failure(DominanceError),
}

/// Producer half held by the analysis worker.
#[derive(Debug, Clone)]
pub(crate) struct DeliverySender {
    tx: Sender<Delivery>,
}

impl DeliverySender {
    pub(crate) fn value(&self, value: f32) {
        if self.tx.send(Delivery::Value(value)).is_err() {
            debug!("dispatcher gone; dropping dominance index");
        }
    }

    pub(crate) fn failure(&self, error: DominanceError) {
        if let Err(e) = self.tx.send(Delivery::Failure(error)) {
            debug!("dispatcher gone; dropping source failure: {:?}", e.into_inner());
        }
    }
}

/// Creates the unbounded queue between the worker and the dispatcher.
pub(crate) fn delivery_channel() -> (DeliverySender, Receiver<Delivery>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (DeliverySender { tx }, rx)
}

/// Spawns the dispatcher thread that drains `rx` into `listener`.
pub(crate) fn spawn_dispatcher<L: DominanceListener>(
    rx: Receiver<Delivery>,
    mut listener: L,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("dominance-delivery".into())
        .spawn(move || dispatch(&rx, &mut listener))?;
    Ok(handle)
}

fn dispatch<L: DominanceListener>(rx: &Receiver<Delivery>, listener: &mut L) {
    for delivery in rx.iter() {
        match delivery {
            Delivery::Value(value) => listener.on_dominance_index(value),
            Delivery::Failure(error) => listener.on_failure(&error),
        }
    }
    listener.on_stopped();
}
