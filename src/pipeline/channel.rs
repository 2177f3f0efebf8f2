//! Bounded row channels between stage workers.
//!
//! Every hop gets its own bounded crossbeam channel. Producers block when the
//! channel is full, which gives end-to-end backpressure without any global
//! coordination. The end of a stream is an explicit [`Envelope::Done`] marker
//! rather than a disconnect, so a consumer can tell a finished producer from
//! one that died.
//!
//! All channels of one run share a [`Poison`] switch. Tripping it wakes every
//! blocked `put`/`take` in the run and makes them fail with
//! [`PipelineError::ChannelPoisoned`].
//!
//! ```text
//!            ┌──────────── Poison (wake) ────────────┐
//!            ▼                                       ▼
//!   RowSender ──[Row|Row|Row|Done]──▶ RowReceiver   InputSet::take_any
//! ```

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::HopId;
use crate::row::Row;
use crossbeam_channel::{bounded, select, Receiver, RecvError, Select, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

enum Envelope {
    Row(Row),
    Done,
}

struct PoisonState {
    poisoned: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
}

/// Run-wide cancellation switch shared by every channel end.
///
/// The wake channel never carries a message; dropping its only sender
/// disconnects it, which makes every `select!` waiting on it ready.
#[derive(Clone)]
pub struct Poison {
    state: Arc<PoisonState>,
    wake: Receiver<()>,
}

impl Poison {
    pub fn new() -> Self {
        let (trigger, wake) = bounded(0);
        Self {
            state: Arc::new(PoisonState {
                poisoned: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
            }),
            wake,
        }
    }

    /// Trip the switch. Returns `true` for the call that actually tripped it.
    pub fn poison(&self) -> bool {
        let first = !self.state.poisoned.swap(true, Ordering::SeqCst);
        self.state
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        first
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.poisoned.load(Ordering::SeqCst)
    }
}

impl Default for Poison {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the two ends of a hop's channel.
pub fn row_channel(hop: HopId, capacity: usize, poison: &Poison) -> (RowSender, RowReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        RowSender {
            hop,
            tx: Some(tx),
            poison: poison.clone(),
        },
        RowReceiver {
            hop,
            rx,
            poison: poison.clone(),
            finished: false,
            counter: Arc::new(AtomicU64::new(0)),
        },
    )
}

/// Producer end of a hop.
pub struct RowSender {
    hop: HopId,
    tx: Option<Sender<Envelope>>,
    poison: Poison,
}

impl RowSender {
    pub fn hop(&self) -> HopId {
        self.hop
    }

    /// Enqueue a row, blocking while the channel is full.
    pub fn put(&self, row: Row) -> PipelineResult<()> {
        let tx = self.tx.as_ref().ok_or(PipelineError::ChannelClosed(self.hop))?;
        self.send(tx, Envelope::Row(row))
    }

    /// Mark the end of the stream. Calling it again is a no-op.
    pub fn signal_done(&mut self) -> PipelineResult<()> {
        match self.tx.take() {
            Some(tx) => self.send(&tx, Envelope::Done),
            None => Ok(()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.tx.is_none()
    }

    fn send(&self, tx: &Sender<Envelope>, envelope: Envelope) -> PipelineResult<()> {
        if self.poison.is_poisoned() {
            return Err(PipelineError::ChannelPoisoned);
        }
        // A disconnected receiver means the consumer is gone, which only
        // happens when it failed.
        select! {
            send(tx, envelope) -> res => res.map_err(|_| PipelineError::ChannelPoisoned),
            recv(self.poison.wake) -> _ => Err(PipelineError::ChannelPoisoned),
        }
    }
}

/// Consumer end of a hop.
pub struct RowReceiver {
    hop: HopId,
    rx: Receiver<Envelope>,
    poison: Poison,
    finished: bool,
    counter: Arc<AtomicU64>,
}

impl RowReceiver {
    pub fn hop(&self) -> HopId {
        self.hop
    }

    /// Take the next row, blocking while the channel is empty.
    ///
    /// Returns `Ok(None)` once the producer signalled completion, and keeps
    /// returning it afterwards.
    pub fn take(&mut self) -> PipelineResult<Option<Row>> {
        if self.finished {
            return Ok(None);
        }
        if self.poison.is_poisoned() {
            return Err(PipelineError::ChannelPoisoned);
        }
        let msg = select! {
            recv(self.rx) -> msg => msg,
            recv(self.poison.wake) -> _ => return Err(PipelineError::ChannelPoisoned),
        };
        self.accept(msg)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rows currently buffered in the channel.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Count rows taken from this receiver into `counter`.
    pub(crate) fn count_into(&mut self, counter: Arc<AtomicU64>) {
        self.counter = counter;
    }

    fn accept(&mut self, msg: Result<Envelope, RecvError>) -> PipelineResult<Option<Row>> {
        match msg {
            Ok(Envelope::Row(row)) => {
                self.counter.fetch_add(1, Ordering::Relaxed);
                Ok(Some(row))
            }
            Ok(Envelope::Done) => {
                self.finished = true;
                Ok(None)
            }
            // Producer dropped without signalling completion.
            Err(_) => Err(PipelineError::ChannelPoisoned),
        }
    }
}

/// A group of receivers read in arrival order.
///
/// Selecting over all open inputs instead of draining them one by one keeps
/// fan-in free of deadlocks when several producers share an upstream.
pub struct InputSet {
    inputs: Vec<RowReceiver>,
}

impl InputSet {
    pub fn new(inputs: Vec<RowReceiver>) -> Self {
        Self { inputs }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn is_finished(&self, index: usize) -> bool {
        self.inputs.get(index).map_or(true, RowReceiver::is_finished)
    }

    pub fn all_finished(&self) -> bool {
        self.inputs.iter().all(RowReceiver::is_finished)
    }

    /// Take the next row from whichever input has one, with the index of
    /// that input. `Ok(None)` once every input has completed.
    pub fn take_any(&mut self) -> PipelineResult<Option<(usize, Row)>> {
        loop {
            let open: Vec<usize> = (0..self.inputs.len())
                .filter(|&i| !self.inputs[i].finished)
                .collect();

            match open.as_slice() {
                [] => return Ok(None),
                [only] => {
                    let only = *only;
                    match self.inputs[only].take()? {
                        Some(row) => return Ok(Some((only, row))),
                        None => continue,
                    }
                }
                _ => {}
            }

            let poison = self.inputs[open[0]].poison.clone();
            if poison.is_poisoned() {
                return Err(PipelineError::ChannelPoisoned);
            }

            let (index, msg) = {
                let mut sel = Select::new();
                for &i in &open {
                    sel.recv(&self.inputs[i].rx);
                }
                let wake = sel.recv(&poison.wake);

                let oper = sel.select();
                let picked = oper.index();
                if picked == wake {
                    let _ = oper.recv(&poison.wake);
                    return Err(PipelineError::ChannelPoisoned);
                }
                let index = open[picked];
                (index, oper.recv(&self.inputs[index].rx))
            };

            if let Some(row) = self.inputs[index].accept(msg)? {
                return Ok(Some((index, row)));
            }
        }
    }

    pub fn into_receivers(self) -> Vec<RowReceiver> {
        self.inputs
    }
}

struct OutputPort {
    target: String,
    sender: RowSender,
}

/// Output hops of one stage, in hop creation order.
pub struct StageOutputs {
    ports: Vec<OutputPort>,
    rows_written: u64,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self {
            ports: Vec::new(),
            rows_written: 0,
        }
    }

    pub(crate) fn attach(&mut self, target: impl Into<String>, sender: RowSender) {
        self.ports.push(OutputPort {
            target: target.into(),
            sender,
        });
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Names of the downstream stages, one per output hop.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(|p| p.target.as_str())
    }

    pub fn index_of(&self, target: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.target == target)
    }

    /// Copy a row onto every output hop.
    pub fn put(&mut self, row: Row) -> PipelineResult<()> {
        if let Some((last, rest)) = self.ports.split_last() {
            for port in rest {
                port.sender.put(row.clone())?;
            }
            last.sender.put(row)?;
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Send a row to the output hop at `index` only.
    pub fn put_to(&mut self, index: usize, row: Row) -> PipelineResult<()> {
        let port = self.ports.get(index).ok_or_else(|| {
            PipelineError::InvalidHop(format!("no output hop at index {}", index))
        })?;
        port.sender.put(row)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Signal completion on every output hop.
    pub fn signal_done(&mut self) -> PipelineResult<()> {
        for port in &mut self.ports {
            port.sender.signal_done()?;
        }
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl Default for StageOutputs {
    fn default() -> Self {
        Self::new()
    }
}
