//! Invoice status polling.
//!
//! A session fetches the invoice immediately, then once per interval, until
//! the snapshot is terminal, a fetch fails, or the session is cancelled.
//! Every transition is sent to the session's single subscriber over a
//! bounded channel; a subscriber that stops reading stalls the loop rather
//! than letting events pile up.
//!
//! Cancellation closes a publication gate under the same lock every send
//! takes, then aborts the task. Once `cancel` returns, nothing else is
//! emitted, even if a fetch was about to resolve.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::{Invoice, InvoiceStatus};
use crate::psp::InvoiceSource;

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle,
    Loading,
    Done(Invoice),
    /// The loop has stopped. `last` is the most recent good snapshot, if any.
    Error {
        message: String,
        last: Option<Invoice>,
    },
}

/// True once no further polling can change what the operator sees.
///
/// Expired and rejected invoices are final. A confirmed invoice is final only
/// once compliance has caught up: an AML result or an operator decision is
/// present. Until then screening may still be running.
pub fn is_terminal(invoice: &Invoice) -> bool {
    if invoice.status.is_final() {
        return true;
    }
    invoice.status == InvoiceStatus::Confirmed
        && (invoice.aml.is_present() || invoice.decision.is_decided())
}

/// Events buffered per session before the loop waits on the subscriber.
pub const EVENT_BUFFER: usize = 8;

type Gate = Arc<Mutex<Option<Sender<PollState>>>>;

fn open_sender(gate: &Gate) -> Option<Sender<PollState>> {
    gate.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Sends `state` unless the session was cancelled. Returns false once the
/// gate is closed or the subscriber went away.
///
/// Waits for buffer space outside the lock, then re-checks the gate before
/// sending so a cancel that lands while waiting still wins.
async fn publish(gate: &Gate, state: PollState) -> bool {
    let Some(tx) = open_sender(gate) else {
        return false;
    };
    let Ok(permit) = tx.reserve_owned().await else {
        return false;
    };

    let guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_none() {
        return false;
    }
    permit.send(state);
    true
}

/// Controls a running session.
#[derive(Debug)]
pub struct PollHandle {
    gate: Gate,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stops the session. No state is emitted after this returns.
    pub fn cancel(&self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// True once the loop has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A session's event stream plus its handle. Dropping it cancels the session.
#[derive(Debug)]
pub struct PollSubscription {
    pub invoice_id: String,
    pub events: Receiver<PollState>,
    pub handle: PollHandle,
}

impl PollSubscription {
    /// Next transition, or `None` once the session has ended and drained.
    pub async fn next(&mut self) -> Option<PollState> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

pub struct InvoicePoller<S> {
    source: Arc<S>,
    interval: Duration,
}

impl<S> Clone for InvoicePoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            interval: self.interval,
        }
    }
}

impl<S: InvoiceSource> InvoicePoller<S> {
    pub fn new(source: Arc<S>, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts a session for `invoice_id`. A blank id yields an idle session
    /// that emits `Idle` and ends.
    pub fn start(&self, invoice_id: &str) -> PollSubscription {
        let invoice_id = invoice_id.trim().to_string();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        if invoice_id.is_empty() {
            let _ = tx.try_send(PollState::Idle);
            return PollSubscription {
                invoice_id,
                events: rx,
                handle: PollHandle {
                    gate: Arc::new(Mutex::new(None)),
                    task: None,
                },
            };
        }

        let gate: Gate = Arc::new(Mutex::new(Some(tx)));
        let task = tokio::spawn(run_session(
            self.source.clone(),
            invoice_id.clone(),
            self.interval,
            gate.clone(),
        ));

        PollSubscription {
            invoice_id,
            events: rx,
            handle: PollHandle {
                gate,
                task: Some(task),
            },
        }
    }
}

async fn run_session<S: InvoiceSource>(
    source: Arc<S>,
    invoice_id: String,
    period: Duration,
    gate: Gate,
) {
    // First tick fires immediately. A fetch that overruns the period skips
    // the missed ticks instead of bursting to catch up.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last: Option<Invoice> = None;

    loop {
        ticker.tick().await;

        if !publish(&gate, PollState::Loading).await {
            return;
        }

        match source.fetch_invoice(&invoice_id).await {
            Ok(invoice) => {
                let terminal = is_terminal(&invoice);
                tracing::debug!(
                    "Poll {}: status={} terminal={}",
                    invoice_id,
                    invoice.status.as_ref(),
                    terminal
                );
                last = Some(invoice.clone());
                if !publish(&gate, PollState::Done(invoice)).await || terminal {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Poll {}: fetch failed, stopping: {}", invoice_id, e);
                publish(
                    &gate,
                    PollState::Error {
                        message: e.to_string(),
                        last,
                    },
                )
                .await;
                break;
            }
        }
    }

    // Close the stream so the subscriber sees the end.
    gate.lock().unwrap_or_else(PoisonError::into_inner).take();
}

/// Keeps at most one live session, as an invoice detail view does.
///
/// Switching to another id cancels the previous session first; clearing the
/// id leaves no session running.
pub struct PollerSession<S> {
    poller: InvoicePoller<S>,
    current: Option<PollSubscription>,
}

impl<S: InvoiceSource> PollerSession<S> {
    pub fn new(poller: InvoicePoller<S>) -> Self {
        Self {
            poller,
            current: None,
        }
    }

    /// Cancels any running session, then starts one for `invoice_id` unless
    /// it is blank. Returns the new subscription, if one was started.
    pub fn switch_to(&mut self, invoice_id: Option<&str>) -> Option<&mut PollSubscription> {
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }

        let id = invoice_id.map(str::trim).filter(|id| !id.is_empty())?;
        self.current = Some(self.poller.start(id));
        self.current.as_mut()
    }

    pub fn current(&mut self) -> Option<&mut PollSubscription> {
        self.current.as_mut()
    }

    pub fn stop(&mut self) {
        self.switch_to(None);
    }
}
