//! Per-invocation execution state (spec §3 "Found step", §9 arena note):
//! an arena of discovered steps addressed by index, plus the memoized map
//! handed in by the Executor.

use durable_core::{CollisionResolver, HashedId, MemoizedState, OpCode, StepDescriptor};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The body of a `step.run`/`sendEvent`/... call, boxed so the arena can
/// hold a heterogeneous set of them. Takes the step's *effective* input
/// (spec §4.2 "Input replay for run") rather than relying solely on
/// whatever the closure captured at discovery time.
pub type StepHandler =
    Box<dyn FnOnce(Option<Value>) -> BoxFuture<'static, Result<Value, Value>> + Send>;

/// What a step settles to, carried across the oneshot channel that backs
/// its [`StepFuture`].
#[derive(Debug, Clone)]
pub enum StepSettlement {
    Data(Value),
    Error(Value),
}

/// A reference into [`ExecutionState::discovered`]. Index, not pointer —
/// the arena-of-steps pattern spec §9 asks for instead of a cyclic graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepHandle(pub usize);

/// The runtime record of a step discovered during this replay (spec §3
/// "Found step").
pub struct FoundStep {
    pub descriptor: StepDescriptor,
    pub handler: Option<StepHandler>,
    settle: Option<oneshot::Sender<StepSettlement>>,
    pub handled: bool,
    /// The input the handler is actually invoked with: the Executor's
    /// recorded `memo.input` when present, else whatever this discovery
    /// pass computed (spec §4.2 "Input replay for run").
    effective_input: Option<Value>,
}

/// The future handed back to user code by a step tool call. Resolves once
/// the engine sends a [`StepSettlement`]; if the sender is dropped without
/// sending (the engine decided this invocation will not run the step),
/// the future freezes permanently rather than resolving to an error —
/// the "frozen promise" of spec §5/§9 (GLOSSARY "Frozen future").
pub struct StepFuture {
    rx: Option<oneshot::Receiver<StepSettlement>>,
}

impl StepFuture {
    fn new(rx: oneshot::Receiver<StepSettlement>) -> Self {
        Self { rx: Some(rx) }
    }
}

impl Future for StepFuture {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(StepSettlement::Data(v))) => Poll::Ready(Ok(v)),
            Poll::Ready(Ok(StepSettlement::Error(e))) => Poll::Ready(Err(e)),
            Poll::Ready(Err(_canceled)) => {
                // Sender dropped without settling: this step will not run
                // in the current invocation. Freeze forever rather than
                // surface a channel-closed error to user code.
                this.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Identifies the checkpointed run once `checkpointNewRun` has assigned a
/// token, so later `checkpointSteps` calls address the same run (spec
/// §4.7 "Checkpoint RPCs").
#[derive(Debug, Clone)]
pub struct CheckpointSession {
    pub app_id: String,
    pub fn_id: String,
    pub token: String,
}

/// Per-invocation mutable state (spec §2.3, §3 "lifecycles").
pub struct ExecutionState {
    pub memoized: MemoizedState,
    pub discovered: Vec<FoundStep>,
    index_by_hash: HashMap<HashedId, usize>,
    pub resolver: CollisionResolver,
    pub completion_order: Vec<HashedId>,
    /// Steps executed under `Mode::AsyncCheckpointing` awaiting a flush to
    /// the Executor (spec §4.7 "AsyncCheckpointing").
    pub checkpoint_buffer: Vec<durable_core::OutgoingOp>,
    /// Set once `checkpointNewRun` has established a token for this run
    /// (`Mode::Sync`, spec §4.7 "Checkpoint RPCs").
    pub checkpoint_session: Option<CheckpointSession>,
    /// The most recent `StepError` value injected into user code, so a
    /// bare re-throw of it can be classified non-retriable (spec §7.4).
    pub recent_step_error: Option<Value>,
    pub executing_step: bool,
}

impl ExecutionState {
    pub fn new(memoized: MemoizedState, completion_order: Vec<HashedId>) -> Self {
        Self {
            memoized,
            discovered: Vec::new(),
            index_by_hash: HashMap::new(),
            resolver: CollisionResolver::new(),
            completion_order,
            checkpoint_buffer: Vec::new(),
            checkpoint_session: None,
            recent_step_error: None,
            executing_step: false,
        }
    }

    pub fn already_discovered(&self, hashed: &HashedId) -> bool {
        self.index_by_hash.contains_key(hashed)
    }

    /// Resolve a userland id against this run's collision tracker. Lives
    /// on `ExecutionState` (rather than being called with a closure that
    /// borrows it) so the `already_discovered` check and the resolver's
    /// own mutable state can be borrowed at once.
    pub fn resolve_id(&mut self, base: &str) -> durable_core::ResolvedId {
        let index_by_hash = &self.index_by_hash;
        self.resolver
            .resolve(base, |h| index_by_hash.contains_key(h))
    }

    pub fn find(&self, hashed: &HashedId) -> Option<StepHandle> {
        self.index_by_hash.get(hashed).copied().map(StepHandle)
    }

    /// Record a newly-discovered step. If its hashed id is already present
    /// and fulfilled in the memoized map, settle its future immediately
    /// (spec P2: memoization is read-only, never re-executed) and mark it
    /// `handled` so the engine's discovery pass skips it.
    pub fn push(&mut self, descriptor: StepDescriptor, handler: Option<StepHandler>) -> StepFuture {
        let hashed = descriptor.hashed_id.clone();
        let (tx, rx) = oneshot::channel();
        let idx = self.discovered.len();
        self.index_by_hash.insert(hashed.clone(), idx);

        // A prior attempt may have recorded `input` for this hashed id
        // without ever fulfilling it (the attempt was interrupted before
        // the step finished) — replay that recorded input rather than
        // whatever this invocation freshly computed (spec §4.2).
        let effective_input = self
            .memoized
            .get(&hashed)
            .and_then(|memo| memo.input.clone())
            .or_else(|| descriptor.input.clone());

        let mut found = FoundStep {
            descriptor,
            handler,
            settle: Some(tx),
            handled: false,
            effective_input,
        };

        if let Some(memo) = self.memoized.get_mut(&hashed) {
            memo.seen = true;
            if memo.is_fulfilled() {
                memo.fulfilled = true;
                let settlement = match memo.error.clone() {
                    Some(err) => StepSettlement::Error(err),
                    None => StepSettlement::Data(memo.data.clone().unwrap_or(Value::Null)),
                };
                if let Some(tx) = found.settle.take() {
                    let _ = tx.send(settlement);
                }
                found.handled = true;
            }
        }

        self.discovered.push(found);
        StepFuture::new(rx)
    }

    pub fn step(&self, handle: StepHandle) -> &FoundStep {
        &self.discovered[handle.0]
    }

    pub fn step_mut(&mut self, handle: StepHandle) -> &mut FoundStep {
        &mut self.discovered[handle.0]
    }

    /// Takes the handler along with the input it should actually be
    /// invoked with (spec §4.2 "Input replay for run").
    pub fn take_handler(&mut self, handle: StepHandle) -> (Option<StepHandler>, Option<Value>) {
        let step = &mut self.discovered[handle.0];
        (step.handler.take(), step.effective_input.clone())
    }

    pub fn settle(&mut self, handle: StepHandle, settlement: StepSettlement) {
        let step = &mut self.discovered[handle.0];
        step.handled = true;
        if let Some(tx) = step.settle.take() {
            let _ = tx.send(settlement);
        }
    }

    /// Indices of steps discovered this replay but not yet handled
    /// (neither pre-fulfilled from memoization nor executed this tick),
    /// ordered per the Executor's `stepCompletionOrder` when given,
    /// falling back to discovery order for unlisted ids (spec §5
    /// "Ordering guarantees").
    pub fn new_step_handles(&self) -> Vec<StepHandle> {
        let mut idxs: Vec<usize> = self
            .discovered
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.handled)
            .map(|(i, _)| i)
            .collect();

        if !self.completion_order.is_empty() {
            let pos = |h: &HashedId| self.completion_order.iter().position(|x| x == h);
            idxs.sort_by_key(|&i| pos(&self.discovered[i].descriptor.hashed_id).unwrap_or(usize::MAX));
        }

        idxs.into_iter().map(StepHandle).collect()
    }

    pub fn all_planned(&self, handles: &[StepHandle]) -> bool {
        handles
            .iter()
            .all(|h| self.discovered[h.0].descriptor.op == OpCode::StepPlanned)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
