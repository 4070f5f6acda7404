use tracing::{debug, trace};

use crate::error::Error;
use crate::stage::inbound::{self, Inbound, Signal, SignalReceiver};
use crate::stage::outbound::Outbound;
use crate::stage::StageContext;

/// Per-input state: the subscription and at most one element waiting to be
/// forwarded.
struct Input<T> {
    upstream: Inbound,
    buffered: Option<T>,
}

impl<T> Default for Input<T> {
    fn default() -> Self {
        Self {
            upstream: Inbound::default(),
            buffered: None,
        }
    }
}

struct MergeState<T> {
    inputs: Vec<Input<T>>,
    /// Next input to serve, for both emission and requests.
    cursor: usize,
}

impl<T> MergeState<T> {
    fn new(count: usize) -> Self {
        Self {
            inputs: (0..count).map(|_| Input::default()).collect(),
            cursor: 0,
        }
    }

    fn all_completed(&self) -> bool {
        self.inputs
            .iter()
            .all(|input| input.upstream.is_closed() && input.buffered.is_none())
    }

    fn all_closed(&self) -> bool {
        self.inputs.iter().all(|input| input.upstream.is_closed())
    }

    /// Input indices in round-robin order starting at the cursor.
    fn rotation(&self) -> impl Iterator<Item = usize> {
        let count = self.inputs.len();
        let cursor = self.cursor;
        (0..count).map(move |step| (cursor + step) % count)
    }

    /// Take the next buffered element in round-robin order.
    fn next_ready(&mut self) -> Option<T> {
        let ready = self
            .rotation()
            .find(|&index| self.inputs[index].buffered.is_some())?;
        self.cursor = (ready + 1) % self.inputs.len();
        self.inputs[ready].buffered.take()
    }

    /// Elements requested or buffered but not yet forwarded.
    fn committed(&self) -> u64 {
        self.inputs
            .iter()
            .map(|input| input.upstream.outstanding() + u64::from(input.buffered.is_some()))
            .sum()
    }

    /// Ask idle inputs for one element each while downstream demand is left
    /// uncovered.
    fn request_upstream(&mut self, demand: u64) {
        let mut budget = demand.saturating_sub(self.committed());
        let order: Vec<usize> = self.rotation().collect();
        for index in order {
            if budget == 0 {
                break;
            }
            let input = &mut self.inputs[index];
            if input.upstream.is_subscribed()
                && !input.upstream.is_closed()
                && input.upstream.outstanding() == 0
                && input.buffered.is_none()
            {
                input.upstream.request(1);
                budget -= 1;
            }
        }
    }

    fn cancel_all(&mut self) {
        for input in &mut self.inputs {
            input.upstream.cancel();
            input.buffered = None;
        }
    }
}

pub(crate) async fn run_merge<T: Send + 'static>(
    count: usize,
    mut mailbox: SignalReceiver<T>,
    mut outbound: Outbound<T>,
    ctx: StageContext,
) {
    debug!(stage = %ctx.name(), inputs = count, "merge stage started");
    let mut state = MergeState::new(count);
    let mut emitted_this_turn = 0usize;

    loop {
        while outbound.can_push() {
            let Some(element) = state.next_ready() else {
                break;
            };
            outbound.push(element);
            emitted_this_turn += 1;
        }
        if emitted_this_turn >= ctx.max_elements_per_turn() {
            emitted_this_turn = 0;
            tokio::task::yield_now().await;
        }

        if outbound.is_open() && state.all_completed() {
            outbound.complete();
        }
        if !outbound.is_open() {
            state.cancel_all();
        }
        if outbound.is_finished() {
            break;
        }

        if outbound.is_open() {
            state.request_upstream(outbound.demand());
        }

        tokio::select! {
            biased;
            _ = ctx.shutdown().cancelled(), if outbound.is_open() => {
                outbound.fail(Error::Shutdown);
                state.cancel_all();
                break;
            }
            event = outbound.next_event() => outbound.handle(event),
            signal = mailbox.recv(), if !state.all_closed() => match signal {
                Some((port, signal)) => {
                    let Some(input) = state.inputs.get_mut(port) else {
                        continue;
                    };
                    match signal {
                        Signal::Subscribed(subscription) => input.upstream.on_subscribe(subscription),
                        Signal::Next(element) => {
                            input.upstream.on_next();
                            if outbound.is_open() {
                                input.buffered = Some(element);
                            }
                        }
                        Signal::Completed => {
                            trace!(stage = %ctx.name(), port, "merge input completed");
                            input.upstream.close();
                        }
                        Signal::Failed(error) => {
                            trace!(stage = %ctx.name(), port, "merge input failed");
                            input.upstream.close();
                            state.cancel_all();
                            outbound.fail(error);
                        }
                    }
                }
                None => {
                    state.cancel_all();
                    outbound.fail(Error::AbruptTermination);
                }
            },
        }
    }

    inbound::release(&mut mailbox);
    debug!(stage = %ctx.name(), "merge stage stopped");
}
