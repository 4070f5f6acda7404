//! Runtime loop for one-in/one-out stages driven by a [`Processor`].

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::stage::inbound::{self, Inbound, Signal, SignalReceiver};
use crate::stage::outbound::Outbound;
use crate::stage::StageContext;
use crate::traits::Processor;

pub(crate) async fn run_processor<P: Processor>(
    mut processor: P,
    mut mailbox: SignalReceiver<P::Input>,
    mut outbound: Outbound<P::Output>,
    ctx: StageContext,
) {
    debug!(stage = %ctx.name(), "processor stage started");
    let mut upstream = Inbound::default();
    let mut pending: VecDeque<P::Output> = VecDeque::new();
    // set once upstream is done and `finish` has been flushed into `pending`
    let mut drained = false;
    let mut emitted_this_turn = 0usize;

    loop {
        while outbound.can_push() {
            let Some(element) = pending.pop_front() else {
                break;
            };
            outbound.push(element);
            emitted_this_turn += 1;
        }
        if emitted_this_turn >= ctx.max_elements_per_turn() {
            emitted_this_turn = 0;
            tokio::task::yield_now().await;
        }

        if outbound.is_open() && drained && pending.is_empty() {
            outbound.complete();
        }
        if !outbound.is_open() {
            upstream.cancel();
        }
        if outbound.is_finished() {
            break;
        }

        if outbound.is_open() && !drained && processor.is_exhausted() {
            upstream.cancel();
            flush(&mut processor, &mut pending, &mut outbound).await;
            drained = true;
            continue;
        }

        if outbound.can_push()
            && pending.is_empty()
            && !drained
            && upstream.outstanding() == 0
        {
            upstream.request(ctx.input_buffer());
        }

        tokio::select! {
            biased;
            _ = ctx.shutdown().cancelled(), if outbound.is_open() => {
                outbound.fail(Error::Shutdown);
                upstream.cancel();
                break;
            }
            event = outbound.next_event() => outbound.handle(event),
            signal = mailbox.recv(), if !upstream.is_closed() => match signal {
                Some((_, Signal::Subscribed(subscription))) => upstream.on_subscribe(subscription),
                Some((_, Signal::Next(element))) => {
                    upstream.on_next();
                    if drained || !outbound.is_open() {
                        continue;
                    }
                    match run_guarded(processor.process(element)).await {
                        Ok(outputs) => pending.extend(outputs),
                        Err(error) => {
                            upstream.cancel();
                            outbound.fail(error);
                        }
                    }
                }
                Some((_, Signal::Completed)) => {
                    upstream.close();
                    if !drained {
                        flush(&mut processor, &mut pending, &mut outbound).await;
                        drained = true;
                    }
                }
                Some((_, Signal::Failed(error))) => {
                    upstream.close();
                    drained = true;
                    outbound.fail(error);
                }
                None => {
                    upstream.close();
                    outbound.fail(Error::AbruptTermination);
                }
            },
        }
    }

    inbound::release(&mut mailbox);
    debug!(stage = %ctx.name(), "processor stage stopped");
}

async fn flush<P: Processor>(
    processor: &mut P,
    pending: &mut VecDeque<P::Output>,
    outbound: &mut Outbound<P::Output>,
) {
    match run_guarded(processor.finish()).await {
        Ok(outputs) => pending.extend(outputs),
        Err(error) => outbound.fail(error),
    }
}

/// Await user logic, turning a panic into an error.
pub(crate) async fn run_guarded<F, T>(logic: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match AssertUnwindSafe(logic).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::panicked(panic)),
    }
}
