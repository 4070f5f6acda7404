//! Runtime loop for stages driven by a [`Producer`].

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, trace};

use crate::error::Error;
use crate::stage::outbound::Outbound;
use crate::stage::StageContext;
use crate::traits::{Producer, StopReason};

pub(crate) async fn run_producer<P: Producer>(
    mut producer: P,
    mut outbound: Outbound<P::Item>,
    ctx: StageContext,
) {
    debug!(stage = %ctx.name(), "producer stage started");
    let mut emitted_this_turn = 0usize;

    while !outbound.is_finished() {
        if !outbound.can_push() {
            // Nothing may be emitted: wait for a subscriber, for demand, or
            // for the producer to end the stream on its own.
            tokio::select! {
                biased;
                _ = ctx.shutdown().cancelled(), if outbound.is_open() => {
                    outbound.fail(Error::Shutdown);
                    break;
                }
                event = outbound.next_event() => outbound.handle(event),
                ended = AssertUnwindSafe(producer.await_termination()).catch_unwind(),
                    if outbound.is_open() && outbound.is_attached() =>
                {
                    match ended {
                        Ok(Ok(())) => outbound.complete(),
                        Ok(Err(error)) => outbound.fail(error),
                        Err(panic) => outbound.fail(Error::panicked(panic)),
                    }
                }
            }
            emitted_this_turn = 0;
            continue;
        }

        // One production opportunity. Signals from downstream are still
        // handled while it is pending; the pending step is never re-invoked.
        let produced = {
            let production = AssertUnwindSafe(producer.produce()).catch_unwind();
            tokio::pin!(production);
            loop {
                tokio::select! {
                    biased;
                    _ = ctx.shutdown().cancelled(), if outbound.is_open() => {
                        outbound.fail(Error::Shutdown);
                        break None;
                    }
                    event = outbound.next_event(), if outbound.is_open() => {
                        outbound.handle(event);
                        if !outbound.is_open() {
                            // the pending step is dropped, not awaited
                            break None;
                        }
                    }
                    result = &mut production => break Some(result),
                }
            }
        };

        let Some(produced) = produced else {
            break;
        };
        if !outbound.is_open() {
            trace!(stage = %ctx.name(), "discarding result produced after termination");
            continue;
        }

        match produced {
            Ok(Ok(Some(element))) => {
                outbound.push(element);
            }
            Ok(Ok(None)) => outbound.complete(),
            Ok(Err(error)) => outbound.fail(error),
            Err(panic) => outbound.fail(Error::panicked(panic)),
        }

        emitted_this_turn += 1;
        if emitted_this_turn >= ctx.max_elements_per_turn() {
            emitted_this_turn = 0;
            tokio::task::yield_now().await;
        }
    }

    if outbound.is_cancelled() || ctx.shutdown().is_cancelled() {
        ctx.cancellation().cancel();
    }
    let reason = outbound.stop_reason().unwrap_or(StopReason::Completed);
    trace!(stage = %ctx.name(), ?reason, "producer stopping");
    producer.on_stop(&reason);
    debug!(stage = %ctx.name(), "producer stage stopped");
}
