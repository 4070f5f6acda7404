//! Runtime loop for terminal stages driven by a [`Consumer`].

use std::ops::ControlFlow;

use tracing::debug;

use crate::error::{Error, Result};
use crate::stage::inbound::{self, Inbound, Signal, SignalReceiver};
use crate::stage::processor::run_guarded;
use crate::stage::StageContext;
use crate::traits::Consumer;

pub(crate) async fn run_consumer<C: Consumer>(
    mut consumer: C,
    mut mailbox: SignalReceiver<C::Item>,
    ctx: StageContext,
) {
    debug!(stage = %ctx.name(), "consumer stage started");
    let mut upstream = Inbound::default();
    let batch = ctx.input_buffer();

    let outcome: Result<()> = loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown().cancelled() => break Err(Error::Shutdown),
            signal = mailbox.recv() => match signal {
                Some((_, Signal::Subscribed(subscription))) => {
                    upstream.on_subscribe(subscription);
                    match consumer.start().await {
                        ControlFlow::Continue(()) => upstream.request(batch),
                        ControlFlow::Break(()) => break Ok(()),
                    }
                }
                Some((_, Signal::Next(element))) => {
                    upstream.on_next();
                    match run_guarded(consumer.consume(element)).await {
                        Ok(ControlFlow::Continue(())) => {
                            // refill once half of the window has been consumed
                            if upstream.outstanding() <= batch / 2 {
                                upstream.request(batch - upstream.outstanding());
                            }
                        }
                        Ok(ControlFlow::Break(())) => break Ok(()),
                        Err(error) => break Err(error),
                    }
                }
                Some((_, Signal::Completed)) => {
                    upstream.close();
                    break Ok(());
                }
                Some((_, Signal::Failed(error))) => {
                    upstream.close();
                    break Err(error);
                }
                None => break Err(Error::AbruptTermination),
            },
        }
    };

    upstream.cancel();
    inbound::release(&mut mailbox);
    debug!(stage = %ctx.name(), ok = outcome.is_ok(), "consumer stage stopped");
    consumer.finish(outcome).await;
}
