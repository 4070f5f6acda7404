//! Basic usage examples for flowweld
//!
//! Run with: cargo run --example basic

use flowweld::prelude::*;
use flowweld::testing::SubscriberProbe;

/// Example 1: Single element
async fn single_example(m: &Materializer) -> Result<()> {
    println!("=== Single ===");

    let items = Source::single("hello").run_with(Sink::seq(), m)?.await?;
    println!("Got: {:?}", items);

    println!();
    Ok(())
}

/// Example 2: Fibonacci numbers from a state
async fn unfold_example(m: &Materializer) -> Result<()> {
    println!("=== Unfold ===");

    let fib = Source::unfold((0u64, 1u64), |(a, b)| {
        if a > 1000 {
            None
        } else {
            Some(((b, a + b), a))
        }
    });
    let numbers = fib.run_with(Sink::seq(), m)?.await?;
    println!("Fibonacci up to 1000: {:?}", numbers);

    println!();
    Ok(())
}

/// Example 3: Transform and filter
async fn transform_filter_example(m: &Materializer) -> Result<()> {
    println!("=== Transform and Filter ===");

    let done = Source::from_iterator(|| 1..21)
        .filter(|x| x % 3 == 0)
        .map(|x| x * x)
        .run_with(Sink::for_each(|x| println!("Square: {}", x)), m)?;
    done.await?;

    println!();
    Ok(())
}

/// Example 4: Bounded slices of an infinite source
async fn batching_example(m: &Materializer) -> Result<()> {
    println!("=== Repeat, Grouped, Take ===");

    let batches = Source::repeat(42)
        .grouped(4)
        .take(3)
        .run_with(Sink::seq(), m)?
        .await?;
    for batch in batches {
        println!("Batch: {:?}", batch);
    }

    println!();
    Ok(())
}

/// Example 5: Driving demand by hand
async fn demand_example(m: &Materializer) -> Result<()> {
    println!("=== Demand-driven Signaling ===");

    let publisher = Source::from_iterator(|| 1..=20)
        .to_mat(Sink::as_publisher(), Keep::right)
        .run(m)?;
    let (subscriber, mut probe) = SubscriberProbe::pair();
    publisher.subscribe(Box::new(subscriber));
    probe.expect_subscription().await?;

    println!("Requesting 5 items:");
    probe.request(5)?;
    for _ in 0..5 {
        println!("Got: {}", probe.expect_next().await?);
    }

    println!("Requesting 3 more items:");
    probe.request(3)?;
    for _ in 0..3 {
        println!("Got: {}", probe.expect_next().await?);
    }

    println!("Cancelling");
    probe.cancel()?;

    println!();
    Ok(())
}

/// Example 6: Failures reach the completion
async fn failure_example(m: &Materializer) -> Result<()> {
    println!("=== Failure ===");

    let outcome = Source::<u32>::failed(Error::custom("disk on fire"))
        .run_with(Sink::seq(), m)?
        .await;
    println!("Outcome: {:?}", outcome);

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("flowweld Basic Usage Examples\n");

    let m = Materializer::new(MaterializerConfig::default())?;

    single_example(&m).await?;
    unfold_example(&m).await?;
    transform_filter_example(&m).await?;
    batching_example(&m).await?;
    demand_example(&m).await?;
    failure_example(&m).await?;

    m.shutdown();
    println!("All basic examples completed successfully!");
    Ok(())
}
