//! Completing a source from outside the graph
//!
//! Run with: cargo run --example maybe

use std::time::Duration;

use flowweld::prelude::*;

/// Example 1: Resolve with a value from another task
async fn value_example(m: &Materializer) -> Result<()> {
    println!("=== Maybe with a Value ===");

    let (handle, done) = Source::maybe()
        .map(|reading: f64| reading * 1.8 + 32.0)
        .to_mat(Sink::seq(), Keep::both)
        .run(m)?;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.complete_with(21.5);
    });
    println!("Fahrenheit: {:?}", done.await?);

    println!();
    Ok(())
}

/// Example 2: Resolve without a value
async fn empty_example(m: &Materializer) -> Result<()> {
    println!("=== Maybe without a Value ===");

    let (handle, done) = Source::<String>::maybe()
        .to_mat(Sink::first(), Keep::both)
        .run(m)?;
    handle.complete();
    println!("First element: {:?}", done.await);
    println!("Resolved as: {:?}", handle.outcome().await);

    println!();
    Ok(())
}

/// Example 3: Downstream cancels first
async fn cancelled_example(m: &Materializer) -> Result<()> {
    println!("=== Cancelled before Resolution ===");

    let handle = Source::<u32>::maybe().to(Sink::cancelled()).run(m)?;
    println!("Resolved as: {:?}", handle.outcome().await);
    println!("Late value accepted: {}", handle.complete_with(7));

    println!();
    Ok(())
}

/// Example 4: A panicking step is contained and reported downstream
async fn supervisor_example() -> Result<()> {
    println!("=== Supervision ===");

    let (m, mut failures) = Materializer::new(MaterializerConfig::default())?.with_supervisor();
    let done = Source::unfold(0u32, |n| {
        if n == 3 {
            panic!("sensor driver crashed");
        }
        Some((n + 1, n))
    })
    .run_with(Sink::seq(), &m)?;

    println!("Outcome: {:?}", done.await);
    match tokio::time::timeout(Duration::from_millis(100), failures.recv()).await {
        Ok(Some(failure)) => println!("Supervisor saw {} fail: {}", failure.stage, failure.error),
        _ => println!("Supervisor saw nothing; the panic never left its stage"),
    }

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("flowweld Maybe Examples\n");

    let m = Materializer::new(MaterializerConfig::default())?;

    value_example(&m).await?;
    empty_example(&m).await?;
    cancelled_example(&m).await?;
    supervisor_example().await?;

    println!("All maybe examples completed successfully!");
    Ok(())
}
