//! Fan-in examples: combining several sources into one
//!
//! Run with: cargo run --example merge

use std::time::Duration;

use flowweld::prelude::*;

/// Example 1: Combine a handful of sources
async fn combine_example(m: &Materializer) -> Result<()> {
    println!("=== Combine ===");

    let letters = Source::from_iterator(|| ["a", "b", "c"]);
    let numbers = Source::from_iterator(|| ["1", "2", "3"]);
    let symbols = Source::from_iterator(|| ["!", "?"]);
    let merged = Source::combine(letters, numbers, vec![symbols], Merge::new)
        .run_with(Sink::seq(), m)?
        .await?;
    println!("Merged: {:?}", merged);

    println!();
    Ok(())
}

/// Example 2: Merging infinite inputs stays fair
async fn fairness_example(m: &Materializer) -> Result<()> {
    println!("=== Fair Merge ===");

    let ticks = Source::repeat("tick")
        .merge(Source::repeat("tock"))
        .take(10)
        .run_with(Sink::seq(), m)?
        .await?;
    println!("Interleaved: {:?}", ticks);

    println!();
    Ok(())
}

/// Example 3: Slow and fast inputs
async fn async_inputs_example(m: &Materializer) -> Result<()> {
    println!("=== Slow and Fast Inputs ===");

    let slow = Source::unfold_async(0u32, |n| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        (n < 3).then_some((n + 1, format!("slow-{n}")))
    });
    let fast = Source::unfold(0u32, |n| (n < 6).then(|| (n + 1, format!("fast-{n}"))));

    let done = slow
        .merge(fast)
        .run_with(Sink::for_each(|item| println!("Received: {}", item)), m)?;
    done.await?;

    println!();
    Ok(())
}

/// Example 4: Wiring a graph by hand
async fn builder_example(m: &Materializer) -> Result<()> {
    println!("=== Graph Builder ===");

    let (mut builder, sink) = GraphBuilder::with_sink(Sink::seq());
    let evens = builder.add_source(Source::from_iterator(|| (0..10).step_by(2)));
    let odds = builder.add_source(Source::from_iterator(|| (1..10).step_by(2)));
    let (inputs, merged) = builder.add_fan_in(Merge::new(2));
    let (square_in, square_out) = builder.add_flow(Flow::map(|x: i32| x * x));

    builder.connect(evens, inputs[0])?;
    builder.connect(odds, inputs[1])?;
    builder.connect(merged, square_in)?;
    builder.connect(square_out, sink)?;

    let mut squares = builder.build_closed().run(m)?.await?;
    squares.sort_unstable();
    println!("Squares: {:?}", squares);

    println!();
    Ok(())
}

/// Example 5: One failing input fails the merge
async fn failure_example(m: &Materializer) -> Result<()> {
    println!("=== Failing Input ===");

    let outcome = Source::repeat(1)
        .merge(Source::failed(Error::custom("sensor offline")))
        .run_with(Sink::seq(), m)?
        .await;
    println!("Outcome: {:?}", outcome);

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("flowweld Merge Examples\n");

    let m = Materializer::new(MaterializerConfig::default().name_prefix("merge-demo"))?;

    combine_example(&m).await?;
    fairness_example(&m).await?;
    async_inputs_example(&m).await?;
    builder_example(&m).await?;
    failure_example(&m).await?;

    println!("All merge examples completed successfully!");
    Ok(())
}
