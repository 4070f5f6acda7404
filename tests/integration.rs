//! Integration tests for materialized stream graphs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flowweld::prelude::*;
use flowweld::testing::SubscriberProbe;
use tokio_test::{assert_err, assert_ok};

fn materializer() -> Materializer {
    Materializer::new(MaterializerConfig::default().name_prefix("test"))
        .expect("tests run inside a tokio runtime")
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

#[derive(Debug, thiserror::Error)]
#[error("passed the cutoff at {0}")]
struct Cutoff(u64);

fn fibonacci(cutoff: u64) -> impl Fn((u64, u64)) -> Option<((u64, u64), u64)> + Send + Sync {
    move |(a, b)| if a > cutoff { None } else { Some(((b, a + b), a)) }
}

const FIB_TO_100: [u64; 12] = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

#[tokio::test]
async fn test_single_emits_once_then_completes() -> Result<()> {
    let m = materializer();
    let mut probe = Source::single("v").run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    assert_eq!(probe.request_next().await?, "v");
    probe.expect_complete().await?;
    Ok(())
}

#[tokio::test]
async fn test_single_rejects_a_second_subscriber() -> Result<()> {
    let m = materializer();
    let publisher = Source::single(7).to_mat(Sink::as_publisher(), Keep::right).run(&m)?;

    let (subscriber, mut first) = SubscriberProbe::pair();
    publisher.subscribe(Box::new(subscriber));
    assert_eq!(first.request_next().await?, 7);
    first.expect_complete().await?;

    let (subscriber, mut second) = SubscriberProbe::<i32>::pair();
    publisher.subscribe(Box::new(subscriber));
    assert!(matches!(second.expect_error().await?, Error::AlreadySubscribed));
    Ok(())
}

#[tokio::test]
async fn test_empty_completes_before_any_request() -> Result<()> {
    let m = materializer();
    let mut probe = Source::<u32>::empty().run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    probe.expect_complete().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_fails_before_any_request() -> Result<()> {
    let m = materializer();
    let publisher = Source::<u32>::failed(Error::custom("boom"))
        .to_mat(Sink::as_publisher(), Keep::right)
        .run(&m)?;

    let (subscriber, mut first) = SubscriberProbe::pair();
    publisher.subscribe(Box::new(subscriber));
    let error = first.expect_error().await?;
    assert!(matches!(error, Error::Custom(ref message) if message == "boom"));

    let (subscriber, mut second) = SubscriberProbe::pair();
    publisher.subscribe(Box::new(subscriber));
    assert!(matches!(second.expect_error().await?, Error::AlreadySubscribed));
    Ok(())
}

#[tokio::test]
async fn test_maybe_cancelled_before_resolution_resolves_empty() -> Result<()> {
    let m = materializer();
    let (handle, mut probe) = Source::<u32>::maybe()
        .to_mat(Sink::probe(), Keep::both)
        .run(&m)?;

    probe.expect_subscription().await?;
    probe.request(1)?;
    probe.cancel()?;

    assert_eq!(within(handle.outcome()).await, MaybeOutcome::Empty);
    assert!(!handle.complete_with(1));
    probe.expect_no_event(Duration::from_millis(50)).await?;
    Ok(())
}

#[tokio::test]
async fn test_maybe_cancelled_without_demand_resolves_empty() -> Result<()> {
    let m = materializer();
    let handle = Source::<u32>::maybe().to(Sink::cancelled()).run(&m)?;

    assert_eq!(within(handle.outcome()).await, MaybeOutcome::Empty);
    assert!(handle.is_resolved());
    Ok(())
}

#[tokio::test]
async fn test_maybe_with_value_emits_it_then_completes() -> Result<()> {
    let m = materializer();
    let (handle, done) = Source::maybe()
        .to_mat(Sink::seq(), Keep::both)
        .run(&m)?;

    assert!(handle.complete_with(9));
    assert!(!handle.complete());
    assert_eq!(within(done).await?, vec![9]);
    assert_eq!(handle.outcome().await, MaybeOutcome::Value);
    Ok(())
}

#[tokio::test]
async fn test_maybe_without_value_completes_empty() -> Result<()> {
    let m = materializer();
    let (handle, mut probe) = Source::<u32>::maybe()
        .to_mat(Sink::probe(), Keep::both)
        .run(&m)?;

    probe.expect_subscription().await?;
    assert!(handle.complete());
    assert!(!handle.complete_with(3));
    probe.expect_complete().await?;
    assert_eq!(handle.outcome().await, MaybeOutcome::Empty);
    Ok(())
}

#[tokio::test]
async fn test_maybe_refuses_values_after_its_stage_failed() -> Result<()> {
    let m = materializer();
    let (handle, mut probe) = Source::<u32>::maybe()
        .to_mat(Sink::probe(), Keep::both)
        .run(&m)?;

    probe.expect_subscription().await?;
    probe.request(0)?;
    assert!(matches!(probe.expect_error().await?, Error::InvalidDemand(0)));

    assert_eq!(within(handle.outcome()).await, MaybeOutcome::Failed);
    assert!(!handle.complete_with(5));
    assert!(matches!(handle.failure(), Some(Error::InvalidDemand(0))));
    Ok(())
}

#[tokio::test]
async fn test_maybe_value_never_delivered_is_not_reported() -> Result<()> {
    let m = materializer();
    let (handle, mut probe) = Source::<u32>::maybe()
        .to_mat(Sink::probe(), Keep::both)
        .run(&m)?;

    probe.expect_subscription().await?;
    assert!(handle.complete_with(4));
    m.shutdown();
    assert!(matches!(probe.expect_error().await?, Error::Shutdown));

    assert_eq!(within(handle.outcome()).await, MaybeOutcome::Failed);
    assert!(matches!(handle.failure(), Some(Error::Shutdown)));
    Ok(())
}

#[tokio::test]
async fn test_repeat_grouped_then_taken_once() -> Result<()> {
    let m = materializer();
    for size in [1usize, 3, 17, 100] {
        let batches = Source::repeat(42)
            .grouped(size)
            .take(1)
            .run_with(Sink::seq(), &m)?;
        assert_eq!(within(batches).await?, vec![vec![42; size]]);
    }
    Ok(())
}

#[tokio::test]
async fn test_repeat_honours_demand() -> Result<()> {
    let m = materializer();
    let mut probe = Source::repeat(1u8).run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    probe.request(3)?;
    for _ in 0..3 {
        assert_eq!(probe.expect_next().await?, 1);
    }
    probe.expect_no_event(Duration::from_millis(50)).await?;
    probe.cancel()?;
    Ok(())
}

#[tokio::test]
async fn test_unfold_fibonacci() -> Result<()> {
    let m = materializer();
    let numbers = Source::unfold((0u64, 1u64), fibonacci(100)).run_with(Sink::seq(), &m)?;
    assert_eq!(within(numbers).await?, FIB_TO_100.to_vec());
    Ok(())
}

#[tokio::test]
async fn test_unfold_failure_keeps_its_cause() -> Result<()> {
    let m = materializer();
    let step = |(a, b): (u64, u64)| {
        if a > 100 {
            Err(Error::generation(Cutoff(a)))
        } else {
            Ok(Some(((b, a + b), a)))
        }
    };
    let outcome = within(Source::try_unfold((0u64, 1u64), step).run_with(Sink::seq(), &m)?).await;

    let error = assert_err!(outcome);
    let cause = error.cause().expect("generation failures carry a cause");
    let cutoff = cause.downcast_ref::<Cutoff>().expect("the raised error");
    assert_eq!(cutoff.0, 144);
    Ok(())
}

#[tokio::test]
async fn test_unfold_async_matches_unfold() -> Result<()> {
    let m = materializer();
    let step = Arc::new(fibonacci(100));
    let numbers = Source::unfold_async((0u64, 1u64), move |state| {
        let step = step.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            (*step)(state)
        }
    })
    .run_with(Sink::seq(), &m)?;

    let sync = Source::unfold((0u64, 1u64), fibonacci(100)).run_with(Sink::seq(), &m)?;
    assert_eq!(within(numbers).await?, within(sync).await?);
    Ok(())
}

#[tokio::test]
async fn test_unfold_async_never_overlaps_steps() -> Result<()> {
    let m = materializer();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (flight, seen) = (in_flight.clone(), overlaps.clone());

    let numbers = Source::unfold_async(0u32, move |n| {
        let (flight, seen) = (flight.clone(), seen.clone());
        async move {
            if flight.fetch_add(1, Ordering::SeqCst) > 0 {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            flight.fetch_sub(1, Ordering::SeqCst);
            (n < 20).then_some((n + 1, n))
        }
    })
    .run_with(Sink::seq(), &m)?;

    assert_eq!(within(numbers).await?, (0..20).collect::<Vec<_>>());
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_unbounded_unfold_with_take() -> Result<()> {
    let m = materializer();
    let numbers = Source::unfold(0u64, |n| Some((n + 1, n)))
        .take(7)
        .run_with(Sink::seq(), &m)?;
    assert_eq!(within(numbers).await?, (0..7).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_panicking_step_fails_the_stream() -> Result<()> {
    let m = materializer();
    let numbers = Source::unfold(0u32, |n| {
        if n == 2 {
            panic!("step exploded");
        }
        Some((n + 1, n))
    })
    .run_with(Sink::seq(), &m)?;

    let error = assert_err!(within(numbers).await);
    assert!(matches!(error, Error::Panicked(ref message) if message == "step exploded"));
    Ok(())
}

#[tokio::test]
async fn test_from_iterator_grouped_reproduces_the_sequence() -> Result<()> {
    let m = materializer();
    let items = vec!["a", "b", "c", "d", "e"];
    let expected = items.clone();
    let batches = Source::from_iterator(move || items.clone())
        .grouped(expected.len())
        .run_with(Sink::seq(), &m)?;
    assert_eq!(within(batches).await?, vec![expected]);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("cursor unavailable")]
struct CursorGone;

#[tokio::test]
async fn test_try_from_iterator_fails_on_cursor_error() -> Result<()> {
    let m = materializer();
    let items = Source::try_from_iterator(|| vec![Ok(1), Ok(2), Err(CursorGone), Ok(3)])
        .run_with(Sink::seq(), &m)?;
    let error = assert_err!(within(items).await);
    assert!(error.cause().is_some_and(|cause| cause.is::<CursorGone>()));
    Ok(())
}

#[tokio::test]
async fn test_from_stream() -> Result<()> {
    let m = materializer();
    let items = Source::from_stream(|| futures::stream::iter(1..=4))
        .map(|n| n * 10)
        .run_with(Sink::seq(), &m)?;
    assert_eq!(within(items).await?, vec![10, 20, 30, 40]);
    Ok(())
}

#[tokio::test]
async fn test_combine_merges_every_single() -> Result<()> {
    let m = materializer();
    let rest = (3..=6).map(Source::single).collect();
    let merged = Source::combine(Source::single(1), Source::single(2), rest, Merge::new)
        .run_with(Sink::seq(), &m)?;

    let mut values = within(merged).await?;
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
    Ok(())
}

#[tokio::test]
async fn test_combine_fails_when_any_input_fails() -> Result<()> {
    let m = materializer();
    let merged = Source::combine(
        Source::repeat(1),
        Source::failed(Error::custom("input failed")),
        vec![Source::single(3)],
        Merge::new,
    )
    .run_with(Sink::seq(), &m)?;

    let error = assert_err!(within(merged).await);
    assert!(matches!(error, Error::Custom(ref message) if message == "input failed"));
    Ok(())
}

#[tokio::test]
async fn test_merge_failure_cancels_the_other_inputs() -> Result<()> {
    let m = materializer();
    let (handle, merged) = Source::<u32>::maybe()
        .merge(Source::failed(Error::custom("other side")))
        .to_mat(Sink::seq(), Keep::both)
        .run(&m)?;

    assert_err!(within(merged).await);
    assert_eq!(within(handle.outcome()).await, MaybeOutcome::Empty);
    Ok(())
}

#[tokio::test]
async fn test_merge_is_fair_to_infinite_inputs() -> Result<()> {
    let m = materializer();
    let values = Source::repeat("left")
        .merge(Source::repeat("right"))
        .take(40)
        .run_with(Sink::seq(), &m)?;

    let values = within(values).await?;
    let left = values.iter().filter(|v| **v == "left").count();
    assert_eq!(values.len(), 40);
    assert!(left > 0 && left < 40, "one side starved: {left} of 40");
    Ok(())
}

#[tokio::test]
async fn test_merge_forwards_no_more_than_requested() -> Result<()> {
    let m = materializer();
    let mut probe = Source::combine(
        Source::repeat(1),
        Source::repeat(2),
        vec![Source::repeat(3)],
        Merge::new,
    )
    .run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    probe.request(2)?;
    probe.expect_next().await?;
    probe.expect_next().await?;
    probe.expect_no_event(Duration::from_millis(50)).await?;
    probe.cancel()?;
    Ok(())
}

#[tokio::test]
async fn test_runs_are_independent() -> Result<()> {
    let m = materializer();
    let repeat = Source::repeat(42);
    let short = repeat.clone().take(3).run_with(Sink::seq(), &m)?;
    let long = repeat.take(5).run_with(Sink::seq(), &m)?;
    assert_eq!(within(short).await?, vec![42; 3]);
    assert_eq!(within(long).await?, vec![42; 5]);

    let counter = Source::unfold(0u32, |n| Some((n + 1, n)))
        .take(3)
        .to_mat(Sink::seq(), Keep::right);
    assert_eq!(within(counter.run(&m)?).await?, vec![0, 1, 2]);
    assert_eq!(within(counter.run(&m)?).await?, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_graph_builder_fan_in() -> Result<()> {
    let m = materializer();
    let (mut builder, sink) = GraphBuilder::with_sink(Sink::seq());
    let evens = builder.add_source(Source::from_iterator(|| (0..10).step_by(2)));
    let odds = builder.add_source(Source::from_iterator(|| (1..10).step_by(2)));
    let (inputs, merged) = builder.add_fan_in(Merge::new(2));
    let (double_in, double_out) = builder.add_flow(Flow::map(|n: i32| n * 2));

    builder.connect(evens, inputs[0])?;
    builder.connect(odds, inputs[1])?;
    builder.connect(merged, double_in)?;
    builder.connect(double_out, sink)?;

    let mut values = within(builder.build_closed().run(&m)?).await?;
    values.sort_unstable();
    assert_eq!(values, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_graph_builder_source() -> Result<()> {
    let m = materializer();
    let mut builder = GraphBuilder::new();
    let a = builder.add_source(Source::single(1));
    let b = builder.add_source(Source::single(2));
    let (inputs, merged) = builder.add_fan_in(Merge::new(2));
    builder.connect(a, inputs[0])?;
    builder.connect(b, inputs[1])?;
    let source = builder.build_source(merged)?;

    let mut values = within(source.run_with(Sink::seq(), &m)?).await?;
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_unconnected_ports_fail_materialization() {
    let m = materializer();
    let mut builder = GraphBuilder::new();
    let out = builder.add_source(Source::single(1));
    let sink = builder.add_sink(Sink::<i32, _>::seq());
    let left_open = builder.add_sink(Sink::<i32, _>::ignore());
    assert_ok!(builder.connect(out, sink));
    assert!(matches!(
        builder.connect(out, left_open),
        Err(Error::PortAlreadyConnected)
    ));

    let result = builder.build_closed().run(&m);
    assert!(matches!(result, Err(Error::UnconnectedPort { .. })));
}

#[tokio::test]
async fn test_zero_demand_is_reported_to_the_subscriber() -> Result<()> {
    let m = materializer();
    let mut probe = Source::repeat(1).run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    probe.request(0)?;
    assert!(matches!(probe.expect_error().await?, Error::InvalidDemand(0)));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_fails_running_stages() -> Result<()> {
    let m = materializer();
    let mut probe = Source::repeat(1).run_with(Sink::probe(), &m)?;

    probe.expect_subscription().await?;
    m.shutdown();
    assert!(matches!(probe.expect_error().await?, Error::Shutdown));
    assert!(matches!(
        Source::single(1).run_with(Sink::seq(), &m),
        Err(Error::Shutdown)
    ));
    Ok(())
}

struct PanicsOnNext {
    subscription: Option<Subscription>,
}

impl Subscriber<u32> for PanicsOnNext {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(1);
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, _element: u32) {
        panic!("subscriber bug");
    }

    fn on_error(&mut self, _error: Error) {}

    fn on_complete(&mut self) {}
}

#[tokio::test]
async fn test_supervisor_receives_failures_outside_stage_logic() -> Result<()> {
    let (m, mut failures) = materializer().with_supervisor();
    let publisher = Source::single(1u32)
        .to_mat(Sink::as_publisher(), Keep::right)
        .run(&m)?;

    publisher.subscribe(Box::new(PanicsOnNext { subscription: None }));

    let failure = within(failures.recv()).await.expect("a stage failure is reported");
    assert_eq!(failure.stage, publisher.stage_name());
    assert!(matches!(failure.error, Error::Panicked(ref message) if message == "subscriber bug"));
    Ok(())
}

#[tokio::test]
async fn test_sinks() -> Result<()> {
    let m = materializer();

    let first = Source::from_iterator(|| 5..).run_with(Sink::first(), &m)?;
    assert_eq!(within(first).await?, 5);

    let nothing = Source::<u8>::empty().run_with(Sink::first(), &m)?;
    assert!(matches!(within(nothing).await, Err(Error::EmptyStream)));

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let done = Source::from_iterator(|| 0..25)
        .filter(|n| n % 5 == 0)
        .run_with(
            Sink::for_each(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            &m,
        )?;
    within(done).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 5);

    let ignored = Source::repeat(0).take(100).run_with(Sink::ignore(), &m)?;
    assert_ok!(within(ignored).await);
    Ok(())
}

#[tokio::test]
async fn test_materialized_values_compose() -> Result<()> {
    let m = materializer();
    let flow = Flow::map(|n: u32| n + 1).map_materialized_value(|()| "flow");
    let (label, done) = Source::single(1u32)
        .map_materialized_value(|()| "source")
        .via_mat(flow, |source, flow| format!("{source}+{flow}"))
        .to_mat(Sink::seq(), Keep::both)
        .run(&m)?;

    assert_eq!(label, "source+flow");
    assert_eq!(within(done).await?, vec![2]);
    Ok(())
}
