use std::time::Duration;

use microbatch_api::StreamingContext;
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::graph::InputQueue;

fn main() -> anyhow::Result<()> {
    let ctx = StreamingContext::new(StreamingConfig::new("windowing", Duration::from_secs(1)))?;

    // (user, clicks) arriving one batch per second.
    let queue = InputQueue::new();
    for batch in [
        vec![("u1", 1), ("u2", 3)],
        vec![("u1", 2)],
        vec![("u2", 1), ("u1", 5)],
        vec![],
        vec![("u3", 4)],
    ] {
        let rows: Vec<(String, i64)> = batch
            .into_iter()
            .map(|(user, clicks)| (user.to_string(), clicks))
            .collect();
        queue.push(Dataset::parallelize(rows, 2))?;
    }
    let clicks = ctx.queue_stream(queue, true);

    // Three-second windows every second, advanced by subtracting the batch
    // that left and adding the one that entered.
    clicks
        .reduce_by_key_and_window_inv(
            |a, b| a + b,
            |a, b| a - b,
            Duration::from_secs(3),
            None,
            None,
            Some(std::sync::Arc::new(|(_, n): &(String, i64)| *n > 0)),
        )?
        .pprint(10);

    // Same window, recomputed each time, emitted every two seconds.
    clicks
        .map(|(_, n): &(String, i64)| *n)
        .reduce_by_window(|a, b| a + b, Duration::from_secs(3), Some(Duration::from_secs(2)))?
        .pprint(1);

    print!("{}", ctx.explain());
    ctx.run_batches(6)?;
    Ok(())
}
