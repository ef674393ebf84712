use std::sync::{Arc, Mutex};
use std::time::Duration;

use microbatch_api::StreamingContext;
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::graph::InputQueue;

fn main() -> anyhow::Result<()> {
    let ctx = StreamingContext::new(StreamingConfig::new("wordcount", Duration::from_secs(1)))?;

    let batches = [
        vec!["hello world".to_string(), "hello microbatch".to_string()],
        vec!["world of streams".to_string()],
        vec!["hello again".to_string()],
    ];
    let queue = InputQueue::new();
    for lines in batches {
        queue.push(Dataset::parallelize(lines, 2))?;
    }

    let words = ctx
        .queue_stream(queue, true)
        .flat_map(|line: &String| {
            line.split_whitespace()
                .map(|s| (s.to_string(), 1i64))
                .collect::<Vec<_>>()
        });
    let per_batch = words.reduce_by_key(|a, b| a + b, None);
    let totals = words.update_state_by_key(
        |counts: &[i64], total: Option<&i64>| {
            Some(total.copied().unwrap_or(0) + counts.iter().sum::<i64>())
        },
        None,
    );

    let results: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for (label, stream) in [("batch", per_batch), ("total", totals)] {
        let sink = Arc::clone(&results);
        stream.foreach_batch_with_time(move |time, data| {
            // Sort by word for deterministic output.
            let mut rows = data.collect();
            rows.sort();
            let line = rows
                .iter()
                .map(|(word, count)| format!("{word}={count}"))
                .collect::<Vec<_>>()
                .join(" ");
            sink.lock()
                .map_err(|_| anyhow::anyhow!("results lock poisoned"))?
                .push(format!("[{time}] {label}: {line}"));
            Ok(())
        });
    }

    ctx.run_batches(3)?;
    let results = results
        .lock()
        .map_err(|_| anyhow::anyhow!("results lock poisoned"))?;
    for line in results.iter() {
        println!("{line}");
    }

    Ok(())
}
