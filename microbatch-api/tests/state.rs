use std::sync::{Arc, Mutex};
use std::time::Duration;

use microbatch_api::{DStream, StreamingContext};
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::graph::InputQueue;
use microbatch_core::types::StreamData;

type Captured<T> = Arc<Mutex<Vec<(i64, Vec<T>)>>>;

fn context() -> StreamingContext {
    StreamingContext::new(StreamingConfig::new("state", Duration::from_secs(1))).unwrap()
}

fn queue<T>(batches: Vec<Vec<T>>) -> InputQueue<T> {
    InputQueue::from_batches(batches.into_iter().map(|b| Dataset::parallelize(b, 2)))
}

fn capture<T: StreamData + Ord>(stream: &DStream<T>) -> Captured<T> {
    let out: Captured<T> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&out);
    stream.foreach_batch_with_time(move |time, data| {
        let mut rows = data.collect();
        rows.sort();
        sink.lock().unwrap().push((time.millis(), rows));
        Ok(())
    });
    out
}

fn kv(k: &str, v: i64) -> (String, i64) {
    (k.to_string(), v)
}

fn running_sum(values: &[i64], state: Option<&i64>) -> Option<i64> {
    Some(state.copied().unwrap_or(0) + values.iter().sum::<i64>())
}

#[test]
fn test_running_sum_carries_across_batches() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![vec![kv("a", 1)], vec![kv("a", 2), kv("b", 5)], vec![]]),
        true,
    );
    let out = capture(&input.update_state_by_key(running_sum, None));

    ctx.run_batches(3).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![kv("a", 1)]),
            (2000, vec![kv("a", 3), kv("b", 5)]),
            // Keys with state but no new values are still updated.
            (3000, vec![kv("a", 3), kv("b", 5)]),
        ]
    );
}

#[test]
fn test_returning_none_removes_the_key() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![
            vec![kv("a", 1), kv("b", 1)],
            vec![kv("a", -1)],
            vec![kv("a", 4)],
        ]),
        true,
    );
    // A zero total is a tombstone.
    let state = input.update_state_by_key(
        |values: &[i64], state: Option<&i64>| {
            let total = state.copied().unwrap_or(0) + values.iter().sum::<i64>();
            (total != 0).then_some(total)
        },
        Some(3),
    );
    let out = capture(&state);

    ctx.run_batches(3).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![kv("a", 1), kv("b", 1)]),
            (2000, vec![kv("b", 1)]),
            (3000, vec![kv("a", 4), kv("b", 1)]),
        ]
    );
}

#[test]
fn test_initial_state_seeds_the_table() {
    let ctx = context();
    let input = ctx.queue_stream(queue(vec![vec![kv("a", 1)], vec![kv("c", 1)]]), true);
    let initial = Dataset::parallelize(vec![kv("a", 100), kv("b", 7)], 2);
    let out = capture(&input.update_state_by_key_with_initial(running_sum, None, &initial));

    ctx.run_batches(2).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![kv("a", 101), kv("b", 7)]),
            (2000, vec![kv("a", 101), kv("b", 7), kv("c", 1)]),
        ]
    );
}

#[test]
fn test_running_word_count() {
    let ctx = context();
    let lines = ctx.queue_stream(
        queue(vec![
            vec!["to be".to_string()],
            vec!["or not to be".to_string()],
        ]),
        true,
    );
    let totals = lines
        .flat_map(|line: &String| {
            line.split_whitespace()
                .map(|w| (w.to_string(), 1i64))
                .collect::<Vec<_>>()
        })
        .update_state_by_key(running_sum, Some(2));
    assert_eq!(totals.slide_ms(), 1000);
    let out = capture(&totals);

    ctx.run_batches(2).unwrap();
    assert_eq!(
        out.lock().unwrap()[1],
        (
            2000,
            vec![kv("be", 2), kv("not", 1), kv("or", 1), kv("to", 2)]
        )
    );
}

#[test]
fn test_state_values_see_arrival_order() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![vec![kv("k", 1), kv("k", 2)], vec![kv("k", 3)]]),
        true,
    );
    let history = input.update_state_by_key(
        |values: &[i64], state: Option<&Vec<i64>>| {
            let mut all = state.cloned().unwrap_or_default();
            all.extend_from_slice(values);
            Some(all)
        },
        None,
    );
    let out = capture(&history);

    ctx.run_batches(2).unwrap();
    assert_eq!(
        out.lock().unwrap()[1],
        (2000, vec![("k".to_string(), vec![1, 2, 3])])
    );
}
