use std::sync::{Arc, Mutex};
use std::time::Duration;

use microbatch_api::{DStream, StreamingContext};
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::error::ConfigError;
use microbatch_core::graph::{InputQueue, Node};
use microbatch_core::types::{BatchTime, StreamData};

type Captured<T> = Arc<Mutex<Vec<(i64, Vec<T>)>>>;

fn context() -> StreamingContext {
    StreamingContext::new(StreamingConfig::new("windowing", Duration::from_secs(1))).unwrap()
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

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn kv(k: &str, v: i64) -> (String, i64) {
    (k.to_string(), v)
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn gen_batches(seed: u64, ticks: usize, num_keys: u64) -> Vec<Vec<(String, i64)>> {
    let mut state = seed;
    (0..ticks)
        .map(|_| {
            let n = (lcg_next(&mut state) % 5) as usize;
            (0..n)
                .map(|_| {
                    let key = format!("k{}", (lcg_next(&mut state) >> 33) % num_keys);
                    let value = ((lcg_next(&mut state) >> 33) % 9) as i64 + 1;
                    (key, value)
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_window_unions_batches() {
    let ctx = context();
    let input = ctx.queue_stream(queue(vec![vec![1i64, 2, 3], vec![4, 5], vec![6]]), true);
    let out = capture(&input.window(secs(2), None).unwrap());

    ctx.run_batches(3).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![1, 2, 3]),
            (2000, vec![1, 2, 3, 4, 5]),
            (3000, vec![4, 5, 6]),
        ]
    );
}

#[test]
fn test_window_with_slide_emits_on_its_own_grid() {
    let ctx = context();
    let input = ctx.queue_stream(queue(vec![vec![1i64], vec![2], vec![3], vec![4], vec![5]]), true);
    let windowed = input.window(secs(3), Some(secs(2))).unwrap();
    assert_eq!(windowed.slide_duration(), secs(2));
    let out = capture(&windowed);

    ctx.run_batches(5).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![(2000, vec![1, 2]), (4000, vec![2, 3, 4])]
    );
}

#[test]
fn test_window_durations_must_be_multiples() {
    let ctx = context();
    let input = ctx.queue_stream(queue::<i64>(vec![]), true);

    assert!(matches!(
        input.window(Duration::from_millis(2500), None),
        Err(ConfigError::WindowNotMultiple {
            window_ms: 2500,
            parent_slide_ms: 1000
        })
    ));
    assert!(matches!(
        input.window(secs(2), Some(Duration::from_millis(1500))),
        Err(ConfigError::SlideNotMultiple { .. })
    ));
    assert!(input.window(secs(4), Some(secs(2))).is_ok());

    let err = input
        .map(|x: &i64| (x.to_string(), *x))
        .reduce_by_key_and_window(|a, b| a + b, Duration::from_millis(1200), None, None)
        .err()
        .unwrap();
    assert!(err.to_string().contains("(1000 ms)"), "unexpected message: {err}");
}

#[test]
fn test_incremental_sum_scenario() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![vec![kv("k", 1)], vec![kv("k", 1)], vec![kv("k", 1)]]),
        true,
    );
    let sums = input
        .reduce_by_key_and_window_inv(|a, b| a + b, |a, b| a - b, secs(2), None, None, None)
        .unwrap();
    let out = capture(&sums);

    ctx.run_batches(3).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![kv("k", 1)]),
            (2000, vec![kv("k", 2)]),
            (3000, vec![kv("k", 2)]),
        ]
    );
}

#[test]
fn test_incremental_and_naive_paths_agree() {
    for (window, slide) in [(2, 1), (3, 1), (4, 2), (6, 2), (6, 3)] {
        let ctx = context();
        let input = ctx.queue_stream(queue(gen_batches(window * 31 + slide, 30, 5)), true);
        let naive = input
            .reduce_by_key_and_window(|a, b| a + b, secs(window), Some(secs(slide)), Some(3))
            .unwrap();
        let incremental = input
            .reduce_by_key_and_window_inv(
                |a, b| a + b,
                |a, b| a - b,
                secs(window),
                Some(secs(slide)),
                Some(2),
                Some(Arc::new(|(_, v): &(String, i64)| *v != 0)),
            )
            .unwrap();
        let naive_out = capture(&naive);
        let incremental_out = capture(&incremental);

        ctx.run_batches(30).unwrap();
        let naive_out = naive_out.lock().unwrap();
        assert_eq!(naive_out.len(), 30 / slide as usize);
        assert_eq!(
            *naive_out,
            *incremental_out.lock().unwrap(),
            "window={window} slide={slide}"
        );
    }
}

#[test]
fn test_reduce_and_count_by_window() {
    let ctx = context();
    let input = ctx.queue_stream(queue(vec![vec![1i64, 2], vec![3], vec![]]), true);
    let naive = capture(&input.reduce_by_window(|a, b| a + b, secs(2), None).unwrap());
    let inverse = capture(
        &input
            .reduce_by_window_inv(|a, b| a + b, |a, b| a - b, secs(2), None)
            .unwrap(),
    );
    let counts = capture(&input.count_by_window(secs(2), None).unwrap());

    ctx.run_batches(4).unwrap();

    assert_eq!(
        *naive.lock().unwrap(),
        vec![(1000, vec![3]), (2000, vec![6]), (3000, vec![3]), (4000, vec![])]
    );
    // The inverse path keeps the constant key at its identity value.
    assert_eq!(
        *inverse.lock().unwrap(),
        vec![(1000, vec![3]), (2000, vec![6]), (3000, vec![3]), (4000, vec![0])]
    );
    assert_eq!(
        *counts.lock().unwrap(),
        vec![(1000, vec![2]), (2000, vec![3]), (3000, vec![1]), (4000, vec![0])]
    );
}

#[test]
fn test_count_by_value_and_window_drops_zero_counts() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["a".to_string()],
            vec![],
        ]),
        true,
    );
    let out = capture(&input.count_by_value_and_window(secs(2), None, None).unwrap());

    ctx.run_batches(4).unwrap();
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![kv("a", 1), kv("b", 1)]),
            (2000, vec![kv("a", 2), kv("b", 1)]),
            (3000, vec![kv("a", 1)]),
            (4000, vec![]),
        ]
    );
}

#[test]
fn test_group_by_key_and_window_keeps_arrival_order() {
    let ctx = context();
    let input = ctx.queue_stream(
        queue(vec![
            vec![kv("k", 1), kv("k", 2), kv("j", 9)],
            vec![kv("k", 3)],
            vec![kv("k", 4)],
            vec![],
            vec![],
        ]),
        true,
    );
    let out = capture(&input.group_by_key_and_window(secs(2), None, None).unwrap());

    ctx.run_batches(5).unwrap();
    let g = |k: &str, v: Vec<i64>| (k.to_string(), v);
    assert_eq!(
        *out.lock().unwrap(),
        vec![
            (1000, vec![g("j", vec![9]), g("k", vec![1, 2])]),
            (2000, vec![g("j", vec![9]), g("k", vec![1, 2, 3])]),
            (3000, vec![g("k", vec![3, 4])]),
            (4000, vec![g("k", vec![4])]),
            (5000, vec![]),
        ]
    );
}

#[test]
fn test_slice_returns_remembered_batches() {
    let config = StreamingConfig::new("slice", secs(1)).with_remember(secs(10));
    let ctx = StreamingContext::new(config).unwrap();
    let input = ctx.queue_stream(queue(vec![vec![1i64], vec![2], vec![3]]), true);
    input.foreach_batch(|_| Ok(()));

    ctx.run_batches(3).unwrap();
    let batches: Vec<Vec<i64>> = input
        .slice(BatchTime::from_secs(1), BatchTime::from_secs(3))
        .unwrap()
        .iter()
        .map(|d| d.collect())
        .collect();
    assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);

    // Unaligned ends are rounded down to the slide grid.
    let tail = input
        .slice(BatchTime::from_millis(1500), BatchTime::from_millis(2999))
        .unwrap();
    assert_eq!(tail.len(), 2);
}

#[test]
fn test_window_keeps_only_needed_history() {
    let ctx = context();
    let input = ctx.queue_stream(queue((1..=6).map(|i| vec![i as i64]).collect()), true);
    let out = capture(&input.window(secs(2), None).unwrap());

    ctx.run_batches(6).unwrap();
    assert_eq!(out.lock().unwrap().last().unwrap(), &(6000, vec![5, 6]));
    assert_eq!(input.node().info().remember_ms(), 2000);
    // History older than the window is gone.
    assert!(input
        .node()
        .typed()
        .generated()
        .get(BatchTime::from_secs(3))
        .unwrap()
        .is_none());
}
