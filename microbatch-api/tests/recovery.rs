use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::bail;
use microbatch_api::{DStream, StreamingContext};
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::graph::InputQueue;
use microbatch_core::types::BatchTime;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "microbatch-{prefix}-{}-{nanos}",
        std::process::id()
    ))
}

fn queue<T>(batches: Vec<Vec<T>>) -> InputQueue<T> {
    InputQueue::from_batches(batches.into_iter().map(|b| Dataset::parallelize(b, 2)))
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[test]
fn test_save_as_text_files_writes_one_directory_per_batch() {
    let dir = unique_temp_dir("text-files");
    let prefix = dir.join("words");
    let ctx = StreamingContext::new(StreamingConfig::new("text", Duration::from_secs(1))).unwrap();
    let input = ctx.queue_stream(
        queue(vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]]),
        true,
    );
    input.save_as_text_files(prefix.to_str().unwrap(), Some("txt"));

    ctx.run_batches(2).unwrap();
    let first = dir.join("words-1000.txt");
    let second = dir.join("words-2000.txt");
    assert_eq!(fs::read_to_string(first.join("part-00000")).unwrap(), "\"a\"\n");
    assert_eq!(fs::read_to_string(second.join("part-00000")).unwrap(), "\"b\"\n");
    assert_eq!(fs::read_to_string(second.join("part-00001")).unwrap(), "\"c\"\n");

    // Re-running a batch finds its directory and leaves it alone.
    ctx.run_batch(BatchTime::from_secs(2)).unwrap();
    assert_eq!(fs::read_to_string(second.join("part-00001")).unwrap(), "\"c\"\n");

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_pprint_shows_the_head_of_each_batch() {
    let ctx = StreamingContext::new(StreamingConfig::new("print", Duration::from_secs(1))).unwrap();
    let input = ctx.queue_stream(queue(vec![vec![1i64, 2, 3], vec![4]]), true);
    let buffer = SharedBuffer::default();
    input.pprint_to(2, Box::new(buffer.clone()));

    ctx.run_batches(2).unwrap();
    let rule = "-".repeat(43);
    assert_eq!(
        buffer.text(),
        format!(
            "{rule}\nTime: 1000 ms\n{rule}\n1\n2\n...\n\n{rule}\nTime: 2000 ms\n{rule}\n4\n\n"
        )
    );
}

#[test]
fn test_checkpoint_interval_is_validated() {
    let ctx = StreamingContext::new(StreamingConfig::new("interval", Duration::from_secs(1))).unwrap();
    let input = ctx.queue_stream(queue::<i64>(vec![]), true);

    assert!(input.clone().checkpoint(Duration::ZERO).is_err());
    let err = input
        .clone()
        .checkpoint(Duration::from_millis(1500))
        .err()
        .unwrap();
    assert!(
        err.to_string().contains("multiple of the stream's slide duration (1000 ms)"),
        "unexpected message: {err}"
    );

    let windowed = input
        .window(Duration::from_secs(4), Some(Duration::from_secs(2)))
        .unwrap();
    assert!(windowed.clone().checkpoint(Duration::from_secs(3)).is_err());
    assert!(windowed.checkpoint(Duration::from_secs(4)).is_ok());
}

fn running_totals(ctx: &StreamingContext, queue: InputQueue<(String, i64)>) -> DStream<(String, i64)> {
    ctx.queue_stream(queue, true)
        .update_state_by_key(
            |values: &[i64], state: Option<&i64>| {
                Some(state.copied().unwrap_or(0) + values.iter().sum::<i64>())
            },
            Some(2),
        )
        .checkpoint(Duration::from_secs(2))
        .unwrap()
}

#[test]
fn test_state_survives_restart_through_checkpoint() {
    let dir = unique_temp_dir("recover");
    let config = StreamingConfig::new("recover", Duration::from_secs(1)).with_checkpoint_dir(&dir);
    let one = || vec![("a".to_string(), 1i64)];

    let first = StreamingContext::new(config.clone()).unwrap();
    let totals = running_totals(&first, queue(vec![one(), one(), one(), one()]));
    totals.foreach_batch(|_| Ok(()));
    first.run_batches(4).unwrap();
    assert_eq!(
        totals.compute_batch(BatchTime::from_secs(4)).unwrap().unwrap().collect(),
        vec![("a".to_string(), 4)]
    );
    drop(first);

    // Same graph, fresh process state.
    let second = StreamingContext::new(config).unwrap();
    let totals = running_totals(&second, queue(vec![vec![("a".to_string(), 10)]]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    totals.foreach_batch_with_time(move |time, data| {
        sink.lock().unwrap().push((time.millis(), data.collect()));
        Ok(())
    });

    assert_eq!(second.recover().unwrap(), Some(BatchTime::from_secs(4)));
    assert_eq!(second.advance().unwrap(), BatchTime::from_secs(5));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(5000, vec![("a".to_string(), 14)])]
    );

    fs::remove_dir_all(dir).unwrap();
}

fn windowed_sums(ctx: &StreamingContext, queue: InputQueue<(String, i64)>) -> DStream<(String, i64)> {
    ctx.queue_stream(queue, true)
        .reduce_by_key_and_window_inv(
            |a, b| a + b,
            |a, b| a - b,
            Duration::from_secs(2),
            None,
            None,
            None,
        )
        .unwrap()
        .checkpoint(Duration::from_secs(1))
        .unwrap()
}

#[test]
fn test_incremental_window_survives_restart_through_checkpoint() {
    let dir = unique_temp_dir("recover-window");
    let config = StreamingConfig::new("recover-window", Duration::from_secs(1)).with_checkpoint_dir(&dir);
    let k = |v: i64| vec![("k".to_string(), v)];

    let first = StreamingContext::new(config.clone()).unwrap();
    let sums = windowed_sums(&first, queue(vec![k(1), k(10)]));
    sums.foreach_batch(|_| Ok(()));
    first.run_batches(2).unwrap();
    drop(first);

    let second = StreamingContext::new(config).unwrap();
    let sums = windowed_sums(&second, queue(vec![k(100), k(1000)]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    sums.foreach_batch_with_time(move |time, data| {
        sink.lock().unwrap().push((time.millis(), data.collect()));
        Ok(())
    });

    assert_eq!(second.recover().unwrap(), Some(BatchTime::from_secs(2)));
    second.advance().unwrap();
    second.advance().unwrap();
    // The batch at 1000 ms leaves first, then the one at 2000 ms.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (3000, vec![("k".to_string(), 110)]),
            (4000, vec![("k".to_string(), 1100)]),
        ]
    );

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_recover_without_checkpoint_starts_fresh() {
    let ctx = StreamingContext::new(StreamingConfig::new("fresh", Duration::from_secs(1))).unwrap();
    let _totals = running_totals(&ctx, queue(vec![]));
    assert_eq!(ctx.recover().unwrap(), None);
    assert_eq!(ctx.last_batch_time().unwrap(), None);
    assert_eq!(ctx.advance().unwrap(), BatchTime::from_secs(1));
}

#[test]
fn test_driver_ticks_until_stopped() {
    let ctx = StreamingContext::new(StreamingConfig::new("driver", Duration::from_millis(10))).unwrap();
    let batches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&batches);
    ctx.constant_stream(Dataset::parallelize(vec![1i64], 1))
        .foreach_batch(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    ctx.start().unwrap();
    assert!(ctx.start().is_err());
    thread::sleep(Duration::from_millis(100));
    assert!(!ctx.await_termination_timeout(Duration::from_millis(5)).unwrap());
    ctx.stop().unwrap();

    let ran = batches.load(Ordering::SeqCst);
    assert!(ran > 0, "driver never ran a batch");
    assert_eq!(
        ctx.last_batch_time().unwrap(),
        Some(BatchTime::from_millis(ran as i64 * 10))
    );
    // Stopped for good: nothing else runs.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(batches.load(Ordering::SeqCst), ran);
    assert!(ctx.await_termination_timeout(Duration::from_millis(5)).unwrap());
}

#[test]
fn test_driver_stops_on_failed_batch() {
    let ctx = StreamingContext::new(StreamingConfig::new("failing", Duration::from_millis(10))).unwrap();
    ctx.constant_stream(Dataset::parallelize(vec![1i64], 1))
        .transform(|_: &Dataset<i64>| -> anyhow::Result<Dataset<i64>> { bail!("boom") })
        .foreach_batch(|_| Ok(()));

    ctx.start().unwrap();
    let err = ctx
        .await_termination_timeout(Duration::from_secs(5))
        .unwrap_err();
    assert!(format!("{err:#}").contains("boom"), "unexpected error: {err:#}");
    assert_eq!(ctx.last_batch_time().unwrap(), Some(BatchTime::from_millis(10)));
    // Stopping after the driver ended on its own is a no-op.
    ctx.stop().unwrap();
}
