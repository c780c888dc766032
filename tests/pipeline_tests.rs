//! Tests for stage run-loops, sentinel shutdown and the sink stage

use std::{fs, sync::Arc, thread, time::Duration};

use tempfile::TempDir;
use tomoflow::{
    FileNumbering, FilterStage, HandoffQueue, HeapAllocator, Image, MemoryPool, RawImageSaver,
    Result, SinkStage, SinkStageConfig, StageKernel, StageState, TomoflowError,
};

/// Forwards its input unchanged
struct PassthroughKernel;

impl StageKernel for PassthroughKernel {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn process(&mut self, input: Image, _pool: &MemoryPool, _slot: usize) -> Result<Image> {
        Ok(input)
    }
}

/// Inverts every byte into a buffer from its own slot
struct InvertKernel;

impl StageKernel for InvertKernel {
    fn name(&self) -> &str {
        "invert"
    }

    fn process(&mut self, input: Image, pool: &MemoryPool, slot: usize) -> Result<Image> {
        let mut output = pool.request_memory(slot)?;
        for (dst, src) in output.as_mut_slice().iter_mut().zip(input.as_slice()) {
            *dst = !*src;
        }
        output.set_dimensions(input.width(), input.height());
        pool.return_memory(input)?;
        Ok(output)
    }
}

/// Fails on the second image it sees
struct FailingKernel {
    seen: u64,
}

impl StageKernel for FailingKernel {
    fn name(&self) -> &str {
        "failing"
    }

    fn process(&mut self, input: Image, _pool: &MemoryPool, _slot: usize) -> Result<Image> {
        self.seen += 1;
        if self.seen > 1 {
            return Err(TomoflowError::invalid_image("synthetic kernel failure"));
        }
        Ok(input)
    }
}

fn pipeline_fixture(quota: usize, size: usize) -> (Arc<MemoryPool>, usize) {
    let pool = Arc::new(MemoryPool::new(Arc::new(HeapAllocator::new())));
    let slot = pool.register_stage(quota, size).unwrap();
    (pool, slot)
}

#[test]
fn test_sentinel_propagates_exactly_once_and_terminates() {
    let (pool, slot) = pipeline_fixture(2, 64);
    let input: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());
    let output: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut stage = FilterStage::new(
        PassthroughKernel,
        Arc::clone(&input),
        Arc::clone(&output),
        Arc::clone(&pool),
        slot,
    );
    assert_eq!(stage.state(), StageState::Running);

    input.push(pool.request_memory(slot).unwrap());
    input.push(pool.request_memory(slot).unwrap());
    input.push(Image::sentinel());

    let handle = thread::spawn(move || {
        let result = stage.run();
        (result, stage)
    });
    let (result, stage) = handle.join().unwrap();

    assert_eq!(result.unwrap(), 2);
    assert_eq!(stage.state(), StageState::Terminated);

    // Two valid images, then the sentinel, then nothing: it is forwarded
    // at most once and is the last item on the queue.
    assert!(output.pop().valid());
    assert!(output.pop().valid());
    assert!(!output.pop().valid());
    assert!(output.try_pop().is_none());
}

#[test]
fn test_no_valid_image_after_sentinel_in_fifo_order() {
    let (pool, slot) = pipeline_fixture(4, 16);
    let input: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());
    let output: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut stage = FilterStage::new(
        PassthroughKernel,
        Arc::clone(&input),
        Arc::clone(&output),
        Arc::clone(&pool),
        slot,
    );

    for i in 0..4u8 {
        let mut image = pool.request_memory(slot).unwrap();
        image.as_mut_slice()[0] = i;
        input.push(image);
    }
    input.push(Image::sentinel());

    thread::spawn(move || stage.run()).join().unwrap().unwrap();

    // Frame order established upstream is preserved.
    for i in 0..4u8 {
        let image = output.pop();
        assert!(image.valid());
        assert_eq!(image.as_slice()[0], i);
        pool.return_memory(image).unwrap();
    }
    assert!(!output.pop().valid());
}

#[test]
fn test_kernel_error_is_fatal_but_still_forwards_sentinel() {
    let (pool, slot) = pipeline_fixture(4, 32);
    let input: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());
    let output: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut stage = FilterStage::new(
        FailingKernel { seen: 0 },
        Arc::clone(&input),
        Arc::clone(&output),
        Arc::clone(&pool),
        slot,
    );

    for _ in 0..3 {
        input.push(pool.request_memory(slot).unwrap());
    }

    let handle = thread::spawn(move || {
        let result = stage.run();
        (result, stage)
    });
    let (result, stage) = handle.join().unwrap();

    assert!(result.is_err());
    assert_eq!(stage.state(), StageState::Terminated);

    // Downstream still drains: one forwarded image, then the sentinel.
    assert!(output.pop().valid());
    assert!(!output.pop().valid());
}

#[test]
fn test_sink_sequential_numbering() {
    let dir = TempDir::new().unwrap();
    let (pool, slot) = pipeline_fixture(2, 8);
    let queue: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut first = pool.request_memory(slot).unwrap();
    first.as_mut_slice().fill(0x11);
    let mut second = pool.request_memory(slot).unwrap();
    second.as_mut_slice().fill(0x22);
    queue.push(first);
    queue.push(second);
    queue.push(Image::sentinel());

    let mut sink = SinkStage::new(
        RawImageSaver,
        SinkStageConfig::new(dir.path().join("out"), "slice_"),
        Arc::clone(&queue),
        Arc::clone(&pool),
    )
    .unwrap();

    assert_eq!(sink.run().unwrap(), 2);
    assert_eq!(sink.state(), StageState::Terminated);

    let out = dir.path().join("out");
    assert_eq!(fs::read(out.join("slice_0")).unwrap(), vec![0x11; 8]);
    assert_eq!(fs::read(out.join("slice_1")).unwrap(), vec![0x22; 8]);

    // Saved buffers went back to the pool.
    assert_eq!(pool.available_in_slot(slot).unwrap(), 2);
}

#[test]
fn test_sink_fixed_numbering_overwrites() {
    let dir = TempDir::new().unwrap();
    let (pool, slot) = pipeline_fixture(2, 4);
    let queue: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut first = pool.request_memory(slot).unwrap();
    first.as_mut_slice().fill(0xAA);
    let mut second = pool.request_memory(slot).unwrap();
    second.as_mut_slice().fill(0xBB);
    queue.push(first);
    queue.push(second);
    queue.push(Image::sentinel());

    let mut sink = SinkStage::new(
        RawImageSaver,
        SinkStageConfig::new(dir.path().join("out"), "slice_")
            .with_numbering(FileNumbering::Fixed(0)),
        Arc::clone(&queue),
        Arc::clone(&pool),
    )
    .unwrap();

    assert_eq!(sink.run().unwrap(), 2);

    // Every save targeted the same file; only the last survives.
    let out = dir.path().join("out");
    assert_eq!(fs::read(out.join("slice_0")).unwrap(), vec![0xBB; 4]);
    assert!(!out.join("slice_1").exists());
}

#[test]
fn test_sink_fails_fast_when_directory_cannot_be_created() {
    let dir = TempDir::new().unwrap();
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, b"not a directory").unwrap();

    let (pool, _slot) = pipeline_fixture(1, 4);
    let queue: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let result = SinkStage::new(
        RawImageSaver,
        SinkStageConfig::new(blocked.join("out"), "slice_"),
        queue,
        pool,
    );
    assert!(matches!(result, Err(TomoflowError::Filesystem { .. })));
}

#[test]
fn test_sink_rejects_empty_prefix() {
    let dir = TempDir::new().unwrap();
    let (pool, _slot) = pipeline_fixture(1, 4);
    let queue: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let result = SinkStage::new(
        RawImageSaver,
        SinkStageConfig::new(dir.path(), ""),
        queue,
        pool,
    );
    assert!(matches!(result, Err(TomoflowError::InvalidParameter { .. })));
}

#[test]
fn test_full_pipeline_end_to_end() {
    let frames = 8usize;
    let frame_size = 64usize;
    let dir = TempDir::new().unwrap();

    let pool = Arc::new(MemoryPool::new(Arc::new(HeapAllocator::new())));
    // Quota 2 per slot forces steady-state buffer reuse and backpressure.
    let source_slot = pool.register_stage(2, frame_size).unwrap();
    let filter_slot = pool.register_stage(2, frame_size).unwrap();

    let to_filter: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());
    let to_sink: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::new());

    let mut filter = FilterStage::new(
        InvertKernel,
        Arc::clone(&to_filter),
        Arc::clone(&to_sink),
        Arc::clone(&pool),
        filter_slot,
    );
    let mut sink = SinkStage::new(
        RawImageSaver,
        SinkStageConfig::new(dir.path().join("recon"), "frame_"),
        Arc::clone(&to_sink),
        Arc::clone(&pool),
    )
    .unwrap();

    let producer = {
        let pool = Arc::clone(&pool);
        let to_filter = Arc::clone(&to_filter);
        thread::spawn(move || -> Result<()> {
            for i in 0..frames {
                let mut image = pool.request_memory(source_slot)?;
                image.as_mut_slice().fill(i as u8);
                image.set_dimensions(8, 8);
                to_filter.push(image);
            }
            to_filter.push(Image::sentinel());
            Ok(())
        })
    };
    let filter_handle = thread::spawn(move || filter.run());
    let sink_handle = thread::spawn(move || sink.run());

    producer.join().unwrap().unwrap();
    assert_eq!(filter_handle.join().unwrap().unwrap(), frames as u64);
    assert_eq!(sink_handle.join().unwrap().unwrap(), frames as u64);

    // Every frame was persisted, inverted, in order.
    for i in 0..frames {
        let path = dir.path().join("recon").join(format!("frame_{}", i));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes, vec![!(i as u8); frame_size]);
    }

    // Steady state: every buffer cycled home and the ledgers balance.
    assert_eq!(pool.available_in_slot(source_slot).unwrap(), 2);
    assert_eq!(pool.available_in_slot(filter_slot).unwrap(), 2);
    let stats = pool.stats();
    assert_eq!(stats.requests, stats.returns);

    pool.free_memory(source_slot).unwrap();
    pool.free_memory(filter_slot).unwrap();
}

#[test]
fn test_bounded_queue_throttles_producer_between_stages() {
    let (pool, slot) = pipeline_fixture(4, 16);
    let queue: Arc<HandoffQueue<Image>> = Arc::new(HandoffQueue::bounded(1).unwrap());

    queue.push(pool.request_memory(slot).unwrap());

    let pusher = {
        let pool = Arc::clone(&pool);
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            queue.push(pool.request_memory(slot).unwrap());
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!pusher.is_finished(), "producer must block on a full queue");

    let image = queue.pop();
    pool.return_memory(image).unwrap();
    pusher.join().unwrap();

    let image = queue.pop();
    pool.return_memory(image).unwrap();
}
