use clap::{App, Arg, SubCommand};
use std::{path::PathBuf, sync::Arc, thread, time::Instant};
use tomoflow::{
    FilterStage, HandoffQueue, HeapAllocator, Image, MemoryPool, RawImageSaver, Result, SinkStage,
    SinkStageConfig, StageKernel,
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("tomoflow-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Tomoflow Pipeline Core Diagnostic Tool")
        .subcommand(
            SubCommand::with_name("pool")
                .about("Benchmark memory pool request/return cycling")
                .arg(
                    Arg::with_name("quota")
                        .short("q")
                        .long("quota")
                        .value_name("COUNT")
                        .help("Buffers reserved for the test slot")
                        .default_value("8")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .value_name("BYTES")
                        .help("Size of each buffer")
                        .default_value("1048576")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("operations")
                        .short("o")
                        .long("operations")
                        .value_name("OPS")
                        .help("Number of request/return cycles")
                        .default_value("100000")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("pipeline")
                .about("Run a demo two-stage pipeline writing frames to disk")
                .arg(
                    Arg::with_name("output")
                        .short("d")
                        .long("output")
                        .value_name("DIR")
                        .help("Output directory for saved frames")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("frames")
                        .short("n")
                        .long("frames")
                        .value_name("COUNT")
                        .help("Number of frames to push through the pipeline")
                        .default_value("16")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("width")
                        .long("width")
                        .value_name("PIXELS")
                        .help("Frame width")
                        .default_value("256")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("height")
                        .long("height")
                        .value_name("PIXELS")
                        .help("Frame height")
                        .default_value("256")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("quota")
                        .short("q")
                        .long("quota")
                        .value_name("COUNT")
                        .help("Buffers reserved per stage slot")
                        .default_value("4")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and build information"))
        .get_matches();

    match matches.subcommand() {
        ("pool", Some(pool_matches)) => handle_pool_command(pool_matches),
        ("pipeline", Some(pipeline_matches)) => handle_pipeline_command(pipeline_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .unwrap()
        .parse()
        .map_err(|_| tomoflow::TomoflowError::invalid_parameter(name, "Invalid numeric value"))
}

fn handle_pool_command(matches: &clap::ArgMatches) -> Result<()> {
    let quota: usize = parse_arg(matches, "quota")?;
    let size: usize = parse_arg(matches, "size")?;
    let operations: usize = parse_arg(matches, "operations")?;

    println!("Testing memory pool performance...");
    println!("Quota: {} buffers", quota);
    println!("Buffer size: {} bytes", size);
    println!("Operations: {}", operations);

    let pool = MemoryPool::new(Arc::new(HeapAllocator::new()));
    let slot = pool.register_stage(quota, size)?;

    let start = Instant::now();
    for _ in 0..operations {
        let image = pool.request_memory(slot)?;
        pool.return_memory(image)?;
    }
    let elapsed = start.elapsed();
    let ops_per_sec = operations as f64 / elapsed.as_secs_f64();

    let stats = pool.stats();
    println!("\nResults:");
    println!("  Total time: {:.2}ms", elapsed.as_millis());
    println!("  Cycles/sec: {:.0}", ops_per_sec);
    println!(
        "  Average latency: {:.2}us",
        elapsed.as_micros() as f64 / operations as f64
    );
    println!("  Requests: {}", stats.requests);
    println!("  Returns: {}", stats.returns);
    println!("  Bytes reserved: {}", stats.bytes_reserved);

    Ok(())
}

/// Demo kernel: inverts every byte of the frame
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

fn handle_pipeline_command(matches: &clap::ArgMatches) -> Result<()> {
    let output: PathBuf = PathBuf::from(matches.value_of("output").unwrap());
    let frames: usize = parse_arg(matches, "frames")?;
    let width: u32 = parse_arg(matches, "width")?;
    let height: u32 = parse_arg(matches, "height")?;
    let quota: usize = parse_arg(matches, "quota")?;

    let frame_size = width as usize * height as usize;

    println!("Running demo pipeline...");
    println!("Frames: {} ({}x{}, {} bytes each)", frames, width, height, frame_size);
    println!("Quota per slot: {}", quota);
    println!("Output: {}", output.display());

    let pool = Arc::new(MemoryPool::new(Arc::new(HeapAllocator::new())));
    let source_slot = pool.register_stage(quota, frame_size)?;
    let filter_slot = pool.register_stage(quota, frame_size)?;

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
        SinkStageConfig::new(&output, "frame_"),
        Arc::clone(&to_sink),
        Arc::clone(&pool),
    )?;

    let start = Instant::now();

    let producer = {
        let pool = Arc::clone(&pool);
        let to_filter = Arc::clone(&to_filter);
        thread::spawn(move || -> Result<()> {
            for i in 0..frames {
                let mut image = pool.request_memory(source_slot)?;
                let shade = (i % 256) as u8;
                image.as_mut_slice().fill(shade);
                image.set_dimensions(width, height);
                to_filter.push(image);
            }
            to_filter.push(Image::sentinel());
            Ok(())
        })
    };
    let filter_handle = thread::spawn(move || filter.run());
    let sink_handle = thread::spawn(move || sink.run());

    producer.join().unwrap()?;
    let processed = filter_handle.join().unwrap()?;
    let saved = sink_handle.join().unwrap()?;
    let elapsed = start.elapsed();

    let stats = pool.stats();
    println!("\nResults:");
    println!("  Frames processed: {}", processed);
    println!("  Frames saved: {}", saved);
    println!("  Total time: {:.2}ms", elapsed.as_millis());
    println!(
        "  Throughput: {:.1} MB/s",
        (saved as usize * frame_size) as f64 / 1_000_000.0 / elapsed.as_secs_f64()
    );
    println!("  Pool requests: {}", stats.requests);
    println!("  Pool returns: {}", stats.returns);

    pool.free_memory(source_slot)?;
    pool.free_memory(filter_slot)?;

    Ok(())
}

fn show_info() -> Result<()> {
    println!("Tomoflow Pipeline Core");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));

    println!("\nCapabilities:");
    println!("  - Registration-based multi-slot memory pool");
    println!("  - Blocking request/return with LIFO buffer reuse");
    println!("  - Pluggable allocation backends (host heap provided)");
    println!("  - Blocking FIFO handoff queues (unbounded or bounded)");
    println!("  - Poison-pill pipeline shutdown");

    Ok(())
}
