//! File pipe benchmark: stream a file through the ring between two pinned
//! threads and report bandwidth.
//!
//! The producer over-reserves a fixed chunk, hands the in-ring slice
//! straight to `read(2)`, and commits only what arrived — the zero-copy
//! idiom the two-phase API exists for.
//!
//! ```text
//! cargo run --release --bin file_pipe -- --input=/tmp/big.bin --output=/dev/null
//! ```

use std::env;
use std::fs::File;
use std::hint;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use chute::affinity::pin_current_thread;
use chute::{Consumer, CreateOptions, OpenOptions, PopResult, Producer};

const CHUNK: usize = 64 * 1024;

struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    capacity: u64,
    dir: PathBuf,
    producer_core: usize,
    consumer_core: usize,
}

fn parse_args() -> Args {
    let mut input = None;
    let mut args = Args {
        input: PathBuf::new(),
        output: None,
        capacity: 1 << 22,
        dir: PathBuf::from("/dev/shm"),
        producer_core: 0,
        consumer_core: 1,
    };

    for arg in env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--input=") {
            input = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("--output=") {
            args.output = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("--capacity=") {
            args.capacity = v.parse().expect("invalid --capacity");
        } else if let Some(v) = arg.strip_prefix("--dir=") {
            args.dir = PathBuf::from(v);
        } else if let Some(v) = arg.strip_prefix("--cores=") {
            let (p, c) = v.split_once(',').expect("--cores wants PRODUCER,CONSUMER");
            args.producer_core = p.parse().expect("invalid producer core");
            args.consumer_core = c.parse().expect("invalid consumer core");
        } else {
            panic!("unknown argument: {arg}");
        }
    }
    args.input = input.expect("--input=<path> is required");
    args
}

fn pin_or_warn(cpu: usize) {
    if let Err(err) = pin_current_thread(cpu) {
        tracing::warn!(cpu, error = %err, "could not pin thread, numbers will be noisy");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = parse_args();
    assert!(
        (CHUNK as u64) <= args.capacity,
        "capacity must hold at least one {CHUNK}-byte chunk"
    );
    let name = format!("chute-filepipe-{}", std::process::id());

    let producer_core = args.producer_core;
    let create_opts = CreateOptions {
        dir: args.dir.clone(),
        ..CreateOptions::default()
    };
    let producer_name = name.clone();
    let input_path = args.input.clone();

    let producer = std::thread::spawn(move || {
        pin_or_warn(producer_core);
        let mut input = File::open(&input_path).expect("open input file");
        let mut tx = Producer::create(&producer_name, args.capacity, &create_opts)
            .expect("create ring");
        loop {
            let buf = loop {
                match tx.push(CHUNK) {
                    Ok(buf) => break buf,
                    Err(_) => hint::spin_loop(),
                }
            };
            let n = input.read(buf).expect("read input file");
            tx.commit(n);
            if n == 0 {
                break;
            }
        }
        // Hold the ring open until the consumer drains it; a small input
        // must not unlink the name before the consumer even opens.
        while !tx.is_empty() {
            hint::spin_loop();
        }
    });

    pin_or_warn(args.consumer_core);
    let open_opts = OpenOptions {
        dir: args.dir.clone(),
    };
    let mut rx = Consumer::open_blocking(&name, &open_opts, std::time::Duration::from_secs(5))
        .expect("open ring");
    let mut output = args
        .output
        .as_ref()
        .map(|path| File::create(path).expect("create output file"));

    let start = Instant::now();
    let mut total = 0u64;
    loop {
        let n = match rx.pop() {
            PopResult::Bytes(bytes) => {
                if let Some(out) = &mut output {
                    out.write_all(bytes).expect("write output file");
                }
                total += bytes.len() as u64;
                bytes.len()
            }
            PopResult::Empty => {
                hint::spin_loop();
                continue;
            }
            PopResult::Eof => break,
        };
        rx.commit(n);
    }
    let elapsed = start.elapsed();

    producer.join().expect("producer thread");
    if let Some(out) = &mut output {
        out.flush().expect("flush output file");
    }

    let mib = total as f64 / (1024.0 * 1024.0);
    println!("file_pipe");
    println!("bytes: {total}");
    println!("elapsed: {:.3}s", elapsed.as_secs_f64());
    println!("bandwidth: {:.1} MiB/s", mib / elapsed.as_secs_f64());
}
