//! Integer ping benchmark: stream sequenced 8-byte integers through a
//! ring between two pinned cores and report operations per second.
//!
//! ```text
//! cargo run --release --bin int_ping -- --iterations=10000000 --cores=2,4
//! ```

use std::env;
use std::hint;
use std::path::PathBuf;
use std::time::Instant;

use chute::affinity::pin_current_thread;
use chute::{Consumer, CreateOptions, OpenOptions, PopResult, Producer};

struct Args {
    iterations: u64,
    capacity: u64,
    dir: PathBuf,
    producer_core: usize,
    consumer_core: usize,
}

fn parse_args() -> Args {
    let mut args = Args {
        iterations: 10_000_000,
        capacity: 1 << 20,
        dir: PathBuf::from("/dev/shm"),
        producer_core: 0,
        consumer_core: 1,
    };

    for arg in env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--iterations=") {
            args.iterations = v.parse().expect("invalid --iterations");
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
    let name = format!("chute-ping-{}", std::process::id());

    let iterations = args.iterations;
    let producer_core = args.producer_core;
    let create_opts = CreateOptions {
        dir: args.dir.clone(),
        ..CreateOptions::default()
    };
    let producer_name = name.clone();

    let producer = std::thread::spawn(move || {
        pin_or_warn(producer_core);
        let mut tx = Producer::create(&producer_name, args.capacity, &create_opts)
            .expect("create ring");
        for seq in 0..iterations {
            loop {
                match tx.push(8) {
                    Ok(buf) => {
                        buf.copy_from_slice(&seq.to_le_bytes());
                        break;
                    }
                    Err(_) => hint::spin_loop(),
                }
            }
            tx.commit(8);
        }
        // Hold the ring open until the consumer drains it; a short run
        // must not unlink the name before the consumer even opens.
        while !tx.is_empty() {
            hint::spin_loop();
        }
    });

    pin_or_warn(args.consumer_core);
    let open_opts = OpenOptions { dir: args.dir };
    let mut rx = Consumer::open_blocking(&name, &open_opts, std::time::Duration::from_secs(5))
        .expect("open ring");

    let start = Instant::now();
    let mut expected = 0u64;
    while expected < iterations {
        let n = match rx.pop() {
            PopResult::Bytes(bytes) => {
                // The producer commits whole integers, so the readable
                // span is always a multiple of 8.
                for chunk in bytes.chunks_exact(8) {
                    let value = u64::from_le_bytes(chunk.try_into().unwrap());
                    assert_eq!(value, expected, "sequence gap");
                    expected += 1;
                }
                bytes.len()
            }
            PopResult::Empty => {
                hint::spin_loop();
                continue;
            }
            PopResult::Eof => panic!("EOF after {expected} of {iterations} integers"),
        };
        rx.commit(n);
    }
    let elapsed = start.elapsed();

    producer.join().expect("producer thread");

    let ops = iterations as f64 / elapsed.as_secs_f64();
    println!("int_ping");
    println!("iterations: {iterations}");
    println!("elapsed: {:.3}s", elapsed.as_secs_f64());
    println!("throughput: {:.1} Mops/s", ops / 1e6);
}
