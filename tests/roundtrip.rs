//! End-to-end scenarios over a real tmpfs-backed ring: handshakes,
//! wrap-around contiguity, flow control, and the EOF protocol.

use chute::{Consumer, CreateOptions, OpenOptions, PopResult, Producer, RingFull};

fn ring_pair(name: &str, capacity: u64) -> (tempfile::TempDir, Producer, Consumer) {
    let dir = tempfile::tempdir_in("/dev/shm").expect("tempdir on /dev/shm");
    let producer = Producer::create(
        name,
        capacity,
        &CreateOptions {
            dir: dir.path().to_path_buf(),
            ..CreateOptions::default()
        },
    )
    .unwrap();
    let consumer = Consumer::open(
        name,
        &OpenOptions {
            dir: dir.path().to_path_buf(),
        },
    )
    .unwrap();
    (dir, producer, consumer)
}

/// Pop exactly `n` bytes, asserting they are available in one slice.
fn pop_exact(rx: &mut Consumer, n: usize) -> Vec<u8> {
    let out = match rx.pop() {
        PopResult::Bytes(bytes) => {
            assert!(bytes.len() >= n, "wanted {n} bytes, ring has {}", bytes.len());
            bytes[..n].to_vec()
        }
        other => panic!("expected bytes, got {other:?}"),
    };
    rx.commit(n);
    out
}

#[test]
fn trivial_handshake() {
    let (_dir, mut tx, mut rx) = ring_pair("handshake", 4096);
    let value = 0x0102030405060708u64;

    tx.push(8).unwrap().copy_from_slice(&value.to_le_bytes());
    tx.commit(8);

    let bytes = pop_exact(&mut rx, 8);
    assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), value);

    assert!(tx.is_empty());
    assert!(rx.is_empty());
}

#[test]
fn wraparound_reservation_is_contiguous() {
    let (_dir, mut tx, mut rx) = ring_pair("wrap", 4096);

    // Drive both indices to 4092 so the next 8 bytes straddle the ring's
    // physical end (positions 4092..4095 then 0..3).
    tx.push(4092).unwrap().fill(0xEE);
    tx.commit(4092);
    pop_exact(&mut rx, 4092);

    let value = 0xDEAD_BEEF_F00D_CAFEu64;
    let buf = tx.push(8).unwrap();
    assert_eq!(buf.len(), 8, "a wrapping reservation must still be one slice");
    buf.copy_from_slice(&value.to_le_bytes());
    tx.commit(8);

    let bytes = pop_exact(&mut rx, 8);
    assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), value);

    let status = tx.status();
    assert_eq!(status.head, 4100);
    assert_eq!(status.tail, 4100);
}

#[test]
fn full_ring_rejects_the_next_byte() {
    let (_dir, mut tx, _rx) = ring_pair("full", 4096);

    tx.push(4096).unwrap().fill(0x11);
    tx.commit(4096);

    assert!(tx.is_full());
    assert_eq!(tx.free(), 0);
    assert_eq!(tx.push(1).unwrap_err(), RingFull);
}

#[test]
fn full_then_drained_accepts_again() {
    let (_dir, mut tx, mut rx) = ring_pair("refill", 4096);

    tx.push(4096).unwrap().fill(0x22);
    tx.commit(4096);
    assert_eq!(tx.push(1).unwrap_err(), RingFull);

    pop_exact(&mut rx, 4096);

    // The refused reservation fits after the consumer's progress; the
    // producer finds out through its cached-tail refresh.
    tx.push(1).unwrap()[0] = 0x33;
    tx.commit(1);
    assert_eq!(pop_exact(&mut rx, 1), [0x33]);
}

#[test]
fn empty_then_eof() {
    let (_dir, tx, mut rx) = ring_pair("eof", 4096);

    assert_eq!(rx.pop(), PopResult::Empty);

    drop(tx);
    assert_eq!(rx.pop(), PopResult::Eof);
    // EOF is terminal.
    assert_eq!(rx.pop(), PopResult::Eof);
}

#[test]
fn buffered_bytes_drain_before_eof() {
    let (_dir, mut tx, mut rx) = ring_pair("drain", 4096);

    tx.push(100).unwrap().fill(0x55);
    tx.commit(100);
    drop(tx);

    let bytes = pop_exact(&mut rx, 100);
    assert_eq!(bytes, vec![0x55; 100]);
    assert_eq!(rx.pop(), PopResult::Eof);
}

#[test]
fn commit_publishes_exactly_the_prefix() {
    let (_dir, mut tx, mut rx) = ring_pair("prefix", 4096);

    // Over-reserve, fill a prefix, publish only that much — the idiom for
    // handing ring space to read(2).
    let buf = tx.push(4096).unwrap();
    buf[..100].fill(0x77);
    tx.commit(100);

    match rx.pop() {
        PopResult::Bytes(bytes) => assert_eq!(bytes.len(), 100),
        other => panic!("expected 100 bytes, got {other:?}"),
    }
    rx.commit(100);
    assert_eq!(rx.pop(), PopResult::Empty);
}

#[test]
fn positions_are_reused_without_ghosts() {
    let (_dir, mut tx, mut rx) = ring_pair("reuse", 4096);

    tx.push(4096).unwrap().fill(0xAA);
    tx.commit(4096);
    pop_exact(&mut rx, 4096);

    // Second lap over the same physical bytes must observe only the new
    // data, never remnants of the first lap.
    tx.push(4096).unwrap().fill(0xBB);
    tx.commit(4096);
    assert_eq!(pop_exact(&mut rx, 4096), vec![0xBB; 4096]);
}

#[test]
fn observers_track_occupancy() {
    let (_dir, mut tx, mut rx) = ring_pair("observe", 4096);

    assert_eq!(tx.capacity(), 4096);
    assert_eq!(rx.capacity(), 4096);
    assert_eq!(tx.page_size(), rx.page_size());
    assert!(tx.is_empty());

    tx.push(1024).unwrap().fill(1);
    tx.commit(1024);

    assert_eq!(tx.used(), 1024);
    assert_eq!(tx.free(), 3072);
    assert_eq!(rx.used(), 1024);
    assert!(!tx.is_empty());
    assert!(!tx.is_full());

    pop_exact(&mut rx, 1024);
    assert!(tx.is_empty());
    assert!(rx.is_empty());
}

#[test]
fn both_sides_see_the_same_mapping() {
    let (_dir, mut tx, mut rx) = ring_pair("mirror", 4096);

    let payload: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    tx.push(3000).unwrap().copy_from_slice(&payload);
    tx.commit(3000);

    assert_eq!(pop_exact(&mut rx, 3000), payload);
}
