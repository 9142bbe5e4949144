use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use loopback::{LoopbackChannel, LoopbackConfig, LoopbackError, OverflowPolicy};

const MESSAGE: &[u8] = b"Testing... 1.2.3. Is this thing on?\n";

#[test]
fn test_end_of_data_read_without_write() {
    let l = LoopbackChannel::new();
    let mut p = [0u8; 128];
    for _ in 0..3 {
        assert_eq!(l.read(&mut p), Err(LoopbackError::EndOfData));
    }
}

#[test]
fn test_write() {
    let l = LoopbackChannel::new();
    assert_eq!(l.write(MESSAGE), MESSAGE.len());
    assert_eq!(l.write(MESSAGE), MESSAGE.len());
}

#[test]
fn test_write_and_read() {
    let l = LoopbackChannel::new();
    assert_eq!(l.write(MESSAGE), MESSAGE.len());

    let mut r = [0u8; 128];
    let n = l.read(&mut r).unwrap();
    assert_eq!(n, MESSAGE.len());
    assert_eq!(&r[..n], MESSAGE);

    assert_eq!(l.read(&mut r), Err(LoopbackError::EndOfData));
}

#[test]
fn test_write_and_multi_read() {
    let l = LoopbackChannel::new();
    assert_eq!(l.write(MESSAGE), MESSAGE.len());

    for (i, &expected) in MESSAGE.iter().enumerate() {
        let mut r = [0u8; 1];
        assert_eq!(l.read(&mut r), Ok(1), "read offset {}", i);
        assert_eq!(r[0], expected, "read offset {}", i);
    }

    let mut r = [0u8; 128];
    assert_eq!(l.read(&mut r), Err(LoopbackError::EndOfData));
}

#[test]
fn test_multi_write_and_read() {
    let l = LoopbackChannel::new();
    for i in 0..MESSAGE.len() {
        assert_eq!(l.write(&MESSAGE[i..i + 1]), 1);
    }

    let mut r = [0u8; 128];
    let n = l.read(&mut r).unwrap();
    assert_eq!(&r[..n], MESSAGE);
    assert_eq!(l.read(&mut r), Err(LoopbackError::EndOfData));
}

#[test]
fn test_multi_write_and_multi_read() {
    let l = LoopbackChannel::new();
    for i in 0..MESSAGE.len() {
        assert_eq!(l.write(&MESSAGE[i..i + 1]), 1);
    }
    for (i, &expected) in MESSAGE.iter().enumerate() {
        let mut r = [0u8; 1];
        assert_eq!(l.read(&mut r), Ok(1), "read offset {}", i);
        assert_eq!(r[0], expected, "read offset {}", i);
    }

    let mut r = [0u8; 128];
    assert_eq!(l.read(&mut r), Err(LoopbackError::EndOfData));
}

#[test]
fn test_interleaved_write_and_read() {
    let l = LoopbackChannel::new();
    for &b in MESSAGE {
        assert_eq!(l.write(&[b]), 1);
        let mut r = [0u8; 1];
        assert_eq!(l.read(&mut r), Ok(1));
        assert_eq!(r[0], b);
    }
    assert_eq!(l.read(&mut [0u8; 4]), Err(LoopbackError::EndOfData));
}

#[test]
fn test_blocked_writer_returns_full_count() {
    let l = Arc::new(LoopbackChannel::with_quota(1024));
    let data = vec![0x5au8; 4096];

    let writer = {
        let l = l.clone();
        let data = data.clone();
        thread::spawn(move || l.write(&data))
    };

    while !l.is_stalled() {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!writer.is_finished());

    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    while out.len() < data.len() {
        match l.read(&mut buf) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(LoopbackError::EndOfData) => thread::yield_now(),
            Err(e) => panic!("unexpected read error: {}", e),
        }
    }

    assert_eq!(writer.join().unwrap(), data.len());
    assert_eq!(out, data);
    assert!(!l.is_stalled());
}

#[test]
fn test_single_producer_order_preserved() {
    let l = Arc::new(LoopbackChannel::with_quota(256));
    let data: Vec<u8> = (0..200_000usize).map(|i| (i % 251) as u8).collect();
    let writers_done = Arc::new(AtomicUsize::new(0));

    let writer = {
        let l = l.clone();
        let data = data.clone();
        let writers_done = writers_done.clone();
        thread::spawn(move || {
            let mut chunk = 1;
            let mut rest = &data[..];
            while !rest.is_empty() {
                let n = chunk.min(rest.len());
                assert_eq!(l.write(&rest[..n]), n);
                rest = &rest[n..];
                chunk = chunk % 700 + 37;
            }
            writers_done.store(1, Ordering::Release);
        })
    };

    let out = drain_until_done(&l, &writers_done, 1, 97);
    writer.join().unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_no_data_loss_many_writers_many_readers() {
    const WRITERS: usize = 4;
    const READERS: usize = 3;
    const PER_WRITER: usize = 50_000;

    let l = Arc::new(LoopbackChannel::with_quota(512));
    let writers_done = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let l = l.clone();
            let writers_done = writers_done.clone();
            thread::spawn(move || {
                let data = vec![w as u8; PER_WRITER];
                for chunk in data.chunks(300) {
                    assert_eq!(l.write(chunk), chunk.len());
                }
                writers_done.fetch_add(1, Ordering::AcqRel);
            })
        })
        .collect();

    let readers: Vec<_> = (0..READERS)
        .map(|r| {
            let l = l.clone();
            let writers_done = writers_done.clone();
            thread::spawn(move || drain_until_done(&l, &writers_done, WRITERS, 64 + r * 50))
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    let mut counts = [0usize; WRITERS];
    for r in readers {
        for b in r.join().unwrap() {
            counts[b as usize] += 1;
        }
    }

    assert_eq!(l.buffered(), 0);
    assert!(!l.is_stalled());
    assert_eq!(counts, [PER_WRITER; WRITERS]);
}

#[test]
fn test_channel_from_config_file() {
    let config = LoopbackConfig::load("loopback.yaml").unwrap();
    assert_eq!(config.overflow, OverflowPolicy::Block);
    let l = LoopbackChannel::from_config(&config).unwrap();
    assert_eq!(l.quota(), config.quota);
}

#[test]
fn test_unsupported_overflow_policy() {
    let config = LoopbackConfig::from_yaml("quota: 64\noverflow: drop").unwrap();
    match LoopbackChannel::from_config(&config) {
        Err(LoopbackError::NotImplemented(what)) => assert!(what.contains("Drop")),
        other => panic!("expected NotImplemented, got {:?}", other.map(|l| l.quota())),
    }
}

/// Read until every writer has finished and the backlog is empty.
fn drain_until_done(
    l: &LoopbackChannel,
    writers_done: &AtomicUsize,
    writers: usize,
    buf_size: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_size];
    loop {
        let finished = writers_done.load(Ordering::Acquire) == writers;
        match l.read(&mut buf) {
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) if finished => return out,
            Err(_) => thread::yield_now(),
        }
    }
}
