//! Concurrency properties of the synchronized connection wrapper.
//!
//! The wrapper promises at most one in-flight read and, independently, at
//! most one in-flight write; a blocked read must never hold up a concurrent
//! write. These tests observe the backend from inside to verify the locking,
//! the way the contract is phrased: by tracking the maximum number of
//! concurrent invocations.

use parking_lot::{Condvar, Mutex};
use serial_link::connection::{ReadHalf, SerialConnection, WriteHalf};
use serial_link::error::SerialResult;
use serial_link::mock::MockBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Counts how many threads sit inside a backend call at once.
#[derive(Default)]
struct ConcurrencyGauge {
    active: Mutex<u32>,
    max_seen: Mutex<u32>,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let mut active = self.active.lock();
        *active += 1;
        let mut max_seen = self.max_seen.lock();
        *max_seen = (*max_seen).max(*active);
    }

    fn exit(&self) {
        *self.active.lock() -= 1;
    }

    fn max_concurrent(&self) -> u32 {
        *self.max_seen.lock()
    }
}

struct GaugedWriteHalf {
    gauge: Arc<ConcurrencyGauge>,
}

impl WriteHalf for GaugedWriteHalf {
    fn write_internal(&mut self, _data: &[u8]) -> SerialResult<()> {
        self.gauge.enter();
        // Dwell long enough that unsynchronized callers would overlap.
        thread::sleep(Duration::from_millis(2));
        self.gauge.exit();
        Ok(())
    }
}

struct GaugedReadHalf {
    gauge: Arc<ConcurrencyGauge>,
}

impl ReadHalf for GaugedReadHalf {
    fn read_internal(&mut self) -> SerialResult<Vec<u8>> {
        self.gauge.enter();
        thread::sleep(Duration::from_millis(2));
        self.gauge.exit();
        Ok(vec![0x00])
    }
}

fn gauged_connection(gauge: &Arc<ConcurrencyGauge>) -> SerialConnection {
    let (_, _, closer) = MockBackend::new().halves();
    SerialConnection::new(
        "GAUGED0",
        Box::new(GaugedReadHalf {
            gauge: gauge.clone(),
        }),
        Box::new(GaugedWriteHalf {
            gauge: gauge.clone(),
        }),
        closer,
    )
}

#[test]
fn test_concurrent_writers_never_overlap_in_the_backend() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let connection = Arc::new(gauged_connection(&gauge));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    connection.write(b"payload").unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(gauge.max_concurrent(), 1);
}

#[test]
fn test_concurrent_readers_never_overlap_in_the_backend() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let connection = Arc::new(gauged_connection(&gauge));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    connection.read().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(gauge.max_concurrent(), 1);
}

/// Read half that parks until the test releases it.
struct ParkedReadHalf {
    released: Arc<(Mutex<bool>, Condvar)>,
    entered: Arc<AtomicBool>,
}

impl ReadHalf for ParkedReadHalf {
    fn read_internal(&mut self) -> SerialResult<Vec<u8>> {
        self.entered.store(true, Ordering::SeqCst);
        let (lock, condvar) = &*self.released;
        let mut released = lock.lock();
        while !*released {
            condvar.wait(&mut released);
        }
        Ok(vec![0x01])
    }
}

#[test]
fn test_a_blocked_read_does_not_hold_up_writes() {
    let backend = MockBackend::new();
    let (_, writer, closer) = backend.halves();
    let released = Arc::new((Mutex::new(false), Condvar::new()));
    let entered = Arc::new(AtomicBool::new(false));
    let connection = Arc::new(SerialConnection::new(
        "SPLIT0",
        Box::new(ParkedReadHalf {
            released: released.clone(),
            entered: entered.clone(),
        }),
        writer,
        closer,
    ));

    let reader = {
        let connection = connection.clone();
        thread::spawn(move || connection.read())
    };

    // Wait until the reader is provably parked inside the backend.
    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    // Writes complete while the read is still in flight.
    connection.write(b"independent").unwrap();
    assert_eq!(backend.writes(), vec![b"independent".to_vec()]);

    // Release the reader and let it finish normally.
    {
        let (lock, condvar) = &*released;
        *lock.lock() = true;
        condvar.notify_all();
    }
    assert_eq!(reader.join().unwrap().unwrap(), vec![0x01]);
}

#[test]
fn test_closing_while_io_is_in_flight_is_observed_by_the_next_call() {
    let backend = MockBackend::new();
    let (_, writer, closer) = backend.halves();
    let released = Arc::new((Mutex::new(false), Condvar::new()));
    let entered = Arc::new(AtomicBool::new(false));
    let connection = Arc::new(SerialConnection::new(
        "SPLIT1",
        Box::new(ParkedReadHalf {
            released: released.clone(),
            entered: entered.clone(),
        }),
        writer,
        closer,
    ));

    let reader = {
        let connection = connection.clone();
        thread::spawn(move || connection.read())
    };
    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    // Close mid-read: the in-flight read completes on its own terms.
    connection.close().unwrap();
    {
        let (lock, condvar) = &*released;
        *lock.lock() = true;
        condvar.notify_all();
    }
    assert_eq!(reader.join().unwrap().unwrap(), vec![0x01]);

    // The next call observes the closed connection.
    let err = connection.read().unwrap_err();
    assert_eq!(err.to_string(), "Port SPLIT1 is closed!");
}
