//!Raw access to the hardware control files. Each switchable output is
//!backed by one or more endpoints that accept or yield a decimal-text
//!integer with no further framing.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

///A single readable/writable control endpoint. Any I/O error is a hardware
///fault; callers never retry transparently outside the relay confirmation
///budget.
pub trait RawChannel {
    fn write(&self, value: i64) -> io::Result<()>;
    fn read(&self) -> io::Result<i64>;
}

///A control endpoint backed by a file, e.g. `/run/io-ext/1/relay_1_set/value`.
pub struct FsChannel {
    path: PathBuf,
}

impl FsChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RawChannel for FsChannel {
    fn write(&self, value: i64) -> io::Result<()> {
        fs::write(&self.path, value.to_string())
    }

    fn read(&self) -> io::Result<i64> {
        let text = fs::read_to_string(&self.path)?;
        text.trim()
            .parse()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{}", err)))
    }
}

#[derive(Default)]
struct MemCell {
    value: i64,
    fail: bool,
    reads: u32,
    writes: Vec<i64>,
}

///In-memory endpoint used to simulate hardware in tests. Clones share the
///same cell, so a test can hold one end while an output owns the other.
#[derive(Clone, Default)]
pub struct MemChannel {
    cell: Arc<Mutex<MemCell>>,
}

impl MemChannel {
    pub fn new(start: i64) -> Self {
        let ch = Self::default();
        ch.cell.lock().expect("mem channel lock").value = start;
        ch
    }

    ///Change the value without going through `write`, simulating the
    ///hardware (e.g. a feedback line following the relay coil).
    pub fn set(&self, value: i64) {
        self.cell.lock().expect("mem channel lock").value = value;
    }

    pub fn value(&self) -> i64 {
        self.cell.lock().expect("mem channel lock").value
    }

    ///Make subsequent reads and writes fail with an I/O error.
    pub fn fail(&self, fail: bool) {
        self.cell.lock().expect("mem channel lock").fail = fail;
    }

    ///Number of `read` calls so far.
    pub fn reads(&self) -> u32 {
        self.cell.lock().expect("mem channel lock").reads
    }

    ///Every value passed to `write`, in order.
    pub fn writes(&self) -> Vec<i64> {
        self.cell.lock().expect("mem channel lock").writes.clone()
    }
}

impl RawChannel for MemChannel {
    fn write(&self, value: i64) -> io::Result<()> {
        let mut cell = self.cell.lock().expect("mem channel lock");
        if cell.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated write fault"));
        }
        cell.value = value;
        cell.writes.push(value);
        Ok(())
    }

    fn read(&self) -> io::Result<i64> {
        let mut cell = self.cell.lock().expect("mem channel lock");
        cell.reads += 1;
        if cell.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read fault"));
        }
        Ok(cell.value)
    }
}
