// In-memory serial ports for exercising the drive engine without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use super::copley::{build_packet, Opcode};

/// Scripted port: reads come from pre-queued response bytes, writes are
/// captured. An empty read queue behaves like a serial timeout.
pub struct ScriptPort {
    responses: VecDeque<u8>,
    written: Vec<u8>,
}

impl ScriptPort {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            written: Vec::new(),
        }
    }

    pub fn queue_response(&mut self, bytes: Vec<u8>) {
        self.responses.extend(bytes);
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for ScriptPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.responses.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted"));
        }
        let mut n = 0;
        while n < buf.len() {
            match self.responses.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for ScriptPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Acknowledging port: every flushed request gets an echo response queued,
/// so callers that issue an unbounded number of commands (the control loop)
/// always find a well-formed reply. `fail_next` suppresses responses for
/// the next N transactions to simulate a silent drive. The request log is
/// shared so tests can inspect it after the port moves into a worker.
pub struct AckPort {
    pending: VecDeque<u8>,
    request: Vec<u8>,
    log: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_remaining: u32,
}

impl AckPort {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            request: Vec::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            fail_remaining: 0,
        }
    }

    pub fn fail_next(&mut self, count: u32) {
        self.fail_remaining = count;
    }

    /// Shared handle onto the request log.
    pub fn log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.log)
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl Read for AckPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response"));
        }
        let mut n = 0;
        while n < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for AckPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.request.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let request = std::mem::take(&mut self.request);
        if request.len() >= 2 {
            if self.fail_remaining > 0 {
                self.fail_remaining -= 1;
            } else if let Some(opcode) = Opcode::from_raw(request[0]) {
                self.pending.extend(build_packet(opcode, request[1], &[]));
            }
        }
        self.log.lock().unwrap().push(request);
        Ok(())
    }
}
