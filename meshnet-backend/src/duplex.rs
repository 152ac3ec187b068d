use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A blocking, ordered byte channel fed by out-of-band deliveries
/// (`deliver`) and draining outbound bytes through an injected sink.
///
/// Shared by `DatagramBackend` and `TunnelBackend`: both carry an
/// underlying datagram transport (UDP packets, Tunnel-content overlay
/// messages) but `SecureTransport`'s record framing expects a carrier that
/// reads and writes like an ordered stream. Concatenating arriving
/// datagrams in delivery order and relying on `RecordCipher`'s
/// length-prefixed records to resynchronize frame boundaries is a
/// deliberate simplification of true DTLS-style one-packet-one-record
/// semantics: reordered or duplicated datagrams would corrupt the stream,
/// whereas a dropped one just stalls it. Reassembly/retransmission is out
/// of scope here (see the NAT-traversal/at-rest non-goals).
pub struct ByteDuplex {
    inbox: Mutex<VecDeque<u8>>,
    cond: Condvar,
    sink: Box<dyn Fn(&[u8]) -> io::Result<()> + Send + Sync>,
}

impl ByteDuplex {
    pub fn new(sink: impl Fn(&[u8]) -> io::Result<()> + Send + Sync + 'static) -> ByteDuplex {
        ByteDuplex {
            inbox: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            sink: Box::new(sink),
        }
    }

    pub fn deliver(&self, bytes: &[u8]) {
        let mut inbox = self.inbox.lock().expect("meshnet-backend: duplex inbox mutex poisoned");
        inbox.extend(bytes.iter().copied());
        self.cond.notify_all();
    }

    fn read_blocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.lock().expect("meshnet-backend: duplex inbox mutex poisoned");
        while inbox.is_empty() {
            let (guard, timeout) = self
                .cond
                .wait_timeout(inbox, Duration::from_secs(30))
                .expect("meshnet-backend: duplex condvar poisoned");
            inbox = guard;
            if timeout.timed_out() && inbox.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no inbound bytes within timeout"));
            }
        }
        let n = buf.len().min(inbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbox.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }

    fn write_now(&self, buf: &[u8]) -> io::Result<usize> {
        (self.sink)(buf)?;
        Ok(buf.len())
    }
}

/// A movable `Read + Write` handle onto a shared [`ByteDuplex`], suitable
/// for boxing as a [`crate::carrier::Carrier`].
pub struct DuplexHandle(pub Arc<ByteDuplex>);

impl Read for DuplexHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read_blocking(buf)
    }
}

impl Write for DuplexHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_now(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn positive_deliver_then_read_returns_bytes() {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let sent_clone = sent.clone();
        let duplex = Arc::new(ByteDuplex::new(move |bytes: &[u8]| {
            sent_clone.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }));
        duplex.deliver(b"hello");

        let mut handle = DuplexHandle(duplex.clone());
        let mut buf = [0u8; 5];
        handle.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.write_all(b"world").unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), b"world");
    }
}
