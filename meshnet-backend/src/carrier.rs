use std::io::{self, Read, Write};

/// Any byte-oriented or datagram-oriented channel a secure transport can be
/// handshaked over. Blanket-implemented for every `Read + Write + Send`
/// type so `StreamBackend`, `DatagramBackend` and `TunnelBackend` can all
/// hand back the same boxed carrier type.
pub trait Carrier: Read + Write + Send {}
impl<T: Read + Write + Send> Carrier for T {}

pub type BoxedCarrier = Box<dyn Carrier>;

impl Read for Box<dyn Carrier> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

impl Write for Box<dyn Carrier> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}
