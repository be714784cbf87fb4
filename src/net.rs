//! Blocking transport to the local proxy.
//!
//! One [`Tunnel`] carries exactly one SOCKS4 handshake and one HTTP exchange.
//! It is closed when dropped, so every exit path releases the socket.

use std::{
    io::{self, Read, Write},
    net::{IpAddr, SocketAddr, TcpStream},
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

use crate::Error;

/// Opens tunnels to the proxy. Implemented once per transport.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self, addr: &str, port: u16) -> Result<Tunnel<Self::Stream>, Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, addr: &str, port: u16) -> Result<Tunnel<TcpStream>, Error> {
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        let sa = SocketAddr::new(ip, port);

        let socket = open_socket(Domain::for_address(sa))?;
        socket
            .connect(&SockAddr::from(sa))
            .map_err(|source| Error::Connect { addr: sa, source })?;
        trace!("tunnel connected to {}", sa);
        Ok(Tunnel::new(TcpStream::from(socket)))
    }
}

/// Allocation is its own step so running out of descriptors or buffers is
/// told apart from the proxy refusing the connection.
fn open_socket(domain: Domain) -> Result<Socket, Error> {
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(Error::SocketCreate)
}

pub struct Tunnel<S> {
    stream: Option<S>,
}

impl<S> Tunnel<S> {
    pub fn new(stream: S) -> Tunnel<S> {
        Tunnel {
            stream: Some(stream),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            trace!("tunnel closed");
        }
    }
}

impl<S: Read + Write> Tunnel<S> {
    /// Writes until the whole buffer is accepted. The first failed write is
    /// terminal and reports how far it got.
    pub fn send_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        let total = buf.len();
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => {
                return Err(Error::Send {
                    sent: 0,
                    total,
                    source: not_connected(),
                })
            }
        };

        let mut sent = 0;
        while sent < total {
            match stream.write(&buf[sent..]) {
                Ok(0) => {
                    return Err(Error::Send {
                        sent,
                        total,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(n) => sent += n,
                Err(source) => return Err(Error::Send { sent, total, source }),
            }
        }
        stream.flush().map_err(|source| Error::Send { sent, total, source })?;
        trace!("sent {} bytes", total);
        Ok(())
    }

    /// Single read. `Ok(0)` means the peer closed the connection.
    pub fn recv_once(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Recv(not_connected()))?;
        stream.read(buf).map_err(Error::Recv)
    }
}

impl<S> Drop for Tunnel<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tunnel is closed")
}

/// In-memory tunnels for protocol tests.
#[cfg(test)]
pub(crate) mod mock {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        io::{self, Cursor, Read, Write},
        net::SocketAddr,
        rc::Rc,
    };

    use super::{Connector, Tunnel};
    use crate::Error;

    /// Replays canned bytes, at most `chunk` per read, and records writes.
    pub struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        written: Rc<RefCell<Vec<u8>>>,
        chunk: usize,
        fail_writes_after: Option<usize>,
    }

    impl ScriptedStream {
        pub fn new(input: &[u8]) -> (ScriptedStream, Rc<RefCell<Vec<u8>>>) {
            let written = Rc::new(RefCell::new(Vec::new()));
            let stream = ScriptedStream {
                input: Cursor::new(input.to_vec()),
                written: written.clone(),
                chunk: usize::MAX,
                fail_writes_after: None,
            };
            (stream, written)
        }

        pub fn with_chunk(mut self, chunk: usize) -> Self {
            self.chunk = chunk;
            self
        }

        pub fn fail_writes_after(mut self, n: usize) -> Self {
            self.fail_writes_after = Some(n);
            self
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.input.read(&mut buf[..n])
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut written = self.written.borrow_mut();
            let mut n = buf.len().min(self.chunk);
            if let Some(limit) = self.fail_writes_after {
                if written.len() >= limit {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
                }
                n = n.min(limit - written.len());
            }
            written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Hands out one scripted tunnel per `connect`, in order.
    #[derive(Default)]
    pub struct ScriptedConnector {
        replies: RefCell<VecDeque<Vec<u8>>>,
        sessions: RefCell<Vec<Rc<RefCell<Vec<u8>>>>>,
        live: Rc<Cell<usize>>,
        peak: Cell<usize>,
    }

    impl ScriptedConnector {
        pub fn new<I, B>(replies: I) -> ScriptedConnector
        where
            I: IntoIterator<Item = B>,
            B: AsRef<[u8]>,
        {
            ScriptedConnector {
                replies: RefCell::new(replies.into_iter().map(|r| r.as_ref().to_vec()).collect()),
                ..Default::default()
            }
        }

        pub fn connects(&self) -> usize {
            self.sessions.borrow().len()
        }

        /// Bytes written on the `n`th tunnel.
        pub fn written(&self, n: usize) -> Vec<u8> {
            self.sessions.borrow()[n].borrow().clone()
        }

        /// Most tunnels that were ever open at the same time.
        pub fn peak_open(&self) -> usize {
            self.peak.get()
        }

        pub fn open_now(&self) -> usize {
            self.live.get()
        }
    }

    pub struct CountedStream {
        inner: ScriptedStream,
        live: Rc<Cell<usize>>,
    }

    impl Read for CountedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for CountedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Drop for CountedStream {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    impl Connector for ScriptedConnector {
        type Stream = CountedStream;

        fn connect(&self, addr: &str, port: u16) -> Result<Tunnel<CountedStream>, Error> {
            let reply = self.replies.borrow_mut().pop_front().ok_or_else(|| Error::Connect {
                addr: SocketAddr::new(addr.parse().unwrap(), port),
                source: io::ErrorKind::ConnectionRefused.into(),
            })?;
            let (stream, written) = ScriptedStream::new(&reply);
            self.sessions.borrow_mut().push(written);

            self.live.set(self.live.get() + 1);
            self.peak.set(self.peak.get().max(self.live.get()));

            Ok(Tunnel::new(CountedStream {
                inner: stream,
                live: self.live.clone(),
            }))
        }
    }
}
