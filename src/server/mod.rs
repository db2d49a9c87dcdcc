//! Connection multiplexer: a single-threaded readiness loop.
//!
//! One `mio::Poll` drives the whole server. Sockets stay in blocking mode and
//! are registered by raw fd, so once an endpoint is readable the frame layer
//! reads exactly one complete message with ordinary blocking reads. There are
//! no worker threads and no locks: the connection table, the WAL handle and
//! the shared [`FrameBuf`] are all private to this loop, and dispatch is
//! strictly serial — the visible order of mutations is the order in which
//! frames were fully received.
//!
//! Per iteration: wait for readiness, accept pending clients into the first
//! free slots (over-capacity clients are closed with a warning), serve one
//! request per ready connection, then probe the checkpoint threshold.

pub mod index;
pub mod table;

pub use index::IndexServer;
pub use table::TableServer;

use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use tracing::{error, info, warn};

use crate::shutdown::Shutdown;
use crate::wal::Wal;
use crate::wire::FrameBuf;

/// Size of the connection table.
pub const MAX_CONNECTIONS: usize = 128;

/// Poll timeout; bounds the latency of terminate-flag observation.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

const LISTENER: Token = Token(MAX_CONNECTIONS);

/// What the state machine decided about the frame in the shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response frame was encoded into the buffer; send it.
    Respond,
    /// Protocol violation; drop the connection without responding.
    Close,
}

/// A server state machine driven by the multiplexer.
pub trait Dispatch {
    /// Handle the request frame in `buf`, leaving the response in it.
    /// `wal` is absent during WAL replay so replay is not itself logged.
    fn dispatch(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome;

    /// Probe the checkpoint threshold; export and truncate when crossed.
    fn maybe_checkpoint(&mut self, wal: &mut Wal);
}

/// Run the serve loop until the terminate flag is raised.
///
/// Consumes the listener; the caller unlinks the socket path afterwards.
pub fn serve<D: Dispatch>(
    core: &mut D,
    listener: UnixListener,
    mut wal: Wal,
    shutdown: &Shutdown,
) -> io::Result<()> {
    listener.set_nonblocking(true)?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(MAX_CONNECTIONS + 1);

    let listener_fd = listener.as_raw_fd();
    poll.registry()
        .register(&mut SourceFd(&listener_fd), LISTENER, Interest::READABLE)?;

    let mut conns: Vec<Option<UnixStream>> = (0..MAX_CONNECTIONS).map(|_| None).collect();
    let mut buf = FrameBuf::new();

    while !shutdown.requested() {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("fatal error waiting for readiness: {err}");
                break;
            }
        }

        for event in events.iter() {
            match event.token() {
                LISTENER => accept_ready(&listener, &mut conns, poll.registry()),
                Token(slot) => {
                    serve_one(core, &mut buf, &mut wal, &mut conns, slot, poll.registry());
                }
            }
        }

        core.maybe_checkpoint(&mut wal);
    }

    info!("end main loop");
    for slot in 0..MAX_CONNECTIONS {
        close_slot(&mut conns, slot, poll.registry());
    }
    Ok(())
}

/// Drain the accept queue into free slots; close the overflow.
fn accept_ready(
    listener: &UnixListener,
    conns: &mut [Option<UnixStream>],
    registry: &Registry,
) {
    loop {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                error!("accept failed: {err}");
                return;
            }
        };

        let Some(slot) = conns.iter().position(|c| c.is_none()) else {
            warn!("max connections reached - new client closed");
            continue;
        };

        // Back to blocking: frame reads must consume exactly one message.
        if let Err(err) = stream.set_nonblocking(false) {
            warn!("failed to configure client socket: {err}");
            continue;
        }

        let fd = stream.as_raw_fd();
        if let Err(err) =
            registry.register(&mut SourceFd(&fd), Token(slot), Interest::READABLE)
        {
            warn!("failed to register client socket: {err}");
            continue;
        }
        conns[slot] = Some(stream);
    }
}

/// Receive, dispatch and answer exactly one request on a ready connection.
fn serve_one<D: Dispatch>(
    core: &mut D,
    buf: &mut FrameBuf,
    wal: &mut Wal,
    conns: &mut [Option<UnixStream>],
    slot: usize,
    registry: &Registry,
) {
    let received = match conns.get_mut(slot).and_then(|c| c.as_mut()) {
        Some(stream) => buf.recv(stream).is_ok(),
        None => return,
    };
    if !received {
        warn!("connection closed due to protocol or receive error");
        close_slot(conns, slot, registry);
        return;
    }

    match core.dispatch(buf, Some(wal)) {
        Outcome::Close => close_slot(conns, slot, registry),
        Outcome::Respond => {
            let sent_fd = conns.get_mut(slot).and_then(|c| c.as_mut()).and_then(
                |stream| match buf.send(stream) {
                    Ok(()) => Some(stream.as_raw_fd()),
                    Err(_) => None,
                },
            );
            match sent_fd {
                None => close_slot(conns, slot, registry),
                Some(fd) => {
                    // mio readiness is edge-triggered: re-arm so a request
                    // already buffered behind the one just consumed is
                    // reported again.
                    if let Err(err) =
                        registry.reregister(&mut SourceFd(&fd), Token(slot), Interest::READABLE)
                    {
                        warn!("failed to re-arm client socket: {err}");
                        close_slot(conns, slot, registry);
                    }
                }
            }
        }
    }
}

fn close_slot(conns: &mut [Option<UnixStream>], slot: usize, registry: &Registry) {
    if let Some(stream) = conns.get_mut(slot).and_then(|c| c.take()) {
        let fd = stream.as_raw_fd();
        let _ = registry.deregister(&mut SourceFd(&fd));
    }
}
