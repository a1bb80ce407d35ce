//! Fake daemon utilities for client and entry-point tests.
//!
//! Provides a TCP server that speaks the framed call protocol with scripted
//! replies, so tests can exercise the client without a real daemon.

use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use ramona_config::SocketEndpoint;
use ramona_protocol::{
    CallRequest, FrameSection, ProtocolError, ResultTag, encode_response, read_request,
};

/// How the fake daemon answers one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Sends a well-formed response.
    Respond(ResultTag, Vec<u8>),
    /// Sends an `Ok` response carrying the request payload.
    Echo,
    /// Sends arbitrary bytes.
    Raw(Vec<u8>),
    /// Sends nothing and holds the connection open until the client leaves.
    Stall,
    /// Sends the first bytes of a response header, then hangs up.
    Close,
    /// Sends a well-formed response one byte at a time.
    Fragmented(ResultTag, Vec<u8>),
}

impl Reply {
    pub(crate) fn ok(payload: &str) -> Self {
        Self::Respond(ResultTag::Ok, payload.as_bytes().to_vec())
    }

    pub(crate) fn exception(message: &str) -> Self {
        Self::Respond(ResultTag::Exception, message.as_bytes().to_vec())
    }
}

/// A fake daemon accepting a single connection and answering with scripted
/// replies, one per request, in order.
pub(crate) struct FakeDaemon {
    port: u16,
    requests: Arc<Mutex<Vec<CallRequest>>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl FakeDaemon {
    /// Spawns a fake daemon listening on an ephemeral TCP port.
    pub(crate) fn spawn(replies: Vec<Reply>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let requests: Arc<Mutex<Vec<CallRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = Arc::clone(&requests);
        let handle = thread::spawn(move || Self::serve_client(&listener, &replies, &requests_clone));
        Ok(Self {
            port,
            requests,
            handle: Some(handle),
        })
    }

    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        SocketEndpoint::tcp("127.0.0.1", self.port)
    }

    /// Waits for the daemon thread to finish and returns the recorded requests.
    pub(crate) fn finish(mut self) -> Result<Vec<CallRequest>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("fake daemon thread panicked"))?
                .context("fake daemon failed")?;
        }
        let requests = self
            .requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?;
        Ok(requests.clone())
    }

    fn serve_client(
        listener: &TcpListener,
        replies: &[Reply],
        requests: &Arc<Mutex<Vec<CallRequest>>>,
    ) -> Result<()> {
        let Some(mut stream) = accept_within(listener, Duration::from_secs(2))? else {
            return Ok(());
        };
        stream
            .set_nonblocking(false)
            .context("fake daemon blocking stream")?;
        for reply in replies {
            let request = match read_request(&mut stream) {
                Ok(request) => request,
                Err(ProtocolError::PeerClosed {
                    section: FrameSection::Header,
                    received: 0,
                    ..
                }) => return Ok(()),
                Err(error) => return Err(error).context("read request"),
            };
            let echoed = request.payload.clone();
            requests
                .lock()
                .map_err(|error| anyhow!("lock requests: {error}"))?
                .push(request);
            Self::answer(&mut stream, reply, echoed).context("answer request")?;
        }
        Ok(())
    }

    fn answer(stream: &mut TcpStream, reply: &Reply, echoed: Vec<u8>) -> Result<()> {
        match reply {
            Reply::Respond(tag, payload) => {
                stream.write_all(&encode_response(*tag, payload)?)?;
            }
            Reply::Echo => stream.write_all(&encode_response(ResultTag::Ok, &echoed)?)?,
            Reply::Raw(bytes) => stream.write_all(bytes)?,
            Reply::Stall => {
                // Drain until the client hangs up.
                io::copy(stream, &mut io::sink())?;
            }
            Reply::Close => {
                let frame = encode_response(ResultTag::Ok, b"truncated")?;
                stream.write_all(frame.get(..3).unwrap_or_default())?;
            }
            Reply::Fragmented(tag, payload) => {
                for byte in encode_response(*tag, payload)? {
                    stream.write_all(&[byte])?;
                    stream.flush()?;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
        stream.flush()?;
        Ok(())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_within(listener: &TcpListener, limit: Duration) -> Result<Option<TcpStream>> {
    let deadline = Instant::now() + limit;
    loop {
        match listener.accept() {
            Ok((stream, _)) => return Ok(Some(stream)),
            Err(ref error)
                if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(5));
            }
            // No client arrived; exit so tests that never connect do not hang.
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(error) => return Err(error).context("accept connection"),
        }
    }
}

/// Returns a TCP endpoint on which nothing is listening.
pub(crate) fn vacant_endpoint() -> Result<SocketEndpoint> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind vacant port")?;
    let port = listener.local_addr().context("vacant port addr")?.port();
    drop(listener);
    Ok(SocketEndpoint::tcp("127.0.0.1", port))
}
