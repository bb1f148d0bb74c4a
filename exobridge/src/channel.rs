//! Point-to-point channel to the supervised child process.
//!
//! One Unix-domain listener, one accepted peer, frames length-delimited with
//! a 4-byte prefix. The receive side always applies a caller-supplied bounded
//! timeout so the host run loop never stalls: while no peer has connected,
//! the wait covers the accept; once connected it covers one framed read.
//! A timeout is a normal, frequent outcome, not a fault.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Frame codec shared by both ends of the channel.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .new_codec()
}

/// Outcome of one bounded receive attempt.
#[derive(Debug)]
pub enum RecvOutcome {
    /// One complete frame.
    Frame(BytesMut),
    /// Nothing arrived within the bound. Not a fault.
    TimedOut,
    /// The peer closed its end. Reported once; the channel then degrades to
    /// timing out every attempt.
    Disconnected,
    /// Transport fault.
    Failed(io::Error),
}

enum Endpoint {
    Listening(UnixListener),
    Connected(Framed<UnixStream, LengthDelimitedCodec>),
    Closed,
}

/// The bridge's end of the duplex socket.
pub struct PairChannel {
    endpoint: Endpoint,
    path: PathBuf,
}

impl PairChannel {
    /// Bind the well-known local endpoint. A stale socket file from a
    /// previous run is removed first. Listening itself never times out;
    /// the peer is picked up by whichever [`recv`](Self::recv) call finds it.
    pub fn listen(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let std_listener = std::os::unix::net::UnixListener::bind(&path)?;
        std_listener.set_nonblocking(true)?;
        let listener = UnixListener::from_std(std_listener)?;

        tracing::debug!(path = %path.display(), "listening for peer");
        Ok(Self {
            endpoint: Endpoint::Listening(listener),
            path,
        })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.endpoint, Endpoint::Connected(_))
    }

    /// One bounded receive attempt.
    pub async fn recv(&mut self, timeout: Duration) -> RecvOutcome {
        if let Endpoint::Listening(listener) = &mut self.endpoint {
            match time::timeout(timeout, listener.accept()).await {
                Err(_) => return RecvOutcome::TimedOut,
                Ok(Err(e)) => return RecvOutcome::Failed(e),
                Ok(Ok((stream, _))) => {
                    tracing::info!(path = %self.path.display(), "peer connected");
                    self.endpoint = Endpoint::Connected(Framed::new(stream, frame_codec()));
                }
            }
        }

        match &mut self.endpoint {
            Endpoint::Connected(framed) => match time::timeout(timeout, framed.next()).await {
                Err(_) => RecvOutcome::TimedOut,
                Ok(Some(Ok(frame))) => RecvOutcome::Frame(frame),
                Ok(Some(Err(e))) => RecvOutcome::Failed(e),
                Ok(None) => {
                    self.endpoint = Endpoint::Closed;
                    RecvOutcome::Disconnected
                }
            },
            // Closed (or accept raced away): burn the bound so callers that
            // count receive attempts keep their timing.
            _ => {
                time::sleep(timeout).await;
                RecvOutcome::TimedOut
            }
        }
    }

    /// Send one complete frame to the peer.
    pub async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        match &mut self.endpoint {
            Endpoint::Connected(framed) => framed.send(frame).await,
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no peer connected",
            )),
        }
    }

    /// Release the socket and remove the endpoint file.
    pub fn close(&mut self) {
        self.endpoint = Endpoint::Closed;
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove socket file");
        }
    }
}

impl Drop for PairChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sock_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("pair.sock")
    }

    #[tokio::test]
    async fn recv_times_out_while_unconnected() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = PairChannel::listen(sock_path(&dir)).unwrap();

        let started = Instant::now();
        let outcome = channel.recv(Duration::from_millis(50)).await;
        assert!(matches!(outcome, RecvOutcome::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let path = sock_path(&dir);
        let mut channel = PairChannel::listen(&path).unwrap();

        let peer = UnixStream::connect(&path).await.unwrap();
        let mut peer = Framed::new(peer, frame_codec());
        peer.send(Bytes::from_static(b"ping")).await.unwrap();

        match channel.recv(Duration::from_secs(1)).await {
            RecvOutcome::Frame(frame) => assert_eq!(&frame[..], b"ping"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(channel.is_connected());

        channel.send(Bytes::from_static(b"pong")).await.unwrap();
        let echoed = peer.next().await.unwrap().unwrap();
        assert_eq!(&echoed[..], b"pong");
    }

    #[tokio::test]
    async fn peer_disconnect_reported_once_then_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = sock_path(&dir);
        let mut channel = PairChannel::listen(&path).unwrap();

        let peer = UnixStream::connect(&path).await.unwrap();
        let mut peer = Framed::new(peer, frame_codec());
        peer.send(Bytes::from_static(b"hello")).await.unwrap();
        assert!(matches!(
            channel.recv(Duration::from_secs(1)).await,
            RecvOutcome::Frame(_)
        ));

        drop(peer);
        assert!(matches!(
            channel.recv(Duration::from_secs(1)).await,
            RecvOutcome::Disconnected
        ));
        assert!(matches!(
            channel.recv(Duration::from_millis(10)).await,
            RecvOutcome::TimedOut
        ));
    }

    #[tokio::test]
    async fn send_before_connect_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = PairChannel::listen(sock_path(&dir)).unwrap();
        let err = channel.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn listen_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = sock_path(&dir);
        // A socket file left behind by a previous run blocks a plain bind.
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let channel = PairChannel::listen(&path).unwrap();
        assert!(!channel.is_connected());
    }
}
