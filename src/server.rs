//! Remote terminal: one command line per text line over TCP
//!
//! Connections only move lines around. A single dispatcher task owns the
//! [`Context`] and every session's state, so commands from all clients
//! run one at a time against the same configuration.
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::command::Privilege;
use crate::dispatch::{dispatch, Context, Session, SessionState};

type SessionId = u64;

/// Longest accepted command line in bytes, longer lines are discarded
pub const MAX_LINE_LENGTH: usize = 4096;

#[derive(Debug)]
enum Request {
    Connect(SessionId, SocketAddr, mpsc::UnboundedSender<String>, CancellationToken),
    Line(SessionId, String),
    Disconnect(SessionId),
}

/// Session of a TCP client, output is queued for its writer task
struct RemoteSession {
    remote: SocketAddr,
    state: SessionState,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl Session for RemoteSession {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn sendln(&mut self, line: &str) {
        if self.tx.send(line.to_string()).is_err() {
            trace!("{} gone, dropped output [{}]", self.remote, line);
        }
    }
}

pub async fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening for remote terminals on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept remote terminals until the listener fails
pub async fn serve(listener: TcpListener, ctx: Context) -> io::Result<()> {
    let (requests, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_dispatcher(ctx, rx));

    let mut next_id: SessionId = 0;
    loop {
        let (stream, remote) = listener.accept().await?;
        next_id += 1;
        debug!("Session {} connected from {}", next_id, remote);
        tokio::spawn(handle_connection(next_id, stream, remote, requests.clone()));
    }
}

async fn run_dispatcher(mut ctx: Context, mut rx: mpsc::UnboundedReceiver<Request>) {
    let mut sessions: HashMap<SessionId, RemoteSession> = HashMap::new();
    while let Some(request) = rx.recv().await {
        match request {
            Request::Connect(id, remote, tx, cancel) => {
                let mut session = RemoteSession {
                    remote,
                    state: SessionState::new(Privilege::Exec),
                    tx,
                    cancel,
                };
                session.sendln(&format!("routerd {} daemon: remote terminal", ctx.daemon));
                session.sendln("use 'quit' to exit remote terminal");
                info!("Remote terminal opened: {}", remote);
                sessions.insert(id, session);
            }
            Request::Line(id, line) => {
                let closed = match sessions.get_mut(&id) {
                    Some(session) => {
                        let level = session.privilege();
                        if let Err(err) = dispatch(&mut ctx, &line, session, level) {
                            debug!("{} [{}]: {}", session.remote, line, err);
                            session.sendln(&format!("error: {}", err));
                        }
                        session.is_closed()
                    }
                    None => {
                        warn!("Line for unknown session {}: [{}]", id, line);
                        false
                    }
                };
                if closed {
                    if let Some(session) = sessions.remove(&id) {
                        info!("Remote terminal closed: {}", session.remote);
                        session.cancel.cancel();
                    }
                }
            }
            Request::Disconnect(id) => {
                if let Some(session) = sessions.remove(&id) {
                    info!("Remote terminal disconnected: {}", session.remote);
                }
            }
        }
    }
    debug!("Dispatcher stopped");
}

async fn handle_connection(
    id: SessionId,
    stream: TcpStream,
    remote: SocketAddr,
    requests: mpsc::UnboundedSender<Request>,
) {
    let codec = LinesCodec::new_with_max_length(MAX_LINE_LENGTH);
    let (mut sink, mut lines) = Framed::new(stream, codec).split::<String>();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let notices = tx.clone();
    let cancel = CancellationToken::new();
    if requests
        .send(Request::Connect(id, remote, tx, cancel.clone()))
        .is_err()
    {
        warn!("Dispatcher is gone, dropping {}", remote);
        return;
    }

    // Ends once the dispatcher drops the session
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(err) = sink.send(line).await {
                debug!("Write to {} failed: {}", remote, err);
                break;
            }
        }
    });

    // the stream yields one None after a decode error, then reads on
    let mut resuming = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    resuming = false;
                    if requests.send(Request::Line(id, line)).is_err() {
                        break;
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    debug!("Discarding line over {} bytes from {}", MAX_LINE_LENGTH, remote);
                    let notice = format!("error: line exceeds {} bytes, discarded", MAX_LINE_LENGTH);
                    let _ = notices.send(notice);
                    resuming = true;
                }
                Some(Err(err)) => {
                    warn!("Read from {} failed: {}", remote, err);
                    break;
                }
                None if resuming => resuming = false,
                None => break,
            },
        }
    }
    // writer ends only once every output sender is gone
    drop(notices);
    // no-op when the session already quit
    let _ = requests.send(Request::Disconnect(id));
    if let Err(err) = writer.await {
        warn!("Writer for {} failed: {}", remote, err);
    }
}
