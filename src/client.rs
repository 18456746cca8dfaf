//! An async client driving [`SshIo`] over a tokio stream.

use crate::{
    config::ClientConfig,
    session::{Host, Output, SshIo, State},
};
use bytes::Buf;
use futures::{
    future::poll_fn,
    ready,
    task::{self, Poll},
};
use std::{future::Future, io, mem, pin::Pin, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt as _, ReadBuf},
    sync::watch,
    time::Sleep,
};

/// How long a failed session keeps trying to write out its last messages.
const FAILURE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// The [`Host`] of a [`Client`]: collects outbound bytes until they are
/// written to the stream.
#[derive(Debug)]
pub struct Outbox {
    buf: Vec<u8>,
    terminal_type: String,
    window_size: (u32, u32),
    local_echo: bool,
}

impl Outbox {
    /// Whether the terminal should echo typed input itself.
    pub fn local_echo(&self) -> bool {
        self.local_echo
    }
}

impl Host for Outbox {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn terminal_type(&self) -> String {
        self.terminal_type.clone()
    }

    fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    fn set_local_echo(&mut self, echo: bool) {
        self.local_echo = echo;
    }
}

/// A remote shell session over `T`.
pub struct Client<T> {
    stream: T,
    session: SshIo<Outbox>,
    send: SendState,
    send_buf: Vec<u8>,
    recv_buf: Vec<u8>,
    state_tx: watch::Sender<State>,
    handshake_timeout: Duration,
    failure: Option<crate::Error>,
    failure_deadline: Option<Pin<Box<Sleep>>>,
}

enum SendState {
    Available,
    Writing(usize),
    Flushing,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T, config: ClientConfig) -> Self {
        let ClientConfig {
            session,
            handshake_timeout,
            terminal_type,
            window_size,
            recv_buffer_size,
        } = config;

        let outbox = Outbox {
            buf: vec![],
            terminal_type,
            window_size,
            local_echo: true,
        };
        let (state_tx, _) = watch::channel(State::Init);

        Self {
            stream,
            session: SshIo::new(outbox, session),
            send: SendState::Available,
            send_buf: vec![],
            recv_buf: vec![0u8; recv_buffer_size.max(1)],
            state_tx,
            handshake_timeout,
            failure: None,
            failure_deadline: None,
        }
    }

    /// The protocol engine.
    pub fn session(&self) -> &SshIo<Outbox> {
        &self.session
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    /// Watch the session state.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state_tx.subscribe()
    }

    /// Outputs the server sent ahead of a frame that failed the session.
    pub fn take_undelivered(&mut self) -> Vec<Output> {
        self.session.take_undelivered()
    }

    /// Run the session until the shell is running, or until the service
    /// request in protocol 2.
    ///
    /// Returns what the server sent to be displayed along the way. If the
    /// handshake fails, those outputs are left for
    /// [`take_undelivered`](Self::take_undelivered).
    pub async fn handshake(&mut self) -> Result<Vec<Output>, crate::Error> {
        let timeout = self.handshake_timeout;
        let handshake = async {
            let mut outputs = vec![];
            loop {
                match self.state() {
                    State::Interactive | State::ServiceRequested => return Ok(outputs),
                    State::Disconnected if self.failure.is_none() => {
                        self.session.keep_undelivered(outputs);
                        return Err(self.closed());
                    }
                    _ => {}
                }
                match poll_fn(|cx| self.poll_recv(cx)).await {
                    Ok(more) => outputs.extend(more),
                    Err(err) => {
                        self.session.keep_undelivered(outputs);
                        return Err(err);
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, handshake).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::debug!("handshake did not complete in {:?}", timeout);
                self.session.disconnect();
                self.publish_state();
                Err(crate::Error::timeout())
            }
        }
    }

    /// Wait for the next output of the session.
    pub async fn recv(&mut self) -> Result<Vec<Output>, crate::Error> {
        loop {
            if self.state() == State::Disconnected && self.failure.is_none() {
                return Err(self.closed());
            }
            let outputs = poll_fn(|cx| self.poll_recv(cx)).await?;
            if !outputs.is_empty() {
                return Ok(outputs);
            }
        }
    }

    /// Send terminal input.
    pub async fn send(&mut self, data: &str) -> Result<(), crate::Error> {
        self.session.send_data(data)?;
        poll_fn(|cx| self.poll_flush(cx)).await
    }

    pub async fn set_window_size(&mut self, cols: u32, rows: u32) -> Result<(), crate::Error> {
        self.session.set_window_size(cols, rows)?;
        poll_fn(|cx| self.poll_flush(cx)).await
    }

    /// Say goodbye to the server and shut the stream down.
    pub async fn disconnect(&mut self, reason: &str) -> Result<(), crate::Error> {
        let span = tracing::trace_span!("Client::disconnect");
        let _enter = span.enter();

        let result = self.session.close(reason);
        self.publish_state();
        poll_fn(|cx| self.poll_flush(cx)).await?;
        self.stream.shutdown().await.map_err(crate::Error::io)?;
        result
    }

    /// The error for a session that has already ended.
    fn closed(&self) -> crate::Error {
        match self.session.disconnect_reason() {
            Some(reason) => crate::Error::disconnected_by_server(reason),
            None => crate::Error::disconnected(),
        }
    }

    fn publish_state(&mut self) {
        let state = self.session.state();
        if *self.state_tx.borrow() != state {
            tracing::trace!("--> {:?}", state);
            self.state_tx.send_replace(state);
        }
    }

    fn poll_recv(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<Vec<Output>, crate::Error>> {
        let span = tracing::trace_span!("Client::poll_recv");
        let _enter = span.enter();

        if self.failure.is_some() {
            return self.poll_deliver_failure(cx).map(Err);
        }

        ready!(self.poll_flush(cx))?;

        let mut read_buf = ReadBuf::new(&mut self.recv_buf[..]);
        let polled = Pin::new(&mut self.stream).poll_read(cx, &mut read_buf);
        if let Err(err) = ready!(polled) {
            return Poll::Ready(Err(self.fail(crate::Error::io(err))));
        }
        let filled = read_buf.filled().len();

        if filled == 0 {
            tracing::debug!("the server closed the connection");
            return Poll::Ready(Err(self.fail(crate::Error::io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by the server",
            )))));
        }

        let result = self.session.handle_inbound(&self.recv_buf[..filled]);
        self.publish_state();
        let outputs = match result {
            Ok(outputs) => outputs,
            Err(err) => {
                self.failure = Some(err);
                return self.poll_deliver_failure(cx).map(Err);
            }
        };

        // Replies are written on the next poll; a pending write does not
        // hold back the outputs already decoded.
        if let Poll::Ready(Err(err)) = self.poll_flush(cx) {
            return Poll::Ready(Err(err));
        }
        Poll::Ready(Ok(outputs))
    }

    fn poll_flush(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), crate::Error>> {
        match ready!(self.poll_write_outbox(cx)) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(self.fail(err))),
        }
    }

    /// Write out what the engine queued on its way down, typically a
    /// disconnect message, then yield the error that ended the session.
    ///
    /// Write errors are ignored and a peer that stops reading is given up on
    /// after [`FAILURE_FLUSH_TIMEOUT`].
    fn poll_deliver_failure(&mut self, cx: &mut task::Context<'_>) -> Poll<crate::Error> {
        match self.poll_write_outbox(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(err)) => {
                tracing::debug!("could not flush the outbox: {}", err);
                self.abandon_send();
            }
            Poll::Pending => {
                let deadline = self
                    .failure_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(FAILURE_FLUSH_TIMEOUT)));
                ready!(deadline.as_mut().poll(cx));
                tracing::debug!("gave up flushing the outbox");
                self.abandon_send();
            }
        }
        self.failure_deadline = None;
        Poll::Ready(self.failure.take().unwrap_or_else(|| self.closed()))
    }

    fn abandon_send(&mut self) {
        self.send = SendState::Available;
        self.send_buf.clear();
        self.session.host_mut().buf.clear();
    }

    /// Tear the session down after a transport failure.
    fn fail(&mut self, err: crate::Error) -> crate::Error {
        tracing::debug!("transport failed: {}", err);
        self.session.disconnect();
        self.publish_state();
        err
    }

    fn poll_write_outbox(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), crate::Error>> {
        let mut stream = Pin::new(&mut self.stream);
        loop {
            match self.send {
                SendState::Available => {
                    let outbox = &mut self.session.host_mut().buf;
                    if outbox.is_empty() {
                        return Poll::Ready(Ok(()));
                    }
                    self.send_buf = mem::take(outbox);
                    self.send = SendState::Writing(0);
                }

                SendState::Writing(ref mut written) => {
                    let mut buf = &self.send_buf[*written..];
                    while buf.has_remaining() {
                        let amt = ready!(stream.as_mut().poll_write(cx, buf.chunk()))
                            .map_err(crate::Error::io)?;
                        if amt == 0 {
                            return Poll::Ready(Err(crate::Error::io(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "failed to write to the stream",
                            ))));
                        }
                        buf.advance(amt);
                        *written += amt;
                    }
                    self.send_buf.clear();
                    self.send = SendState::Flushing;
                }

                SendState::Flushing => {
                    ready!(stream.as_mut().poll_flush(cx)).map_err(crate::Error::io)?;
                    self.send = SendState::Available;
                }
            }
        }
    }
}
