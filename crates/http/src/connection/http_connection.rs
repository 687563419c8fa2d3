use std::io;

use bytes::Bytes;
use futures::StreamExt;
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::select;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::codec::RequestDecoder;
use crate::connection::{Outcome, ResponseWriter, Upgrade, shutdown_transport};
use crate::deadline::{DeadlineSupervisor, Tick};
use crate::handler::Router;
use crate::pipeline::{PendingWrite, PipelineFull, WritePipeline};
use crate::protocol::{ConnectionError, ParseError, bad_request, is_upgrade, keep_alive, not_found, prepare_response};
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 8 * 1024;
const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// An HTTP/1.x connection serving pipelined requests.
///
/// The connection reads requests, asks the router for a response to each and queues
/// the responses in a [`WritePipeline`], writing them strictly in request order with
/// one write in flight. Reading pauses while
///
/// - the pipeline is full (backpressure),
/// - a queued response will close the connection,
/// - an upgrade request waits for the pipeline to drain,
/// - or the peer has ended its stream.
///
/// Every pending operation is raced against the [`DeadlineSupervisor`]; the
/// first expiry shuts the connection down.
pub struct HttpConnection<S> {
    framed_read: FramedRead<ReadHalf<Transport<S>>, RequestDecoder>,
    writer: ResponseWriter<WriteHalf<Transport<S>>>,
    pipeline: WritePipeline<Response<Bytes>>,
    supervisor: DeadlineSupervisor,
}

/// What the read side is doing besides accepting requests.
#[derive(Debug)]
enum ReadState {
    Open,
    /// An upgrade request was read; nothing more is read over HTTP.
    Upgrading(Request<Bytes>),
    /// End of stream, or a request too broken to continue after.
    Done,
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: Transport<S>, supervisor: DeadlineSupervisor) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), READ_BUFFER_SIZE),
            writer: ResponseWriter::with_capacity(writer, WRITE_BUFFER_SIZE),
            pipeline: WritePipeline::default(),
            supervisor,
        }
    }

    /// Replaces the default pipeline depth.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn pipeline_capacity(mut self, capacity: usize) -> Self {
        self.pipeline = WritePipeline::with_capacity(capacity);
        self
    }

    pub async fn process<R>(mut self, router: &R) -> Result<Outcome<S>, ConnectionError>
    where
        R: Router + ?Sized,
    {
        let mut state = ReadState::Open;

        loop {
            if self.pipeline.is_empty() {
                match state {
                    ReadState::Upgrading(request) => return Ok(Outcome::Upgrade(self.into_upgrade(request))),
                    ReadState::Done => {
                        self.close().await;
                        return Ok(Outcome::Closed);
                    }
                    ReadState::Open => {}
                }
            }

            let reading = matches!(state, ReadState::Open) && !self.pipeline.is_full() && !self.pipeline.closing();
            let writing = !self.pipeline.is_empty();
            let expired = self.supervisor.expired();

            select! {
                () = expired => match self.supervisor.tick(Instant::now()) {
                    Tick::Timeout | Tick::ShutdownExpired => {
                        self.close().await;
                        return Err(ConnectionError::TimedOut);
                    }
                    Tick::Rearm | Tick::Idle => {}
                },

                result = self.writer.flush(), if writing => {
                    result?;
                    self.supervisor.refresh();
                    if self.on_write_complete()? {
                        self.close().await;
                        return Ok(Outcome::Closed);
                    }
                }

                frame = self.framed_read.next(), if reading => match frame {
                    Some(Ok(request)) => {
                        self.supervisor.refresh();
                        if is_upgrade(request.method(), request.version(), request.headers()) {
                            trace!(path = request.uri().path(), "upgrade requested");
                            state = ReadState::Upgrading(request);
                        } else {
                            self.dispatch(&request, router)?;
                        }
                    }
                    Some(Err(ParseError::Io { source })) => return Err(ConnectionError::transport("read", source)),
                    Some(Err(e)) => {
                        warn!(cause = %e, "malformed request");
                        let mut response = bad_request();
                        prepare_response(&mut response, http::Version::HTTP_11, false);
                        self.enqueue(PendingWrite::new(response, true))?;
                        state = ReadState::Done;
                    }
                    None => {
                        debug!("peer ended the stream");
                        state = ReadState::Done;
                    }
                },
            }
        }
    }

    fn dispatch<R>(&mut self, request: &Request<Bytes>, router: &R) -> Result<(), ConnectionError>
    where
        R: Router + ?Sized,
    {
        let mut response = match router.at(request) {
            Some(route) => route.handler.call(request, &route.params),
            None => not_found(),
        };
        trace!(method = %request.method(), path = request.uri().path(), status = response.status().as_u16(), "dispatched");

        let keep_alive = keep_alive(request.version(), request.headers());
        let close_after_send = prepare_response(&mut response, request.version(), keep_alive);
        self.enqueue(PendingWrite::new(response, close_after_send))
    }

    fn enqueue(&mut self, item: PendingWrite<Response<Bytes>>) -> Result<(), ConnectionError> {
        match self.pipeline.enqueue(item) {
            Ok(true) => self.encode_head()?,
            Ok(false) => {}
            Err(PipelineFull(_)) => {
                return Err(ConnectionError::transport("enqueue", io::Error::other("write pipeline overflow")));
            }
        }
        if self.pipeline.is_full() {
            trace!(depth = self.pipeline.len(), "pipeline full, reads suspended");
        }
        Ok(())
    }

    /// Retires the written head and starts the next write. Returns whether the
    /// connection must close now.
    fn on_write_complete(&mut self) -> Result<bool, ConnectionError> {
        let Some((done, was_full)) = self.pipeline.on_write_complete() else {
            return Ok(false);
        };
        if was_full {
            trace!("pipeline drained below capacity, reads resumed");
        }
        if done.close_after_send {
            return Ok(true);
        }
        if !self.pipeline.is_empty() {
            self.encode_head()?;
        }
        Ok(false)
    }

    fn encode_head(&mut self) -> Result<(), ConnectionError> {
        if let Some(head) = self.pipeline.head() {
            self.writer.write(&head.message)?;
        }
        Ok(())
    }

    async fn close(self) {
        let HttpConnection { framed_read, writer, mut supervisor, .. } = self;
        let mut transport = framed_read.into_inner().unsplit(writer.into_inner());
        shutdown_transport(&mut transport, &mut supervisor).await;
    }

    fn into_upgrade(self, request: Request<Bytes>) -> Upgrade<S> {
        let HttpConnection { mut framed_read, writer, supervisor, .. } = self;
        let read_buffer = framed_read.read_buffer_mut().split();
        let transport = framed_read.into_inner().unsplit(writer.into_inner());
        Upgrade { transport, request, read_buffer, supervisor }
    }
}

impl<S> std::fmt::Debug for HttpConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("pipeline", &self.pipeline.len())
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
