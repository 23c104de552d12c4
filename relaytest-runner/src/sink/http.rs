// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReportSink, SinkCompletion};
use crate::errors::{SinkCloseError, SinkCompletionError, SinkOpenError};
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use std::{io, net::IpAddr, time::Duration};
use tokio::{
    net::TcpStream,
    runtime::Handle,
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Streams report lines in the body of a single HTTP `POST` request.
///
/// The request is sent by a background task on the runtime. Lines are handed to it as they're
/// completed; closing the sink ends the body, and the returned [`SinkCompletion`] resolves once the
/// collector responds.
#[derive(Debug)]
pub(crate) struct HttpSink {
    pending: String,
    sender: UnboundedSender<Bytes>,
    request: JoinHandle<Result<(), SinkCompletionError>>,
}

impl HttpSink {
    pub(crate) fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        handle: &Handle,
    ) -> Result<Self, SinkOpenError> {
        // Check the collector is there before committing to it. The request itself only starts
        // failing once the body is being streamed.
        handle
            .block_on(async {
                tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("connection timed out after {connect_timeout:?}"),
                        ))
                    })
            })
            .map_err(|error| SinkOpenError::Connect {
                host: host.to_owned(),
                port,
                error,
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(SinkOpenError::HttpClient)?;

        let (sender, receiver) = mpsc::unbounded_channel::<Bytes>();
        let body = reqwest::Body::wrap_stream(
            UnboundedReceiverStream::new(receiver).map(Ok::<_, io::Error>),
        );
        let url = collector_url(host, port);
        tracing::debug!("streaming results to {url}");

        let request = handle.spawn(async move {
            client
                .post(url)
                .header(CONTENT_TYPE, CONTENT_TYPE_TEXT)
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, SinkCompletionError>(())
        });

        Ok(Self {
            pending: String::new(),
            sender,
            request,
        })
    }

    fn send(&mut self, chunk: String) -> io::Result<()> {
        self.sender.send(Bytes::from(chunk)).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "HTTP request to the collector has ended",
            )
        })
    }
}

impl ReportSink for HttpSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.pending.push_str(s);
        if let Some(end) = self.pending.rfind('\n') {
            let rest = self.pending.split_off(end + 1);
            let lines = std::mem::replace(&mut self.pending, rest);
            self.send(lines)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        self.send(pending)
    }

    fn close(mut self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError> {
        let flushed = self.flush();
        let HttpSink {
            sender, request, ..
        } = *self;
        // Dropping the sender ends the request body.
        drop(sender);

        if let Err(error) = flushed {
            // The request already ended. The completion reports why.
            tracing::debug!("HTTP sink flush failed on close: {error}");
        }

        let completion = async move {
            request.await??;
            Ok::<_, SinkCompletionError>(())
        }
        .boxed();
        Ok(Some(completion))
    }
}

fn collector_url(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(addr)) => format!("http://[{addr}]:{port}/"),
        Ok(IpAddr::V4(_)) | Err(_) => format!("http://{host}:{port}/"),
    }
}
