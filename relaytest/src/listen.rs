// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A minimal TCP collector.

use relaytest_runner::race::PROBE_PAYLOAD;
use std::{io, net::SocketAddr};
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

/// Receives reports over TCP and copies them to a writer, one connection at a time.
///
/// Host-race probes (a lone `ping` line) are recognized and skipped.
#[derive(Debug)]
pub(crate) struct Collector {
    listener: TcpListener,
}

impl Collector {
    pub(crate) async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until accepting or writing to `out` fails or, if `once` is set, until
    /// one report has been received in full.
    ///
    /// A connection that fails while being read is logged and skipped.
    pub(crate) async fn serve<W>(&self, once: bool, out: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            match receive(stream, out).await? {
                Received::Probe => tracing::debug!("probe from {peer}"),
                Received::Report { lines } => {
                    tracing::info!("received {lines} lines from {peer}");
                    if once {
                        return Ok(());
                    }
                }
                Received::Broken { lines, error } => {
                    tracing::warn!("connection from {peer} failed after {lines} lines: {error}");
                }
            }
        }
    }
}

#[derive(Debug)]
enum Received {
    Probe,
    Report { lines: usize },
    Broken { lines: usize, error: io::Error },
}

/// Copies one connection's lines to `out`. Only write errors are returned as `Err`.

async fn receive<W>(stream: TcpStream, out: &mut W) -> io::Result<Received>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let mut lines = 0;
    let mut held_probe = false;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => return Ok(Received::Broken { lines, error }),
        }

        // A probe line is only a probe if nothing follows it.
        if lines == 0 && !held_probe && line.as_bytes() == PROBE_PAYLOAD {
            held_probe = true;
            continue;
        }
        if held_probe {
            out.write_all(PROBE_PAYLOAD).await?;
            held_probe = false;
            lines += 1;
        }

        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        lines += 1;
    }

    if lines == 0 {
        Ok(Received::Probe)
    } else {
        Ok(Received::Report { lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn send(addr: SocketAddr, contents: &[u8]) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(contents).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn probes_are_skipped() {
        let collector = Collector::bind("127.0.0.1:0").await.unwrap();
        let addr = collector.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut out = Vec::new();
            collector.serve(true, &mut out).await.map(|()| out)
        });

        send(addr, b"ping\n").await;
        send(addr, b"[Runner executing:\tMath]\n\tPASS\n").await;

        let out = server.await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[Runner executing:\tMath]\n\tPASS\n"
        );
    }

    #[tokio::test]
    async fn leading_ping_line_in_a_report_is_kept() {
        let collector = Collector::bind("127.0.0.1:0").await.unwrap();
        let addr = collector.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut out = Vec::new();
            collector.serve(true, &mut out).await.map(|()| out)
        });

        send(addr, b"ping\npong\n").await;

        let out = server.await.unwrap().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "ping\npong\n");
    }

    #[tokio::test]
    async fn bad_connection_does_not_stop_the_collector() {
        let collector = Collector::bind("127.0.0.1:0").await.unwrap();
        let addr = collector.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut out = Vec::new();
            collector.serve(true, &mut out).await.map(|()| out)
        });

        send(addr, b"caf\xe9 bad\n").await;
        send(addr, b"[Runner executing:\tMath]\n").await;

        let out = server.await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[Runner executing:\tMath]\n"
        );
    }
}
