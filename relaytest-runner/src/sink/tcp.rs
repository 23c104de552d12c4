// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReportSink, SinkCompletion};
use crate::errors::{SinkCloseError, SinkOpenError};
use std::{
    io::{self, BufWriter, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

/// Streams report lines over a raw TCP connection.
///
/// Output is buffered until the end of each line, then flushed, so the collector sees complete
/// lines as soon as they're written.
#[derive(Debug)]
pub(crate) struct TcpSink {
    writer: BufWriter<TcpStream>,
}

impl TcpSink {
    /// Connects to `host:port`, trying each resolved address in turn.
    pub(crate) fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, SinkOpenError> {
        let connect_error = |error| SinkOpenError::Connect {
            host: host.to_owned(),
            port,
            error,
        };

        let mut last_error = None;
        for addr in (host, port).to_socket_addrs().map_err(connect_error)? {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    // Lines are small and must not be held back.
                    stream.set_nodelay(true).map_err(connect_error)?;
                    return Ok(Self {
                        writer: BufWriter::new(stream),
                    });
                }
                Err(error) => last_error = Some(error),
            }
        }

        Err(connect_error(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }
}

impl ReportSink for TcpSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())?;
        if s.contains('\n') {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn close(mut self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError> {
        self.writer.flush()?;
        self.writer.get_ref().shutdown(Shutdown::Write)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{io::Read, net::TcpListener};

    #[test]
    fn lines_arrive_before_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut sink =
            Box::new(TcpSink::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap());
        let (mut server, _) = listener.accept().unwrap();

        writeln!(sink, "[Runner executing:\tRun Everything]").unwrap();
        let expected = b"[Runner executing:\tRun Everything]\n";
        let mut buf = vec![0; expected.len()];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected);

        sink.write_str("tail without newline").unwrap();
        assert!(sink.close().unwrap().is_none());
        let mut rest = String::new();
        server.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "tail without newline");
    }

    #[test]
    fn refused_connection_is_an_open_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let error = TcpSink::connect("127.0.0.1", port, Duration::from_secs(1)).unwrap_err();
        assert!(
            matches!(&error, SinkOpenError::Connect { host, .. } if host == "127.0.0.1"),
            "unexpected error: {error}"
        );
    }
}
