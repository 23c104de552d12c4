// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReportSink, SinkCompletion};
use crate::errors::{SinkCloseError, SinkOpenError};
use camino::Utf8Path;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
};

/// Appends report output to a local file.
///
/// Writes are not buffered, so every line is in the file as soon as it's written.
#[derive(Debug)]
pub(crate) struct FileSink {
    file: File,
}

impl FileSink {
    pub(crate) fn open(path: &Utf8Path) -> Result<Self, SinkOpenError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|error| SinkOpenError::FileOpen {
                path: path.to_owned(),
                error,
            })?;
        Ok(Self { file })
    }
}

impl ReportSink for FileSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.file.write_all(s.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn close(mut self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError> {
        self.file.flush()?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_and_is_durable_per_write() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("results.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let mut sink = Box::new(FileSink::open(&path).unwrap());
        writeln!(sink, "first").unwrap();
        // Visible before close.
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier run\nfirst\n"
        );
        writeln!(sink, "second").unwrap();
        assert!(sink.close().unwrap().is_none());

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier run\nfirst\nsecond\n"
        );
    }

    #[test]
    fn unwritable_path_is_an_open_error() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("results.log");
        let error = FileSink::open(&path).unwrap_err();
        assert!(
            matches!(&error, SinkOpenError::FileOpen { path: p, .. } if *p == path),
            "unexpected error: {error}"
        );
    }
}
