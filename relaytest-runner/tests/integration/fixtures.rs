// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use relaytest_runner::{
    events::CaseError,
    platform::DeviceInfo,
    tree::{TestCase, TestSuite},
};
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

pub(crate) fn sample_tree() -> TestSuite {
    TestSuite::new("")
        .with(
            TestSuite::new("Math")
                .with(TestCase::new("Math", "Add", || Ok(())))
                .with(TestCase::new("Math", "Div", || {
                    Err(CaseError::failure("expected 2\r\nbut was 3")
                        .with_stack_trace("at Math.Div()\nat Runner.Run()"))
                })),
        )
        .with(
            TestSuite::new("Strings")
                .with(TestCase::new("Strings", "Upper", || Ok(())).ignored("locale dependent"))
                .with(TestCase::new("Strings", "Lower", || {
                    Err(CaseError::inconclusive("no locale data"))
                })),
        )
}

pub(crate) fn fixed_device() -> DeviceInfo {
    DeviceInfo {
        model: "x86_64".to_owned(),
        system_name: "linux".to_owned(),
        system_version: "6.1".to_owned(),
        name: "ci-runner".to_owned(),
        locale: "en_US".to_owned(),
        bundle_id: "com.example.relaytest".to_owned(),
    }
}

/// A TCP collector: ignores probe connections and returns everything received on the first
/// report connection.
pub(crate) fn tcp_collector() -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut contents = String::new();
            stream.unwrap().read_to_string(&mut contents).unwrap();
            if contents != "ping\n" {
                return contents;
            }
        }
        unreachable!("listener.incoming() never ends")
    });
    (port, handle)
}

/// An HTTP collector: skips the reachability check, reads one chunked request and answers it
/// with `200 OK`. `received` is set once the whole body has been read.
pub(crate) fn http_collector(received: Arc<AtomicBool>) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        // The reachability check.
        drop(listener.accept().unwrap());

        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let body = read_chunked_request(&mut reader);
        received.store(true, Ordering::SeqCst);

        let mut stream: TcpStream = reader.into_inner();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .unwrap();
        body
    });
    (port, handle)
}

fn read_chunked_request(reader: &mut impl BufRead) -> String {
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line == "\r\n" {
            break;
        }
    }

    let mut body = String::new();
    loop {
        let mut size = String::new();
        reader.read_line(&mut size).unwrap();
        let size = usize::from_str_radix(size.trim(), 16).unwrap();
        let mut chunk = vec![0; size + 2];
        reader.read_exact(&mut chunk).unwrap();
        if size == 0 {
            return body;
        }
        body.push_str(std::str::from_utf8(&chunk[..size]).unwrap());
    }
}
