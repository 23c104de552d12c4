// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent reachability probing across candidate hosts.
//!
//! [`HostRace`] connects to every candidate at once and picks the first one that accepts a
//! connection and a one-line probe. Probes run on the tokio runtime, bounded by a semaphore.

use std::{io, sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Semaphore, task::JoinSet};

/// The payload written by each probe.
pub const PROBE_PAYLOAD: &[u8] = b"ping\n";

/// The default upper bound for a single probe, including connect and write.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of probes in flight at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// The result of a [`HostRace`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RaceOutcome {
    /// The host that won.
    Winner(String),

    /// Every candidate failed, or there were no candidates.
    NoWinner,
}

impl RaceOutcome {
    /// Returns the winning host, if any.
    pub fn winner(&self) -> Option<&str> {
        match self {
            RaceOutcome::Winner(host) => Some(host),
            RaceOutcome::NoWinner => None,
        }
    }
}

/// Races candidate hosts on a port and returns the first one that answers.
#[derive(Clone, Debug)]
pub struct HostRace {
    port: u16,
    connect_timeout: Duration,
    max_concurrency: usize,
}

impl HostRace {
    /// Creates a new race against the given port, with default settings.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Sets the upper bound for a single probe.
    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the maximum number of probes in flight. Values below 1 are treated as 1.
    pub fn set_max_concurrency(&mut self, max_concurrency: usize) -> &mut Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the race.
    ///
    /// A single candidate is returned without being probed. With several candidates, the first
    /// probe to succeed wins and every other probe is aborted.
    pub async fn race(&self, candidates: &[String]) -> RaceOutcome {
        let port = self.port;
        let attempt = move |host: String| async move { probe(&host, port).await };
        self.race_with(candidates, attempt).await
    }

    /// Runs the race with `attempt` deciding whether a host is reachable.
    pub(crate) async fn race_with<F, Fut>(&self, candidates: &[String], attempt: F) -> RaceOutcome
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        match candidates {
            [] => return RaceOutcome::NoWinner,
            [only] => return RaceOutcome::Winner(only.clone()),
            _ => {}
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();
        for host in candidates {
            let semaphore = semaphore.clone();
            let host = host.clone();
            let connect_timeout = self.connect_timeout;
            let fut = attempt(host.clone());
            join_set.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = tokio::time::timeout(connect_timeout, fut)
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("probe timed out after {connect_timeout:?}"),
                        ))
                    });
                (host, result)
            });
        }

        let mut failures = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((host, Ok(()))) => {
                    tracing::debug!(
                        "host race won by {host}:{} after {failures} failure(s)",
                        self.port
                    );
                    // Close the sockets of the probes still in flight.
                    join_set.abort_all();
                    return RaceOutcome::Winner(host);
                }
                Ok((host, Err(error))) => {
                    failures += 1;
                    tracing::debug!("probe to {host}:{} failed: {error}", self.port);
                }
                Err(error) => {
                    failures += 1;
                    tracing::debug!("probe task failed: {error}");
                }
            }
        }

        debug_assert_eq!(failures, candidates.len());
        RaceOutcome::NoWinner
    }
}

async fn probe(host: &str, port: u16) -> io::Result<()> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(PROBE_PAYLOAD).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn no_candidates_no_winner() {
        let outcome = HostRace::new(1).race(&[]).await;
        assert_eq!(outcome, RaceOutcome::NoWinner);
        assert_eq!(outcome.winner(), None);
    }

    #[tokio::test]
    async fn single_candidate_is_not_probed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let outcome = HostRace::new(port).race(&["127.0.0.1".to_owned()]).await;
        assert_eq!(outcome, RaceOutcome::Winner("127.0.0.1".to_owned()));

        // Nothing connected.
        let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err(), "single candidate must not be probed");
    }

    #[tokio::test]
    async fn single_unreachable_candidate_still_wins() {
        let port = unused_port().await;
        let outcome = HostRace::new(port).race(&["127.0.0.1".to_owned()]).await;
        assert_eq!(outcome.winner(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn reachable_candidate_wins_and_receives_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        // 127.0.0.2 is loopback on Linux but nothing listens on it for this port.
        let candidates = ["127.0.0.2".to_owned(), "127.0.0.1".to_owned()];
        let outcome = HostRace::new(port).race(&candidates).await;
        assert_eq!(outcome, RaceOutcome::Winner("127.0.0.1".to_owned()));
        assert_eq!(server.await.unwrap(), PROBE_PAYLOAD);
    }

    async fn slow_failure(_host: String) -> io::Result<()> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(io::Error::from(io::ErrorKind::TimedOut))
    }

    #[tokio::test]
    async fn fast_winner_does_not_wait_for_slow_candidate() {
        let mut race = HostRace::new(4000);
        race.set_connect_timeout(Duration::from_secs(30));

        let candidates = ["slow".to_owned(), "fast".to_owned()];
        let attempt = |host: String| async move {
            if host == "slow" {
                slow_failure(host).await
            } else {
                Ok(())
            }
        };

        let start = Instant::now();
        let outcome = race.race_with(&candidates, attempt).await;
        assert_eq!(outcome.winner(), Some("fast"));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "race took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn hung_candidates_are_cut_off_by_the_timeout() {
        let mut race = HostRace::new(4000);
        race.set_connect_timeout(Duration::from_millis(200));

        let start = Instant::now();
        let candidates = ["a".to_owned(), "b".to_owned()];
        let outcome = race.race_with(&candidates, slow_failure).await;
        assert_eq!(outcome, RaceOutcome::NoWinner);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "race took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn all_refused_returns_no_winner() {
        let port = unused_port().await;
        let outcome = HostRace::new(port)
            .race(&["127.0.0.1".to_owned(), "127.0.0.2".to_owned()])
            .await;
        assert_eq!(outcome, RaceOutcome::NoWinner);
    }

    #[tokio::test]
    async fn concurrency_of_one_still_finds_winner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
            }
        });

        let mut race = HostRace::new(port);
        race.set_max_concurrency(0)
            .set_connect_timeout(Duration::from_millis(500));
        let candidates = ["127.0.0.2".to_owned(), "127.0.0.1".to_owned()];
        let outcome = race.race(&candidates).await;
        let winner = outcome.winner().expect("one candidate is reachable");
        assert!(candidates.iter().any(|c| c == winner));
    }
}
