use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use super::window_start;
use crate::alerts::{AlertRaiser, AlertTypes};
use crate::compiler::DROP_MARKER;
use crate::model::BlockedPacketRecord;
use crate::signal::ShutdownToken;
use crate::store::Records;

/// A live, line-oriented log source.
#[async_trait]
pub trait LineSource: Send {
    /// Next line, or `Ok(None)` when nothing is available right now.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Follows a file with `tail -F`, restarting the child when it exits.
pub struct TailFollower {
    path: PathBuf,
    child: Option<Child>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
}

impl TailFollower {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            child: None,
            lines: None,
        }
    }

    fn spawn(&mut self) -> io::Result<()> {
        let mut child = Command::new("tail")
            .arg("-F")
            .arg("-n")
            .arg("0")
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "tail stdout not captured"))?;
        debug!("Following {:?}", self.path);
        self.lines = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        Ok(())
    }
}

#[async_trait]
impl LineSource for TailFollower {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        if self.lines.is_none() {
            self.spawn()?;
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        match lines.next_line().await? {
            Some(line) => Ok(Some(line)),
            None => {
                // tail exited; respawn on the next call
                self.lines = None;
                self.child = None;
                Ok(None)
            }
        }
    }
}

/// Records `FWDROP:` lines and alerts when the trailing window overflows.
pub struct DropLogMonitor {
    records: Records,
    raiser: AlertRaiser,
    threshold: usize,
    window_secs: u64,
    backoff: Duration,
}

impl DropLogMonitor {
    pub fn new(
        records: Records,
        raiser: AlertRaiser,
        threshold: usize,
        window_secs: u64,
        backoff: Duration,
    ) -> Self {
        Self {
            records,
            raiser,
            threshold,
            window_secs,
            backoff,
        }
    }

    /// Process one log line. Returns whether an alert was raised.
    pub async fn handle_line(&self, line: &str, now: DateTime<Utc>) -> Result<bool> {
        if !line.contains(DROP_MARKER) {
            return Ok(false);
        }

        let record = BlockedPacketRecord {
            timestamp: now,
            raw_log_line: line.trim().to_string(),
        };
        let count = self
            .records
            .record_blocked(&record, window_start(now, self.window_secs))
            .await
            .context("Failed to store blocked packet")?;

        self.alert_if_over(count).await
    }

    /// Count drops in the trailing window; alert (strictly) above threshold.
    pub async fn evaluate_window(&self, now: DateTime<Utc>) -> Result<Option<usize>> {
        let count = self
            .records
            .count_blocked_since(window_start(now, self.window_secs))
            .await
            .context("Failed to count blocked packets")?;

        Ok(self.alert_if_over(count).await?.then_some(count))
    }

    async fn alert_if_over(&self, count: usize) -> Result<bool> {
        if count <= self.threshold {
            return Ok(false);
        }
        self.raiser
            .raise(AlertTypes::blocked_burst(count, self.window_secs))
            .await?;
        Ok(true)
    }

    /// Consume `source` until cancelled. Source errors and dry spells back
    /// off and retry.
    pub async fn run<S: LineSource>(self, mut source: S, shutdown: ShutdownToken) {
        info!("Drop-log tailer started");
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = source.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    if let Err(e) = self.handle_line(&line, Utc::now()).await {
                        error!("Drop-log tailer: {:#}", e);
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("Log source unavailable: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
        info!("Drop-log tailer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_support::CapturingSink;
    use crate::store::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Arc;

    const DROP_LINE: &str = "Oct 16 10:00:01 gw kernel: [1234.5] FWDROP: IN=eth0 OUT= SRC=203.0.113.9 DST=10.0.0.2 PROTO=TCP DPT=445";

    struct ScriptedLines(VecDeque<io::Result<Option<String>>>);

    #[async_trait]
    impl LineSource for ScriptedLines {
        async fn next_line(&mut self) -> io::Result<Option<String>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn monitor() -> (DropLogMonitor, Records, Arc<CapturingSink>) {
        let records = Records::new(Arc::new(MemoryStore::new()));
        let sink = Arc::new(CapturingSink::default());
        let raiser = AlertRaiser::new(records.clone(), sink.clone());
        let monitor = DropLogMonitor::new(records.clone(), raiser, 50, 300, Duration::from_millis(100));
        (monitor, records, sink)
    }

    #[tokio::test]
    async fn test_unmarked_lines_ignored() {
        let (monitor, records, _) = monitor();
        let raised = monitor
            .handle_line("Oct 16 10:00:01 gw sshd[1]: Accepted publickey", Utc::now())
            .await
            .unwrap();
        assert!(!raised);
        assert!(records.recent_blocked(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marked_line_recorded_trimmed() {
        let (monitor, records, _) = monitor();
        monitor.handle_line(&format!("{}\n", DROP_LINE), Utc::now()).await.unwrap();
        let stored = records.recent_blocked(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].raw_log_line, DROP_LINE);
    }

    #[tokio::test]
    async fn test_fifty_drops_no_alert_fifty_one_alert() {
        let (monitor, records, sink) = monitor();
        let now = Utc::now();

        for _ in 0..50 {
            assert!(!monitor.handle_line(DROP_LINE, now).await.unwrap());
        }
        assert!(records.recent_alerts(10).await.unwrap().is_empty());

        assert!(monitor.handle_line(DROP_LINE, now).await.unwrap());
        let alerts = records.recent_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, crate::model::AlertLevel::Alert);
        assert!(alerts[0].message.contains("51"));
        sink.wait_for(1).await;
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sustained_flood_keeps_store_bounded() {
        let (monitor, records, _) = monitor();
        let start = Utc::now();

        // 3000 drops, one per second, against a 300s window
        for i in 0..3000 {
            monitor
                .handle_line(DROP_LINE, start + chrono::Duration::seconds(i))
                .await
                .unwrap();
        }
        let stored = records.recent_blocked(10_000).await.unwrap();
        assert_eq!(stored.len(), 301);
    }

    #[tokio::test]
    async fn test_slow_sink_does_not_block_lines() {
        let records = Records::new(Arc::new(MemoryStore::new()));
        let raiser = AlertRaiser::new(records.clone(), Arc::new(StalledSink));
        let monitor = DropLogMonitor::new(records.clone(), raiser, 0, 300, Duration::from_millis(100));

        let handled = tokio::time::timeout(Duration::from_secs(5), async {
            for _ in 0..10 {
                monitor.handle_line(DROP_LINE, Utc::now()).await.unwrap();
            }
        })
        .await;
        assert!(handled.is_ok());
        assert_eq!(records.recent_alerts(100).await.unwrap().len(), 10);
    }

    struct StalledSink;

    #[async_trait]
    impl crate::alerts::AlertSink for StalledSink {
        async fn send(&self, _alert: &crate::model::AlertRecord) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_old_drops_fall_out_of_window() {
        let (monitor, records, _) = monitor();
        let now = Utc::now();
        let stale = now - chrono::Duration::seconds(301);

        for _ in 0..60 {
            records
                .append_blocked(&BlockedPacketRecord {
                    timestamp: stale,
                    raw_log_line: DROP_LINE.to_string(),
                })
                .await
                .unwrap();
        }

        assert!(!monitor.handle_line(DROP_LINE, now).await.unwrap());
        assert_eq!(monitor.evaluate_window(now).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_starvation_and_errors() {
        let (monitor, records, _) = monitor();
        let source = ScriptedLines(VecDeque::from(vec![
            Ok(None),
            Err(io::Error::new(io::ErrorKind::NotFound, "tail: cannot open")),
            Ok(Some(DROP_LINE.to_string())),
            Ok(Some("unrelated".to_string())),
            Ok(Some(DROP_LINE.to_string())),
        ]));

        let token = ShutdownToken::new();
        let handle = tokio::spawn(monitor.run(source, token.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(records.recent_blocked(10).await.unwrap().len(), 2);
    }
}
