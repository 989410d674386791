//! Demo command implementation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use vtsync_engine::{ClientConfig, SyncStats, ValueListener};
use vtsync_protocol::{Key, ValueRecord};
use vtsync_server::{ServerConfig, SyncServer};

/// How long to wait for each value to come back.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a demo run.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    /// Subscribed key.
    pub key: String,
    /// Values delivered to the listener, in order.
    pub values: Vec<DeliveredValue>,
    /// Confirmed clock at the end of the run.
    pub confirmed_vts: u64,
    /// Engine counters.
    pub stats: StatsReport,
}

/// A value as delivered to the listener.
#[derive(Debug, Serialize)]
pub struct DeliveredValue {
    /// Server clock of the revision.
    pub vts: u64,
    /// Payload, lossily decoded as UTF-8.
    pub data: Option<String>,
}

/// Engine counters worth showing.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// Requests handed to the transport.
    pub requests_sent: u64,
    /// Advance responses processed.
    pub advances_completed: u64,
    /// Fetches scheduled.
    pub fetches_scheduled: u64,
    /// Values delivered.
    pub values_delivered: u64,
    /// Failed operations.
    pub operations_failed: u64,
}

impl From<&SyncStats> for StatsReport {
    fn from(stats: &SyncStats) -> Self {
        Self {
            requests_sent: stats.requests_sent,
            advances_completed: stats.advances_completed,
            fetches_scheduled: stats.fetches_scheduled,
            values_delivered: stats.values_delivered,
            operations_failed: stats.operations_failed,
        }
    }
}

/// Runs the demo command.
pub async fn run(
    key: &str,
    count: usize,
    advance_interval: Duration,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = Key::parse(key)?;
    if key.is_pattern() {
        return Err(format!("cannot publish to pattern {key}").into());
    }

    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let client = super::connect(
        &server,
        ClientConfig::default().with_advance_interval(advance_interval),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: ValueListener = Arc::new(move |value: &ValueRecord| {
        let _ = tx.send(value.clone());
    });
    client.subscribe(key.clone(), listener)?;
    info!(%key, count, "subscribed, publishing");

    for i in 0..count {
        let payload = format!("message {}", i + 1).into_bytes();
        client.publish_async(key.clone(), payload, None).await?;
    }

    let mut values = Vec::with_capacity(count);
    while values.len() < count {
        let value = tokio::time::timeout(DELIVERY_TIMEOUT, rx.recv())
            .await
            .map_err(|_| format!("timed out after {} of {count} values", values.len()))?
            .ok_or("listener closed")?;
        values.push(DeliveredValue {
            vts: value.vts.get(),
            data: value
                .data
                .as_deref()
                .map(|data| String::from_utf8_lossy(data).into_owned()),
        });
    }

    let report = DemoReport {
        key: key.to_string(),
        values,
        confirmed_vts: client.confirmed_vts(&key).get(),
        stats: StatsReport::from(&client.stats()),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &DemoReport) {
    println!("Key: {}", report.key);
    println!();
    println!("Delivered values:");
    for value in &report.values {
        println!(
            "  vts:{:<6} {}",
            value.vts,
            value.data.as_deref().unwrap_or("<deleted>")
        );
    }
    println!();
    println!("Confirmed clock: vts:{}", report.confirmed_vts);
    println!("Requests sent:   {}", report.stats.requests_sent);
    println!("Advances:        {}", report.stats.advances_completed);
    println!("Fetches:         {}", report.stats.fetches_scheduled);
    println!("Delivered:       {}", report.stats.values_delivered);
    println!("Failed ops:      {}", report.stats.operations_failed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_delivers_every_value() {
        run("room/5", 3, Duration::from_millis(10), "json")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn demo_rejects_patterns() {
        let err = run("room/*", 1, Duration::from_millis(10), "text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn stats_report_copies_counters() {
        let stats = SyncStats {
            requests_sent: 4,
            values_delivered: 2,
            ..SyncStats::default()
        };
        let report = StatsReport::from(&stats);
        assert_eq!(report.requests_sent, 4);
        assert_eq!(report.values_delivered, 2);
    }
}
