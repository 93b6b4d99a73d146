//! `campus-checkin` binary.
//!
//! Renders attendee QR codes, runs a scanner session from the command line
//! and inspects RSVPs and attendance.

use anyhow::Context;
use campus_checkin::check_in::CheckInEnvironment;
use campus_checkin::cli::{Cli, Command, QrFormat};
use campus_checkin::config::{Config, StorageBackend};
use campus_checkin::types::{Attendance, EventId, UserId};
use campus_checkin::{
    AttendanceLedger, QrCodec, QrPayload, RsvpService, ScanStatus, ScannerSession, seed,
};
use campus_events_core::document_store::DocumentStore;
use campus_events_core::environment::{Clock, SystemClock};
use campus_events_postgres::PostgresDocumentStore;
use campus_events_testing::InMemoryDocumentStore;
use clap::Parser;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = cli.apply(Config::from_env());

    // Logs go to stderr so rendered codes can be piped from stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(backend = %config.storage.backend, "Configuration loaded");

    if let Command::Qr { event, user, format, output, size } = &cli.command {
        let codec = QrCodec::new(size.unwrap_or(config.scanner.qr_pixel_size));
        return render_qr(&codec, event, user, *format, output.as_deref());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let documents = open_store(&config, &clock).await?;

    match cli.command {
        Command::Qr { .. } => Ok(()),
        Command::Scan { payloads } => scan(documents, clock, &config, &payloads).await,
        Command::Rsvp { event, user, status } => {
            let rsvp = RsvpService::new(documents, clock)
                .set_status(&event, &user, status)
                .await?;
            println!("{} -> {}", rsvp.id(), rsvp.status);
            Ok(())
        },
        Command::Record { event, user, notes } => {
            let organizer = UserId::new(config.scanner.organizer_id.as_str());
            let id = AttendanceLedger::new(documents, clock)
                .record_attendance(&event, &user, &organizer, notes)
                .await?;
            println!("recorded {id}");
            Ok(())
        },
        Command::Attendance { event } => {
            let records = AttendanceLedger::new(documents, clock).for_event(&event).await?;
            print_attendance(&event, &records);
            Ok(())
        },
        Command::Watch { event } => watch(documents, clock, &event).await,
        Command::Seed => {
            let summary = seed::seed(documents, clock).await?;
            println!(
                "seeded {} users, {} events, {} RSVPs",
                summary.users, summary.events, summary.rsvps
            );
            Ok(())
        },
        Command::Reset => {
            let rsvps = RsvpService::new(Arc::clone(&documents), Arc::clone(&clock))
                .clear_all()
                .await?;
            let attendance = AttendanceLedger::new(documents, clock).clear_all().await?;
            println!("removed {rsvps} RSVPs and {attendance} attendance records");
            Ok(())
        },
    }
}

/// Open the configured document store.
///
/// The in-memory store starts out seeded so every subcommand has data to
/// work on.
async fn open_store(
    config: &Config,
    clock: &Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PostgresDocumentStore::connect(
                &config.storage.database_url,
                config.storage.max_connections,
                config.storage.min_connections,
            )
            .await
            .context("connecting to the document database")?;
            store.migrate().await.context("running migrations")?;
            Ok(Arc::new(store))
        },
        StorageBackend::Memory => {
            let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
            seed::seed(Arc::clone(&documents), Arc::clone(clock)).await?;
            Ok(documents)
        },
    }
}

fn render_qr(
    codec: &QrCodec,
    event: &EventId,
    user: &UserId,
    format: QrFormat,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let payload = QrPayload::new(event.clone(), user.clone())?;
    let bytes = match format {
        QrFormat::Png => codec.render_png(&payload)?,
        QrFormat::Svg => codec.render_svg(&payload)?.into_bytes(),
        QrFormat::Text => codec.render_text(&payload)?.into_bytes(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(payload = %payload, path = %path.display(), "QR code written");
        },
        None => std::io::stdout().lock().write_all(&bytes)?,
    }
    Ok(())
}

async fn scan(
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: &Config,
    payloads: &[String],
) -> anyhow::Result<()> {
    let organizer = UserId::new(config.scanner.organizer_id.as_str());
    let session = ScannerSession::new(
        CheckInEnvironment::new(documents, clock, organizer),
        config.scanner.scan_timeout(),
    );

    for text in payloads {
        match session.process_qr_code(text).await? {
            ScanStatus::Success(receipt) => println!(
                "{text}: checked in {} at {}",
                receipt.user_id,
                receipt.checked_in_at.to_rfc3339()
            ),
            ScanStatus::Error(error) => println!("{text}: {error}"),
            other => println!("{text}: {}", other.label()),
        }
        session.reset().await?;
    }

    let state = session.state().await;
    println!("{} checked in, {} rejected", state.checked_in, state.rejected);
    session.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

async fn watch(
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    event: &EventId,
) -> anyhow::Result<()> {
    let snapshots = AttendanceLedger::new(documents, clock).watch_event(event).await?;
    let mut snapshots = std::pin::pin!(snapshots);

    loop {
        tokio::select! {
            snapshot = snapshots.next() => match snapshot {
                Some(records) => print_attendance(event, &records?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped watching");
                break;
            },
        }
    }
    Ok(())
}

fn print_attendance(event: &EventId, records: &[Attendance]) {
    println!("{event}: {} checked in", records.len());
    for record in records {
        println!(
            "  {}  {}  by {}{}",
            record.check_in_time.to_rfc3339(),
            record.user_id,
            record.organizer_id,
            record.notes.as_deref().map(|n| format!("  ({n})")).unwrap_or_default()
        );
    }
}
