//! Command-line interface of the `campus-checkin` binary.

use crate::config::{Config, StorageBackend};
use crate::types::{EventId, RsvpStatus, UserId};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Campus events: RSVPs and QR code check-in.
#[derive(Debug, Parser)]
#[command(name = "campus-checkin", version, about)]
pub struct Cli {
    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, global = true)]
    pub backend: Option<StorageBackend>,

    /// Postgres connection URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Organizer operating the scanner (overrides ORGANIZER_ID)
    #[arg(long, global = true)]
    pub organizer: Option<String>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render the check-in QR code for an attendee
    Qr {
        /// Event id
        event: EventId,
        /// Attendee id
        user: UserId,
        /// Output format
        #[arg(long, value_enum, default_value_t = QrFormat::Text)]
        format: QrFormat,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Image side length in pixels (overrides QR_PIXEL_SIZE)
        #[arg(long)]
        size: Option<u32>,
    },

    /// Check attendees in from scanned QR text, one payload per argument
    Scan {
        /// Decoded QR text such as `event1:user3`
        #[arg(required = true)]
        payloads: Vec<String>,
    },

    /// Set a user's RSVP status
    Rsvp {
        /// Event id
        event: EventId,
        /// User id
        user: UserId,
        /// GOING, MAYBE or NOT_GOING
        status: RsvpStatus,
    },

    /// Record attendance by hand, with or without an RSVP
    Record {
        /// Event id
        event: EventId,
        /// Attendee id
        user: UserId,
        /// Free-form note stored on the record
        #[arg(long)]
        notes: Option<String>,
    },

    /// List attendance for an event, newest first
    Attendance {
        /// Event id
        event: EventId,
    },

    /// Print the attendance list every time it changes
    Watch {
        /// Event id
        event: EventId,
    },

    /// Write demo users, events and RSVPs
    Seed,

    /// Delete every RSVP and attendance record
    Reset,
}

/// QR output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QrFormat {
    /// PNG image
    Png,
    /// SVG document
    Svg,
    /// Block characters for a terminal
    Text,
}

impl Cli {
    /// Apply command-line overrides on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(url) = &self.database_url {
            config.storage.database_url.clone_from(url);
        }
        if let Some(organizer) = &self.organizer {
            config.scanner.organizer_id.clone_from(organizer);
        }
        config
    }
}
