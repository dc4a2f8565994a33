//! Plain-text rendering of the widget for the terminal shell.
//!
//! Rendering is pure: every frame is a function of one [`View`], so the
//! shell can redraw on each published snapshot without keeping its own state.

use std::fmt::Write as _;
use std::time::Duration;

use crate::error::ConfigError;
use crate::state::{ConnectionStatus, WidgetState};

pub const LOADING_TEXT: &str = "Connecting to the lightbulb...";
pub const NOTICE_TEXT: &str = "This lightbulb is connected globally - if you change it, everyone sees the change!";
pub const UPDATING_TEXT: &str = "Updating...";

const CONFIG_MESSAGE: &str =
    "Supabase URL and/or anon key not configured. Please update your .env.local file.";
const CONNECTION_MESSAGE: &str = "Could not connect to the lightbulb database. Make sure you have created the \
     lightbulb table in Supabase and configured your environment variables correctly.";
const SETUP_STEPS: [&str; 4] = [
    "1. Make sure you've created a Supabase account and project",
    "2. Run the SQL in supabase/schema.sql in the SQL Editor",
    "3. Update .env.local with your Supabase URL and anon key",
    "4. Enable realtime for the lightbulb table in Supabase dashboard",
];

const BULB_ON: &str = r"
     \   |   /
       .---.
   -- ( *** ) --
       \ * /
        |=|
        |=|
        '-'";

const BULB_OFF: &str = r"

       .---.
      (     )
       \   /
        |=|
        |=|
        '-'";

/// Everything the shell can show.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    /// Credentials missing or placeholders; nothing was contacted.
    ConfigurationError(&'a ConfigError),
    /// Initial read in progress.
    Loading,
    /// Initial read failed. The detail is the described backend error.
    ConnectionError(&'a str),
    /// Normal operation.
    Ready(&'a WidgetState),
}

impl View<'_> {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::ConfigurationError(err) => render_setup_error(CONFIG_MESSAGE, &err.to_string()),
            Self::Loading => LOADING_TEXT.to_owned(),
            Self::ConnectionError(detail) => render_setup_error(CONNECTION_MESSAGE, detail),
            Self::Ready(state) => render_ready(state),
        }
    }
}

fn render_setup_error(message: &str, detail: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Connection Error");
    let _ = writeln!(out);
    let _ = writeln!(out, "{message}");
    if !detail.is_empty() {
        let _ = writeln!(out, "({detail})");
    }
    let _ = writeln!(out);
    for step in SETUP_STEPS {
        let _ = writeln!(out, "  {step}");
    }
    let _ = writeln!(out);
    let _ = write!(out, "Restart lightbulb to retry.");
    out
}

fn render_ready(state: &WidgetState) -> String {
    let mut out = String::new();
    let on = state.is_on();
    let _ = writeln!(out, "{}", if on { BULB_ON } else { BULB_OFF });
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", if on { "The light is ON!" } else { "The light is OFF!" });
    let _ = writeln!(out, "Press [t] to toggle it {}", if on { "off" } else { "on" });
    let _ = writeln!(out);
    let _ = writeln!(out, "{NOTICE_TEXT}");

    if let Some(banner) = &state.banner {
        let _ = writeln!(out);
        let _ = writeln!(out, "! {banner}");
    }
    if state.writing {
        let _ = writeln!(out, "{UPDATING_TEXT}");
    }

    let _ = writeln!(out);
    let _ = write!(out, "[{}]", status_text(state));
    if shows_reconnect(state) {
        let _ = write!(out, "  [r] Reconnect");
    }
    if let Some(warning) = &state.warning {
        let _ = write!(out, "\nwarning: {warning}");
    }
    out
}

/// Text of the status pill.
#[must_use]
pub fn status_text(state: &WidgetState) -> String {
    match state.connection_status() {
        ConnectionStatus::Connecting => "Connecting to real-time updates...".to_owned(),
        ConnectionStatus::RealtimeActive => "Real-time updates active".to_owned(),
        ConnectionStatus::UpdateReceived => "Update received!".to_owned(),
        ConnectionStatus::RealtimeFailed => "Real-time updates failed - using polling fallback".to_owned(),
        ConnectionStatus::PollingOnly => {
            format!("Polling for updates every {}s", format_secs(state.poll_interval))
        }
    }
}

/// The reconnect affordance is offered whenever the pill is not live.
#[must_use]
pub fn shows_reconnect(state: &WidgetState) -> bool {
    !state.connection_status().is_live()
}

fn format_secs(period: Duration) -> String {
    let millis = period.as_millis();
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{:.1}", period.as_secs_f64())
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
