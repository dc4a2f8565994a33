use super::*;
use crate::state::ToggleState;

fn ready(value: bool, link: ConnectionStatus) -> WidgetState {
    let mut state = WidgetState::new(ToggleState::new(1, value), Duration::from_secs(5));
    state.link = link;
    state
}

// =============================================================================
// status pill
// =============================================================================

#[test]
fn pill_text_per_status() {
    assert_eq!(status_text(&ready(true, ConnectionStatus::Connecting)), "Connecting to real-time updates...");
    assert_eq!(status_text(&ready(true, ConnectionStatus::RealtimeActive)), "Real-time updates active");
    assert_eq!(
        status_text(&ready(true, ConnectionStatus::RealtimeFailed)),
        "Real-time updates failed - using polling fallback"
    );

    let mut flashing = ready(true, ConnectionStatus::RealtimeActive);
    flashing.update_flash = true;
    assert_eq!(status_text(&flashing), "Update received!");
}

#[test]
fn polling_pill_shows_current_period() {
    let mut state = ready(false, ConnectionStatus::PollingOnly);
    state.poll_interval = Duration::from_millis(1_500);
    assert_eq!(status_text(&state), "Polling for updates every 1.5s");

    state.poll_interval = Duration::from_secs(5);
    assert_eq!(status_text(&state), "Polling for updates every 5s");
}

#[test]
fn reconnect_offered_only_when_not_live() {
    assert!(!shows_reconnect(&ready(true, ConnectionStatus::RealtimeActive)));
    assert!(shows_reconnect(&ready(true, ConnectionStatus::Connecting)));
    assert!(shows_reconnect(&ready(true, ConnectionStatus::RealtimeFailed)));
    assert!(shows_reconnect(&ready(true, ConnectionStatus::PollingOnly)));

    let mut flashing = ready(true, ConnectionStatus::PollingOnly);
    flashing.update_flash = true;
    assert!(!shows_reconnect(&flashing));
}

// =============================================================================
// render
// =============================================================================

#[test]
fn ready_view_on() {
    let text = View::Ready(&ready(true, ConnectionStatus::RealtimeActive)).render();
    assert!(text.contains("The light is ON!"));
    assert!(text.contains("toggle it off"));
    assert!(text.contains(NOTICE_TEXT));
    assert!(text.contains("[Real-time updates active]"));
    assert!(!text.contains("[r] Reconnect"));
    assert!(!text.contains(UPDATING_TEXT));
}

#[test]
fn ready_view_off_with_banner_writing_and_warning() {
    let mut state = ready(false, ConnectionStatus::PollingOnly);
    state.writing = true;
    state.banner = Some("Error toggling lightbulb: boom".into());
    state.warning = Some("request failed: refused".into());

    let text = View::Ready(&state).render();
    assert!(text.contains("The light is OFF!"));
    assert!(text.contains("toggle it on"));
    assert!(text.contains("! Error toggling lightbulb: boom"));
    assert!(text.contains(UPDATING_TEXT));
    assert!(text.contains("[r] Reconnect"));
    assert!(text.ends_with("warning: request failed: refused"));
}

#[test]
fn configuration_error_view_lists_setup_steps() {
    let err = ConfigError::Placeholder { var: "SUPABASE_URL" };
    let text = View::ConfigurationError(&err).render();
    assert!(text.starts_with("Connection Error"));
    assert!(text.contains("not configured"));
    assert!(text.contains("SUPABASE_URL is still set to its placeholder value"));
    assert!(text.contains("Enable realtime for the lightbulb table"));
}

#[test]
fn connection_error_view_carries_detail() {
    let text = View::ConnectionError("Table does not exist. Please check your Supabase setup.").render();
    assert!(text.contains("Could not connect to the lightbulb database"));
    assert!(text.contains("(Table does not exist. Please check your Supabase setup.)"));
    assert!(text.ends_with("Restart lightbulb to retry."));
}

#[test]
fn loading_view() {
    assert_eq!(View::Loading.render(), LOADING_TEXT);
}
