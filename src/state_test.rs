use super::*;
use time::macros::datetime;

fn at(secs: i64) -> OffsetDateTime {
    datetime!(2025-01-01 00:00:00 UTC) + time::Duration::seconds(secs)
}

fn row(value: bool, secs: i64) -> ToggleState {
    ToggleState::new(1, value).changed_at(at(secs))
}

fn widget(toggle: ToggleState) -> WidgetState {
    WidgetState::new(toggle, Duration::from_secs(5))
}

/// Heap's algorithm; small inputs only.
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        heap(k - 1, items, out);
        for i in 0..k - 1 {
            let swap_with = if k % 2 == 0 { i } else { 0 };
            items.swap(swap_with, k - 1);
            heap(k - 1, items, out);
        }
    }
    let mut items = items.to_vec();
    let mut out = Vec::new();
    heap(items.len(), &mut items, &mut out);
    out
}

// =============================================================================
// ToggleState serde
// =============================================================================

#[test]
fn toggle_state_decodes_postgrest_row() {
    let json = r#"{"id":1,"is_on":true,"updated_at":"2025-01-01T00:00:05.250+00:00"}"#;
    let state: ToggleState = serde_json::from_str(json).unwrap();
    assert_eq!(state.id, 1);
    assert!(state.value);
    assert_eq!(state.last_changed_at, Some(at(5) + time::Duration::milliseconds(250)));
}

#[test]
fn toggle_state_tolerates_missing_id_and_timestamp() {
    let state: ToggleState = serde_json::from_str(r#"{"is_on":false}"#).unwrap();
    assert_eq!(state, ToggleState::new(0, false));
}

#[test]
fn toggle_state_unparsable_timestamp_is_none() {
    let state: ToggleState = serde_json::from_str(r#"{"id":1,"is_on":true,"updated_at":"yesterday"}"#).unwrap();
    assert_eq!(state.last_changed_at, None);
}

#[test]
fn parse_accepts_postgres_text_form() {
    assert_eq!(timestamp::parse("2025-01-01 00:00:05+00"), Some(at(5)));
    assert_eq!(timestamp::parse("2025-01-01T00:00:05Z"), Some(at(5)));
    assert_eq!(timestamp::parse("not a time"), None);
}

#[test]
fn toggle_state_serializes_column_names() {
    let value = serde_json::to_value(row(true, 0)).unwrap();
    assert_eq!(value["is_on"], serde_json::json!(true));
    assert_eq!(value["updated_at"], serde_json::json!("2025-01-01T00:00:00Z"));
}

// =============================================================================
// ordering helpers
// =============================================================================

#[test]
fn ordering_requires_both_timestamps() {
    assert!(row(true, 1).is_older_than(&row(true, 2)));
    assert!(row(true, 2).is_newer_than(&row(true, 1)));
    assert!(!ToggleState::new(1, true).is_older_than(&row(true, 2)));
    assert!(!row(true, 1).is_newer_than(&ToggleState::new(1, true)));
}

// =============================================================================
// apply_remote
// =============================================================================

#[test]
fn apply_remote_newer_value_applies() {
    let mut w = widget(row(false, 1));
    assert_eq!(w.apply_remote(&row(true, 2), None), Reconcile::Applied);
    assert!(w.is_on());
}

#[test]
fn apply_remote_older_snapshot_is_stale() {
    let mut w = widget(row(true, 5));
    assert_eq!(w.apply_remote(&row(false, 3), None), Reconcile::Stale);
    assert!(w.is_on());
}

#[test]
fn apply_remote_identical_is_unchanged() {
    let mut w = widget(row(true, 5));
    assert_eq!(w.apply_remote(&row(true, 5), None), Reconcile::Unchanged);
}

#[test]
fn apply_remote_same_value_newer_timestamp_refreshes() {
    let mut w = widget(row(true, 5));
    assert_eq!(w.apply_remote(&row(true, 9), None), Reconcile::Refreshed);
    assert_eq!(w.toggle.last_changed_at, Some(at(9)));
}

#[test]
fn refreshed_timestamp_renders_the_same() {
    let before = widget(row(true, 5));
    let mut after = before.clone();
    after.apply_remote(&row(true, 9), None);
    assert_ne!(before, after);
    assert!(before.renders_same(&after));

    after.apply_remote(&row(false, 10), None);
    assert!(!before.renders_same(&after));
}

#[test]
fn apply_remote_without_timestamps_is_last_write_wins() {
    let mut w = widget(ToggleState::new(1, true));
    assert_eq!(w.apply_remote(&ToggleState::new(1, false), None), Reconcile::Applied);
    assert_eq!(w.apply_remote(&ToggleState::new(1, true), None), Reconcile::Applied);
    assert!(w.is_on());
}

#[test]
fn apply_remote_during_write_ignores_base_echo() {
    let mut w = widget(row(false, 1));
    let base = w.flip_optimistic();
    // A poll that still sees the pre-toggle row must not undo the flip.
    assert_eq!(w.apply_remote(&row(false, 1), Some(&base)), Reconcile::Stale);
    assert!(w.is_on());
    // A strictly newer change from another client still lands.
    assert_eq!(w.apply_remote(&row(false, 4), Some(&base)), Reconcile::Applied);
    assert!(!w.is_on());
}

#[test]
fn final_value_is_latest_timestamp_for_every_arrival_order() {
    let updates = [row(true, 1), row(false, 2), row(true, 3), row(false, 4)];
    for order in permutations(&updates) {
        let mut w = widget(row(true, 0));
        for update in &order {
            w.apply_remote(update, None);
        }
        assert!(!w.is_on(), "order {order:?} ended on the wrong value");
        assert_eq!(w.toggle.last_changed_at, Some(at(4)));
    }
}

// =============================================================================
// optimistic flip
// =============================================================================

#[test]
fn flip_then_revert_restores_previous() {
    let mut w = widget(row(false, 1));
    let previous = w.flip_optimistic();
    assert!(w.is_on());
    assert!(w.writing);

    w.revert_to(previous);
    assert!(!w.is_on());
    assert!(!w.writing);
}

#[test]
fn revert_keeps_newer_remote_change() {
    let mut w = widget(row(false, 1));
    let previous = w.flip_optimistic();
    w.apply_remote(&row(true, 6), Some(&previous));

    w.revert_to(previous);
    assert!(w.is_on());
    assert_eq!(w.toggle.last_changed_at, Some(at(6)));
}

// =============================================================================
// ConnectionStatus
// =============================================================================

#[test]
fn connection_status_overlays_update_flash() {
    let mut w = widget(row(false, 1));
    w.link = ConnectionStatus::PollingOnly;
    assert_eq!(w.connection_status(), ConnectionStatus::PollingOnly);

    w.update_flash = true;
    assert_eq!(w.connection_status(), ConnectionStatus::UpdateReceived);
}

#[test]
fn only_active_and_update_are_live() {
    assert!(ConnectionStatus::RealtimeActive.is_live());
    assert!(ConnectionStatus::UpdateReceived.is_live());
    assert!(!ConnectionStatus::Connecting.is_live());
    assert!(!ConnectionStatus::RealtimeFailed.is_live());
    assert!(!ConnectionStatus::PollingOnly.is_live());
}

#[test]
fn widget_defaults_to_connecting() {
    let w = widget(row(false, 1));
    assert_eq!(w.link, ConnectionStatus::Connecting);
    assert!(!w.writing);
    assert!(w.banner.is_none());
}
