//! Local projection of the shared lightbulb.
//!
//! DESIGN
//! ======
//! `ToggleState` mirrors the singleton row. `WidgetState` is everything the
//! presentation shell needs to render one frame: the row, the connection
//! status, and the transient overlays (update flash, error banner, polling
//! warning). Push and poll both funnel remote snapshots through
//! [`WidgetState::apply_remote`], which is the only place arrival order is
//! reconciled.
//!
//! RECONCILIATION
//! ==============
//! A snapshot older than the local copy is dropped, so the displayed value is
//! always the most recently timestamped one received. Snapshots without a
//! timestamp fall back to last-write-wins. While a write is in flight, only
//! snapshots strictly newer than the pre-toggle copy are accepted, so a racing
//! poll cannot undo the optimistic flip.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// TOGGLE STATE
// =============================================================================

/// The shared singleton row. Mirrors the `lightbulb` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "is_on")]
    pub value: bool,
    #[serde(rename = "updated_at", default, with = "timestamp")]
    pub last_changed_at: Option<OffsetDateTime>,
}

impl ToggleState {
    #[must_use]
    pub fn new(id: i64, value: bool) -> Self {
        Self { id, value, last_changed_at: None }
    }

    #[must_use]
    pub fn changed_at(mut self, at: OffsetDateTime) -> Self {
        self.last_changed_at = Some(at);
        self
    }

    /// True only when both sides carry timestamps and `self` is strictly older.
    #[must_use]
    pub fn is_older_than(&self, other: &ToggleState) -> bool {
        match (self.last_changed_at, other.last_changed_at) {
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => false,
        }
    }

    /// True only when both sides carry timestamps and `self` is strictly newer.
    #[must_use]
    pub fn is_newer_than(&self, other: &ToggleState) -> bool {
        other.is_older_than(self)
    }
}

/// Lenient `updated_at` handling. Postgres may emit either RFC 3339 or its
/// text form (`2024-05-01 12:00:00.123+00`); anything unparsable maps to
/// `None` rather than failing the whole row.
mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => time::serde::rfc3339::serialize(at, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub(super) fn parse(raw: &str) -> Option<OffsetDateTime> {
        if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
            return Some(at);
        }
        // EDGE: Postgres text form uses a space separator and may shorten the offset to `+00`.
        let mut normalized = raw.replacen(' ', "T", 1);
        let offset_start = normalized.rfind(['+', '-']).filter(|idx| *idx > 10);
        if let Some(idx) = offset_start {
            if normalized.len() - idx == 3 {
                normalized.push_str(":00");
            }
        }
        OffsetDateTime::parse(&normalized, &Rfc3339).ok()
    }
}

// =============================================================================
// CONNECTION STATUS
// =============================================================================

/// Push-channel lifecycle as shown in the status pill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Subscription attempt in progress.
    #[default]
    Connecting,
    /// Push channel joined and healthy.
    RealtimeActive,
    /// Push channel failed or timed out; polling has taken over.
    RealtimeFailed,
    /// At least one poll has completed since the push channel failed.
    PollingOnly,
    /// Transient overlay after a remote change; reverts on its own.
    UpdateReceived,
}

impl ConnectionStatus {
    /// Active or flashing an update: no reconnect affordance needed.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::RealtimeActive | Self::UpdateReceived)
    }
}

// =============================================================================
// WIDGET STATE
// =============================================================================

/// Outcome of offering a remote snapshot to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// The displayed value changed.
    Applied,
    /// Same value, newer metadata. Stored without a visible change.
    Refreshed,
    /// Identical to what is already held.
    Unchanged,
    /// Older than the local copy, or not newer than a pending write's base.
    Stale,
}

/// Everything the shell renders, published by the synchronizer after each change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetState {
    pub toggle: ToggleState,
    /// Underlying link status; never `UpdateReceived`.
    pub link: ConnectionStatus,
    /// Whether the "update received" overlay is up.
    pub update_flash: bool,
    /// A conditional write is in flight.
    pub writing: bool,
    /// Transient write-failure banner.
    pub banner: Option<String>,
    /// Last polling failure, cleared by the next successful poll.
    pub warning: Option<String>,
    /// Current poll period.
    pub poll_interval: Duration,
}

impl WidgetState {
    #[must_use]
    pub fn new(toggle: ToggleState, poll_interval: Duration) -> Self {
        Self {
            toggle,
            link: ConnectionStatus::Connecting,
            update_flash: false,
            writing: false,
            banner: None,
            warning: None,
            poll_interval,
        }
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.toggle.value
    }

    /// Status as displayed, with the update overlay applied.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        if self.update_flash { ConnectionStatus::UpdateReceived } else { self.link }
    }

    /// Whether both states draw the same screen: equal in everything but
    /// the row timestamp.
    #[must_use]
    pub fn renders_same(&self, other: &Self) -> bool {
        self.toggle.id == other.toggle.id
            && self.toggle.value == other.toggle.value
            && self.link == other.link
            && self.update_flash == other.update_flash
            && self.writing == other.writing
            && self.banner == other.banner
            && self.warning == other.warning
            && self.poll_interval == other.poll_interval
    }

    /// Offer a remote snapshot. `write_base` is the pre-toggle copy while a
    /// write is in flight.
    pub fn apply_remote(&mut self, incoming: &ToggleState, write_base: Option<&ToggleState>) -> Reconcile {
        if let Some(base) = write_base {
            if !incoming.is_newer_than(base) {
                return Reconcile::Stale;
            }
        }
        if incoming.is_older_than(&self.toggle) {
            return Reconcile::Stale;
        }
        if *incoming == self.toggle {
            return Reconcile::Unchanged;
        }

        let changed = incoming.value != self.toggle.value;
        self.toggle = incoming.clone();
        if changed { Reconcile::Applied } else { Reconcile::Refreshed }
    }

    /// Flip the value locally and mark a write in flight. Returns the pre-toggle copy.
    pub fn flip_optimistic(&mut self) -> ToggleState {
        let previous = self.toggle.clone();
        self.toggle.value = !previous.value;
        self.writing = true;
        previous
    }

    /// Undo an optimistic flip unless a newer remote snapshot already replaced it.
    pub fn revert_to(&mut self, previous: ToggleState) {
        self.writing = false;
        if self.toggle.last_changed_at == previous.last_changed_at {
            self.toggle = previous;
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
