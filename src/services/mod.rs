//! Long-running services behind the presentation shell.
//!
//! ARCHITECTURE
//! ============
//! Services own the local state and all network orchestration so the shell
//! only renders snapshots and forwards user intents.

pub mod synchronizer;
