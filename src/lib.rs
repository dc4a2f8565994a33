//! Client for a single shared on/off toggle stored in a Supabase table.
//!
//! ARCHITECTURE
//! ============
//! `rest` and `realtime` talk to the hosted backend, `services::synchronizer`
//! reconciles both paths into one [`state::WidgetState`], and `view` renders
//! it. The binary in `main.rs` is the interactive shell.

pub mod config;
pub mod error;
pub mod realtime;
pub mod rest;
pub mod services;
pub mod state;
pub mod store;
pub mod view;
