//! Branchnote library
//!
//! Offline-first notes and folders kept in step with a server of record.
//! The library exposes the reconciliation engine and its stores for the
//! CLI and for testing.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod remote;
pub mod services;
