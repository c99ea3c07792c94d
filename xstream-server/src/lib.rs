//! # xstream-server: Replay Service
//!
//! Stands in for the host application: loads raw buffer dumps into an
//! in-memory host, runs the full XStream data path over them (identity
//! match, discovery, throttled slicing, delivery) and attaches one
//! pulling consumer per display that writes its latest frame to disk.
//!
//! ## Modes
//!
//! - **Replay** (default): stream until Ctrl-C.
//! - **Dump** (`--dump <dir>`): rewrite every large buffer and exit.
//! - **Gen-config** (`--gen-config`): print the default configuration.

pub mod config;
pub mod replay;
pub mod service;
pub mod transport;
