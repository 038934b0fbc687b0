//! Antihunter library: portable wireless threat-hunting engine.
//!
//! Watches the 2.4 GHz band for devices on an operator watchlist, homes in on
//! a single device by signal strength, and flags deauthentication and beacon
//! flood attacks. Everything that decides *what* happened lives here with no
//! platform dependencies, testable on any host with `cargo test`. The ESP-IDF
//! firmware in `firmware-std/` is a thin consumer that provides the radio,
//! buzzer, mesh UART and flash storage through the traits in [`platform`] and
//! [`radio`].
//!
//! Data flows in one direction:
//! - the capture context (promiscuous callback, BLE scan callback) feeds
//!   [`scanner::CaptureShared`], which filters and pushes events through the
//!   bounded [`bridge::CaptureBridge`];
//! - the session worker ([`session::run_session`]) drains the bridge, keeps the
//!   bounded logs, drives audio and mesh, and writes the result summary;
//! - the console ([`comm`]) turns commands into [`control::Control`] calls.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod bridge;
pub mod comm;
pub mod control;
pub mod defaults;
pub mod detect;
pub mod eventlog;
pub mod frame;
pub mod mac;
pub mod mesh;
pub mod platform;
pub mod protocol;
pub mod radio;
pub mod scanner;
pub mod session;
pub mod tracker;
pub mod watchlist;
