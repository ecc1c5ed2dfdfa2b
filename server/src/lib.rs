//! Timify Server - Daily time-tracking reminder daemon.
//!
//! This crate provides the server component of Timify, responsible for:
//! - Receiving the "tracking started" signal over HTTP
//! - Emailing a reminder at a fixed time if no signal arrived
//! - Resetting the signal every night
//!
//! # Architecture
//!
//! A single in-memory flag ([`tracking::TrackingState`]) is shared by the
//! HTTP router and two daily jobs driven by [`schedule`]. Reminder delivery
//! goes through the [`notifier::Notifier`] capability on a background task, so
//! a slow or failing email provider never affects the flag.

pub mod auth;
pub mod config;
pub mod notifier;
pub mod routes;
pub mod schedule;
pub mod tracking;
