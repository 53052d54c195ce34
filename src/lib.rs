//! Guided breathing pacer: a four-phase breathing cycle, session timing,
//! and a persisted log of completed sessions.
//!
//! The core is clock-driven and never sleeps; the binary owns real time and
//! feeds it in through [`session::SessionTracker::advance_to`].

pub mod config;
pub mod error;
pub mod hooks;
pub mod phase;
pub mod session;
pub mod store;
pub mod timer;
