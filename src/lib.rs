//! Client-side logic for the dual-sensor radar logger's HTTP API: chunk
//! decoding with motion-span derivation, race-safe settings synchronization,
//! and the session bookkeeping around them. Rendering is out of scope; the
//! front end consumes [`ui::UiEvent`]s and calls back into [`session`] and
//! [`settings`].

pub mod chunk;
pub mod config;
pub mod device;
pub mod error;
pub mod session;
pub mod settings;
pub mod ui;
