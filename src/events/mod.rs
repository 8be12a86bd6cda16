//! # Events Module
//!
//! Event-driven progress reporting for the ingestion pipeline.
//!
//! ## Design
//! The core engine emits events through channels, allowing any consumer
//! (CLI, web job monitor, admin dashboard) to subscribe and display
//! progress. Delivery is best-effort: if the receiver is gone, events are
//! dropped and the pipeline keeps running.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let IngestEvent::Progress(p) = event {
//!             println!("[{}] {} ({:.0}%)", p.stage, p.message, p.fraction * 100.0);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(uploads, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
