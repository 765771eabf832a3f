//! Request-activity tracking for slow backend cold starts.
//!
//! Hosted backends that scale to zero take a while to answer the first
//! request after a quiet period. [`RequestActivity`] counts in-flight calls
//! and raises a single "waking" signal once the system has been continuously
//! busy for longer than a threshold, then drops it the moment the last call
//! settles.
//!
//! ```rust,ignore
//! use server_wake::RequestActivity;
//!
//! let activity = RequestActivity::new();
//!
//! let subscription = activity.subscribe(|waking| {
//!     if waking {
//!         eprintln!("Waking server… please wait");
//!     }
//! });
//!
//! let body = activity.track(client.get(url).send()).await?;
//!
//! subscription.unsubscribe();
//! ```
//!
//! The wake timer is a tokio task, so tracking must happen inside a tokio
//! runtime with the time driver enabled.

mod listeners;
mod slot;
mod tracker;

pub use listeners::Subscription;
pub use slot::PendingSlot;
pub use tracker::{RequestActivity, WAKE_THRESHOLD};
