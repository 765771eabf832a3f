//! Terminal notice shown while the backend is waking up.

use std::io::Write;
use std::sync::Mutex;

use console::style;
use server_wake::{RequestActivity, Subscription};

pub const WAKING_MESSAGE: &str = "Waking server… please wait";
pub const AWAKE_MESSAGE: &str = "Server is awake";

/// Print a line to `out` each time the waking signal changes.
///
/// Write errors are ignored; a notice is never worth failing a request over.
pub fn attach<W>(activity: &RequestActivity, out: W) -> Subscription
where
    W: Write + Send + 'static,
{
    let out = Mutex::new(out);
    activity.subscribe(move |waking| {
        let line = if waking {
            style(WAKING_MESSAGE).yellow().for_stderr()
        } else {
            style(AWAKE_MESSAGE).green().for_stderr()
        };
        if let Ok(mut out) = out.lock() {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    })
}
