//! Command implementations for the CLI.

mod config;
mod poll;
mod read;
mod scan;
mod services;
mod subscribe;
mod write;

pub use config::cmd_config;
pub use poll::{PollArgs, cmd_poll};
pub use read::cmd_read;
pub use scan::cmd_scan;
pub use services::cmd_services;
pub use subscribe::cmd_subscribe;
pub use write::{WriteArgs, cmd_write};

use blediag_core::ConnectionSession;

/// Drop the subscription and the link before exiting.
pub(crate) async fn close(session: &ConnectionSession) {
    if let Err(e) = session.unsubscribe().await {
        tracing::debug!("Unsubscribe on exit failed: {}", e);
    }
    if let Err(e) = session.transport().disconnect().await {
        tracing::debug!("Disconnect on exit failed: {}", e);
    }
}
