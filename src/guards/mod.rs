//! Guards - the checks chat and command handlers call.
//!
//! Every guard answers "should this be blocked?": `true` (or `Some`) means
//! block, `false` (or `None`) means let it through.

pub mod antiflood;
pub mod antispam;
pub mod cooldown;

pub use antiflood::FloodGuard;
pub use antispam::SpamGuard;
pub use cooldown::ActionGate;
