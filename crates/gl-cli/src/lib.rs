//! guidelink: Command-line interface
//!
//! Provides the `guidelink` CLI for editing the guider's profile file and
//! driving a running guider over its event server.

pub mod commands;
pub mod output;
