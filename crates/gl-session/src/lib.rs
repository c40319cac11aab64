//! gl-session: Connection lifecycle and commands for the guider
//!
//! [`GuiderSession`] is the single owner of the link to a guider instance.
//! It connects with a bounded linear retry, shares one in-flight connect
//! between concurrent callers, and gates every guider command on the
//! connection state.

mod backoff;
mod client;
mod commands;
mod session;

pub use backoff::LinearBackoff;
pub use client::{
    EventSnapshot, GuiderConnector, GuiderLink, SettleOutcome, SettleProgress, TcpConnector,
    TcpGuiderClient,
};
pub use commands::{
    adjust_param_value, Axis, DecGuideMode, GuiderProfile, GuiderStatus, SettleParams,
    PARAM_EPSILON, PARAM_VERIFY_TOLERANCE,
};
pub use session::{GuiderSession, SessionPhase};
