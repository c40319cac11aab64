//! Guider command implementations
//!
//! Every command connects first; the session's retry budget applies.

use anyhow::Result;

use gl_core::SessionError;
use gl_protocol::RpcErrorKind;
use gl_session::{Axis, DecGuideMode, GuiderSession, SettleParams};

use crate::output::{
    format_guider_profiles, format_guider_status, print_error, print_info, print_success,
    print_warning,
};

/// Print a session error with its taxonomy tag and a hint where one helps
fn report(context: &str, e: &SessionError) {
    print_error(&format!("{}: {} [{}]", context, e, e.kind().tag()));
    match e {
        SessionError::ConnectExhausted { .. } | SessionError::ConnectDeadline { .. } => {
            print_info("Is the guider running with its event server enabled?");
        }
        SessionError::Protocol(rpc) if rpc.kind == RpcErrorKind::UnsupportedMethod => {
            print_info("This guider version does not support that request");
        }
        SessionError::Protocol(rpc) if rpc.kind == RpcErrorKind::NoStarSelected => {
            print_info("Select a guide star first");
        }
        _ => {}
    }
}

fn check<T>(context: &str, result: Result<T, SessionError>) -> Result<T> {
    result.map_err(|e| {
        report(context, &e);
        e.into()
    })
}

/// Connect, reporting failures
pub async fn connect(session: &GuiderSession) -> Result<()> {
    tracing::info!("Connecting to guider at {}", session.address());
    check(
        &format!("Failed to connect to {}", session.address()),
        session.connect().await,
    )
}

/// Show guider state
pub async fn guider_status(session: &GuiderSession) -> Result<()> {
    connect(session).await?;
    let status = check("Failed to get guider status", session.status().await)?;
    println!(
        "{}",
        format_guider_status(&session.address(), session.phase().await, &status)
    );
    Ok(())
}

pub async fn guider_guide(
    session: &GuiderSession,
    settle: SettleParams,
    recalibrate: bool,
) -> Result<()> {
    connect(session).await?;
    check("Failed to start guiding", session.guide(settle, recalibrate).await)?;
    print_success("Guiding started");
    Ok(())
}

pub async fn guider_dither(
    session: &GuiderSession,
    amount: f64,
    ra_only: bool,
    settle: SettleParams,
) -> Result<()> {
    connect(session).await?;
    check("Failed to dither", session.dither(amount, ra_only, settle).await)?;
    print_success(&format!("Dither of {} px requested", amount));
    Ok(())
}

pub async fn guider_pause(session: &GuiderSession, pause: bool) -> Result<()> {
    connect(session).await?;
    if pause {
        check("Failed to pause", session.pause().await)?;
        print_success("Guiding paused");
    } else {
        check("Failed to resume", session.unpause().await)?;
        print_success("Guiding resumed");
    }
    Ok(())
}

pub async fn guider_loop(session: &GuiderSession) -> Result<()> {
    connect(session).await?;
    check("Failed to start looping", session.start_looping().await)?;
    print_success("Looping exposures");
    Ok(())
}

pub async fn guider_stop(session: &GuiderSession) -> Result<()> {
    connect(session).await?;
    check("Failed to stop capture", session.stop_capture().await)?;
    print_success("Capture stopped");
    Ok(())
}

/// Show image scale and focal length
pub async fn guider_optics(session: &GuiderSession) -> Result<()> {
    connect(session).await?;
    let scale = check("Failed to get pixel scale", session.pixel_scale().await)?;
    let focal_length = match session.focal_length().await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Focal length unavailable: {}", e);
            None
        }
    };

    if scale == 0.0 {
        print_warning("Pixel scale not known yet (no image or calibration)");
    }
    println!("Pixel scale: {:.3} arcsec/px", scale);
    if let Some(focal_length) = focal_length {
        println!("Focal length: {:.0} mm", focal_length);
    }
    Ok(())
}

/// Print the exposure, or set it when `exposure_ms` is given
pub async fn guider_exposure(session: &GuiderSession, exposure_ms: Option<u32>) -> Result<()> {
    connect(session).await?;
    match exposure_ms {
        Some(ms) => {
            check("Failed to set exposure", session.set_exposure(ms).await)?;
            print_success(&format!("Exposure set to {} ms", ms));
        }
        None => {
            let ms = check("Failed to get exposure", session.get_exposure().await)?;
            println!("{}", ms);
        }
    }
    Ok(())
}

pub async fn guider_param_get(session: &GuiderSession, axis: Axis, name: &str) -> Result<()> {
    connect(session).await?;
    let value = check(
        &format!("Failed to get {} {}", axis, name),
        session.get_algo_param(axis, name).await,
    )?;
    println!("{}", value);
    Ok(())
}

pub async fn guider_param_set(
    session: &GuiderSession,
    axis: Axis,
    name: &str,
    value: f64,
) -> Result<()> {
    connect(session).await?;
    check(
        &format!("Failed to set {} {}", axis, name),
        session.set_algo_param(axis, name, value).await,
    )?;
    print_success(&format!("Set {} {} = {}", axis, name, value));
    Ok(())
}

pub async fn guider_param_list(session: &GuiderSession, axis: Axis) -> Result<()> {
    connect(session).await?;
    let names = check(
        &format!("Failed to list {} parameters", axis),
        session.algo_param_names(axis).await,
    )?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// List the guider's profiles, or switch to one when `id` is given
pub async fn guider_profiles(session: &GuiderSession, id: Option<u32>) -> Result<()> {
    connect(session).await?;
    match id {
        Some(id) => {
            check("Failed to switch profile", session.set_profile(id).await)?;
            print_success(&format!("Guider switched to profile {}", id));
        }
        None => {
            let profiles = check("Failed to list profiles", session.guider_profiles().await)?;
            println!("{}", format_guider_profiles(&profiles));
        }
    }
    Ok(())
}

pub async fn guider_dec_mode(session: &GuiderSession, mode: DecGuideMode) -> Result<()> {
    connect(session).await?;
    check(
        "Failed to set declination guide mode",
        session.set_dec_guide_mode(mode).await,
    )?;
    print_success(&format!("Declination guide mode set to {}", mode));
    Ok(())
}

pub async fn guider_lock(session: &GuiderSession, x: f64, y: f64, exact: bool) -> Result<()> {
    connect(session).await?;
    check(
        "Failed to set lock position",
        session.set_lock_position(x, y, exact).await,
    )?;
    print_success(&format!("Lock position set to ({:.1}, {:.1})", x, y));
    Ok(())
}
