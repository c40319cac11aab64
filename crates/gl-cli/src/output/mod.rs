//! Output formatting utilities for the CLI
//!
//! Tables for profiles and settings, the guider status block, and colored
//! status messages.

use std::collections::{BTreeMap, BTreeSet};

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use gl_session::{GuiderProfile, GuiderStatus, SessionPhase};

/// Format the profiles in the profile file as an ASCII table
///
/// `current` marks the profile the guider will load on startup.
pub fn format_profiles(
    numbers: &BTreeSet<u32>,
    names: &BTreeMap<u32, String>,
    current: i64,
) -> String {
    if numbers.is_empty() {
        return "No profiles defined".to_string();
    }

    #[derive(Tabled)]
    struct ProfileRow {
        #[tabled(rename = "#")]
        number: u32,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "CURRENT")]
        current: String,
    }

    let rows: Vec<ProfileRow> = numbers
        .iter()
        .map(|n| ProfileRow {
            number: *n,
            name: names.get(n).cloned().unwrap_or_else(|| "-".to_string()),
            current: if i64::from(*n) == current {
                "*".to_string()
            } else {
                String::new()
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format settings as a PATH / VALUE table
pub fn format_settings(settings: &BTreeMap<String, String>) -> String {
    if settings.is_empty() {
        return "No matching settings".to_string();
    }

    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "PATH")]
        path: String,
        #[tabled(rename = "VALUE")]
        value: String,
    }

    let rows: Vec<SettingRow> = settings
        .iter()
        .map(|(path, value)| SettingRow {
            path: path.clone(),
            value: truncate(value, 60),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

/// Format one equipment list, marking the selected entry
pub fn format_equipment(kind: &str, names: &[String], selected: Option<usize>) -> String {
    if names.is_empty() {
        return format!("No {} configured", kind);
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "SELECTED")]
        selected: String,
    }

    let rows: Vec<DeviceRow> = names
        .iter()
        .enumerate()
        .map(|(index, name)| DeviceRow {
            index,
            name: name.clone(),
            selected: if selected == Some(index) {
                "*".to_string()
            } else {
                String::new()
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the guider's own profile list
pub fn format_guider_profiles(profiles: &[GuiderProfile]) -> String {
    if profiles.is_empty() {
        return "Guider reports no profiles".to_string();
    }

    #[derive(Tabled)]
    struct GuiderProfileRow {
        #[tabled(rename = "ID")]
        id: u32,
        #[tabled(rename = "NAME")]
        name: String,
    }

    let rows: Vec<GuiderProfileRow> = profiles
        .iter()
        .map(|p| GuiderProfileRow {
            id: p.id,
            name: p.name.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format guider status as a human-readable block
pub fn format_guider_status(address: &str, phase: SessionPhase, status: &GuiderStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!("Guider: {} ({})\n", address, phase));
    output.push_str(&format!("State: {}\n", status.app_state));
    if let Some(version) = &status.events.version {
        output.push_str(&format!("Version: {}\n", version));
    }
    if let Some(step) = &status.events.last_step {
        output.push_str(&format!(
            "Last step: frame {} dx={:.2} dy={:.2} SNR={:.1}\n",
            step.frame, step.dx, step.dy, step.snr
        ));
    }
    if let Some(settling) = &status.events.settling {
        output.push_str(&format!(
            "Settling: {:.2} px, {:.0}/{:.0}s\n",
            settling.distance, settling.time, settling.settle_time
        ));
    }
    if let Some(settle) = &status.events.last_settle {
        match &settle.error {
            Some(error) if settle.status != 0 => {
                output.push_str(&format!("Last settle: failed ({})\n", error))
            }
            _ => output.push_str("Last settle: ok\n"),
        }
    }
    if let Some(alert) = &status.events.last_alert {
        output.push_str(&format!("Last alert: {}\n", alert));
    }

    output
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
