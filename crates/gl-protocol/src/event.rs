//! Unsolicited event notifications pushed by the guider
//!
//! Every event is a JSON object whose `Event` field names its kind. The
//! guider also stamps `Timestamp`, `Host` and `Inst` on each event; those
//! are ignored here. Event kinds this crate does not model decode as
//! [`GuiderEvent::Unknown`].

use serde::{Deserialize, Serialize};

/// Per-frame guiding telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideStep {
    #[serde(rename = "Frame")]
    pub frame: u64,
    #[serde(rename = "Time", default)]
    pub time: f64,
    #[serde(rename = "Mount", default)]
    pub mount: String,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    #[serde(rename = "RADistanceRaw", default)]
    pub ra_distance_raw: f64,
    #[serde(rename = "DECDistanceRaw", default)]
    pub dec_distance_raw: f64,
    #[serde(rename = "StarMass", default)]
    pub star_mass: f64,
    #[serde(rename = "SNR", default)]
    pub snr: f64,
    #[serde(rename = "HFD", default)]
    pub hfd: f64,
    #[serde(rename = "AvgDist", default)]
    pub avg_dist: f64,
}

/// Event notification from the guider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Event")]
pub enum GuiderEvent {
    Version {
        #[serde(rename = "PHDVersion")]
        version: String,
        #[serde(rename = "PHDSubver", default)]
        subversion: String,
        #[serde(rename = "MsgVersion", default)]
        msg_version: u32,
    },
    AppState {
        #[serde(rename = "State")]
        state: String,
    },
    GuideStep(GuideStep),
    StartGuiding,
    GuidingStopped,
    Paused,
    Resumed,
    SettleBegin,
    Settling {
        #[serde(rename = "Distance")]
        distance: f64,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "SettleTime")]
        settle_time: f64,
        #[serde(rename = "StarLocked", default)]
        star_locked: bool,
    },
    SettleDone {
        #[serde(rename = "Status")]
        status: i32,
        #[serde(rename = "Error", default)]
        error: Option<String>,
    },
    StarLost {
        #[serde(rename = "Status", default)]
        status: String,
    },
    StarSelected {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },
    LockPositionSet {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },
    LockPositionLost,
    LoopingExposures {
        #[serde(rename = "Frame")]
        frame: u64,
    },
    LoopingExposuresStopped,
    GuidingDithered {
        dx: f64,
        dy: f64,
    },
    CalibrationComplete {
        #[serde(rename = "Mount", default)]
        mount: String,
    },
    CalibrationFailed {
        #[serde(rename = "Reason", default)]
        reason: String,
    },
    Alert {
        #[serde(rename = "Msg")]
        message: String,
        #[serde(rename = "Type", default)]
        level: String,
    },
    ConfigurationChange,
    #[serde(other)]
    Unknown,
}

impl GuiderEvent {
    /// The application state implied by this event, when it implies one
    pub fn implied_state(&self) -> Option<&str> {
        match self {
            GuiderEvent::AppState { state } => Some(state.as_str()),
            GuiderEvent::StartGuiding | GuiderEvent::Resumed => Some("Guiding"),
            GuiderEvent::GuideStep(_) => Some("Guiding"),
            GuiderEvent::Paused => Some("Paused"),
            GuiderEvent::LoopingExposures { .. } => Some("Looping"),
            GuiderEvent::LoopingExposuresStopped | GuiderEvent::GuidingStopped => Some("Stopped"),
            GuiderEvent::StarLost { .. } => Some("LostLock"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_app_state() {
        let event: GuiderEvent = serde_json::from_str(
            r#"{"Event":"AppState","Timestamp":1.0,"Host":"obs","Inst":1,"State":"Looping"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            GuiderEvent::AppState {
                state: "Looping".to_string()
            }
        );
    }

    #[test]
    fn test_decode_guide_step() {
        let event: GuiderEvent = serde_json::from_str(
            r#"{"Event":"GuideStep","Frame":12,"Time":3.2,"Mount":"EQMOD","dx":0.5,"dy":-0.25,
                "RADistanceRaw":0.4,"DECDistanceRaw":-0.1,"StarMass":4000,"SNR":30.5,"HFD":2.1,"AvgDist":0.3}"#,
        )
        .unwrap();
        match event {
            GuiderEvent::GuideStep(step) => {
                assert_eq!(step.frame, 12);
                assert_eq!(step.snr, 30.5);
                assert_eq!(step.mount, "EQMOD");
            }
            other => panic!("Expected GuideStep, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_event_ignores_stamp_fields() {
        let event: GuiderEvent =
            serde_json::from_str(r#"{"Event":"Paused","Timestamp":5.0,"Host":"obs","Inst":1}"#)
                .unwrap();
        assert_eq!(event, GuiderEvent::Paused);
        assert_eq!(event.implied_state(), Some("Paused"));
    }

    #[test]
    fn test_unknown_event() {
        let event: GuiderEvent =
            serde_json::from_str(r#"{"Event":"BrandNewThing","Foo":1}"#).unwrap();
        assert_eq!(event, GuiderEvent::Unknown);
        assert_eq!(event.implied_state(), None);
    }
}
