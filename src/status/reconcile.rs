//! Marker reconciliation
//!
//! | pattern status            | marker          | result                     |
//! |---------------------------|-----------------|----------------------------|
//! | Active / Waiting          | working         | Active                     |
//! | Active / Waiting          | waiting / idle  | Waiting (marker detail)    |
//! | Thinking / Done / Error   | any             | unchanged                  |
//! | Paused                    | any             | unchanged                  |
//! | any                       | none            | unchanged                  |

use super::marker::{AgentMarker, MarkerState};
use super::Status;

pub fn reconcile(current: Status, marker: Option<&AgentMarker>) -> Status {
    let Some(marker) = marker else {
        return current;
    };

    match current {
        Status::Active | Status::Waiting { .. } => {}
        other => return other,
    }

    match marker.state {
        MarkerState::Working => Status::Active,
        MarkerState::Waiting | MarkerState::Idle => {
            let prompt = marker
                .detail
                .clone()
                .filter(|detail| !detail.trim().is_empty())
                .or(match current {
                    Status::Waiting { prompt } => Some(prompt),
                    _ => None,
                })
                .unwrap_or_default();
            Status::waiting(prompt)
        }
    }
}
