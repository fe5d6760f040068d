//! Named remote actions exposed to the host
//!
//! Each action targets one child and has no return payload: its effect is
//! observed through the next snapshot once the affected stream's listener
//! fires.
//!
//! | service               | parameters                                              |
//! |-----------------------|---------------------------------------------------------|
//! | `start_sleep` ...     | none (also pause, resume, cancel, complete)             |
//! | `start_feeding`       | `side` (left/right, default left)                       |
//! | `resume_feeding`      | optional `side`                                         |
//! | `pause_feeding` ...   | none (also switch side, cancel, complete)               |
//! | `log_diaper_<mode>`   | amounts, color, consistency, `diaper_rash`, `notes`     |
//! | `log_growth`          | `weight`, `height`, `head`, `units` (default metric)    |
//!
//! Every service accepts an optional `child_uid`. Without it the first known
//! child is targeted.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use crate::coordinator::Coordinator;
use crate::entity::SwitchEntity;
use crate::error::{Error, Result};
use crate::executor::run_blocking;
use crate::model::{
    ChildProfile, DiaperAmount, DiaperColor, DiaperConsistency, DiaperEntry, DiaperMode,
    FeedingSide, GrowthEntry,
};
use crate::traits::TrackerApi;

/// Every service name accepted by [`ActionService::call`]
pub const SERVICE_NAMES: [&str; 16] = [
    "start_sleep",
    "pause_sleep",
    "resume_sleep",
    "cancel_sleep",
    "complete_sleep",
    "start_feeding",
    "pause_feeding",
    "resume_feeding",
    "switch_feeding_side",
    "cancel_feeding",
    "complete_feeding",
    "log_diaper_pee",
    "log_diaper_poo",
    "log_diaper_both",
    "log_diaper_dry",
    "log_growth",
];

/// A remote action with its typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartSleep,
    PauseSleep,
    ResumeSleep,
    CancelSleep,
    CompleteSleep,
    StartFeeding { side: FeedingSide },
    PauseFeeding,
    ResumeFeeding { side: Option<FeedingSide> },
    SwitchFeedingSide,
    CancelFeeding,
    CompleteFeeding,
    LogDiaper(DiaperEntry),
    LogGrowth(GrowthEntry),
}

#[derive(Debug, Default, Deserialize)]
struct SideParams {
    #[serde(default)]
    side: Option<FeedingSide>,
}

#[derive(Debug, Default, Deserialize)]
struct DiaperParams {
    #[serde(default)]
    pee_amount: Option<DiaperAmount>,
    #[serde(default)]
    poo_amount: Option<DiaperAmount>,
    #[serde(default)]
    color: Option<DiaperColor>,
    #[serde(default)]
    consistency: Option<DiaperConsistency>,
    #[serde(default)]
    diaper_rash: bool,
    #[serde(default)]
    notes: Option<String>,
}

impl DiaperParams {
    fn into_entry(self, mode: DiaperMode) -> DiaperEntry {
        DiaperEntry {
            mode,
            pee_amount: self.pee_amount,
            poo_amount: self.poo_amount,
            color: self.color,
            consistency: self.consistency,
            diaper_rash: self.diaper_rash,
            notes: self.notes,
        }
        .normalized()
    }
}

fn params<T: for<'de> Deserialize<'de> + Default>(service: &str, data: &Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone())
        .map_err(|e| Error::invalid_input(format!("Invalid parameters for {}: {}", service, e)))
}

impl Action {
    /// Parse a service call into an action
    ///
    /// # Parameters
    ///
    /// - `service`: Service name (see [`SERVICE_NAMES`])
    /// - `data`: Service data object (`null` means no parameters)
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for unknown services or malformed parameters
    pub fn from_service(service: &str, data: &Value) -> Result<Self> {
        let action = match service {
            "start_sleep" => Action::StartSleep,
            "pause_sleep" => Action::PauseSleep,
            "resume_sleep" => Action::ResumeSleep,
            "cancel_sleep" => Action::CancelSleep,
            "complete_sleep" => Action::CompleteSleep,
            "start_feeding" => Action::StartFeeding {
                side: params::<SideParams>(service, data)?.side.unwrap_or_default(),
            },
            "pause_feeding" => Action::PauseFeeding,
            "resume_feeding" => Action::ResumeFeeding {
                side: params::<SideParams>(service, data)?.side,
            },
            "switch_feeding_side" => Action::SwitchFeedingSide,
            "cancel_feeding" => Action::CancelFeeding,
            "complete_feeding" => Action::CompleteFeeding,
            "log_diaper_pee" => {
                Action::LogDiaper(params::<DiaperParams>(service, data)?.into_entry(DiaperMode::Pee))
            }
            "log_diaper_poo" => {
                Action::LogDiaper(params::<DiaperParams>(service, data)?.into_entry(DiaperMode::Poo))
            }
            "log_diaper_both" => Action::LogDiaper(
                params::<DiaperParams>(service, data)?.into_entry(DiaperMode::Both),
            ),
            "log_diaper_dry" => {
                Action::LogDiaper(params::<DiaperParams>(service, data)?.into_entry(DiaperMode::Dry))
            }
            "log_growth" => Action::LogGrowth(params::<GrowthEntry>(service, data)?),
            other => return Err(Error::invalid_input(format!("Unknown service: {}", other))),
        };
        Ok(action)
    }

    /// Service name of this action
    pub fn service_name(&self) -> &'static str {
        match self {
            Action::StartSleep => "start_sleep",
            Action::PauseSleep => "pause_sleep",
            Action::ResumeSleep => "resume_sleep",
            Action::CancelSleep => "cancel_sleep",
            Action::CompleteSleep => "complete_sleep",
            Action::StartFeeding { .. } => "start_feeding",
            Action::PauseFeeding => "pause_feeding",
            Action::ResumeFeeding { .. } => "resume_feeding",
            Action::SwitchFeedingSide => "switch_feeding_side",
            Action::CancelFeeding => "cancel_feeding",
            Action::CompleteFeeding => "complete_feeding",
            Action::LogDiaper(entry) => match entry.mode {
                DiaperMode::Pee => "log_diaper_pee",
                DiaperMode::Poo => "log_diaper_poo",
                DiaperMode::Both => "log_diaper_both",
                DiaperMode::Dry => "log_diaper_dry",
            },
            Action::LogGrowth(_) => "log_growth",
        }
    }

    /// Perform the blocking API call for this action
    fn execute(&self, api: &dyn TrackerApi, child_id: &str) -> Result<()> {
        match self {
            Action::StartSleep => api.start_sleep(child_id),
            Action::PauseSleep => api.pause_sleep(child_id),
            Action::ResumeSleep => api.resume_sleep(child_id),
            Action::CancelSleep => api.cancel_sleep(child_id),
            Action::CompleteSleep => api.complete_sleep(child_id),
            Action::StartFeeding { side } => api.start_feeding(child_id, *side),
            Action::PauseFeeding => api.pause_feeding(child_id),
            Action::ResumeFeeding { side } => api.resume_feeding(child_id, *side),
            Action::SwitchFeedingSide => api.switch_feeding_side(child_id),
            Action::CancelFeeding => api.cancel_feeding(child_id),
            Action::CompleteFeeding => api.complete_feeding(child_id),
            Action::LogDiaper(entry) => api.log_diaper(child_id, entry),
            Action::LogGrowth(entry) => api.log_growth(child_id, entry),
        }
    }
}

/// Dispatches named actions to the vendor client
///
/// Steady-state errors never reach the caller of [`ActionService::call`]:
/// they are logged and the action is dropped.
pub struct ActionService {
    api: Arc<dyn TrackerApi>,
    coordinator: Arc<Coordinator>,
}

impl ActionService {
    /// Create a service dispatching to `api` for the coordinator's children
    pub fn new(api: Arc<dyn TrackerApi>, coordinator: Arc<Coordinator>) -> Self {
        Self { api, coordinator }
    }

    fn children(&self) -> &[Arc<ChildProfile>] {
        self.coordinator.children()
    }

    /// Resolve the target child of an action
    ///
    /// An explicit id must name a known child. Without one, the first known
    /// child is used.
    pub fn resolve_child(&self, child_uid: Option<&str>) -> Result<String> {
        match child_uid {
            Some(uid) => self
                .children()
                .iter()
                .find(|child| child.uid == uid)
                .map(|child| child.uid.clone())
                .ok_or_else(|| Error::unknown_child(uid)),
            None => self
                .children()
                .first()
                .map(|child| child.uid.clone())
                .ok_or_else(|| Error::no_data("No children known")),
        }
    }

    /// Invoke an action and report its outcome
    ///
    /// Runs the API call on the worker pool. A successful growth log also
    /// requests a snapshot refresh.
    pub async fn invoke(&self, child_uid: Option<&str>, action: Action) -> Result<()> {
        let child_id = self.resolve_child(child_uid)?;
        let service = action.service_name();
        info!("Calling {} for child {}", service, child_id);

        let refresh_after = matches!(action, Action::LogGrowth(_));
        let target = child_id.clone();
        run_blocking(&self.api, move |api| action.execute(api, &target)).await?;

        info!("Completed {} for child {}", service, child_id);
        if refresh_after {
            self.coordinator.request_refresh();
        }
        Ok(())
    }

    /// Handle a host service call
    ///
    /// `data` may carry `child_uid` plus the service's parameters. Unknown
    /// services, malformed parameters, unknown children and API failures
    /// are logged and dropped.
    pub async fn call(&self, service: &str, data: &Value) {
        let child_uid = data.get("child_uid").and_then(Value::as_str);

        let action = match Action::from_service(service, data) {
            Ok(action) => action,
            Err(e) => {
                error!("Rejected service call {}: {}", service, e);
                return;
            }
        };

        if let Err(e) = self.invoke(child_uid, action).await {
            error!("Service call {} failed: {}", service, e);
        }
    }

    /// Turn a timer switch on
    pub async fn turn_on(&self, switch: &SwitchEntity) -> Result<()> {
        self.invoke(Some(switch.child_id()), switch.turn_on_action()).await
    }

    /// Turn a timer switch off
    pub async fn turn_off(&self, switch: &SwitchEntity) -> Result<()> {
        self.invoke(Some(switch.child_id()), switch.turn_off_action()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitSystem;
    use serde_json::json;

    #[test]
    fn test_every_service_name_parses() {
        for service in SERVICE_NAMES {
            let action = Action::from_service(service, &Value::Null).unwrap();
            assert_eq!(action.service_name(), service);
        }
    }

    #[test]
    fn test_start_feeding_defaults_to_left() {
        assert_eq!(
            Action::from_service("start_feeding", &json!({})).unwrap(),
            Action::StartFeeding { side: FeedingSide::Left }
        );
        assert_eq!(
            Action::from_service("start_feeding", &json!({"side": "right"})).unwrap(),
            Action::StartFeeding { side: FeedingSide::Right }
        );
        assert_eq!(
            Action::from_service("resume_feeding", &json!({"child_uid": "child_1"})).unwrap(),
            Action::ResumeFeeding { side: None }
        );
    }

    #[test]
    fn test_diaper_services_set_mode() {
        let action = Action::from_service(
            "log_diaper_poo",
            &json!({"poo_amount": "medium", "pee_amount": "big", "color": "brown", "consistency": "solid"}),
        )
        .unwrap();

        let Action::LogDiaper(entry) = action else {
            panic!("expected diaper action");
        };
        assert_eq!(entry.mode, DiaperMode::Poo);
        assert_eq!(entry.poo_amount, Some(DiaperAmount::Medium));
        assert_eq!(entry.pee_amount, None);
        assert_eq!(entry.color, Some(DiaperColor::Brown));
        assert!(!entry.diaper_rash);
    }

    #[test]
    fn test_log_growth_params() {
        let action = Action::from_service(
            "log_growth",
            &json!({"weight": 10.5, "height": 75.0, "head": 45.0}),
        )
        .unwrap();

        assert_eq!(
            action,
            Action::LogGrowth(GrowthEntry {
                weight: Some(10.5),
                height: Some(75.0),
                head: Some(45.0),
                units: UnitSystem::Metric,
            })
        );
    }

    #[test]
    fn test_invalid_calls() {
        assert!(matches!(
            Action::from_service("fly_to_moon", &json!({})),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Action::from_service("start_feeding", &json!({"side": "middle"})),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Action::from_service("log_growth", &json!({"units": "cubits"})),
            Err(Error::InvalidInput(_))
        ));
    }
}
