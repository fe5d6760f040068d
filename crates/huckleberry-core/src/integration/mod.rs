//! Setup and unload of one bridged account
//!
//! [`Integration::setup`] signs in, enumerates the children, builds the
//! [`Coordinator`] and [`ActionService`] and registers the realtime
//! listeners. Any failure before the listeners are registered aborts setup
//! with a [`SetupFailure`] reason the host can show to the user.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::actions::ActionService;
use crate::config::HuckleberryConfig;
use crate::coordinator::{Coordinator, CoordinatorEvent, ListenerReport};
use crate::error::{Error, SetupFailure};
use crate::executor::run_blocking;
use crate::model::ChildProfile;
use crate::traits::TrackerApi;

/// Setup aborted
#[derive(Debug, Error)]
#[error("Setup failed ({key}): {source}", key = .reason.key())]
pub struct SetupError {
    /// Reason reported to the host
    pub reason: SetupFailure,
    /// Underlying error
    #[source]
    pub source: Error,
}

impl SetupError {
    fn new(source: Error) -> Self {
        Self {
            reason: source.setup_failure(),
            source,
        }
    }
}

/// A running bridged account
pub struct Integration {
    coordinator: Arc<Coordinator>,
    actions: ActionService,
    listeners: ListenerReport,
}

impl Integration {
    /// Set up the bridge for one account
    ///
    /// # Returns
    ///
    /// The integration plus the coordinator's event receiver. The delivery
    /// loop is not started: spawn [`Coordinator::run_with_shutdown`] on the
    /// returned coordinator.
    ///
    /// # Errors
    ///
    /// - `InvalidAuth`: credentials rejected
    /// - `NoChildren`: the account has no children
    /// - `CannotConnect`: any other failure
    pub async fn setup(
        api: Arc<dyn TrackerApi>,
        config: &HuckleberryConfig,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>), SetupError> {
        info!("Setting up {} account for {}", api.provider_name(), config.account.email);

        run_blocking(&api, |api| api.authenticate())
            .await
            .map_err(|e| fail("Authentication failed", e))?;

        let children = run_blocking(&api, |api| api.get_children())
            .await
            .map_err(|e| fail("Failed to enumerate children", e))?;
        if children.is_empty() {
            return Err(fail(
                "Account has no children",
                Error::no_data("No children found on account"),
            ));
        }
        info!("Found {} child(ren)", children.len());

        let (coordinator, events) =
            Coordinator::new(Arc::clone(&api), children, &config.coordinator)
                .map_err(|e| fail("Invalid coordinator settings", e))?;
        let coordinator = Arc::new(coordinator);
        let actions = ActionService::new(api, Arc::clone(&coordinator));

        let listeners = coordinator.start_listening().await;

        Ok((
            Self {
                coordinator,
                actions,
                listeners,
            },
            events,
        ))
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn actions(&self) -> &ActionService {
        &self.actions
    }

    pub fn children(&self) -> &[Arc<ChildProfile>] {
        self.coordinator.children()
    }

    /// Outcome of listener registration during setup
    pub fn listeners(&self) -> &ListenerReport {
        &self.listeners
    }

    /// Unload the integration: stop delivery and deregister listeners
    pub async fn unload(&self) {
        info!("Unloading integration");
        self.coordinator.shutdown().await;
    }
}

fn fail(context: &str, source: Error) -> SetupError {
    let err = SetupError::new(source);
    error!("{}: {}", context, err);
    err
}
