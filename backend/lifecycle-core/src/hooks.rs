//! Before/after test hooks built on an injected [`LifecycleManager`].
//!
//! Test and build orchestration receives the manager explicitly; nothing
//! here keeps global state.

use crate::error::LifecycleError;
use crate::launcher::ServerLauncher;
use crate::manager::{LifecycleManager, ServerHandle};

use common::ErrorLocation;
use models::{ServerConfig, ServerInfo};

use std::future::Future;
use std::panic::Location;
use std::time::Duration;

use log::{debug, warn};

/// A database bound to one test run: `before_test` brings it up,
/// `after_test` tears it down.
pub struct DatabaseSession<'a, L: ServerLauncher> {
    manager: &'a mut LifecycleManager<L>,
    config: ServerConfig,
    ready_timeout: Duration,
    handle: Option<ServerHandle>,
}

impl<'a, L: ServerLauncher> DatabaseSession<'a, L> {
    pub fn new(
        manager: &'a mut LifecycleManager<L>,
        config: ServerConfig,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            config,
            ready_timeout,
            handle: None,
        }
    }

    /// Start the server and wait until it accepts connections.
    ///
    /// If the server never becomes ready it is stopped again before the
    /// error is returned, so a failed hook leaves no process or lock behind.
    pub async fn before_test(&mut self) -> Result<ServerInfo, LifecycleError> {
        let handle = self.manager.start(self.config.clone()).await?;

        if let Err(e) = self
            .manager
            .wait_until_ready(&handle, self.ready_timeout)
            .await
        {
            if let Err(stop_error) = self.manager.stop(&handle).await {
                warn!("Cleanup after failed readiness also failed: {stop_error}");
            }
            return Err(e);
        }

        let info = self.manager.info(&handle).ok_or_else(|| LifecycleError::UnknownHandle {
            message: format!("{handle} vanished right after becoming ready"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        self.handle = Some(handle);
        Ok(info)
    }

    /// Stop the server if `before_test` started one. Safe to call twice.
    pub async fn after_test(&mut self) -> Result<(), LifecycleError> {
        match self.handle.take() {
            Some(handle) => self.manager.stop(&handle).await,
            None => {
                debug!("after_test called with no running server");
                Ok(())
            }
        }
    }

    pub fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref()
    }
}

/// Run `body` against a ready server, stopping the server afterwards no
/// matter how `body` ends.
///
/// An error from `body` wins over an error from stopping; the stop error is
/// logged instead.
pub async fn with_database<L, F, Fut, T, E>(
    manager: &mut LifecycleManager<L>,
    config: ServerConfig,
    ready_timeout: Duration,
    body: F,
) -> Result<T, E>
where
    L: ServerLauncher,
    F: FnOnce(ServerInfo) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LifecycleError>,
{
    let mut session = DatabaseSession::new(manager, config, ready_timeout);
    let info = session.before_test().await?;

    let result = body(info).await;
    let stopped = session.after_test().await;

    match (result, stopped) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(stop_error)) => Err(stop_error.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop_error)) => {
            warn!("Stopping the database after a failed run also failed: {stop_error}");
            Err(e)
        }
    }
}
