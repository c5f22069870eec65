use crate::error::H2ctlError;

use common::ErrorLocation;
use lifecycle_core::error::{ConfigError, CoreError, LifecycleError};

use std::panic::Location;

/// **VALUE**: Verifies lifecycle and config errors funnel into the core variant.
///
/// **BUG THIS CATCHES**: Would catch a `From` impl wrapping errors in the wrong variant,
/// which changes what the user sees.
#[test]
fn given_core_errors_when_converted_then_wrapped_transparently() {
    // GIVEN
    let lifecycle = LifecycleError::ConfigConflict {
        port: 9092,
        location: ErrorLocation::from(Location::caller()),
    };
    let config = ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: String::from("bad"),
    };
    let lifecycle_message = lifecycle.to_string();

    // WHEN
    let from_lifecycle: H2ctlError = lifecycle.into();
    let from_config: H2ctlError = config.into();

    // THEN
    assert!(matches!(
        from_lifecycle,
        H2ctlError::Core(CoreError::Lifecycle(LifecycleError::ConfigConflict { .. }))
    ));
    assert!(matches!(from_config, H2ctlError::Core(CoreError::Config(_))));
    assert_eq!(from_lifecycle.to_string(), lifecycle_message);
}

/// **VALUE**: Verifies app errors carry their location.
#[test]
fn given_command_error_when_formatted_then_includes_location() {
    let error = H2ctlError::Command {
        message: String::from("Failed to run mvn"),
        location: ErrorLocation::from(Location::caller()),
    };

    let message = error.to_string();

    assert!(message.starts_with("Command Error: Failed to run mvn ["));
    assert!(message.contains("error.rs"));
}
