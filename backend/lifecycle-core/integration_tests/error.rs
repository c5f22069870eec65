use lifecycle_core::error::{ConfigError, CoreError, LifecycleError};
use lifecycle_core::port::ensure_available;

use std::net::TcpListener;

/// **VALUE**: Verifies lifecycle errors carry the caller's location in their message.
///
/// **WHY THIS MATTERS**: Build logs are often all there is. The location points straight at
/// the call that failed.
///
/// **BUG THIS CATCHES**: Would catch `#[track_caller]` being dropped from the public helpers.
#[test]
fn given_port_error_when_formatted_then_includes_port_and_location() {
    // GIVEN
    let squatter = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = squatter.local_addr().unwrap().port();

    // WHEN
    let error = ensure_available("127.0.0.1", port).unwrap_err();
    let message = error.to_string();

    // THEN
    assert!(message.starts_with("Port Unavailable Error:"), "message: {message}");
    assert!(message.contains(&format!("127.0.0.1:{port}")));
    assert!(message.contains("integration_tests"), "message: {message}");
}

/// **VALUE**: Verifies the umbrella error stays transparent.
#[test]
fn given_config_error_when_wrapped_in_core_error_then_message_is_unchanged() {
    // GIVEN
    let error = lifecycle_core::config::LifecycleConfig::from_toml_str(
        "version = 9",
        std::path::Path::new("h2.toml"),
    )
    .unwrap_err();
    let expected = error.to_string();

    // WHEN
    let core: CoreError = error.into();

    // THEN
    assert!(matches!(core, CoreError::Config(ConfigError::ValidationError { .. })));
    assert_eq!(core.to_string(), expected);
    assert!(expected.contains("Invalid version: 9"));
}

/// **VALUE**: Verifies model validation errors pass through unchanged.
#[test]
fn given_model_error_when_converted_then_lifecycle_error_is_transparent() {
    let model_error = models::ServerConfigBuilder::default()
        .with_data_dir("/tmp/x")
        .build()
        .unwrap_err();
    let expected = model_error.to_string();

    let error: LifecycleError = model_error.into();

    assert!(matches!(error, LifecycleError::Model(_)));
    assert_eq!(error.to_string(), expected);
}
