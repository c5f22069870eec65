use crate::RedactedPassword;

/// **VALUE**: Verifies the password never shows up in Debug or Display output.
///
/// **WHY THIS MATTERS**: ServerConfig is logged at debug level on every start. A leaked
/// TCP password ends up in CI logs that are often public.
///
/// **BUG THIS CATCHES**: Would catch if someone swaps the manual Debug impl for a derive.
#[test]
fn given_password_when_formatted_then_value_is_redacted() {
    // GIVEN: A password
    let password = RedactedPassword::new("hunter2");

    // WHEN: Formatting with Debug and Display
    let debug = format!("{password:?}");
    let display = format!("{password}");

    // THEN: Neither contains the secret
    assert!(!debug.contains("hunter2"));
    assert!(!display.contains("hunter2"));
    assert!(debug.contains("REDACTED"));
}

/// **VALUE**: Verifies serialization is refused.
///
/// **WHY THIS MATTERS**: `h2ctl config` prints the effective configuration as TOML.
/// The password must never be part of that output by accident.
///
/// **BUG THIS CATCHES**: Would catch if Serialize starts writing the inner value.
#[test]
fn given_password_when_serialized_then_returns_error() {
    // GIVEN: A password
    let password = RedactedPassword::new("hunter2");

    // WHEN: Serializing
    let result = serde_json::to_string(&password);

    // THEN: Serialization fails without echoing the value
    let message = result.expect_err("RedactedPassword must not serialize").to_string();
    assert!(message.contains("RedactedPassword refuses to serialize"));
    assert!(!message.contains("hunter2"));
}

/// **VALUE**: Verifies passwords can still be read from config files.
///
/// **BUG THIS CATCHES**: Would catch if Deserialize is removed along with Serialize.
#[test]
fn given_json_string_when_deserialized_then_exposes_value() {
    // GIVEN / WHEN: Deserializing a JSON string
    let password: RedactedPassword = serde_json::from_str("\"sa-secret\"").unwrap();

    // THEN: The raw value is available through expose()
    assert_eq!(password.expose(), "sa-secret");
    assert_eq!(password.len(), 9);
    assert!(!password.is_empty());
}
