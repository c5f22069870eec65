mod redacted_password;
