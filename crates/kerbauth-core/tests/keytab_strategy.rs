mod common;

use std::path::Path;

use common::RecordingRunner;
use kerbauth_core::{
    AuthHandler, AuthSettings, AuthType, AuthenticationStrategy, Authenticator, CredentialCache,
    KerbAuthError, KeytabAuthenticator, Platform, Session,
};

fn settings_with_cache(path: &str) -> AuthSettings {
    AuthSettings::builder()
        .ccache(CredentialCache::new(path))
        .platform(Platform::Posix)
        .build()
}

#[test]
fn keytab_runs_kinit_with_cache_and_keytab() {
    let runner = RecordingRunner::with_exit_codes(&[0]);

    let authenticator = KeytabAuthenticator::new(
        &runner,
        &settings_with_cache("/tmp/kerbauth/cc"),
        "svc-sts",
        "/etc/security/svc-sts.keytab",
        "EXAMPLE.COM",
    )
    .expect("ticket from keytab");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program(), "kinit");
    assert_eq!(
        calls[0].args(),
        [
            "-c",
            "/tmp/kerbauth/cc",
            "-kt",
            "/etc/security/svc-sts.keytab",
            "svc-sts@EXAMPLE.COM"
        ]
    );
    assert!(calls[0].stdin().is_none());
    assert_eq!(authenticator.auth_type(), AuthType::Keytab);
    assert_eq!(authenticator.principal().to_string(), "svc-sts@EXAMPLE.COM");
    assert_eq!(authenticator.keytab(), Path::new("/etc/security/svc-sts.keytab"));
}

#[test]
fn keytab_defaults_to_cache_in_working_directory() {
    let runner = RecordingRunner::with_exit_codes(&[0]);
    let settings = AuthSettings::builder().platform(Platform::Posix).build();

    let authenticator =
        KeytabAuthenticator::new(&runner, &settings, "svc", "svc.keytab", "EXAMPLE.COM")
            .expect("ticket");

    let expected = std::env::current_dir().expect("cwd").join("credentials_cache");
    assert_eq!(authenticator.ccache().path(), expected);
    assert_eq!(runner.calls()[0].args()[1], expected.to_string_lossy());
}

#[test]
fn unsupported_platform_fails_before_any_process() {
    let runner = RecordingRunner::default();
    let settings = AuthSettings::builder().platform(Platform::Windows).build();

    let err = KeytabAuthenticator::new(&runner, &settings, "svc", "svc.keytab", "EXAMPLE.COM")
        .expect_err("windows has no keytab tooling");

    assert!(matches!(
        err,
        KerbAuthError::UnsupportedPlatform {
            auth_type: AuthType::Keytab,
            platform: "windows"
        }
    ));
    assert!(runner.calls().is_empty());
}

#[test]
#[tracing_test::traced_test]
fn failing_kinit_rejects_keytab() {
    let runner = RecordingRunner::with_exit_codes(&[1]);
    let strategy = AuthenticationStrategy::Keytab {
        username: "svc".into(),
        keytab: "missing.keytab".into(),
        domain: "EXAMPLE.COM".into(),
    };

    let err = strategy
        .into_authenticator(&runner, &settings_with_cache("/tmp/kerbauth/cc"))
        .expect_err("kinit failed");

    assert!(
        err.to_string()
            .starts_with("could not generate a valid ticket for the given keytab"),
        "{err}"
    );
    assert!(logs_contain("could not generate a valid ticket"));
}

#[test]
fn handler_carries_cache_without_hostname_override() {
    let runner = RecordingRunner::with_exit_codes(&[0]);
    let authenticator = KeytabAuthenticator::new(
        &runner,
        &settings_with_cache("/tmp/kerbauth/cc"),
        "svc",
        "svc.keytab",
        "EXAMPLE.COM",
    )
    .expect("ticket");

    let session = Session::new("https://sts.example.com/").expect("valid url");
    let AuthHandler::Kerberos(handler) = authenticator.auth_handler(&session).expect("handler")
    else {
        panic!("expected a kerberos handler");
    };

    assert_eq!(handler.service_name(), "HTTP@sts.example.com");
    assert_eq!(
        handler.ccache().map(CredentialCache::krb5ccname).as_deref(),
        Some("FILE:/tmp/kerbauth/cc")
    );
    assert_eq!(runner.calls().len(), 1);
}
