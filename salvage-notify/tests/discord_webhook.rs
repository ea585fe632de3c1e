//! DiscordNotifier against a mocked webhook endpoint.

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use salvage_core::{
    ChangeAction, ChangeRecord, FailureKind, Secret, StackFailure, StackName, SyncReport,
};
use salvage_notify::webhook::MAX_CONTENT_CHARS;
use salvage_notify::{DiscordNotifier, Notification, Notifier, NotifyError};
use salvage_test_utils::{always, body_json, unused_local_url, MockApi};

const HOOK_PATH: &str = "/api/webhooks/1/token";

fn notifier(api: &MockApi) -> DiscordNotifier {
    DiscordNotifier::new(
        Secret::new(format!("{}{HOOK_PATH}", api.uri())),
        Duration::from_secs(5),
    )
    .expect("notifier")
    .with_repository("acme/backups@main")
}

fn accepting() -> MockApi {
    always(ResponseTemplate::new(204))
}

fn report(names: &[&str]) -> SyncReport {
    let mut report = SyncReport::new(false);
    for name in names {
        report.changes.push(ChangeRecord::new(
            StackName::from(*name),
            ChangeAction::Created,
            format!("{name}.yaml"),
        ));
    }
    report
}

fn content(request: &wiremock::Request) -> String {
    body_json(request)["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[test]
fn created_stack_posts_summary_and_embed() {
    let api = accepting();

    notifier(&api)
        .notify(&Notification::Changes(report(&["web"])))
        .expect("notify");

    let posts = api.received_with_method("POST");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url.path(), HOOK_PATH);
    let body = body_json(&posts[0]);
    assert!(content(&posts[0]).contains("web created"));
    assert_eq!(body["embeds"][0]["fields"][0]["value"], "web");
    assert_eq!(body["embeds"][0]["color"], 0x1D63ED);
}

#[test]
fn many_changes_span_several_messages() {
    let api = accepting();
    let names: Vec<String> = (0..12).map(|i| format!("s{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    notifier(&api)
        .notify(&Notification::Changes(report(&refs)))
        .expect("notify");

    let posts = api.received_with_method("POST");
    assert_eq!(posts.len(), 2);
    assert_eq!(body_json(&posts[0])["embeds"].as_array().map(Vec::len), Some(10));
    assert_eq!(body_json(&posts[1])["embeds"].as_array().map(Vec::len), Some(2));
    assert!(body_json(&posts[1]).get("content").is_none());
}

#[test]
fn many_failures_stay_within_content_limit() {
    let api = accepting();
    let mut report = SyncReport::new(false);
    for i in 0..15 {
        let path = format!("stacks/service-{i:02}.yaml");
        report.failures.push(StackFailure {
            stack: StackName::from(format!("service-{i:02}").as_str()),
            reason: format!(
                "network error calling https://api.github.com/repos/acme/backups/contents/{path}?ref=main: \
                 Connection Failed: Connect error: Connection refused (os error 111)"
            ),
            path,
            kind: FailureKind::Network,
        });
    }

    notifier(&api)
        .notify(&Notification::Changes(report))
        .expect("notify");

    let posts = api.received_with_method("POST");
    assert!(posts.len() > 1);
    let texts: Vec<String> = posts.iter().map(content).collect();
    for text in &texts {
        assert!(text.chars().count() <= MAX_CONTENT_CHARS, "{} chars", text.chars().count());
    }
    let all = texts.join("\n");
    assert!(all.starts_with("Backed up 0 stack changes"), "{all}");
    for i in 0..15 {
        assert!(all.contains(&format!("- service-{i:02} (network)")), "missing {i}");
    }
}

#[test]
fn fatal_error_is_posted_as_text() {
    let api = accepting();

    notifier(&api)
        .notify(&Notification::Fatal("stack source unavailable".into()))
        .expect("notify");

    let body = body_json(&api.received()[0]);
    assert_eq!(
        body["content"],
        "Salvage run failed (acme/backups@main): stack source unavailable"
    );
    assert!(body.get("embeds").is_none());
}

#[test]
fn rate_limit_is_retried_once() {
    let api = MockApi::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({ "message": "rate limited", "retry_after": 0.05 })),
            )
            .up_to_n_times(1)
            .with_priority(1),
    );
    api.mount(
        Mock::given(method("POST"))
            .and(path(HOOK_PATH))
            .respond_with(ResponseTemplate::new(204)),
    );

    let started = Instant::now();
    notifier(&api)
        .notify(&Notification::NoChanges { unchanged: 1 })
        .expect("notify");

    assert_eq!(api.received().len(), 2);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn persistent_rate_limit_gives_up() {
    let api = always(ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 0.01 })));

    let err = notifier(&api)
        .notify(&Notification::NoChanges { unchanged: 1 })
        .unwrap_err();

    assert!(matches!(err, NotifyError::Rejected { status: 429, .. }));
    assert_eq!(api.received().len(), 2);
}

#[test]
fn unreachable_webhook_does_not_leak_url() {
    let notifier = DiscordNotifier::new(
        Secret::new(format!("{}/api/webhooks/1/secret-token", unused_local_url())),
        Duration::from_secs(2),
    )
    .expect("notifier");

    let err = notifier
        .notify(&Notification::Fatal("x".into()))
        .unwrap_err();

    assert!(matches!(err, NotifyError::Network { .. }));
    assert!(!err.to_string().contains("secret-token"));
}
