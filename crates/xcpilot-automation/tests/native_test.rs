mod common;

use common::{
    FakeProcesses, ax_command, ax_error, ax_success, dispatcher, failed, is_ax, is_osascript, ok,
    script_of,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use xcpilot_automation::{
    Action, AutomationConfig, Backend, CancellationToken, ExecutionContext, ProcessRequest,
};

fn native(action: Action, application: &str, params: Value) -> ExecutionContext {
    ExecutionContext::new(action)
        .with_backend(Backend::MacosAx)
        .with_application(application)
        .with_params(params)
}

fn ax_kind(request: &ProcessRequest) -> Option<String> {
    is_ax(request)
        .then(|| ax_command(request)["command"].as_str().map(str::to_string))
        .flatten()
}

#[tokio::test]
async fn tap_falls_back_to_direct_press_and_stops_there() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        match ax_kind(request).as_deref() {
            Some("perform_action") => ax_error("Action 'AXPress' is not supported by element"),
            Some(_) => ax_success(json!({})),
            None if script_of(request).contains("perform action \"AXPress\"") => ok("pressed"),
            None => failed(1, "unexpected script"),
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::Tap, "com.apple.TextEdit", json!({"identifier": "save"})))
        .await;

    assert!(envelope.ok, "{:?}", envelope);
    let data = envelope.data.as_ref().unwrap();
    assert_eq!(data["method"], "AXPress");
    assert_eq!(data["tier"], "direct_press");
    assert_eq!(envelope.warnings.len(), 1);
    assert!(envelope.warnings[0].contains("perform_action"));

    let calls = fake.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls.iter().any(|c| script_of(c).contains("click at")));
    assert!(!calls.iter().any(|c| ax_kind(c).as_deref() == Some("get_attributes")));
}

#[tokio::test]
async fn tap_not_found_does_not_fall_back() {
    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ax_error("Element not found for locator")),
    );

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::Tap, "com.apple.TextEdit", json!({"identifier": "nope"})))
        .await;

    assert_eq!(envelope.first_error_code(), Some("ELEMENT_NOT_FOUND"));
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn missing_press_action_moves_on_to_direct_press() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        match ax_kind(request).as_deref() {
            Some("perform_action") => ax_error("Action not found: AXPress"),
            Some(_) => ax_success(json!({})),
            None if script_of(request).contains("perform action \"AXPress\"") => ok("pressed"),
            None => failed(1, "unexpected script"),
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::Tap, "com.apple.TextEdit", json!({"identifier": "save"})))
        .await;

    assert!(envelope.ok, "{:?}", envelope);
    assert_eq!(envelope.data.as_ref().unwrap()["tier"], "direct_press");
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn unrepresentable_wait_timeout_is_rejected() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]));
    let dispatcher = dispatcher(&fake, AutomationConfig::default());

    for timeout in [json!(1e300), json!("inf")] {
        let envelope = dispatcher
            .execute(&native(
                Action::WaitFor,
                "com.apple.TextEdit",
                json!({"identifier": "save", "timeout": timeout}),
            ))
            .await;
        assert!(!envelope.ok);
        assert_eq!(envelope.first_error_code(), Some("INVALID_PARAMS"));
    }
    assert_eq!(fake.invocation_count(), 0);
}

#[tokio::test]
async fn tap_exhaustion_reports_every_tier() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        match ax_kind(request).as_deref() {
            Some("perform_action") => ax_error("AXPress unsupported"),
            Some("get_attributes") => ax_success(json!({
                "attributes": {"AXPosition": {"x": 10, "y": 20}, "AXSize": {"width": 100, "height": 40}}
            })),
            Some(_) => ax_success(json!({})),
            None => failed(1, "System Events got an error: Access not allowed"),
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::Tap, "com.apple.TextEdit", json!({"title": "Save"})))
        .await;

    assert!(!envelope.ok);
    assert_eq!(envelope.first_error_code(), Some("TAP_FALLBACK_EXHAUSTED"));
    let attempts = envelope.data.as_ref().unwrap()["attempts"].as_array().unwrap().clone();
    let methods: Vec<_> = attempts.iter().map(|a| a["method"].as_str().unwrap()).collect();
    assert_eq!(methods, vec!["perform_action", "AXPress", "coordinate_click"]);

    let click = fake
        .calls()
        .into_iter()
        .find(|c| script_of(c).contains("click at"))
        .expect("coordinate click attempted");
    assert!(script_of(&click).contains("click at {60, 40}"));
}

#[tokio::test]
async fn describe_ui_resolves_plain_application_names() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        if is_osascript(request) {
            return ok("com.apple.finder\n");
        }
        ax_success(json!({
            "elements": [{"role": "AXWindow", "title": "Desktop", "children": [{"role": "AXButton"}]}]
        }))
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::DescribeUi, "Finder", json!({"maxDepth": 3})))
        .await;

    assert!(envelope.ok, "{:?}", envelope);
    let calls = fake.calls();
    assert!(is_osascript(&calls[0]));
    assert!(script_of(&calls[0]).contains("id of application \"Finder\""));
    let command = ax_command(&calls[1]);
    assert_eq!(command["command"], "collect_all");
    assert_eq!(command["application"], "com.apple.finder");
    assert_eq!(command["max_depth"], 3);
    assert!(uuid_like(command["command_id"].as_str().unwrap()));

    let data = envelope.data.unwrap();
    assert_eq!(data["elementCount"], 2);
    assert_eq!(data["elements"][0]["title"], "Desktop");
    assert!(envelope.warnings.is_empty());
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn failed_name_lookup_falls_back_to_literal_name() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        if is_osascript(request) {
            return failed(1, "Can't get application \"Finder\"");
        }
        ax_success(json!({"elements": []}))
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::DescribeUi, "Finder", json!({})))
        .await;

    assert!(envelope.ok);
    assert_eq!(envelope.warnings.len(), 1);
    let command = ax_command(&fake.calls_to("axorc")[0]);
    assert_eq!(command["application"], "Finder");
    assert_eq!(command["max_depth"], 5);
}

#[tokio::test]
async fn missing_tool_and_application_are_preconditions() {
    let fake = Arc::new(FakeProcesses::new());
    let dispatcher = dispatcher(&fake, AutomationConfig::default());

    let envelope = dispatcher
        .execute(&native(Action::QueryText, "com.apple.TextEdit", json!({})))
        .await;
    assert_eq!(envelope.first_error_code(), Some("AX_TOOL_NOT_FOUND"));
    assert!(envelope.errors[0].hint.is_some());

    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]));
    let dispatcher = common::dispatcher(&fake, AutomationConfig::default());
    let ctx = ExecutionContext::new(Action::QueryText).with_backend(Backend::MacosAx);
    let envelope = dispatcher.execute(&ctx).await;
    assert_eq!(envelope.first_error_code(), Some("MISSING_APPLICATION"));
    assert_eq!(fake.invocation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_for_succeeds_on_second_poll() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            ax_error("No element matched locator")
        } else {
            ax_success(json!({"role": "AXButton"}))
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(
            Action::WaitFor,
            "com.apple.TextEdit",
            json!({"identifier": "save-button", "timeout": 1}),
        ))
        .await;

    assert!(envelope.ok);
    assert_eq!(envelope.data, Some(json!({"found": true, "attempts": 2})));
    assert_eq!(polls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out_after_bounded_polls() {
    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ax_error("No element matched locator")),
    );

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(
            Action::WaitFor,
            "com.apple.TextEdit",
            json!({"identifier": "save-button", "timeout": 2}),
        ))
        .await;

    assert!(!envelope.ok);
    assert_eq!(envelope.first_error_code(), Some("TIMEOUT"));
    assert_eq!(fake.calls().len(), 4);
    assert_eq!(envelope.data.as_ref().unwrap()["attempts"], 4);
}

#[tokio::test]
async fn wait_for_with_cancelled_signal_never_polls() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(
            &native(Action::WaitFor, "com.apple.TextEdit", json!({"identifier": "save"}))
                .with_cancellation(cancel),
        )
        .await;

    assert_eq!(envelope.first_error_code(), Some("ABORTED"));
    assert_eq!(envelope.data.as_ref().unwrap()["attempts"], 0);
    assert_eq!(fake.invocation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_for_stops_when_cancelled_between_polls() {
    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ax_error("No element matched locator")),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(750)).await;
        trigger.cancel();
    });

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(
            &native(
                Action::WaitFor,
                "com.apple.TextEdit",
                json!({"identifier": "save", "timeoutMs": 10000}),
            )
            .with_cancellation(cancel),
        )
        .await;

    assert_eq!(envelope.first_error_code(), Some("ABORTED"));
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn assert_reports_expected_and_actual() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|_| {
        ax_success(json!({"attributes": {"AXRole": "AXTextField", "AXValue": "draft"}}))
    }));
    let dispatcher = dispatcher(&fake, AutomationConfig::default());

    let envelope = dispatcher
        .execute(&native(
            Action::Assert,
            "com.apple.TextEdit",
            json!({"identifier": "status", "expectedValue": "final"}),
        ))
        .await;
    assert!(!envelope.ok);
    assert_eq!(envelope.data, Some(json!({"expected": "final", "actual": "draft"})));
    assert_eq!(envelope.first_error_code(), Some("ASSERT_VALUE_MISMATCH"));

    let envelope = dispatcher
        .execute(&native(
            Action::Assert,
            "com.apple.TextEdit",
            json!({"identifier": "status", "expectedValue": "draft"}),
        ))
        .await;
    assert!(envelope.ok);
    assert_eq!(envelope.data.unwrap()["element"]["value"], "draft");
}

#[tokio::test(start_paused = true)]
async fn type_falls_back_to_focus_and_keystroke() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        let command = ax_command(request);
        match command["action_name"].as_str() {
            Some("AXSetValue") => ax_error("Attribute AXValue is not settable"),
            Some("AXPress") => ax_success(json!({})),
            _ if script_of(request).contains("keystroke") => ok(""),
            _ => failed(1, "unexpected"),
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(
            Action::Type,
            "com.apple.TextEdit",
            json!({"identifier": "body", "text": "Hello \"world\""}),
        ))
        .await;

    assert!(envelope.ok, "{:?}", envelope);
    let data = envelope.data.as_ref().unwrap();
    assert_eq!(data["method"], "keystroke");
    assert_eq!(data["focusedByTap"], true);
    assert_eq!(envelope.warnings.len(), 1);

    let calls = fake.calls();
    let kinds: Vec<_> = calls
        .iter()
        .map(|c| ax_command(c)["action_name"].as_str().unwrap_or("script").to_string())
        .collect();
    assert_eq!(kinds, vec!["AXSetValue", "AXPress", "script"]);
    assert!(script_of(&calls[2]).contains(r#"keystroke "Hello \"world\"""#));
}

#[tokio::test]
async fn type_exhaustion_never_sends_blind_keystrokes() {
    let fake = Arc::new(FakeProcesses::new().installed(&["axorc"]).reply_with(|request| {
        match ax_kind(request).as_deref() {
            Some("perform_action") => ax_error("Action not supported"),
            Some("get_attributes") => ax_success(json!({})),
            Some(_) => ax_success(json!({})),
            None => failed(1, "scripting refused"),
        }
    }));

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(
            Action::Type,
            "com.apple.TextEdit",
            json!({"identifier": "body", "text": "abc"}),
        ))
        .await;

    assert_eq!(envelope.first_error_code(), Some("TYPE_FALLBACK_EXHAUSTED"));
    assert!(!fake.calls().iter().any(|c| script_of(c).contains("keystroke")));
}

#[tokio::test]
async fn clear_text_has_no_fallback() {
    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ax_error("Attribute AXValue is not settable")),
    );

    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::ClearText, "com.apple.TextEdit", json!({"identifier": "body"})))
        .await;

    assert_eq!(envelope.first_error_code(), Some("ACTION_NOT_SUPPORTED"));
    assert_eq!(fake.calls().len(), 1);
    assert_eq!(ax_command(&fake.calls()[0])["action_value"], "");
}

#[tokio::test]
async fn query_text_and_invalid_tool_output() {
    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ax_success(json!({"text": "Hello"}))),
    );
    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::QueryText, "com.apple.TextEdit", json!({"role": "AXTextArea"})))
        .await;
    assert_eq!(envelope.data, Some(json!({"text": "Hello", "matches": ["Hello"]})));

    let fake = Arc::new(
        FakeProcesses::new()
            .installed(&["axorc"])
            .reply_with(|_| ok("Segmentation fault")),
    );
    let envelope = dispatcher(&fake, AutomationConfig::default())
        .execute(&native(Action::QueryText, "com.apple.TextEdit", json!({})))
        .await;
    assert_eq!(envelope.first_error_code(), Some("AX_TOOL_INVALID_OUTPUT"));
}

#[tokio::test]
async fn native_screenshot_needs_no_accessibility_tool() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeProcesses::new());
    let config = AutomationConfig {
        artifact_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let ctx = ExecutionContext::new(Action::Screenshot).with_backend(Backend::MacosAx);
    let envelope = dispatcher(&fake, config).execute(&ctx).await;

    assert!(envelope.ok, "{:?}", envelope);
    let call = &fake.calls()[0];
    assert_eq!(call.program, "screencapture");
    assert_eq!(call.args[0], "-x");
    assert!(call.args[1].starts_with(&dir.path().join("screenshots").display().to_string()));
    assert_eq!(envelope.artifacts.get("screenshot"), Some(&call.args[1]));
}
