//! Execution bridge behaviour against the mock runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cloudbridge_core::{
    BridgeError, BridgePhase, BridgeSettings, ExecutionError, ExtractionError, PNG_DATA_URI_PREFIX,
    PNG_SIGNATURE, RunOutcome, SkipReason,
};
use cloudbridge_sandbox::{MockRun, MockRuntime, TINY_PNG};

fn png_runtime() -> Arc<MockRuntime> {
    Arc::new(MockRuntime::producing_png("result.png"))
}

#[tokio::test]
async fn test_hello_world_scenario() {
    let runtime = png_runtime();
    let (bridge, display) = common::bridge(runtime.clone()).await;

    let outcome = bridge.execute("hello world hello").await.unwrap();
    let RunOutcome::Rendered(image) = outcome else {
        panic!("Expected a render, got {outcome:?}");
    };

    assert!(image.as_str().starts_with(PNG_DATA_URI_PREFIX));
    let bytes = image.to_bytes().unwrap();
    assert_eq!(&bytes[..8], &PNG_SIGNATURE);
    assert_eq!(bytes, TINY_PNG);

    assert_eq!(display.current(), Some(image));
    assert_eq!(bridge.session().last_input(), Some("hello world hello"));
    assert_eq!(bridge.phase(), BridgePhase::Idle);

    let sources = runtime.sources();
    assert_eq!(sources.len(), 1);
    assert!(sources[0].contains("\"hello world hello\""));
    assert!(sources[0].contains("cm.set_text(_text)"));
    assert!(sources[0].contains("output = cm.make_wordcloud_base64()"));
}

#[tokio::test]
async fn test_distinct_inputs_run_twice() {
    let runtime = png_runtime();
    let (bridge, display) = common::bridge(runtime.clone()).await;

    bridge.execute("first text").await.unwrap();
    bridge.execute("second text").await.unwrap();

    assert_eq!(runtime.run_count(), 2);
    assert_eq!(display.updates(), 2);
    assert_eq!(bridge.session().renders(), 2);
}

#[tokio::test]
async fn test_identical_input_runs_once() {
    let runtime = png_runtime();
    let (bridge, display) = common::bridge(runtime.clone()).await;

    assert!(matches!(
        bridge.execute("same").await.unwrap(),
        RunOutcome::Rendered(_)
    ));
    assert_eq!(
        bridge.execute("same").await.unwrap(),
        RunOutcome::Skipped(SkipReason::Unchanged)
    );

    assert_eq!(runtime.run_count(), 1);
    assert_eq!(display.updates(), 1);
}

#[tokio::test]
async fn test_any_change_reruns() {
    let runtime = png_runtime();
    let (bridge, _display) = common::bridge(runtime.clone()).await;

    bridge.execute("same").await.unwrap();
    bridge.execute("same ").await.unwrap();
    bridge.execute("Same ").await.unwrap();

    assert_eq!(runtime.run_count(), 3);
}

#[tokio::test]
async fn test_blank_input_never_runs() {
    let runtime = png_runtime();
    let (bridge, display) = common::bridge(runtime.clone()).await;

    for blank in ["", "   ", "\n\t  \r\n"] {
        assert_eq!(
            bridge.execute(blank).await.unwrap(),
            RunOutcome::Skipped(SkipReason::Blank)
        );
    }

    assert_eq!(runtime.run_count(), 0);
    assert_eq!(display.updates(), 0);
    assert_eq!(bridge.session().last_input(), None);
}

#[tokio::test]
async fn test_guest_fault_leaves_session_untouched() {
    let runtime = Arc::new(
        MockRuntime::producing_png("result.png")
            .then(MockRun::png("result.png"))
            .then(MockRun::Fault("ValueError: font not found".into())),
    );
    let (bridge, display) = common::bridge(runtime.clone()).await;

    bridge.execute("good").await.unwrap();
    let shown = display.current();

    let err = bridge.execute("bad").await.unwrap_err();
    match err {
        BridgeError::Execution(ExecutionError::GuestFault { message }) => {
            assert!(message.contains("font not found"));
        }
        other => panic!("Expected guest fault, got {other:?}"),
    }

    assert_eq!(bridge.session().last_input(), Some("good"));
    assert_eq!(display.current(), shown);
    assert_eq!(display.updates(), 1);
    assert_eq!(bridge.phase(), BridgePhase::Idle);

    // The failed text was never recorded, so it runs again
    assert!(matches!(
        bridge.execute("bad").await.unwrap(),
        RunOutcome::Rendered(_)
    ));
    assert_eq!(runtime.run_count(), 3);
}

#[tokio::test]
async fn test_missing_output_is_extraction_error() {
    let runtime = Arc::new(MockRuntime::new().with_default(MockRun::Silent));
    let (bridge, display) = common::bridge(runtime.clone()).await;

    let err = bridge.execute("hello").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Extraction(ExtractionError::Missing { ref file }) if file == "result.png"
    ));

    assert_eq!(display.updates(), 0);
    assert_eq!(display.current(), None);
    assert_eq!(bridge.session().last_input(), None);
    assert_eq!(runtime.run_count(), 1);
}

#[tokio::test]
async fn test_previous_output_is_not_reused() {
    let runtime = Arc::new(
        MockRuntime::new()
            .then(MockRun::png("result.png"))
            .with_default(MockRun::Silent),
    );
    let (bridge, display) = common::bridge(runtime.clone()).await;

    bridge.execute("first").await.unwrap();
    let shown = display.current();

    // The guest claims success but writes nothing this time
    let err = bridge.execute("second").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Extraction(ExtractionError::Missing { .. })
    ));

    assert_eq!(bridge.session().last_input(), Some("first"));
    assert_eq!(display.updates(), 1);
    assert_eq!(display.current(), shown);
    assert!(runtime.file("result.png").is_none());
}

#[tokio::test]
async fn test_non_png_output_is_rejected() {
    let runtime = Arc::new(MockRuntime::new().with_default(MockRun::Produce {
        file: "result.png".into(),
        bytes: b"not an image".to_vec(),
    }));
    let (bridge, display) = common::bridge(runtime).await;

    let err = bridge.execute("hello").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Extraction(ExtractionError::NotPng { .. })
    ));
    assert_eq!(display.updates(), 0);
}

#[tokio::test]
async fn test_packages_loaded_once() {
    let runtime = png_runtime();
    let (bridge, _display) = common::bridge(runtime.clone()).await;

    bridge.execute("one").await.unwrap();
    bridge.execute("two").await.unwrap();

    assert_eq!(
        runtime.package_loads(),
        vec!["micropip", "numpy", "pillow", "wordcloud"]
    );
}

#[tokio::test]
async fn test_missing_package_prevents_run() {
    let runtime = Arc::new(MockRuntime::producing_png("result.png").with_packages(&["numpy"]));
    let settings = BridgeSettings {
        packages: vec!["numpy".into(), "wordcloud".into()],
        ..Default::default()
    };
    let (bridge, _display) = common::bridge_with(runtime.clone(), settings).await;

    let err = bridge.execute("hello").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Execution(ExecutionError::Package { ref name, .. }) if name == "wordcloud"
    ));
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_while_running_is_dropped() {
    let runtime = Arc::new(
        MockRuntime::producing_png("result.png").with_run_delay(Duration::from_secs(5)),
    );
    let (bridge, _display) = common::bridge(runtime.clone()).await;

    let (first, second) = tokio::join!(bridge.execute("first"), bridge.execute("second"));

    assert!(matches!(first.unwrap(), RunOutcome::Rendered(_)));
    assert_eq!(second.unwrap(), RunOutcome::Busy);
    assert_eq!(runtime.run_count(), 1);
    assert_eq!(bridge.session().last_input(), Some("first"));
    assert_eq!(bridge.phase(), BridgePhase::Idle);

    // The dropped input still runs once the bridge is idle
    bridge.execute("second").await.unwrap();
    assert_eq!(runtime.run_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execution_timeout() {
    let runtime = Arc::new(
        MockRuntime::producing_png("result.png").with_run_delay(Duration::from_secs(60)),
    );
    let settings = BridgeSettings {
        execution_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let (bridge, display) = common::bridge_with(runtime, settings).await;

    let err = bridge.execute("slow").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Execution(ExecutionError::Timeout(d)) if d == Duration::from_secs(2)
    ));
    assert_eq!(display.updates(), 0);
    assert_eq!(bridge.session().last_input(), None);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_run_blocks_next_until_guest_returns() {
    let runtime = Arc::new(
        MockRuntime::producing_png("result.png").with_run_delay(Duration::from_secs(60)),
    );
    let settings = BridgeSettings {
        execution_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let (bridge, display) = common::bridge_with(runtime.clone(), settings).await;

    assert!(bridge.execute("slow").await.is_err());

    // The guest is still going, so nothing new may start
    assert_eq!(bridge.phase(), BridgePhase::Running);
    assert_eq!(bridge.execute("next").await.unwrap(), RunOutcome::Busy);
    assert_eq!(runtime.run_count(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(bridge.phase(), BridgePhase::Idle);

    // The late artifact of the abandoned run is not picked up as this one's
    runtime.push_run(MockRun::Silent);
    let err = bridge.execute("next").await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Extraction(ExtractionError::Missing { .. })
    ));
    assert_eq!(runtime.run_count(), 2);
    assert_eq!(display.updates(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_request_returns_to_idle() {
    let runtime = Arc::new(
        MockRuntime::producing_png("result.png").with_run_delay(Duration::from_secs(60)),
    );
    let (bridge, display) = common::bridge(runtime).await;

    let cancelled = tokio::time::timeout(Duration::from_secs(1), bridge.execute("abandoned")).await;
    assert!(cancelled.is_err());
    assert_eq!(bridge.phase(), BridgePhase::Running);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(bridge.phase(), BridgePhase::Idle);
    assert_eq!(bridge.session().last_input(), None);
    assert_eq!(display.updates(), 0);
}
