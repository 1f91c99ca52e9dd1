//! Provisioning and readiness gate tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cloudbridge_core::{
    BridgeError, BridgeSettings, Host, MemoryDisplay, ProgramSynthesizer, ProvisionError,
    Provisioner, Readiness, RunOutcome,
};
use cloudbridge_sandbox::{GuestRuntime, MockRuntime};
use common::{FONT_BYTES, FONT_URL, GatedFetcher, MODULE_BYTES, MapFetcher, manifest};

fn launch(provisioner: Provisioner) -> (Host, Arc<MemoryDisplay>) {
    let display = Arc::new(MemoryDisplay::new());
    let host = Host::launch(
        provisioner,
        ProgramSynthesizer::default(),
        display.clone(),
        BridgeSettings::default(),
    );
    (host, display)
}

#[tokio::test]
async fn test_provisioning_stages_module_then_font() {
    let runtime = Arc::new(MockRuntime::new());
    let fetcher = Arc::new(MapFetcher::standard());
    let provisioned = Provisioner::new(runtime.clone(), fetcher.clone(), manifest())
        .initialize()
        .await
        .unwrap();

    assert!(runtime.is_booted());
    assert_eq!(fetcher.requests(), vec![common::MODULE_URL, FONT_URL]);
    assert_eq!(runtime.file("cloud.pyc").unwrap(), MODULE_BYTES);
    assert_eq!(runtime.file("PretendardVariable.ttf").unwrap(), FONT_BYTES);

    let staged = provisioned.staged();
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[0].target, "cloud.pyc");
    assert_eq!(staged[0].bytes, MODULE_BYTES.len());
    assert_eq!(staged[0].sha256.len(), 64);
    assert_eq!(staged[1].target, "PretendardVariable.ttf");
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test]
async fn test_provisioning_aborts_on_first_failure() {
    let runtime = Arc::new(MockRuntime::new());
    let fetcher = Arc::new(MapFetcher::default().with(common::MODULE_URL, MODULE_BYTES));

    let err = Provisioner::new(runtime.clone(), fetcher, manifest())
        .initialize()
        .await
        .unwrap_err();

    match err {
        ProvisionError::Fetch { target, .. } => assert_eq!(target, "PretendardVariable.ttf"),
        other => panic!("Expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_boot_failure() {
    let runtime = Arc::new(MockRuntime::new().failing_boot("interpreter missing"));
    let fetcher = Arc::new(MapFetcher::standard());

    let err = Provisioner::new(runtime.clone(), fetcher.clone(), manifest())
        .initialize()
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Boot(_)));
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn test_preload_packages() {
    let runtime = Arc::new(MockRuntime::new().with_packages(&["numpy", "wordcloud"]));
    let provisioned = Provisioner::new(runtime.clone(), Arc::new(MapFetcher::standard()), manifest())
        .with_preload(vec!["numpy".into(), "wordcloud".into()])
        .initialize()
        .await
        .unwrap();
    assert_eq!(provisioned.preloaded(), ["numpy", "wordcloud"]);
    assert_eq!(runtime.package_loads(), vec!["numpy", "wordcloud"]);

    let runtime = Arc::new(MockRuntime::new().with_packages(&["numpy"]));
    let err = Provisioner::new(runtime, Arc::new(MapFetcher::standard()), manifest())
        .with_preload(vec!["pillow".into()])
        .initialize()
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Package { ref name, .. } if name == "pillow"));
}

#[tokio::test]
async fn test_slow_fetch_blocks_run() {
    let runtime = Arc::new(MockRuntime::producing_png("result.png"));
    let (fetcher, gate) = GatedFetcher::new(MapFetcher::standard(), FONT_URL);
    let (host, display) = launch(Provisioner::new(runtime.clone(), Arc::new(fetcher), manifest()));
    let host = Arc::new(host);

    let pending = tokio::spawn({
        let host = host.clone();
        async move { host.run("hello world hello").await }
    });

    // Give provisioning and the trigger every chance to make progress
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(host.readiness(), Readiness::Provisioning);
    assert!(!pending.is_finished());
    assert_eq!(runtime.run_count(), 0);
    assert_eq!(display.updates(), 0);

    gate.notify_one();
    let outcome = pending.await.unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::Rendered(_)));
    assert_eq!(host.readiness(), Readiness::Ready);
    assert_eq!(runtime.run_count(), 1);
    assert_eq!(display.updates(), 1);
}

#[tokio::test]
async fn test_failed_provisioning_disables_feature() {
    let runtime = Arc::new(MockRuntime::new().failing_boot("no interpreter"));
    let (host, display) = launch(Provisioner::new(
        runtime.clone(),
        Arc::new(MapFetcher::standard()),
        manifest(),
    ));

    for _ in 0..2 {
        let err = host.run("hello").await.unwrap_err();
        match err {
            BridgeError::Unavailable(reason) => assert!(reason.contains("no interpreter")),
            other => panic!("Expected unavailable, got {other:?}"),
        }
    }

    assert!(matches!(host.readiness(), Readiness::Unavailable(_)));
    assert_eq!(runtime.run_count(), 0);
    assert_eq!(display.updates(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_timeout() {
    let runtime = Arc::new(MockRuntime::producing_png("result.png"));
    // The gate is never opened
    let (fetcher, _gate) = GatedFetcher::new(MapFetcher::standard(), FONT_URL);
    let provisioner = Provisioner::new(runtime.clone(), Arc::new(fetcher), manifest())
        .with_timeout(Duration::from_secs(30));
    let (host, _display) = launch(provisioner);

    let err = host.run("hello").await.unwrap_err();
    assert!(matches!(err, BridgeError::Unavailable(ref reason) if reason.contains("timed out")));
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test]
async fn test_host_dedupes_across_triggers() {
    let runtime = Arc::new(MockRuntime::producing_png("result.png"));
    let (host, _display) = launch(Provisioner::new(
        runtime.clone(),
        Arc::new(MapFetcher::standard()),
        manifest(),
    ));

    host.run("a b c").await.unwrap();
    host.run("a b c").await.unwrap();
    host.run("").await.unwrap();
    host.run("a b c d").await.unwrap();

    assert_eq!(runtime.run_count(), 2);
    let bridge = host.wait_ready().await.unwrap();
    assert_eq!(bridge.session().last_input(), Some("a b c d"));
}
