//! Runs `tests/features/pods.feature` against an in-memory cluster.

mod common;

use std::{sync::Arc, time::Duration};

use kubestep::{
    AssertionMode, AsyncAssertion, Cli, Engine, Executor, Outcome, Predicate, ResourceRef,
    Scheme, StepContext, StepDefinition, StepHelper,
    client::WatchSource,
    executor::{self, Interrupts},
    gherkin::{Feature, GherkinEnv},
    resource::ResourceOption,
};
use futures::FutureExt as _;
use serde_json::{Value as Json, json};
use tokio::time;

use self::common::Cluster;

fn scheme(cluster: &Arc<Cluster>, cli: Cli) -> Scheme {
    let creator = Arc::clone(cluster);
    let dry_runner = Arc::clone(cluster);
    let changer = Arc::clone(cluster);
    let watcher = Arc::clone(cluster);
    let auditor = Arc::clone(cluster);
    let counter = Arc::clone(cluster);

    Scheme::builder()
        .with_config(&cli)
        .step(
            StepDefinition::new(
                "I create {id}:",
                move |_: StepContext, helper: StepHelper, target: ResourceRef, mut object: Json| {
                    let cluster = Arc::clone(&creator);
                    async move {
                        object["kind"] = json!(target.kind.clone().unwrap_or_default());
                        object["metadata"]["name"] = json!(target.name);
                        _ = kubestep::ResourceClient::create(&*cluster, &object, &[]).await?;
                        helper.log(format!("created {target}"));
                        helper.on_cleanup(move || {
                            async move {
                                kubestep::ResourceClient::delete(&*cluster, &target, &[]).await?;
                                Ok(())
                            }
                            .boxed_local()
                        });
                        Ok::<_, anyhow::Error>(())
                    }
                },
            )
            .with_doc_string(),
        )
        .step(
            StepDefinition::new(
                "I create {id} with options",
                move |_: StepContext, target: ResourceRef, options: Vec<ResourceOption>| {
                    let cluster = Arc::clone(&dry_runner);
                    async move {
                        let object = json!({
                            "kind": target.kind.clone().unwrap_or_default(),
                            "metadata": {"name": target.name},
                        });
                        _ = kubestep::ResourceClient::create(&*cluster, &object, &options).await?;
                        Ok::<_, anyhow::Error>(())
                    }
                },
            )
            .with_step_argument("create-options"),
        )
        .step(StepDefinition::new(
            "{id} turns {text} after {duration}",
            move |_: StepContext, target: ResourceRef, phase: String, delay: Duration| {
                let cluster = Arc::clone(&changer);
                drop(tokio::spawn(async move {
                    time::sleep(delay).await;
                    cluster.modify(&target, |o| o["status"]["phase"] = json!(phase));
                }));
                async { Ok::<_, anyhow::Error>(()) }
            },
        ))
        .step(StepDefinition::new(
            "{id} {should} {async} {matcher}",
            move |ctx: StepContext,
                  target: ResourceRef,
                  should: bool,
                  mode: AssertionMode,
                  matcher: Predicate| {
                let client: Arc<Cluster> = Arc::clone(&watcher);
                let source = WatchSource::new(client, target);
                async move {
                    AsyncAssertion::new(mode, matcher)
                        .desired(should)
                        .with_config(&cli)
                        .assert(&ctx, &source)
                        .await;
                    Ok::<_, anyhow::Error>(())
                }
            },
        ))
        .step(StepDefinition::new(
            "{id} was created by alice as a dry run",
            move |_: StepContext, target: ResourceRef| {
                let options = auditor.options_of(&target);
                async move {
                    anyhow::ensure!(
                        options
                            == Some(vec![
                                ResourceOption::DryRunAll,
                                ResourceOption::FieldOwner("alice".into()),
                            ]),
                        "created with {options:?}",
                    );
                    Ok(())
                }
            },
        ))
        .step(StepDefinition::new(
            "there are {number} resources",
            move |_: StepContext, expected: i64| {
                let actual = counter.len();
                async move {
                    anyhow::ensure!(
                        i64::try_from(actual)? == expected,
                        "{actual} resources exist",
                    );
                    Ok(())
                }
            },
        ))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn pod_lifecycle() {
    _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let cluster = Arc::new(Cluster::default());
    let cli = Cli { assertion_timeout: Duration::from_secs(5), ..Cli::default() };
    let engine = Engine::new(scheme(&cluster, cli))
        .with_executor(Executor::new().with_interrupts(Interrupts::None).with_config(&cli));
    let feature = Feature::parse_path("tests/features/pods.feature", GherkinEnv::default())
        .unwrap();

    let mut outcomes = Vec::new();
    for scenario in &feature.scenarios {
        let results = engine.run_scenario(&StepContext::new(), scenario).await;
        for res in &results {
            assert!(
                res.outcome != Outcome::Failed || res.message.is_some(),
                "failed without message",
            );
        }
        let cleanups = results.iter().map(|r| r.cleanups.len()).sum::<usize>();
        let messages = results.iter().flat_map(|r| r.messages.clone()).collect::<Vec<_>>();
        let got = results.iter().map(|r| r.outcome).collect::<Vec<_>>();
        let failure = results.iter().find_map(|r| r.message.clone());

        let mut errors = Vec::new();
        for res in results {
            errors.extend(executor::run_cleanups(res.cleanups).await);
        }
        assert!(errors.is_empty(), "{}: {errors:?}", scenario.name);
        assert_eq!(cluster.len(), 0, "{} leaked resources", scenario.name);
        assert_eq!(cluster.open_watches(), 0, "{} leaked watches", scenario.name);

        outcomes.push((scenario.name.clone(), got, cleanups, messages, failure));
    }

    let [ready, never_ready, crash, absent, dry_run, undefined] = outcomes.as_slice() else {
        panic!("unexpected scenarios: {outcomes:?}");
    };

    assert_eq!(ready.1, [Outcome::Passed; 4], "{ready:?}");
    assert_eq!(ready.2, 1);
    assert_eq!(ready.3, ["created pod/web"]);

    assert_eq!(
        never_ready.1,
        [Outcome::Passed, Outcome::Passed, Outcome::Timedout, Outcome::Skipped],
        "{never_ready:?}",
    );
    assert_eq!(never_ready.4.as_deref(), Some("Timed out after 5s"));

    assert_eq!(crash.1, [Outcome::Passed, Outcome::Passed, Outcome::Failed], "{crash:?}");
    assert!(crash.4.as_deref().is_some_and(|m| m.contains("Failed")), "{crash:?}");

    assert_eq!(absent.1, [Outcome::Passed; 2], "{absent:?}");

    assert_eq!(dry_run.1, [Outcome::Passed; 3], "{dry_run:?}");

    assert_eq!(undefined.1, [Outcome::Failed, Outcome::Skipped], "{undefined:?}");
    assert_eq!(
        undefined.4.as_deref(),
        Some("no step definition matches `a pod nobody knows how to create`"),
    );
}

#[tokio::test]
async fn interrupted_scenarios_skip_the_rest() {
    let cluster = Arc::new(Cluster::default());
    let engine = Engine::new(scheme(&cluster, Cli::default()))
        .with_executor(Executor::new().with_interrupts(Interrupts::None));
    let parent = StepContext::new();
    parent.cancel();

    let results = engine
        .run_steps(
            &parent,
            ["there are 0 resources", "there are 0 resources"].map(kubestep::StepInput::new),
        )
        .await;

    let outcomes = results.iter().map(|r| r.outcome).collect::<Vec<_>>();
    assert_eq!(outcomes, [Outcome::Interrupted, Outcome::Skipped]);
}
