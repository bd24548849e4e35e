//! End-to-end scenarios for the run protocol.
//!
//! The fixtures mirror the ones interaction scripts use: `typeInto` and
//! `click` with a locator strategy, a `loadDemoData` row producer and a
//! self-registering fixture with an interruptible `sleep`.

use ensayo::prelude::*;
use ensayo::{Action, ExitReport, ListenerFault, UnitKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FixtureEnum)]
enum LocatorStrategy {
    Id,
    XPath,
    Label,
}

/// Fixture that is also a listener and registers itself at run start
#[derive(Debug, Default)]
struct SampleFixture {
    seen: RecordingListener,
    init_calls: AtomicUsize,
}

impl TestRunListener for SampleFixture {
    fn reported(&self, event: &ReportEvent) -> ListenerResult {
        self.seen.reported(event)
    }

    fn report_exit(&self, exit: &ExitReport) -> ListenerResult {
        self.seen.report_exit(exit)
    }
}

impl TestRunReportable for SampleFixture {
    fn init_with_reporter(self: Arc<Self>, reporter: &mut ReporterHub) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        reporter.add_listener(self);
    }
}

fn locator_params(builder: ensayo::FixtureMethodBuilder) -> ensayo::FixtureMethodBuilder {
    builder
        .param("locator", ParamType::Str)
        .param("locatorStrategy", ParamType::enumeration::<LocatorStrategy>())
}

fn registry(sample: Option<Arc<SampleFixture>>) -> Arc<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    let methods = vec![
        locator_params(FixtureMethod::builder("typeInto"))
            .param("value", ParamType::Str)
            .build(|call| {
                let args = call.args();
                let locator = args.str("locator")?;
                let _: LocatorStrategy = args.enumeration("locatorStrategy")?;
                if locator.starts_with("missing") {
                    return Err(FixtureException::new(format!("no element '{locator}'"))
                        .with_detail("locator", locator)
                        .into());
                }
                Ok(Returned::Void)
            })
            .unwrap(),
        locator_params(FixtureMethod::builder("click"))
            .build(|_| Ok(Returned::Void))
            .unwrap(),
        FixtureMethod::builder("loadDemoData")
            .returns(ReturnShape::Rows)
            .build(|_| {
                Ok(Returned::rows(vec![
                    Row::tuple(vec![Value::from("Arthur"), Value::from("Dent"), Value::Int(42)]),
                    Row::tuple(vec![
                        Value::from("Ford"),
                        Value::from("Prefect"),
                        Value::Int(42),
                    ]),
                    Row::tuple(vec![
                        Value::from("Zaphod"),
                        Value::from("Beeblebrox"),
                        Value::Int(42),
                    ]),
                ]))
            })
            .unwrap(),
        FixtureMethod::builder("endlessData")
            .returns(ReturnShape::Rows)
            .build(|_| {
                Ok(Returned::rows(
                    (0..).map(|i: i64| Row::Scalar(Value::Int(i))),
                ))
            })
            .unwrap(),
        FixtureMethod::builder("checkPerson")
            .param("firstName", ParamType::Str)
            .param("lastName", ParamType::Str)
            .param("age", ParamType::Int)
            .build(|call| {
                let first = call.args().str("firstName")?;
                if first == "Ford" {
                    return Err(AssertionFailure::mismatch("Arthur or Zaphod", first).into());
                }
                Ok(Returned::Void)
            })
            .unwrap(),
        FixtureMethod::builder("sleep")
            .build(|call| {
                call.sleep(Duration::from_secs(30)).map_err(|e| {
                    Failure::from(
                        FixtureException::new("interrupted while sleeping").with_cause(e),
                    )
                })?;
                Ok(Returned::Void)
            })
            .unwrap(),
    ];
    registry.register_all(methods).unwrap();
    if let Some(sample) = sample {
        registry.register_reportable(sample);
    }
    Arc::new(registry)
}

fn args(pairs: &[(&str, &str)]) -> ArgumentMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn assert_balanced(recorder: &RecordingListener) {
    let events = recorder.events();
    let enters = events.iter().filter(|e| e.action == Action::Enter).count();
    let leaves = events.iter().filter(|e| e.action == Action::Leave).count();
    assert_eq!(enters, leaves, "unmatched ENTER in {:?}", recorder.transcript());
}

mod failure_reporting {
    use super::*;

    #[test]
    fn test_fixture_failure_in_case_reports_one_exit() {
        let mut run = TestRun::with_defaults(registry(None)).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let suite = run.enter(SemanticUnit::suite("Login")).unwrap();
        let case = run.enter(SemanticUnit::case("login fails")).unwrap();
        let outcome = run
            .invoke(
                "typeInto",
                &args(&[
                    ("locator", "missing:user"),
                    ("locatorStrategy", "ID"),
                    ("value", "arthur"),
                ]),
            )
            .unwrap();
        run.leave(&case, outcome.status()).unwrap();
        run.leave(&suite, Status::Ok).unwrap();

        assert_eq!(
            recorder.transcript(),
            vec![
                "ENTER SUITE Login",
                "ENTER TEST login fails",
                "LEAVE TEST login fails FIXTURE_FAILURE",
                "LEAVE SUITE Login OK",
            ]
        );
        let exits = recorder.exits();
        assert_eq!(exits.len(), 1);
        assert!(matches!(exits[0], ExitReport::Fixture(_)));
        assert_eq!(exits[0].message(), "no element 'missing:user'");

        let case_leave = &recorder.leaves()[0];
        assert_eq!(
            case_leave.variables.get("locator").map(String::as_str),
            Some("missing:user")
        );

        let summary = run.finish();
        assert_eq!(summary.fixture_failures, 1);
        assert_eq!(summary.exits_reported, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_binding_resolves_strategy_case_insensitively() {
        let mut run = TestRun::with_defaults(registry(None)).unwrap();
        let outcome = run
            .run_step(
                SemanticUnit::step("type hello"),
                "typeInto",
                &args(&[
                    ("locator", "id:submit"),
                    ("locatorStrategy", "id"),
                    ("value", "hello"),
                ]),
            )
            .unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_unresolved_strategy_lists_expected_values() {
        let mut run = TestRun::with_defaults(registry(None)).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let outcome = run
            .run_step(
                SemanticUnit::step("click"),
                "click",
                &args(&[("locator", "id:submit"), ("locatorStrategy", "BOGUS")]),
            )
            .unwrap();
        assert_eq!(outcome.status(), Status::FixtureFailure);

        let exits = recorder.exits();
        assert_eq!(exits.len(), 1);
        let message = exits[0].message();
        assert!(message.contains("'BOGUS'"), "{message}");
        assert!(message.contains("ID, XPATH, LABEL"), "{message}");
        assert_balanced(&recorder);
    }

    #[test]
    fn test_failing_listeners_do_not_stop_delivery() {
        struct Broken;

        impl TestRunListener for Broken {
            fn reported(&self, _event: &ReportEvent) -> ListenerResult {
                Err("sink unavailable".into())
            }

            fn name(&self) -> &str {
                "broken"
            }
        }

        let mut run = TestRun::with_defaults(registry(None)).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(Arc::new(Broken));
        run.add_listener(recorder.clone());

        run.run_step(
            SemanticUnit::step("click"),
            "click",
            &args(&[("locator", "x"), ("locatorStrategy", "LABEL")]),
        )
        .unwrap();

        assert_eq!(recorder.events().len(), 2);
        let summary = run.finish();
        assert_eq!(summary.listener_faults.len(), 2);
        let fault: &ListenerFault = &summary.listener_faults[0];
        assert_eq!(fault.listener, "broken");
        assert!(summary.to_json().unwrap().contains("sink unavailable"));
    }
}

mod iteration {
    use super::*;

    fn run_demo_data(fail_fast: bool) -> (ensayo::IterationReport, Arc<RecordingListener>) {
        let config = RunConfig::default().with_fail_fast(fail_fast);
        let mut run = TestRun::new(registry(None), config).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let case = run.enter(SemanticUnit::case("people")).unwrap();
        let report = run
            .run_data_driven(
                SemanticUnit::step("load demo data"),
                "loadDemoData",
                &ArgumentMap::new(),
                "checkPerson",
            )
            .unwrap();
        run.leave(&case, report.status).unwrap();
        (report, recorder)
    }

    #[test]
    fn test_each_row_reports_independently() {
        let (report, recorder) = run_demo_data(false);

        assert_eq!(report.rows_produced, 3);
        let statuses: Vec<Status> = report.iterations.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![Status::Ok, Status::AssertionFailure, Status::Ok]
        );
        assert_eq!(report.status, Status::AssertionFailure);

        let iteration_leaves: Vec<ReportEvent> = recorder
            .leaves()
            .into_iter()
            .filter(|e| e.unit.kind == UnitKind::Iteration)
            .collect();
        assert_eq!(iteration_leaves.len(), 3);
        assert_eq!(
            iteration_leaves[1].variables.get("0").map(String::as_str),
            Some("Ford")
        );
        assert_eq!(recorder.exits().len(), 1);
        assert_balanced(&recorder);
    }

    #[test]
    fn test_fail_fast_skips_remaining_rows() {
        let (report, recorder) = run_demo_data(true);
        assert_eq!(report.iterations.len(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_balanced(&recorder);
    }

    #[test]
    fn test_row_producer_cannot_run_as_plain_step() {
        let mut run = TestRun::with_defaults(registry(None)).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let outcome = run
            .run_step(
                SemanticUnit::step("load demo data"),
                "loadDemoData",
                &ArgumentMap::new(),
            )
            .unwrap();
        assert_eq!(outcome.status(), Status::FixtureFailure);
        assert!(recorder
            .events()
            .iter()
            .all(|e| e.unit.kind != UnitKind::Iteration));
        assert_eq!(
            recorder.transcript(),
            vec![
                "ENTER STEP load demo data",
                "LEAVE STEP load demo data FIXTURE_FAILURE",
            ]
        );
        assert_eq!(recorder.exits().len(), 1);
    }

    #[test]
    fn test_non_terminating_producer_is_fixture_failure() {
        let config = RunConfig::default().with_max_iterations(25);
        let mut run = TestRun::new(registry(None), config).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let report = run
            .run_iterations(
                SemanticUnit::step("endless"),
                "endlessData",
                &ArgumentMap::new(),
                |_, _| Ok(Status::Ok),
            )
            .unwrap();
        assert_eq!(report.status, Status::FixtureFailure);
        assert!(report.iterations.is_empty());
        assert!(recorder.exits()[0].message().contains("more than 25 rows"));
        assert_balanced(&recorder);
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn test_cancel_while_two_units_open_preserves_details() {
        let sample = Arc::new(SampleFixture::default());
        let config = RunConfig::default().with_cancel_poll(Duration::from_millis(5));
        let mut run = TestRun::new(registry(Some(sample.clone())), config).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let suite = SemanticUnit::suite("SampleSuite").with_id("IDsuite");
        let case = SemanticUnit::case("SampleTest").with_id("IDcase");
        run.enter(suite).unwrap();
        run.set_variable("environment", "ci");
        run.enter(case).unwrap();
        run.set_variable("step", "going to sleep");

        let token = run.cancel_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            token.cancel("stopped by user");
        });
        let err = run.invoke("sleep", &ArgumentMap::new()).unwrap_err();
        canceller.join().unwrap();

        match err {
            EnsayoError::Cancelled { reason, closed } => {
                assert_eq!(reason, "stopped by user");
                assert_eq!(closed, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let leaves = recorder.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].unit.id.as_str(), "IDcase");
        assert_eq!(leaves[1].unit.id.as_str(), "IDsuite");
        assert!(leaves.iter().all(|e| e.status == Some(Status::Cancelled)));
        assert_eq!(
            leaves[0].variables.get("step").map(String::as_str),
            Some("going to sleep")
        );
        assert_eq!(
            leaves[0].variables.get("environment").map(String::as_str),
            Some("ci")
        );
        assert!(leaves[1].variables.get("step").is_none());

        let exits = recorder.exits();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].message(), "interrupted while sleeping");
        assert_balanced(&recorder);

        // The self-registered fixture saw the same stream
        assert_eq!(sample.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sample.seen.leaves().len(), 2);
        assert_eq!(sample.seen.exits().len(), 1);

        let err = run.enter(SemanticUnit::case("after")).unwrap_err();
        assert!(matches!(err, EnsayoError::Protocol { .. }), "{err:?}");
        let summary = run.finish();
        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.cancel_reason.as_deref(), Some("stopped by user"));
    }

    #[test]
    fn test_cancel_inside_iteration_closes_three_units() {
        let config = RunConfig::default().with_cancel_poll(Duration::from_millis(5));
        let mut run = TestRun::new(registry(None), config).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        let token = run.cancel_token();
        let mut canceller = None;
        let mut rows_run = Vec::new();

        run.enter(SemanticUnit::case("people")).unwrap();
        let err = run
            .run_iterations(
                SemanticUnit::step("load demo data"),
                "loadDemoData",
                &ArgumentMap::new(),
                |run, row| {
                    let first = row.variables().get("0").cloned().unwrap_or_default();
                    rows_run.push(first.clone());
                    if first == "Ford" {
                        let token = token.clone();
                        canceller = Some(std::thread::spawn(move || {
                            std::thread::sleep(Duration::from_millis(30));
                            token.cancel("stopped by user");
                        }));
                        return Ok(run.invoke("sleep", &ArgumentMap::new())?.status());
                    }
                    Ok(Status::Ok)
                },
            )
            .unwrap_err();
        canceller.unwrap().join().unwrap();

        assert!(matches!(err, EnsayoError::Cancelled { closed: 3, .. }), "{err:?}");
        assert_eq!(rows_run, vec!["Arthur", "Ford"]);

        let cancelled: Vec<ReportEvent> = recorder
            .leaves()
            .into_iter()
            .filter(|e| e.status == Some(Status::Cancelled))
            .collect();
        assert_eq!(cancelled.len(), 3);
        let kinds: Vec<UnitKind> = cancelled.iter().map(|e| e.unit.kind).collect();
        assert_eq!(kinds, vec![UnitKind::Iteration, UnitKind::Step, UnitKind::Case]);

        let iteration = &cancelled[0].variables;
        assert_eq!(iteration.get("0").map(String::as_str), Some("Ford"));
        assert_eq!(iteration.get("1").map(String::as_str), Some("Prefect"));
        assert_eq!(iteration.get("2").map(String::as_str), Some("42"));
        assert_eq!(iteration.get("rows").map(String::as_str), Some("3"));
        assert_eq!(
            cancelled[1].variables.get("rows").map(String::as_str),
            Some("3")
        );
        assert!(cancelled[2].variables.get("rows").is_none());

        let exits = recorder.exits();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].message(), "interrupted while sleeping");
        assert_balanced(&recorder);
    }

    #[test]
    fn test_deadline_from_yaml_config() {
        let config = RunConfig::from_yaml_str("timeout_ms: 40\ncancel_poll_ms: 5\n").unwrap();
        let mut run = TestRun::new(registry(None), config).unwrap();
        let recorder = Arc::new(RecordingListener::new());
        run.add_listener(recorder.clone());

        run.enter(SemanticUnit::case("slow")).unwrap();
        let err = run.invoke("sleep", &ArgumentMap::new()).unwrap_err();
        assert!(matches!(err, EnsayoError::Cancelled { closed: 1, .. }));
        assert!(err.to_string().contains("timed out"));
        assert_balanced(&recorder);
    }

    #[test]
    fn test_dropped_run_closes_units() {
        let recorder = Arc::new(RecordingListener::new());
        {
            let mut run = TestRun::with_defaults(registry(None)).unwrap();
            run.add_listener(recorder.clone());
            run.enter(SemanticUnit::suite("abandoned")).unwrap();
            run.enter(SemanticUnit::case("abandoned case")).unwrap();
        }
        assert_eq!(recorder.leaves().len(), 2);
        assert_balanced(&recorder);
    }
}
