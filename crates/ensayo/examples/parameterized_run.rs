//! Parameterized run demo.
//!
//! Registers a handful of interaction fixtures, runs a data-driven case
//! and prints the run summary as JSON.
//!
//! ```text
//! RUST_LOG=debug cargo run -p ensayo --example parameterized_run
//! ```

use ensayo::prelude::*;
use ensayo::{init_logging, TracingListener};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FixtureEnum)]
enum LocatorStrategy {
    Id,
    XPath,
    Label,
}

fn fixtures() -> EnsayoResult<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    registry.register(
        FixtureMethod::builder("typeInto")
            .param("locator", ParamType::Str)
            .param("locatorStrategy", ParamType::enumeration::<LocatorStrategy>())
            .param("value", ParamType::Str)
            .build(|call| {
                let args = call.args();
                let strategy: LocatorStrategy = args.enumeration("locatorStrategy")?;
                tracing::info!(
                    locator = args.str("locator")?,
                    ?strategy,
                    value = args.str("value")?,
                    "typed"
                );
                Ok(Returned::Void)
            })?,
    )?;
    registry.register(
        FixtureMethod::builder("click")
            .param("locator", ParamType::Str)
            .param("locatorStrategy", ParamType::enumeration::<LocatorStrategy>())
            .build(|call| {
                tracing::info!(locator = call.args().str("locator")?, "clicked");
                Ok(Returned::Void)
            })?,
    )?;
    registry.register(
        FixtureMethod::builder("loadDemoData")
            .returns(ReturnShape::Rows)
            .build(|_| {
                let people = [("Arthur", "Dent"), ("Ford", "Prefect"), ("Zaphod", "Beeblebrox")];
                Ok(Returned::rows(people.into_iter().map(|(first, last)| {
                    Row::tuple(vec![Value::from(first), Value::from(last), Value::Int(42)])
                })))
            })?,
    )?;
    registry.register(
        FixtureMethod::builder("greet")
            .param("firstName", ParamType::Str)
            .param("lastName", ParamType::Str)
            .param("age", ParamType::Int)
            .build(|call| {
                let args = call.args();
                if args.int("age")? != 42 {
                    return Err(AssertionFailure::mismatch(42, args.int("age")?).into());
                }
                tracing::info!(first = args.str("firstName")?, last = args.str("lastName")?, "hello");
                Ok(Returned::Void)
            })?,
    )?;
    registry.register(FixtureMethod::builder("sleep").optional("ms", ParamType::Int, "200").build(
        |call| {
            let ms = call.args().int("ms")?;
            call.sleep(Duration::from_millis(ms.unsigned_abs()))?;
            Ok(Returned::Void)
        },
    )?)?;
    Ok(registry)
}

fn named(pairs: &[(&str, &str)]) -> ArgumentMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn main() -> EnsayoResult<()> {
    let config = RunConfig::default().with_timeout(Duration::from_secs(10));
    init_logging(&config.log)?;

    let mut run = TestRun::new(Arc::new(fixtures()?), config)?;
    run.add_listener(Arc::new(TracingListener));

    let suite = run.enter(SemanticUnit::suite("Demo"))?;
    let case = run.enter(SemanticUnit::case("ParameterizedTest"))?;

    let mut status = run
        .run_step(
            SemanticUnit::step("type name"),
            "typeInto",
            &named(&[
                ("locator", "name"),
                ("locatorStrategy", "id"),
                ("value", "Arthur"),
            ]),
        )?
        .status();

    let report = run.run_data_driven(
        SemanticUnit::step("greet everyone"),
        "loadDemoData",
        &ArgumentMap::new(),
        "greet",
    )?;
    if status.is_ok() {
        status = report.status;
    }

    run.run_step(
        SemanticUnit::step("click bogus"),
        "click",
        &named(&[("locator", "submit"), ("locatorStrategy", "BOGUS")]),
    )?;
    run.run_step(SemanticUnit::step("nap"), "sleep", &ArgumentMap::new())?;

    run.leave(&case, status)?;
    run.leave(&suite, Status::Ok)?;

    let summary = run.finish();
    println!("{}", summary.to_json()?);
    Ok(())
}
