//! End-to-end runs of YAML flow documents

mod common;

use actionflow::config::{parse_flow_document, FlowConfig};
use actionflow::context::{FlowContext, SharedParameters};
use actionflow::{FlowError, FlowRunner, FlowService};
use anyhow::Result;
use common::FlowDir;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn runner(debug: bool) -> FlowRunner {
    FlowRunner::new(
        FlowService::new(FlowConfig {
            debug,
            ..Default::default()
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_run_file_end_to_end() -> Result<()> {
    let dir = FlowDir::new()?;
    let path = dir.write(
        "flow.yml",
        r#"
version: 1.0.0
description: collect squares
pipeline:
  --:
    - ctx:
        $.numbers:
          inline: [1, 2, 3]
    - each:
        of: <$ ctx.numbers $>
        action:
          ctx:
            $.squares:
              inline: <$ iteration.value * iteration.value $>
              push: true
    - switch:
        value: <$ ctx.squares | length $>
        is:
          3:
            ctx:
              $.verdict:
                inline: three
        else:
          fail: unexpected count
"#,
    )?;

    let runner = runner(false);
    let report = runner.run_file(&path, runner.new_context()).await?;

    assert!(report.successful(), "{:?}", report.snapshot.failure_messages());
    let after = report.context_after.clone().unwrap_or_default();
    assert_eq!(after["squares"], json!([1, 4, 9]));
    assert_eq!(after["verdict"], json!("three"));
    assert_eq!(report.snapshot.wd, dir.path());
    Ok(())
}

#[tokio::test]
async fn test_each_over_mapping_exposes_keys() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  each:
    of:
      first: 1
      second: 2
    action:
      ctx:
        $.keys:
          inline: <$ iteration.key $>
          push: true
"#,
    )?;

    let runner = runner(false);
    let context = runner.new_context();
    runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?
        .into_result()?;

    assert_eq!(context.ctx()["keys"], json!(["first", "second"]));
    Ok(())
}

#[tokio::test]
async fn test_parameters_metadata_reaches_nested_steps() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  $parameters:
    target: world
  --:
    - ctx:
        $.greeting:
          inline: hello <$ parameters.target $>
"#,
    )?;

    let runner = runner(false);
    let context = runner.new_context();
    let report = runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?;

    assert!(report.successful());
    assert_eq!(context.ctx()["greeting"], json!("hello world"));
    Ok(())
}

#[tokio::test]
async fn test_failed_run_keeps_partial_results() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  --:
    - secrets:
        $.token:
          inline: s3cr3t
    - ctx:
        $.step:
          inline: one
    - error:
        message: stopped here
        code: E_STOP
    - ctx:
        $.step:
          inline: two
"#,
    )?;

    let runner = runner(true);
    let context = runner.new_context();
    let report = runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?;

    assert!(!report.successful());
    assert_eq!(report.snapshot.error_code().as_deref(), Some("E_STOP"));
    assert_eq!(context.ctx()["step"], json!("one"));
    assert_eq!(context.secrets()["token"], json!("s3cr3t"));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, FlowError::FlowFailed(_)));
    assert!(err.to_string().contains("stopped here"));
    Ok(())
}

#[tokio::test]
async fn test_retry_inside_try_recovers() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  try:
    action:
      retry:
        attempts: 3
        action:
          fail:
            message: always
            code: E_ALWAYS
        errorCode:
          assignTo:
            ctx: $.retry.code
    catch:
      ctx:
        $.recovered:
          inline: true
"#,
    )?;

    let runner = runner(false);
    let context = runner.new_context();
    let report = runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?;

    assert!(report.successful());
    assert_eq!(context.ctx()["retry"]["code"], json!("E_ALWAYS"));
    assert_eq!(context.ctx()["recovered"], json!(true));
    Ok(())
}

#[tokio::test]
async fn test_repeat_and_while_drive_a_counter() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  --:
    - repeat:
        times: 3
        action:
          ctx:
            $.ticks:
              inline: <$ iteration.index $>
              push: true
    - ctx:
        $.count:
          inline: 0
    - while:
        value: <$ ctx.count $>
        not: 2
        action:
          ctx:
            $.count:
              inline: <$ ctx.count + 1 $>
"#,
    )?;

    let runner = runner(false);
    let context = runner.new_context();
    runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?
        .into_result()?;

    assert_eq!(context.ctx()["ticks"], json!([0, 1, 2]));
    assert_eq!(context.ctx()["count"], json!(2));
    Ok(())
}

#[tokio::test]
async fn test_invoke_runs_a_step_computed_at_runtime() -> Result<()> {
    let document = parse_flow_document(
        r#"
version: 1.0.0
pipeline:
  --:
    - ctx:
        $.next:
          inline:
            ctx:
              $.invoked:
                inline: yes
    - "@": <$ ctx.next $>
"#,
    )?;

    let runner = runner(false);
    let context = runner.new_context();
    runner
        .run(Path::new("."), &document, context.clone(), SharedParameters::default())
        .await?
        .into_result()?;

    assert_eq!(context.ctx()["invoked"], json!("yes"));
    Ok(())
}

#[tokio::test]
async fn test_structural_errors_stop_before_dispatch() {
    let runner = runner(false);
    let context = Arc::new(FlowContext::default());

    let missing = parse_flow_document("version: 1.0.0\npipeline:\n  unknown.handler:\n").unwrap();
    let err = runner
        .run(Path::new("."), &missing, context.clone(), SharedParameters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::HandlerNotFound(_)));

    let malformed = parse_flow_document("version: 1.0.0\npipeline:\n  void:\n  noop:\n");
    assert!(matches!(malformed, Err(FlowError::InvalidDocument(_))));

    assert_eq!(context.ctx(), json!({}));
}

#[tokio::test]
async fn test_report_serializes_snapshot_tree() -> Result<()> {
    let document = parse_flow_document(
        "version: 1.0.0\npipeline:\n  --:\n    - log: hello\n    - void:\n",
    )?;

    let runner = runner(true);
    let report = runner
        .run(Path::new("."), &document, runner.new_context(), SharedParameters::default())
        .await?;

    let value = serde_json::to_value(&report)?;
    assert_eq!(value["snapshot"]["idOrAlias"], json!("--"));
    assert_eq!(value["snapshot"]["successful"], json!(true));
    assert!(value["contextBefore"].is_object());
    let steps = value["snapshot"]["steps"].as_array().cloned().unwrap_or_default();
    let children = steps.iter().filter(|s| s["type"] == json!("child")).count();
    assert_eq!(children, 2);
    Ok(())
}
