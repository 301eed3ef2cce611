// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use foreman_core::{Run, TriggerType};
use indexmap::IndexMap;

fn definition() -> ProjectDefinition {
    ProjectDefinition::from_yaml(
        r#"
timeout: 10
params:
  DEF_LEVEL: def
  OVERRIDE: def
scripts:
  compile: |
    #!/bin/sh
    make
triggers:
  - name: t1
    type: simple
    params:
      OVERRIDE: trigger
    triggers:
      - name: t2
    runs:
      - name: run0
        host-tag: amd64
        container: ubuntu:24.04
        script: compile
        params:
          RUN_LEVEL: run
        secrets:
          default-secret: fallback
        max-mem-bytes: 2147483648
  - name: t2
    type: simple
    runs:
      - name: publish
        host-tag: amd64
        container: ubuntu:24.04
        script: compile
"#,
    )
    .unwrap()
}

fn urls() -> RunUrls {
    RunUrls {
        run_url: "http://ci/projects/p1/builds/1/runs/run0/".to_string(),
        runner_url: "http://ci/runner".to_string(),
        trigger_url: Some("http://ci/projects/p1/builds/".to_string()),
    }
}

fn queued_run() -> Run {
    let mut run = Run::new("p1", 1, 7, "run0", "t1", "run-key", 0);
    run.host_tag = "amd64".to_string();
    run
}

#[test]
fn rundef_contains_every_executor_key() {
    let def = definition();
    let trigger = def.get_trigger("t1").unwrap();
    let spec = &trigger.runs[0];
    let rundef = build_run_def(
        &def,
        trigger,
        spec,
        &queued_run(),
        &IndexMap::new(),
        &IndexMap::new(),
        urls(),
    )
    .unwrap();

    assert_eq!(rundef.api_key, "run-key");
    assert_eq!(rundef.trigger_type, "simple");
    assert_eq!(rundef.container, "ubuntu:24.04");
    assert!(rundef.script.as_deref().unwrap().contains("make"));
    assert_eq!(rundef.timeout, 10);
    assert_eq!(rundef.max_mem_bytes, Some(2_147_483_648));
    assert_eq!(rundef.env["H_PROJECT"], "p1");
    assert_eq!(rundef.env["H_BUILD"], "1");
    assert_eq!(rundef.env["H_RUN"], "run0");
    assert_eq!(rundef.env["H_TRIGGER_URL"], "http://ci/projects/p1/builds/");
}

#[test]
fn param_precedence_later_wins() {
    let def = definition();
    let trigger = def.get_trigger("t1").unwrap();
    let mut caller = IndexMap::new();
    caller.insert("RUN_LEVEL".to_string(), "caller".to_string());
    let rundef = build_run_def(
        &def,
        trigger,
        &trigger.runs[0],
        &queued_run(),
        &caller,
        &IndexMap::new(),
        urls(),
    )
    .unwrap();

    assert_eq!(rundef.env["DEF_LEVEL"], "def");
    assert_eq!(rundef.env["OVERRIDE"], "trigger");
    assert_eq!(rundef.env["RUN_LEVEL"], "caller");
}

#[test]
fn caller_secrets_override_run_defaults() {
    let def = definition();
    let trigger = def.get_trigger("t1").unwrap();
    let mut secrets = IndexMap::new();
    secrets.insert("default-secret".to_string(), "live".to_string());
    secrets.insert("token".to_string(), "abc".to_string());
    let rundef = build_run_def(
        &def,
        trigger,
        &trigger.runs[0],
        &queued_run(),
        &IndexMap::new(),
        &secrets,
        urls(),
    )
    .unwrap();

    assert_eq!(rundef.secrets["default-secret"], "live");
    assert_eq!(rundef.secrets["token"], "abc");
}

#[test]
fn rundef_uses_the_runs_effective_trigger_type() {
    let def = definition();
    let trigger = def.get_trigger("t1").unwrap();
    let mut run = queued_run();
    run.trigger_type = TriggerType::GithubPr;
    let rundef = build_run_def(
        &def,
        trigger,
        &trigger.runs[0],
        &run,
        &IndexMap::new(),
        &IndexMap::new(),
        urls(),
    )
    .unwrap();
    assert_eq!(rundef.trigger_type, "github_pr");
}

#[test]
fn rundef_json_roundtrip() {
    let def = definition();
    let trigger = def.get_trigger("t1").unwrap();
    let rundef = build_run_def(
        &def,
        trigger,
        &trigger.runs[0],
        &queued_run(),
        &IndexMap::new(),
        &IndexMap::new(),
        urls(),
    )
    .unwrap();
    let json = serde_json::to_string(&rundef).unwrap();
    let again: RunDef = serde_json::from_str(&json).unwrap();
    assert_eq!(rundef, again);
    // Wire names stay kebab-case for the executor.
    assert!(json.contains("\"max-mem-bytes\""));
}
