//! End-to-end runs over JavaScript snippets: parse, interpret, check.

use std::time::Duration;

use quarry_core::{Analyzer, Config};

fn analyze(code: &str) -> quarry_core::Report {
    Analyzer::new(Config::default())
        .run_source(code)
        .expect("analysis should succeed")
}

#[test]
fn tainted_input_reaching_a_command_sink_is_reported() {
    let report = analyze("var a = user_input();\nexec(a);\n");
    let finding = report
        .findings
        .iter()
        .find(|f| f.class == "os_command")
        .expect("os_command finding expected");
    assert_eq!(finding.sink, "exec");
    assert!(finding.path.len() >= 2, "path should span source and sink");
    assert_eq!(finding.sink_line, Some(2));
}

#[test]
fn flows_through_intermediate_variables_are_tracked() {
    let report = analyze(
        "var a = user_input();\n\
         var b = a + \"!\";\n\
         var c = b;\n\
         exec(c);\n",
    );
    let finding = report
        .findings
        .iter()
        .find(|f| f.class == "os_command")
        .expect("flow through concatenation and copies expected");
    assert!(
        finding.path.len() >= 3,
        "longest path should cross the intermediate statements, got {}",
        finding.path.len()
    );
}

#[test]
fn sanitized_input_is_not_reported() {
    let report = analyze("var a = parseInt(user_input());\nexec(a);\n");
    assert!(
        report.findings.is_empty(),
        "numeric coercion should launder taint: {:?}",
        report.findings.iter().map(|f| &f.class).collect::<Vec<_>>()
    );
}

#[test]
fn untainted_literals_are_not_reported() {
    let report = analyze("exec(\"ls -la\");\n");
    assert!(report.findings.is_empty());
}

#[test]
fn sanitizer_call_anywhere_on_the_path_suppresses_the_flow() {
    let report = analyze(
        "var a = user_input();\n\
         var b = parseInt(a) + a;\n\
         exec(b);\n",
    );
    assert!(
        !report.findings.iter().any(|f| f.class == "os_command"),
        "a path through a sanitizing statement is rejected even when taint survives"
    );
}

#[test]
fn tainted_paths_reaching_filesystem_reads_are_reported() {
    let report = analyze("var p = user_input();\nreadFile(p);\n");
    assert!(
        report.findings.iter().any(|f| f.class == "path_traversal"),
        "a tainted path argument to a filesystem function is traversal"
    );
}

#[test]
fn file_reads_piped_to_the_response_are_path_traversal() {
    let report = analyze(
        "var p = user_input();\n\
         var data = readFile(p);\n\
         res.sendFile(data);\n",
    );
    assert!(
        report
            .findings
            .iter()
            .any(|f| f.class == "path_traversal" && f.sink.ends_with("sendFile")),
        "the read-then-respond chain must be reported at the response sink"
    );
}

#[test]
fn static_proto_pollution_is_recorded_at_the_assignment() {
    let report = analyze("var o = {};\no.__proto__.polluted = user_input();\n");
    let finding = report
        .findings
        .iter()
        .find(|f| f.class == "proto_pollution")
        .expect("pollution through a literal __proto__ hop expected");
    assert_eq!(finding.sink_line, Some(2));
}

#[test]
fn computed_key_pollution_is_found_through_entry_points() {
    let mut config = Config::default();
    config.entry_points = vec!["store".into()];
    let report = Analyzer::new(config)
        .run_source(
            "function store(a, b, c) {\n\
             \x20 var o = {};\n\
             \x20 o[a][b] = c;\n\
             }\n",
        )
        .expect("analysis should succeed");
    assert!(
        report.findings.iter().any(|f| f.class == "proto_pollution"),
        "tainted computed keys can land on Object.prototype"
    );
}

#[test]
fn clean_prototype_writes_are_not_reported() {
    let report = analyze("var o = {};\no.__proto__.tag = 1;\n");
    assert!(
        !report.findings.iter().any(|f| f.class == "proto_pollution"),
        "a constant write through __proto__ is not pollution"
    );
}

#[test]
fn unresolved_branch_keeps_both_bindings_alive() {
    let report = analyze(
        "var a = 1;\n\
         if (user_input()) {\n\
         \x20 a = user_input();\n\
         }\n\
         exec(a);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "the conditional binding must stay visible after the if"
    );
}

#[test]
fn surely_false_branch_is_not_taken() {
    let report = analyze(
        "var a = 1;\n\
         if (false) {\n\
         \x20 a = user_input();\n\
         }\n\
         exec(a);\n",
    );
    assert!(
        report.findings.is_empty(),
        "a deterministically dead branch must not contribute bindings"
    );
}

#[test]
fn loop_carried_taint_is_found() {
    let report = analyze(
        "var acc = \"\";\n\
         var data = user_input();\n\
         for (var k in data) {\n\
         \x20 acc = data[k];\n\
         }\n\
         exec(acc);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "members of an opaque tainted iteratee carry its taint"
    );
}

#[test]
fn direct_recursion_terminates() {
    let report = analyze("function f(n) { return f(n); }\nf(1);\n");
    assert!(report.findings.is_empty());
    assert!(!report.timed_out, "call limits should stop recursion early");
}

#[test]
fn a_limit_skipped_call_does_not_overwrite_the_old_binding() {
    let report = analyze(
        "var a = user_input();\n\
         function f() { a = f(); return a; }\n\
         f();\n\
         exec(a);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "the refused inner call must not rebind a to undefined"
    );
}

#[test]
fn a_normal_empty_return_does_rebind_to_undefined() {
    let report = analyze(
        "var a = user_input();\n\
         function g() { }\n\
         a = g();\n\
         exec(a);\n",
    );
    assert!(
        report.findings.is_empty(),
        "a function that runs and returns nothing yields undefined"
    );
}

#[test]
fn mutual_recursion_terminates() {
    let report = analyze(
        "function even(n) { return odd(n); }\n\
         function odd(n) { return even(n); }\n\
         even(user_input());\n",
    );
    assert!(!report.timed_out);
}

#[test]
fn deferred_callbacks_run_with_their_closure() {
    let report = analyze(
        "var a = user_input();\n\
         setTimeout(function () { exec(a); }, 0);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "a macrotask callback sees bindings captured at scheduling time"
    );
}

#[test]
fn promise_reactions_receive_the_resolved_value() {
    let report = analyze(
        "Promise.resolve(user_input()).then(function (v) { exec(v); });\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "the microtask callback receives the settled value"
    );
}

#[test]
fn exported_functions_are_driven_with_tainted_arguments() {
    let report = analyze("module.exports.handler = function (req) { exec(req); };\n");
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "exports are attacker reachable by default"
    );
}

#[test]
fn cyclic_prototype_chains_do_not_hang() {
    let report = analyze(
        "var o = {};\n\
         o.__proto__ = o;\n\
         var x = o.missing;\n\
         exec(x);\n",
    );
    assert!(!report.timed_out, "lookup depth ceiling must terminate the walk");
}

#[test]
fn exported_graph_timestamps_are_monotone() {
    let report = analyze("var a = user_input();\nvar b = a;\nexec(b);\n");
    let table = report.export();
    let ts: Vec<u64> = table.edges.iter().filter_map(|e| e.ts).collect();
    assert!(!ts.is_empty());
    assert!(
        ts.windows(2).all(|w| w[0] < w[1]),
        "edge timestamps must be strictly increasing"
    );
}

#[test]
fn exhausted_time_budget_reports_partial_results() {
    let mut config = Config::default();
    config.timeout = Some(Duration::from_nanos(1));
    let report = Analyzer::new(config)
        .run_source("var a = user_input();\nexec(a);\n")
        .expect("analysis should still return");
    assert!(report.timed_out);
}

#[test]
fn xss_sinks_use_the_same_machinery() {
    let report = analyze(
        "var q = user_input();\n\
         res.send(q);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "xss"),
        "method-call sinks match on the property key"
    );
}

#[test]
fn switch_arms_fork_like_branches() {
    let report = analyze(
        "var a = 1;\n\
         switch (user_input()) {\n\
         \x20 case 1: a = user_input(); break;\n\
         \x20 default: a = 2; break;\n\
         }\n\
         exec(a);\n",
    );
    assert!(
        report.findings.iter().any(|f| f.class == "os_command"),
        "an unresolved switch keeps every arm's bindings"
    );
}
