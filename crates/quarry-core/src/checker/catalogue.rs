//! Built-in vulnerability classes, their sink functions, and the rules
//! a candidate path must satisfy to be reported for them.

use crate::config::Config;

use super::rules::{Predicate, Rule};

const FS_READS: &[&str] = &[
    "readFile",
    "readFileSync",
    "createReadStream",
    "open",
    "openSync",
];
const FS_WRITES: &[&str] = &["writeFile", "writeFileSync"];
const RESPONSE_SINKS: &[&str] = &["pipe", "sendFile"];

/// Classes checked when the configuration does not narrow the set.
pub fn default_classes() -> Vec<String> {
    [
        "os_command",
        "code_exec",
        "path_traversal",
        "xss",
        "proto_pollution",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Sink function names for a class. Entries are anchored regular
/// expressions matched against the callee name and its last dot-segment.
pub fn sinks_for(class: &str) -> Vec<&'static str> {
    match class {
        "os_command" => vec!["exec", "execSync", "execFile", "spawn", "spawnSync"],
        "code_exec" => vec!["eval", "Function"],
        "path_traversal" => {
            let mut sinks = FS_READS.to_vec();
            sinks.extend(FS_WRITES);
            sinks.extend(RESPONSE_SINKS);
            sinks
        }
        "xss" => vec!["send", "render", "write", "end"],
        _ => Vec::new(),
    }
}

/// Ordered predicate rules for a class. A path is reported when any one
/// rule accepts it; sanitizer and source names come from the configuration.
pub fn rules_for(class: &str, config: &Config) -> Vec<Rule> {
    let sinks: Vec<String> = sinks_for(class).iter().map(|s| s.to_string()).collect();
    let unsanitized = Predicate::NotExistFunc(config.sanitizers.clone());
    match class {
        "os_command" | "code_exec" => vec![Rule::new(vec![
            Predicate::HasTaintedInput,
            Predicate::NotStartSynthetic,
            unsanitized,
            Predicate::EndWithFunc(sinks),
        ])],
        "xss" => vec![Rule::new(vec![
            Predicate::HasTaintedInput,
            Predicate::NotStartWithFunc(sinks.clone()),
            unsanitized,
            Predicate::EndWithFunc(sinks),
        ])],
        "path_traversal" => {
            let reads: Vec<String> = FS_READS.iter().map(|s| s.to_string()).collect();
            let mut fs_access = reads.clone();
            fs_access.extend(FS_WRITES.iter().map(|s| s.to_string()));
            vec![
                // a file read under attacker-controlled path, handed back
                // through the response
                Rule::new(vec![
                    Predicate::HasTaintedInput,
                    Predicate::StartWithVar(config.sources.clone()),
                    unsanitized.clone(),
                    Predicate::EndWithFunc(
                        RESPONSE_SINKS.iter().map(|s| s.to_string()).collect(),
                    ),
                    Predicate::ExistFunc(reads),
                ]),
                // direct filesystem access with a tainted path argument
                Rule::new(vec![
                    Predicate::HasTaintedInput,
                    unsanitized,
                    Predicate::EndWithFunc(fs_access),
                ]),
            ]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_default_class_except_pollution_has_sinks() {
        for class in default_classes() {
            if class == "proto_pollution" {
                continue;
            }
            assert!(
                !sinks_for(&class).is_empty(),
                "class {class} should name at least one sink"
            );
        }
    }

    #[test]
    fn every_sink_bearing_class_has_rules() {
        let config = Config::default();
        for class in default_classes() {
            if class == "proto_pollution" {
                continue;
            }
            let rules = rules_for(&class, &config);
            assert!(!rules.is_empty(), "class {class} should carry a rule list");
            for rule in &rules {
                assert!(
                    rule.predicates
                        .iter()
                        .any(|p| matches!(p, Predicate::HasTaintedInput)),
                    "every rule of {class} must anchor on tainted input"
                );
            }
        }
    }
}
