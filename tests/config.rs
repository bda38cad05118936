use std::collections::VecDeque;
use std::fs;

use assert_matches::assert_matches;
use polymix::config::{Config, ConfigLoader, DEFAULT_SOLVENT_GROUP};
use polymix::error::PolymixError;
use polymix::prompt::Prompt;
use polymix::resolver::PolymerKeyPolicy;

/// Answers prompts from a script and remembers what was asked.
#[derive(Default)]
struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<(String, bool)>,
}

impl ScriptedPrompt {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|answer| answer.to_string()).collect(),
            asked: Vec::new(),
        }
    }

    fn next(&mut self, label: &str, secret: bool) -> Result<String, PolymixError> {
        self.asked.push((label.to_string(), secret));
        self.answers
            .pop_front()
            .ok_or_else(|| PolymixError::Prompt("script exhausted".to_string()))
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, label: &str) -> Result<String, PolymixError> {
        self.next(label, false)
    }

    fn ask_secret(&mut self, label: &str) -> Result<String, PolymixError> {
        self.next(label, true)
    }
}

fn complete() -> Config {
    Config {
        host: Some("criptapp.org".to_string()),
        token: Some("secret".to_string()),
        group: Some("polymer lab".to_string()),
        collection: Some("cloud points".to_string()),
        inventory: Some("LCST".to_string()),
        path: Some("data/lcst.csv".to_string()),
        ..Config::default()
    }
}

#[test]
fn defaults_fill_optional_fields() {
    let config = ConfigLoader::resolve(vec![complete()], None).unwrap();
    assert_eq!(config.workers, 1);
    assert_eq!(config.solvent_group, DEFAULT_SOLVENT_GROUP);
    assert_eq!(config.polymer_key, PolymerKeyPolicy::Properties);
    assert_eq!(config.error_log.as_str(), "./errors.txt");
    assert!(config.tls);
    assert_eq!(config.path.as_str(), "data/lcst.csv");
}

#[test]
fn earlier_layers_take_precedence() {
    let flags = Config {
        workers: Some(8),
        polymer_key: Some(PolymerKeyPolicy::PolymerId),
        ..Config::default()
    };
    let env = Config {
        token: Some("from-env".to_string()),
        ..Config::default()
    };
    let file = Config {
        workers: Some(2),
        ..complete()
    };

    let config = ConfigLoader::resolve(vec![flags, env, file], None).unwrap();
    assert_eq!(config.workers, 8);
    assert_eq!(config.token, "from-env");
    assert_eq!(config.polymer_key, PolymerKeyPolicy::PolymerId);
    assert_eq!(config.host, "criptapp.org");
}

#[test]
fn missing_values_are_prompted_in_order() {
    let mut prompt = ScriptedPrompt::new(&[
        "criptapp.org",
        "tok",
        "polymer lab",
        "cloud points",
        "LCST",
        "\"/tmp/with space.csv\"",
    ]);
    let config = ConfigLoader::resolve(vec![Config::default()], Some(&mut prompt)).unwrap();

    let asked: Vec<bool> = prompt.asked.iter().map(|(_, secret)| *secret).collect();
    assert_eq!(asked, vec![false, true, false, false, false, false]);
    assert_eq!(prompt.asked[1].0, "API Token");
    assert_eq!(config.token, "tok");
    assert_eq!(config.path.as_str(), "/tmp/with space.csv");
}

#[test]
fn only_missing_values_are_prompted() {
    let partial = Config {
        token: None,
        ..complete()
    };
    let mut prompt = ScriptedPrompt::new(&["tok"]);
    let config = ConfigLoader::resolve(vec![partial], Some(&mut prompt)).unwrap();
    assert_eq!(prompt.asked.len(), 1);
    assert_eq!(config.token, "tok");
}

#[test]
fn missing_value_without_prompt_fails() {
    let partial = Config {
        collection: None,
        ..complete()
    };
    let err = ConfigLoader::resolve(vec![partial], None).unwrap_err();
    assert_matches!(err, PolymixError::MissingConfigField("collection"));
}

#[test]
fn blank_answer_is_rejected() {
    let partial = Config {
        group: None,
        ..complete()
    };
    let mut prompt = ScriptedPrompt::new(&["   "]);
    let err = ConfigLoader::resolve(vec![partial], Some(&mut prompt)).unwrap_err();
    assert_matches!(err, PolymixError::InvalidConfig { field: "group", .. });
}

#[test]
fn worker_count_is_bounded() {
    for workers in [0, 65] {
        let config = Config {
            workers: Some(workers),
            ..complete()
        };
        let err = ConfigLoader::resolve(vec![config], None).unwrap_err();
        assert_matches!(err, PolymixError::InvalidConfig { field: "workers", .. });
    }
}

#[test]
fn loads_explicit_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("polymix.json");
    fs::write(
        &path,
        r#"{"host": "localhost:8000", "workers": 4, "polymer_key": "polymer-id", "tls": false}"#,
    )
    .unwrap();

    let config = ConfigLoader::load(path.to_str()).unwrap();
    assert_eq!(config.host.as_deref(), Some("localhost:8000"));
    assert_eq!(config.workers, Some(4));
    assert_eq!(config.polymer_key, Some(PolymerKeyPolicy::PolymerId));
    assert_eq!(config.tls, Some(false));
}

#[test]
fn explicit_file_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, PolymixError::ConfigRead(_));
}
