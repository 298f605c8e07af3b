//! Launch action trees of desired LRPs.
//!
//! A desired LRP describes how its process is started with a nested action
//! tree: a parallel action may contain serial actions which wrap timeouts
//! around run actions, and so on. Only run actions carry environment
//! variables, so extracting the auto-discovery payload means walking the
//! whole tree.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::{AD_ENV_VAR, VCAP_SERVICES_ENV_VAR};

/// One `NAME=value` entry of a run action environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Terminal action starting a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAction {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvironmentVariable>,
}

/// A node of the launch action tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ActionEnvelope", into = "ActionEnvelope")]
pub enum Action {
    Run(RunAction),
    Serial(Vec<Action>),
    Parallel(Vec<Action>),
    Codependent(Vec<Action>),
    Timeout(Option<Box<Action>>),
    EmitProgress(Option<Box<Action>>),
    Try(Option<Box<Action>>),
    /// Download, upload and anything this agent does not know about.
    Other,
}

impl Action {
    /// Builds a run action from `(name, value)` pairs.
    pub fn run<'a, I>(env: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Action::Run(RunAction {
            env: env
                .into_iter()
                .map(|(name, value)| EnvironmentVariable {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            ..RunAction::default()
        })
    }

    /// Children in declaration order; empty for leaves.
    fn children(&self) -> Vec<&Action> {
        match self {
            Action::Serial(actions) | Action::Parallel(actions) | Action::Codependent(actions) => {
                actions.iter().collect()
            }
            Action::Timeout(inner) | Action::EmitProgress(inner) | Action::Try(inner) => {
                inner.as_deref().into_iter().collect()
            }
            Action::Run(_) | Action::Other => Vec::new(),
        }
    }
}

// Wire shape: an object with exactly one populated member.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActionEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_action: Option<RunAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serial_action: Option<ActionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parallel_action: Option<ActionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    codependent_action: Option<ActionList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_action: Option<WrappedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emit_progress_action: Option<WrappedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    try_action: Option<WrappedAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActionList {
    #[serde(default)]
    actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WrappedAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<Box<Action>>,
}

impl From<ActionEnvelope> for Action {
    fn from(envelope: ActionEnvelope) -> Self {
        if let Some(run) = envelope.run_action {
            Action::Run(run)
        } else if let Some(a) = envelope.timeout_action {
            Action::Timeout(a.action)
        } else if let Some(a) = envelope.emit_progress_action {
            Action::EmitProgress(a.action)
        } else if let Some(a) = envelope.try_action {
            Action::Try(a.action)
        } else if let Some(a) = envelope.parallel_action {
            Action::Parallel(a.actions)
        } else if let Some(a) = envelope.serial_action {
            Action::Serial(a.actions)
        } else if let Some(a) = envelope.codependent_action {
            Action::Codependent(a.actions)
        } else {
            Action::Other
        }
    }
}

impl From<Action> for ActionEnvelope {
    fn from(action: Action) -> Self {
        let mut envelope = ActionEnvelope::default();
        match action {
            Action::Run(run) => envelope.run_action = Some(run),
            Action::Serial(actions) => envelope.serial_action = Some(ActionList { actions }),
            Action::Parallel(actions) => envelope.parallel_action = Some(ActionList { actions }),
            Action::Codependent(actions) => {
                envelope.codependent_action = Some(ActionList { actions })
            }
            Action::Timeout(action) => envelope.timeout_action = Some(WrappedAction { action }),
            Action::EmitProgress(action) => {
                envelope.emit_progress_action = Some(WrappedAction { action })
            }
            Action::Try(action) => envelope.try_action = Some(WrappedAction { action }),
            Action::Other => {}
        }
        envelope
    }
}

/// Collects the environment of every run action, breadth first.
///
/// The order of the returned lists is the visiting order, which decides the
/// tie-break in [`extract_env`].
pub fn run_action_envs(root: &Action) -> Vec<&[EnvironmentVariable]> {
    let mut envs = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(action) = queue.pop_front() {
        match action {
            Action::Run(run) => envs.push(run.env.as_slice()),
            other => queue.extend(other.children()),
        }
    }

    envs
}

/// Environment values pulled out of one action tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionEnv {
    pub ad: String,
    pub vcap_services: String,
}

/// Extracts the auto-discovery and service-binding variables of an action tree.
///
/// The auto-discovery value is taken from the first run action (in breadth
/// first order) that sets it to a non-empty value; later run actions cannot
/// change it. `VCAP_SERVICES` is scanned over every run action and the last
/// non-empty value wins.
pub fn extract_env(root: Option<&Action>) -> ActionEnv {
    let mut env = ActionEnv::default();
    let Some(root) = root else {
        return env;
    };

    let mut ad_found = false;
    for vars in run_action_envs(root) {
        for var in vars {
            if var.name == AD_ENV_VAR {
                if !ad_found {
                    env.ad = var.value.clone();
                }
            } else if var.name == VCAP_SERVICES_ENV_VAR && !var.value.is_empty() {
                env.vcap_services = var.value.clone();
            }
        }
        if !env.ad.is_empty() {
            ad_found = true;
        }
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(envs: &[&[EnvironmentVariable]]) -> Vec<String> {
        envs.iter()
            .map(|vars| vars.iter().map(|v| v.value.as_str()).collect::<Vec<_>>().join(","))
            .collect()
    }

    #[test]
    fn walks_breadth_first() {
        // serial[ parallel[ run(deep) ], run(shallow) ]
        let tree = Action::Serial(vec![
            Action::Parallel(vec![Action::run([("X", "deep")])]),
            Action::run([("X", "shallow")]),
        ]);

        let envs = run_action_envs(&tree);
        assert_eq!(names(&envs), vec!["shallow", "deep"]);
    }

    #[test]
    fn descends_into_wrapping_actions() {
        let tree = Action::Codependent(vec![
            Action::Timeout(Some(Box::new(Action::run([("X", "a")])))),
            Action::EmitProgress(Some(Box::new(Action::Try(Some(Box::new(Action::run([
                ("X", "b"),
            ]))))))),
            Action::Try(None),
            Action::Other,
        ]);

        let envs = run_action_envs(&tree);
        assert_eq!(names(&envs), vec!["a", "b"]);
    }

    #[test]
    fn first_ad_wins_last_vcap_wins() {
        let tree = Action::Serial(vec![
            Action::run([(AD_ENV_VAR, "x"), (VCAP_SERVICES_ENV_VAR, "first")]),
            Action::run([(AD_ENV_VAR, "y"), (VCAP_SERVICES_ENV_VAR, "second")]),
        ]);

        let env = extract_env(Some(&tree));
        assert_eq!(env.ad, "x");
        assert_eq!(env.vcap_services, "second");
    }

    #[test]
    fn empty_ad_does_not_stop_the_scan() {
        let tree = Action::Serial(vec![
            Action::run([(AD_ENV_VAR, "")]),
            Action::run([(AD_ENV_VAR, "{}")]),
        ]);

        assert_eq!(extract_env(Some(&tree)).ad, "{}");
    }

    #[test]
    fn empty_vcap_does_not_clear_previous_value() {
        let tree = Action::Serial(vec![
            Action::run([(VCAP_SERVICES_ENV_VAR, "bound")]),
            Action::run([(VCAP_SERVICES_ENV_VAR, "")]),
        ]);

        assert_eq!(extract_env(Some(&tree)).vcap_services, "bound");
    }

    #[test]
    fn no_root_action_yields_empty_env() {
        assert_eq!(extract_env(None), ActionEnv::default());
    }

    #[test]
    fn decodes_wire_shape() {
        let json = r#"{
            "serial_action": {"actions": [
                {"download_action": {"from": "http://blobstore/droplet"}},
                {"timeout_action": {"action": {"run_action": {
                    "path": "/bin/app",
                    "env": [{"name": "AD_DATADOGHQ_COM", "value": "{}"}]
                }}}}
            ]}
        }"#;

        let action: Action = serde_json::from_str(json).expect("valid action");
        let Action::Serial(children) = &action else {
            panic!("expected serial action, got {action:?}");
        };
        assert_eq!(children[0], Action::Other);
        assert_eq!(extract_env(Some(&action)).ad, "{}");

        let encoded = serde_json::to_value(&action).expect("serializable");
        assert!(encoded["serial_action"]["actions"][1]["timeout_action"].is_object());
    }
}
