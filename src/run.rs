//! Model runs and their client-side state machine.
//!
//! A model run is one execution attempt of a predictive model against an
//! experiment's subject/image-group pairing. The lifecycle is
//! IDLE → RUNNING → {SUCCESS, FAILED}; terminal states are final. The
//! transition table is enforced locally before any state-change request is
//! sent, but the server remains authoritative: every mutation re-fetches
//! the run.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScoError;
use crate::resource::{NameValuePair, ResourceHandle, ResourceObject, parse_timestamp};

// Schedule keys stamped by the server on run transitions.
pub const RUN_CREATED_AT: &str = "created_at";
pub const RUN_STARTED_AT: &str = "started_at";
pub const RUN_FINISHED_AT: &str = "finished_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Idle,
    Running,
    Success,
    Failed,
}

impl RunState {
    pub const ALL: [RunState; 4] = [
        RunState::Idle,
        RunState::Running,
        RunState::Success,
        RunState::Failed,
    ];

    pub fn is_idle(self) -> bool {
        self == RunState::Idle
    }

    pub fn is_running(self) -> bool {
        self == RunState::Running
    }

    pub fn is_success(self) -> bool {
        self == RunState::Success
    }

    pub fn is_failed(self) -> bool {
        self == RunState::Failed
    }

    /// SUCCESS and FAILED are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }

    /// Validate a transition attempt against the lifecycle table. The only
    /// legal transitions are IDLE→RUNNING, RUNNING→SUCCESS and
    /// RUNNING→FAILED; every other attempt fails naming the current state.
    pub fn ensure_transition(self, to: RunState) -> Result<(), ScoError> {
        let allowed = matches!(
            (self, to),
            (RunState::Idle, RunState::Running)
                | (RunState::Running, RunState::Success)
                | (RunState::Running, RunState::Failed)
        );
        if allowed {
            Ok(())
        } else {
            Err(ScoError::InvalidStateTransition {
                current: self,
                attempted: to,
            })
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Idle => "IDLE",
            RunState::Running => "RUNNING",
            RunState::Success => "SUCCESS",
            RunState::Failed => "FAILED",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Deserialize)]
struct RunObject {
    #[serde(flatten)]
    resource: ResourceObject,
    state: RunState,
    #[serde(default)]
    arguments: Vec<NameValuePair>,
    #[serde(default)]
    schedule: HashMap<String, String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Handle for one model run.
#[derive(Debug, Clone)]
pub struct ModelRunHandle {
    pub resource: ResourceHandle,
    pub state: RunState,
    pub arguments: HashMap<String, Value>,
    /// Timestamps for key transitions (`created_at`, `started_at`,
    /// `finished_at`), converted to local time.
    pub schedule: HashMap<String, DateTime<Local>>,
    /// Error messages reported for a FAILED run.
    pub errors: Vec<String>,
}

impl ModelRunHandle {
    pub fn from_json(value: Value) -> Result<Self, ScoError> {
        let object: RunObject = serde_json::from_value(value)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let resource = ResourceHandle::from_object(object.resource)?;
        let arguments = object
            .arguments
            .into_iter()
            .map(|pair| (pair.name, pair.value))
            .collect();
        let mut schedule = HashMap::new();
        for (key, timestamp) in object.schedule {
            schedule.insert(key, parse_timestamp(&timestamp)?);
        }
        Ok(Self {
            resource,
            state: object.state,
            arguments,
            schedule,
            errors: object.errors,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.resource.identifier
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }

    pub fn url(&self) -> &str {
        &self.resource.url
    }
}
