//! Suspend/resume points.
//!
//! A flow that needs later input (a modal submit, a button press on a
//! message it sent) persists a [`ResumePoint`]: the ID of the suspending
//! node plus the frozen interpreter state. The correlation back from
//! Discord happens through component custom IDs in the `resume:` format
//! below. Resume points are single-use: consuming one deletes it, and an
//! expired point is treated the same as a missing one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::state::FlowContextState;

/// Modal resume points are short-lived; Discord only allows responding to
/// a modal for a limited window anyway. Component resume points carry no
/// expiry and live as long as their message instance.
pub fn modal_resume_ttl() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePointKind {
    ModalSubmit,
    MessageComponent,
}

/// Owning entity of a flow invocation. Exactly one of the IDs is set;
/// the same links annotate log entries and usage records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_listener_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_instance_id: Option<i64>,
}

impl EntityLinks {
    pub fn command(id: impl Into<String>) -> Self {
        EntityLinks {
            command_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn event_listener(id: impl Into<String>) -> Self {
        EntityLinks {
            event_listener_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn message_instance(id: i64) -> Self {
        EntityLinks {
            message_instance_id: Some(id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub id: String,
    pub kind: ResumePointKind,
    pub app_id: String,
    #[serde(default)]
    pub links: EntityLinks,
    /// The suspending node; resuming executes its children.
    pub flow_node_id: String,
    #[serde(default)]
    pub flow_state: FlowContextState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResumePoint {
    pub fn new(
        kind: ResumePointKind,
        app_id: impl Into<String>,
        links: EntityLinks,
        flow_node_id: impl Into<String>,
        flow_state: FlowContextState,
    ) -> Self {
        let created_at = Utc::now();
        let expires_at = match kind {
            ResumePointKind::ModalSubmit => Some(created_at + modal_resume_ttl()),
            ResumePointKind::MessageComponent => None,
        };
        ResumePoint {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            app_id: app_id.into(),
            links,
            flow_node_id: flow_node_id.into(),
            flow_state,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

const CUSTOM_ID_PREFIX: &str = "resume:";

/// Parsed form of a `resume:` custom ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeTarget {
    /// `resume:<resume-point-id>` — a modal submit.
    Modal { resume_point_id: String },
    /// `resume:<resume-point-id>_<component-index>` — a message component.
    Component {
        resume_point_id: String,
        component_index: usize,
    },
}

impl ResumeTarget {
    pub fn resume_point_id(&self) -> &str {
        match self {
            ResumeTarget::Modal { resume_point_id }
            | ResumeTarget::Component {
                resume_point_id, ..
            } => resume_point_id,
        }
    }
}

pub fn modal_custom_id(resume_point_id: &str) -> String {
    format!("{CUSTOM_ID_PREFIX}{resume_point_id}")
}

pub fn component_custom_id(resume_point_id: &str, component_index: usize) -> String {
    format!("{CUSTOM_ID_PREFIX}{resume_point_id}_{component_index}")
}

/// Parses a component/modal custom ID. Anything outside the `resume:`
/// namespace returns `None` so other custom IDs pass through untouched.
pub fn parse_custom_id(custom_id: &str) -> Option<ResumeTarget> {
    let rest = custom_id.strip_prefix(CUSTOM_ID_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    // Resume point IDs are UUIDs and never contain underscores, so a
    // trailing `_<n>` unambiguously marks a component reference.
    if let Some((id, index)) = rest.rsplit_once('_') {
        if let Ok(component_index) = index.parse::<usize>() {
            if !id.is_empty() {
                return Some(ResumeTarget::Component {
                    resume_point_id: id.to_owned(),
                    component_index,
                });
            }
        }
        return None;
    }
    Some(ResumeTarget::Modal {
        resume_point_id: rest.to_owned(),
    })
}
