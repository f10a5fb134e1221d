//! Pipeline stages, roles, and the transition gate.
//!
//! Every allowed stage change lives in [`TRANSITIONS`]. Adding a role or a
//! stage means editing that table; the gate functions below only read it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A position in the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Intake,
    Scoping,
    #[serde(rename = "Ready for Dev")]
    ReadyForDev,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Completed,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Intake,
        Self::Scoping,
        Self::ReadyForDev,
        Self::InProgress,
        Self::Review,
        Self::Completed,
    ];

    /// Display name, identical to the wire format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "Intake",
            Self::Scoping => "Scoping",
            Self::ReadyForDev => "Ready for Dev",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Completed => "Completed",
        }
    }

    /// Whether no further transitions leave this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String =
            s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_lowercase();
        match normalized.as_str() {
            "intake" => Ok(Self::Intake),
            "scoping" => Ok(Self::Scoping),
            "readyfordev" => Ok(Self::ReadyForDev),
            "inprogress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("unknown stage '{s}'")),
        }
    }
}

/// The role an actor plays when acting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Requester,
    ProductOwner,
    Dev,
    Management,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::ProductOwner => "product-owner",
            Self::Dev => "dev",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "requester" => Ok(Self::Requester),
            "product-owner" | "po" => Ok(Self::ProductOwner),
            "dev" | "developer" => Ok(Self::Dev),
            "management" => Ok(Self::Management),
            _ => Err(format!("unknown role '{s}'")),
        }
    }
}

/// Someone acting on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self { name: name.into(), role }
    }
}

/// What must hold before a transition may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Nothing beyond the role check
    None,
    /// Every generated document has been approved
    DocumentsApproved,
    /// A non-empty note (rejection reason or change-request feedback)
    Note,
}

/// How a transition affects the request owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerEffect {
    Keep,
    /// The acting user becomes the owner
    AssignActor,
}

/// One edge of the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
    pub role: Role,
    pub requirement: Requirement,
    pub owner_effect: OwnerEffect,
    /// Short label for the action, used in activity entries
    pub label: &'static str,
}

/// The complete transition table.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Stage::Scoping,
        to: Stage::ReadyForDev,
        role: Role::ProductOwner,
        requirement: Requirement::DocumentsApproved,
        owner_effect: OwnerEffect::Keep,
        label: "Approved for development",
    },
    Transition {
        from: Stage::ReadyForDev,
        to: Stage::InProgress,
        role: Role::Dev,
        requirement: Requirement::None,
        owner_effect: OwnerEffect::AssignActor,
        label: "Development started",
    },
    Transition {
        from: Stage::ReadyForDev,
        to: Stage::Scoping,
        role: Role::Dev,
        requirement: Requirement::Note,
        owner_effect: OwnerEffect::Keep,
        label: "Returned to scoping",
    },
    Transition {
        from: Stage::InProgress,
        to: Stage::Review,
        role: Role::Dev,
        requirement: Requirement::None,
        owner_effect: OwnerEffect::Keep,
        label: "Submitted for review",
    },
    Transition {
        from: Stage::Review,
        to: Stage::Completed,
        role: Role::Requester,
        requirement: Requirement::None,
        owner_effect: OwnerEffect::Keep,
        label: "Approved and completed",
    },
    Transition {
        from: Stage::Review,
        to: Stage::InProgress,
        role: Role::Requester,
        requirement: Requirement::Note,
        owner_effect: OwnerEffect::Keep,
        label: "Changes requested",
    },
];

/// Look up the edge between two stages.
pub fn transition(from: Stage, to: Stage) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Whether `role` may move a request from `from` to `to`.
///
/// This only answers the question. Callers that mutate state must check it
/// themselves before touching anything.
pub fn can_transition(role: Role, from: Stage, to: Stage) -> bool {
    transition(from, to).is_some_and(|t| t.role == role)
}

/// Edges that `role` may take out of `from`.
pub fn available_transitions(role: Role, from: Stage) -> Vec<&'static Transition> {
    TRANSITIONS.iter().filter(|t| t.from == from && t.role == role).collect()
}

/// Whether `role` can only observe a request sitting in `stage`.
pub fn is_read_only(role: Role, stage: Stage) -> bool {
    match (role, stage) {
        (Role::ProductOwner, Stage::Scoping) => false,
        (Role::Dev, Stage::ReadyForDev | Stage::InProgress | Stage::Review) => false,
        (Role::Requester, Stage::Review) => false,
        _ => true,
    }
}
