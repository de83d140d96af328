// ABOUTME: Tenant and actor context threaded through every operation
// ABOUTME: Every read and write is scoped to an org_id; writes are attributed to an actor

use serde::{Deserialize, Serialize};

/// Who (or what) performed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    System,
    Ai,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::User => "user",
            ActorKind::System => "system",
            ActorKind::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ActorKind::User),
            "system" => Some(ActorKind::System),
            "ai" => Some(ActorKind::Ai),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Actor {
    pub fn user(email: impl Into<String>) -> Self {
        Actor {
            kind: ActorKind::User,
            email: Some(email.into()),
        }
    }

    /// Scheduler / background work not tied to a person.
    pub fn system() -> Self {
        Actor {
            kind: ActorKind::System,
            email: None,
        }
    }

    pub fn ai() -> Self {
        Actor {
            kind: ActorKind::Ai,
            email: None,
        }
    }
}

/// Per-request scope: the tenant and the acting identity.
///
/// Tenancy is enforced by carrying this through every service and
/// storage call rather than trusting callers to remember a WHERE
/// clause. Rows from other orgs are indistinguishable from rows that
/// do not exist.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub org_id: String,
    pub actor: Actor,
}

impl RequestContext {
    pub fn new(org_id: impl Into<String>, actor: Actor) -> Self {
        RequestContext {
            org_id: org_id.into(),
            actor,
        }
    }

    /// Context for background jobs (delivery scheduler, retention sweeps).
    pub fn system(org_id: impl Into<String>) -> Self {
        RequestContext::new(org_id, Actor::system())
    }

    /// Email to attribute writes to, when the actor has one.
    pub fn actor_email(&self) -> Option<&str> {
        self.actor.email.as_deref()
    }
}
