//! Authorization decisions for petitions and teams.
//!
//! Handlers load the subject's team memberships fresh on every request and
//! ask the policy; nothing here touches the database.

use uuid::Uuid;

use crate::models::{auth::AuthenticatedUser, team::TeamRole};

/// Who is asking.
#[derive(Debug, Clone)]
pub struct Subject {
    pub user_id: Uuid,
    pub is_admin: bool,
    pub team_ids: Vec<Uuid>,
}

impl Subject {
    pub fn new(user: &AuthenticatedUser, team_ids: Vec<Uuid>) -> Self {
        Self {
            user_id: user.user_id,
            is_admin: user.is_admin,
            team_ids,
        }
    }

    pub fn is_member_of(&self, team_id: Uuid) -> bool {
        self.team_ids.contains(&team_id)
    }
}

/// The ownership facts of a petition that matter for authorization.
#[derive(Debug, Clone, Copy)]
pub struct PetitionResource {
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetitionAction {
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

pub fn decide(subject: &Subject, resource: &PetitionResource, action: PetitionAction) -> Decision {
    let is_owner = resource.owner_id == subject.user_id;
    let in_team = resource.team_id.is_some_and(|t| subject.is_member_of(t));

    let allowed = match action {
        PetitionAction::Read | PetitionAction::Update => subject.is_admin || is_owner || in_team,
        // Team members may work on a petition but only its author or an admin removes it.
        PetitionAction::Delete => subject.is_admin || is_owner,
    };
    Decision::from_bool(allowed)
}

/// Creating a petition on a team requires membership; the cost is charged to that team.
pub fn decide_create(subject: &Subject, team_id: Uuid) -> Decision {
    Decision::from_bool(subject.is_member_of(team_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    View,
    Manage,
}

/// `role` is the subject's role in the team, `None` when not a member.
pub fn decide_team(is_admin: bool, role: Option<TeamRole>, action: TeamAction) -> Decision {
    let allowed = match action {
        TeamAction::View => is_admin || role.is_some(),
        TeamAction::Manage => is_admin || role == Some(TeamRole::Owner),
    };
    Decision::from_bool(allowed)
}
