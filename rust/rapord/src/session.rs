use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Homeroom,
    Staff,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "TEACHER" => Some(Role::Teacher),
            "HOMEROOM" => Some(Role::Homeroom),
            "STAFF" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Homeroom => "HOMEROOM",
            Role::Staff => "STAFF",
        }
    }
}

pub const SETUP_WRITERS: &[Role] = &[Role::Admin];
pub const SCORE_WRITERS: &[Role] = &[Role::Admin, Role::Teacher];
pub const RAPOR_READERS: &[Role] = &[Role::Admin, Role::Teacher, Role::Homeroom];
pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::Teacher, Role::Homeroom, Role::Staff];

/// The principal behind the current connection and the one role it acts
/// under. Built once by `session.begin` and consulted by every handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub principal_id: String,
    pub available_roles: BTreeSet<Role>,
    pub active_role: Role,
}

impl SessionContext {
    pub fn new(
        principal_id: impl Into<String>,
        available_roles: BTreeSet<Role>,
        active_role: Role,
    ) -> Result<Self, String> {
        let principal_id = principal_id.into();
        if principal_id.trim().is_empty() {
            return Err("principalId must not be empty".to_string());
        }
        if !available_roles.contains(&active_role) {
            return Err(format!(
                "activeRole {} is not among the principal's roles",
                active_role.as_str()
            ));
        }
        Ok(Self {
            principal_id,
            available_roles,
            active_role,
        })
    }

    pub fn switch_role(&mut self, role: Role) -> Result<(), String> {
        if !self.available_roles.contains(&role) {
            return Err(format!("role {} is not available", role.as_str()));
        }
        self.active_role = role;
        Ok(())
    }

    pub fn allows(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.active_role)
    }
}
