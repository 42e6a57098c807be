//! Access decisions. The [`AuthUser`] guard only proves who the caller is;
//! handlers ask [`authorize`] whether that caller may perform an action,
//! passing the target user where one is involved.

use super::{AuthUser, Permission, Role};
use crate::error::AppError;

/// The user an action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetUser {
    pub id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListUsers,
    CreateUser { role: Role },
    UpdateUser { target: TargetUser, new_role: Option<Role> },
    DeleteUser { target: TargetUser },
    DeleteSession,
    DownloadBackup,
    RestoreBackup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

/// Which users a caller may see in the user list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserListScope {
    All,
    OperatorsOnly,
}

pub fn decide(actor_id: i64, actor_role: Role, action: Action) -> Decision {
    match action {
        Action::ListUsers => {
            if actor_role.has_permission(Permission::ManageOperators) {
                Decision::Allow
            } else {
                Decision::Deny("Listing users requires admin rights")
            }
        }
        Action::CreateUser { role } => {
            if can_manage_role(actor_role, role) {
                Decision::Allow
            } else {
                Decision::Deny("Not allowed to create a user with this role")
            }
        }
        Action::UpdateUser { target, new_role } => {
            let role_change = new_role.is_some_and(|r| r != target.role);
            if role_change && !actor_role.has_permission(Permission::EditUserRoles) {
                return Decision::Deny("Only a super admin may change roles");
            }
            if may_act_on(actor_id, actor_role, target) {
                Decision::Allow
            } else {
                Decision::Deny("Not allowed to modify this user")
            }
        }
        Action::DeleteUser { target } => {
            if may_act_on(actor_id, actor_role, target) {
                Decision::Allow
            } else {
                Decision::Deny("Not allowed to delete this user")
            }
        }
        Action::DeleteSession => {
            if actor_role.has_permission(Permission::DeleteSessions) {
                Decision::Allow
            } else {
                Decision::Deny("Access denied. Admin or super admin only.")
            }
        }
        Action::DownloadBackup | Action::RestoreBackup => {
            if actor_role.has_permission(Permission::ManageBackups) {
                Decision::Allow
            } else {
                Decision::Deny("Access denied. Super admin only.")
            }
        }
    }
}

pub fn authorize(actor: &AuthUser, action: Action) -> Result<(), AppError> {
    match decide(actor.id, actor.role, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(
                username = %actor.username,
                role = %actor.role,
                action = ?action,
                "Permission denied"
            );
            Err(AppError::Authorization(reason.to_string()))
        }
    }
}

pub fn user_list_scope(role: Role) -> UserListScope {
    if role.has_permission(Permission::ManageAllUsers) {
        UserListScope::All
    } else {
        UserListScope::OperatorsOnly
    }
}

fn can_manage_role(actor_role: Role, target_role: Role) -> bool {
    actor_role.has_permission(Permission::ManageAllUsers)
        || (actor_role.has_permission(Permission::ManageOperators) && target_role == Role::Operator)
}

fn may_act_on(actor_id: i64, actor_role: Role, target: TargetUser) -> bool {
    (actor_id == target.id && actor_role.has_permission(Permission::EditOwnAccount))
        || can_manage_role(actor_role, target.role)
}
