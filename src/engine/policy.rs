use ulid::Ulid;

use crate::model::{Actor, Role};

// Authorization is two pure predicates over the closed Role enum. No
// permission maps — adding a role forces every match below to be revisited.

/// May `actor` mutate a resource owned by `owner_id`?
/// Admins may mutate anything; everyone else only their own.
pub fn can_mutate(actor: &Actor, owner_id: Ulid) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Employee | Role::General => actor.id == owner_id,
    }
}

/// Workspace create/edit/delete is admin-only, independent of ownership.
pub fn can_manage_workspaces(role: Role) -> bool {
    match role {
        Role::Admin => true,
        Role::Employee | Role::General => false,
    }
}
