//! Permission model.
//!
//! A [`Permission`] is a tagged value answered against the persisted
//! [`PermissionGrants`] table:
//!
//! | Variant      | Holds for a member when                                          |
//! |--------------|------------------------------------------------------------------|
//! | `Everyone`   | always                                                           |
//! | `Role(id)`   | member is on the all-permissions list, or has role `id`          |
//! | `Named(p)`   | member is on the all-permissions list, or `p` is granted to the  |
//! |              | member's user id or to any of the member's roles                 |
//!
//! A role permission built from the guild's public role is normalized to
//! `Everyone` at construction, so no call site needs to special-case it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PersistenceResult;
use crate::id::{RoleId, UserId};
use crate::store::{PersistentObject, Shared, Store};

// ─── Member ───────────────────────────────────────────────────────────────────

/// The caller of a command: a user and the roles they hold in the guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
}

impl Member {
    pub fn new(user_id: UserId, role_ids: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            user_id,
            role_ids: role_ids.into_iter().collect(),
        }
    }

    /// Whether the member holds `role`.
    pub fn has_role(&self, role: RoleId) -> bool {
        self.role_ids.contains(&role)
    }
}

// ─── Permission ───────────────────────────────────────────────────────────────

/// Who may run something.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    Everyone,
    Role(RoleId),
    Named(String),
}

impl Permission {
    /// A role permission, normalized to `Everyone` for the public role.
    pub fn role(id: RoleId, public_role: RoleId) -> Self {
        if id == public_role {
            Self::Everyone
        } else {
            Self::Role(id)
        }
    }

    /// A named permission string.
    pub fn named(permission: impl Into<String>) -> Self {
        Self::Named(permission.into())
    }

    pub fn is_everyone(&self) -> bool {
        matches!(self, Self::Everyone)
    }

    /// Whether this holds for every member of a guild whose public role is `public_role`.
    ///
    /// Unlike [`is_everyone`](Self::is_everyone) this also accepts a
    /// `Role(public_role)` built without going through [`role`](Self::role).
    pub fn is_public(&self, public_role: RoleId) -> bool {
        match self {
            Self::Everyone => true,
            Self::Role(id) => *id == public_role,
            Self::Named(_) => false,
        }
    }

    /// `Everyone` for `Role(public_role)`, `self` otherwise.
    pub fn normalized(self, public_role: RoleId) -> Self {
        match self {
            Self::Role(id) => Self::role(id, public_role),
            other => other,
        }
    }

    /// Canonical string form: `everyone`, `role:<id>` or the name itself.
    pub fn as_permission_string(&self) -> String {
        match self {
            Self::Everyone => "everyone".to_string(),
            Self::Role(id) => format!("role:{id}"),
            Self::Named(name) => name.clone(),
        }
    }

    /// Whether `member` satisfies this permission under `grants`.
    pub fn member_has_permission(&self, member: &Member, grants: &PermissionGrants) -> bool {
        match self {
            Self::Everyone => true,
            Self::Role(id) => grants.has_all_permissions(member.user_id) || member.has_role(*id),
            Self::Named(name) => {
                grants.has_all_permissions(member.user_id)
                    || grants.user_has(name, member.user_id)
                    || member.role_ids.iter().any(|role| grants.role_has(name, *role))
            }
        }
    }

    /// Users this permission explicitly targets.
    ///
    /// Only named permissions target users: the all-permissions list plus
    /// every user granted the name.
    pub fn targeted_users(&self, grants: &PermissionGrants) -> Vec<UserId> {
        match self {
            Self::Named(name) => {
                let mut users: BTreeSet<UserId> = grants.users_with_all_permissions.clone();
                if let Some(granted) = grants.user_grants.get(name) {
                    users.extend(granted.iter().copied());
                }
                users.into_iter().collect()
            }
            Self::Everyone | Self::Role(_) => Vec::new(),
        }
    }

    /// Roles this permission explicitly targets.
    pub fn targeted_roles(&self, grants: &PermissionGrants) -> Vec<RoleId> {
        match self {
            Self::Everyone => Vec::new(),
            Self::Role(id) => vec![*id],
            Self::Named(name) => grants
                .role_grants
                .get(name)
                .map(|roles| roles.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    pub fn targets_users(&self, grants: &PermissionGrants) -> bool {
        !self.targeted_users(grants).is_empty()
    }

    pub fn targets_roles(&self, grants: &PermissionGrants) -> bool {
        !self.targeted_roles(grants).is_empty()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_permission_string())
    }
}

// ─── PermissionGrants ─────────────────────────────────────────────────────────

/// Persisted grant tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionGrants {
    /// Users that hold every permission.
    pub users_with_all_permissions: BTreeSet<UserId>,
    /// Permission name → users granted it.
    pub user_grants: BTreeMap<String, BTreeSet<UserId>>,
    /// Permission name → roles granted it.
    pub role_grants: BTreeMap<String, BTreeSet<RoleId>>,
}

impl PersistentObject for PermissionGrants {
    const KEY: &'static str = "permission_grants";
}

impl PermissionGrants {
    pub fn has_all_permissions(&self, user: UserId) -> bool {
        self.users_with_all_permissions.contains(&user)
    }

    fn user_has(&self, permission: &str, user: UserId) -> bool {
        self.user_grants
            .get(permission)
            .is_some_and(|users| users.contains(&user))
    }

    fn role_has(&self, permission: &str, role: RoleId) -> bool {
        self.role_grants
            .get(permission)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// Grants `permission` to `user`. Returns whether it was newly added.
    pub fn grant_user(&mut self, user: UserId, permission: &str) -> bool {
        self.user_grants
            .entry(permission.to_string())
            .or_default()
            .insert(user)
    }

    /// Revokes `permission` from `user`. Returns whether it was present.
    pub fn revoke_user(&mut self, user: UserId, permission: &str) -> bool {
        let Some(users) = self.user_grants.get_mut(permission) else {
            return false;
        };
        let removed = users.remove(&user);
        if users.is_empty() {
            self.user_grants.remove(permission);
        }
        removed
    }

    /// Grants `permission` to `role`. Returns whether it was newly added.
    pub fn grant_role(&mut self, role: RoleId, permission: &str) -> bool {
        self.role_grants
            .entry(permission.to_string())
            .or_default()
            .insert(role)
    }

    /// Revokes `permission` from `role`. Returns whether it was present.
    pub fn revoke_role(&mut self, role: RoleId, permission: &str) -> bool {
        let Some(roles) = self.role_grants.get_mut(permission) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.role_grants.remove(permission);
        }
        removed
    }

    /// Puts `user` on the all-permissions list.
    pub fn grant_all(&mut self, user: UserId) -> bool {
        self.users_with_all_permissions.insert(user)
    }

    /// Takes `user` off the all-permissions list.
    pub fn revoke_all(&mut self, user: UserId) -> bool {
        self.users_with_all_permissions.remove(&user)
    }
}

// ─── PermissionManager ────────────────────────────────────────────────────────

/// Concurrent access to the persisted grant table.
///
/// Writers take the table's write lock only for the duration of one
/// mutation. Callers that cache anything derived from grants must invalidate
/// after a write that returns `true`.
#[derive(Debug, Clone)]
pub struct PermissionManager {
    grants: Shared<PermissionGrants>,
    public_role: RoleId,
}

impl PermissionManager {
    /// Wraps an already-loaded grant table.
    pub fn new(grants: Shared<PermissionGrants>, public_role: RoleId) -> Self {
        Self {
            grants,
            public_role,
        }
    }

    /// Loads the grant table from `store`.
    pub fn load(store: &Store, public_role: RoleId) -> PersistenceResult<Self> {
        let grants = store.load(PermissionGrants::default)?;
        Ok(Self::new(grants, public_role))
    }

    /// An isolated, empty table.
    pub fn in_memory(public_role: RoleId) -> Self {
        Self::new(Arc::new(RwLock::new(PermissionGrants::default())), public_role)
    }

    /// A role permission, normalized against this guild's public role.
    pub fn role(&self, id: RoleId) -> Permission {
        Permission::role(id, self.public_role)
    }

    pub fn public_role(&self) -> RoleId {
        self.public_role
    }

    /// Whether `member` satisfies `permission`. `Role(public_role)` always holds.
    pub fn member_has_permission(&self, permission: &Permission, member: &Member) -> bool {
        permission.is_public(self.public_role)
            || permission.member_has_permission(member, &self.grants.read())
    }

    pub fn targeted_users(&self, permission: &Permission) -> Vec<UserId> {
        permission.targeted_users(&self.grants.read())
    }

    /// Roles `permission` targets. `Role(public_role)` targets none, like `Everyone`.
    pub fn targeted_roles(&self, permission: &Permission) -> Vec<RoleId> {
        if permission.is_public(self.public_role) {
            return Vec::new();
        }
        permission.targeted_roles(&self.grants.read())
    }

    pub fn grant_user(&self, user: UserId, permission: &str) -> bool {
        let added = self.grants.write().grant_user(user, permission);
        if added {
            info!(user = %user, permission, "Granted permission to user");
        }
        added
    }

    pub fn revoke_user(&self, user: UserId, permission: &str) -> bool {
        let removed = self.grants.write().revoke_user(user, permission);
        if removed {
            info!(user = %user, permission, "Revoked permission from user");
        }
        removed
    }

    pub fn grant_role(&self, role: RoleId, permission: &str) -> bool {
        let added = self.grants.write().grant_role(role, permission);
        if added {
            info!(role = %role, permission, "Granted permission to role");
        }
        added
    }

    pub fn revoke_role(&self, role: RoleId, permission: &str) -> bool {
        let removed = self.grants.write().revoke_role(role, permission);
        if removed {
            info!(role = %role, permission, "Revoked permission from role");
        }
        removed
    }

    pub fn grant_all(&self, user: UserId) -> bool {
        self.grants.write().grant_all(user)
    }

    pub fn revoke_all(&self, user: UserId) -> bool {
        self.grants.write().revoke_all(user)
    }

    /// A copy of the current table.
    pub fn snapshot(&self) -> PermissionGrants {
        self.grants.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: RoleId = RoleId(1000);

    fn member(user: u64, roles: &[u64]) -> Member {
        Member::new(UserId(user), roles.iter().map(|r| RoleId(*r)))
    }

    #[test]
    fn test_everyone_always_holds() {
        let grants = PermissionGrants::default();
        for m in [member(1, &[]), member(2, &[5, 6]), member(3, &[1000])] {
            assert!(Permission::Everyone.member_has_permission(&m, &grants));
        }
    }

    #[test]
    fn test_public_role_normalizes_to_everyone() {
        let permission = Permission::role(PUBLIC, PUBLIC);
        assert_eq!(permission, Permission::Everyone);
        assert!(permission.member_has_permission(&member(9, &[]), &PermissionGrants::default()));

        assert_eq!(Permission::role(RoleId(5), PUBLIC), Permission::Role(RoleId(5)));
    }

    #[test]
    fn test_raw_public_role_variant_is_treated_as_everyone() {
        let raw = Permission::Role(PUBLIC);
        assert!(raw.is_public(PUBLIC));
        assert!(!Permission::Role(RoleId(5)).is_public(PUBLIC));
        assert_eq!(raw.clone().normalized(PUBLIC), Permission::Everyone);
        assert_eq!(
            Permission::Role(RoleId(5)).normalized(PUBLIC),
            Permission::Role(RoleId(5))
        );

        let permissions = PermissionManager::in_memory(PUBLIC);
        assert!(permissions.member_has_permission(&raw, &member(9, &[])));
        assert!(permissions.targeted_roles(&raw).is_empty());
        assert!(!permissions.member_has_permission(&Permission::Role(RoleId(5)), &member(9, &[])));
    }

    #[test]
    fn test_role_permission() {
        let mut grants = PermissionGrants::default();
        let permission = Permission::Role(RoleId(5));
        assert!(permission.member_has_permission(&member(1, &[5]), &grants));
        assert!(!permission.member_has_permission(&member(2, &[6]), &grants));

        grants.grant_all(UserId(2));
        assert!(permission.member_has_permission(&member(2, &[6]), &grants));
    }

    #[test]
    fn test_named_permission_by_user_and_role() {
        let mut grants = PermissionGrants::default();
        let permission = Permission::named("cmd:play");

        assert!(!permission.member_has_permission(&member(1, &[]), &grants));

        grants.grant_user(UserId(1), "cmd:play");
        assert!(permission.member_has_permission(&member(1, &[]), &grants));

        grants.grant_role(RoleId(7), "cmd:play");
        assert!(permission.member_has_permission(&member(2, &[3, 7]), &grants));
        assert!(!permission.member_has_permission(&member(2, &[3]), &grants));
    }

    #[test]
    fn test_grant_and_revoke_are_idempotent() {
        let mut grants = PermissionGrants::default();
        assert!(grants.grant_user(UserId(1), "p"));
        assert!(!grants.grant_user(UserId(1), "p"));
        assert!(grants.revoke_user(UserId(1), "p"));
        assert!(!grants.revoke_user(UserId(1), "p"));
        assert!(!grants.revoke_user(UserId(2), "never"));

        assert!(grants.grant_role(RoleId(1), "p"));
        assert!(!grants.grant_role(RoleId(1), "p"));
        assert!(grants.revoke_role(RoleId(1), "p"));
        assert!(!grants.revoke_role(RoleId(1), "p"));
        assert!(grants.role_grants.is_empty());
    }

    #[test]
    fn test_targeted_users_and_roles() {
        let mut grants = PermissionGrants::default();
        grants.grant_all(UserId(1));
        grants.grant_user(UserId(2), "cmd:admin");
        grants.grant_user(UserId(1), "cmd:admin");
        grants.grant_role(RoleId(8), "cmd:admin");

        let named = Permission::named("cmd:admin");
        assert_eq!(named.targeted_users(&grants), vec![UserId(1), UserId(2)]);
        assert_eq!(named.targeted_roles(&grants), vec![RoleId(8)]);

        assert!(Permission::Everyone.targeted_users(&grants).is_empty());
        assert!(!Permission::Everyone.targets_roles(&grants));
        assert_eq!(
            Permission::Role(RoleId(4)).targeted_roles(&grants),
            vec![RoleId(4)]
        );
        assert!(!Permission::Role(RoleId(4)).targets_users(&grants));
    }

    #[test]
    fn test_manager_persists_through_store() {
        let store = Store::in_memory();
        let manager = PermissionManager::load(&store, PUBLIC).unwrap();
        assert!(manager.grant_user(UserId(3), "cmd:ping"));

        let again = PermissionManager::load(&store, PUBLIC).unwrap();
        assert!(again.member_has_permission(&Permission::named("cmd:ping"), &member(3, &[])));
        assert_eq!(again.role(PUBLIC), Permission::Everyone);
    }

    #[test]
    fn test_permission_strings() {
        assert_eq!(Permission::Everyone.to_string(), "everyone");
        assert_eq!(Permission::Role(RoleId(5)).to_string(), "role:5");
        assert_eq!(Permission::named("cmd:x").to_string(), "cmd:x");
    }
}
