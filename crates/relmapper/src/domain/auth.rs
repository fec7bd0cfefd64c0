//! Per-instance permission annotations.

use serde::Serialize;

use crate::core::value::PkValue;

/// Who is asking: the signed-in administrator and the roles they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub administrator_id: PkValue,
    pub role_ids: Vec<PkValue>,
    /// Id of the top-level role, when it exists.
    pub top_role_id: Option<PkValue>,
}

/// What the caller may do with one returned administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePermissions {
    pub can_update: bool,
    pub can_delete: bool,
}

impl AuthContext {
    pub fn new(administrator_id: PkValue, role_ids: Vec<PkValue>, top_role_id: Option<PkValue>) -> Self {
        Self {
            administrator_id,
            role_ids,
            top_role_id,
        }
    }

    pub fn holds_top_role(&self) -> bool {
        self.top_role_id
            .as_ref()
            .is_some_and(|top| self.role_ids.contains(top))
    }

    /// Only top-role holders may modify a top-role administrator, and nobody
    /// may delete their own account.
    pub fn permissions_for(&self, target_id: &PkValue, target_role_ids: &[PkValue]) -> InstancePermissions {
        let target_is_top = self
            .top_role_id
            .as_ref()
            .is_some_and(|top| target_role_ids.contains(top));
        let can_update = !target_is_top || self.holds_top_role();
        InstancePermissions {
            can_update,
            can_delete: can_update && *target_id != self.administrator_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: PkValue = PkValue::Int(1);

    fn ctx(id: i64, roles: &[i64]) -> AuthContext {
        AuthContext::new(
            PkValue::Int(id),
            roles.iter().copied().map(PkValue::Int).collect(),
            Some(TOP),
        )
    }

    #[test]
    fn test_top_role_holder_can_modify_anyone_but_not_delete_self() {
        let auth = ctx(5, &[1, 2]);
        assert!(auth.holds_top_role());

        let other = auth.permissions_for(&PkValue::Int(6), &[TOP]);
        assert_eq!(other, InstancePermissions { can_update: true, can_delete: true });

        let own = auth.permissions_for(&PkValue::Int(5), &[TOP]);
        assert!(own.can_update);
        assert!(!own.can_delete);
    }

    #[test]
    fn test_regular_admin_cannot_touch_top_role_admin() {
        let auth = ctx(5, &[2]);
        let top_admin = auth.permissions_for(&PkValue::Int(6), &[PkValue::Int(2), TOP]);
        assert_eq!(top_admin, InstancePermissions { can_update: false, can_delete: false });

        let peer = auth.permissions_for(&PkValue::Int(7), &[PkValue::Int(3)]);
        assert!(peer.can_update && peer.can_delete);
    }

    #[test]
    fn test_missing_top_role_protects_nobody() {
        let auth = AuthContext::new(PkValue::Int(5), vec![], None);
        assert!(!auth.holds_top_role());
        assert!(auth.permissions_for(&PkValue::Int(6), &[TOP]).can_update);
    }
}
