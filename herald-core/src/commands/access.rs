use crate::entities::{ChannelConfig, RoleId};
use thiserror::Error;

/// Who issued a command or menu selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub is_admin: bool,
    pub is_bot: bool,
    pub roles: Vec<RoleId>,
}

impl Caller {
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Default::default()
        }
    }

    pub fn member(roles: Vec<RoleId>) -> Self {
        Self {
            roles,
            ..Default::default()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("You are not allowed to use this command.")]
pub struct AccessDenied;

/// Administrators only until an access role is configured, then holders
/// of that role only.
pub fn authorize(caller: &Caller, config: &ChannelConfig) -> Result<(), AccessDenied> {
    let allowed = match config.access_role {
        None => caller.is_admin,
        Some(role) => caller.roles.contains(&role),
    };
    if allowed { Ok(()) } else { Err(AccessDenied) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_only_without_access_role() {
        let config = ChannelConfig::default();
        assert_eq!(authorize(&Caller::admin(), &config), Ok(()));
        assert_eq!(authorize(&Caller::member(vec![]), &config), Err(AccessDenied));
    }

    #[test]
    fn test_access_role_restricts_to_holders() {
        let role = RoleId::new(9).unwrap();
        let config = ChannelConfig {
            access_role: Some(role),
            ..Default::default()
        };
        assert_eq!(authorize(&Caller::member(vec![role]), &config), Ok(()));
        assert_eq!(authorize(&Caller::member(vec![RoleId::new(8).unwrap()]), &config), Err(AccessDenied));
        assert_eq!(authorize(&Caller::admin(), &config), Err(AccessDenied));
    }
}
