use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Admin,
    Eo,
    Panitia,
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Eo, Role::Panitia, Role::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Eo => "EO",
            Role::Panitia => "Panitia",
            Role::User => "User",
        }
    }

    /// Capabilities granted by holding this role.
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin => &Capability::ALL,
            Role::Eo => &[
                EventView,
                EventCreate,
                EventUpdate,
                EventDelete,
                TicketTypeView,
                TicketTypeCreate,
                TicketTypeUpdate,
                TicketTypeDelete,
                TicketView,
                TicketScan,
                TicketVerify,
                TransactionView,
                UserView,
            ],
            Role::Panitia => &[EventView, TicketView, TicketScan, TicketVerify],
            Role::User => &[
                EventView,
                TicketTypeView,
                TicketView,
                TransactionCreate,
                TransactionView,
            ],
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
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    EventView,
    EventCreate,
    EventUpdate,
    EventDelete,
    EventViewAll,
    TicketView,
    TicketScan,
    TicketVerify,
    TicketTypeView,
    TicketTypeCreate,
    TicketTypeUpdate,
    TicketTypeDelete,
    TransactionCreate,
    TransactionView,
    TransactionViewAll,
    TransactionApprove,
    TransactionReject,
    UserView,
    UserCreate,
    UserUpdate,
    UserDelete,
    UserManageRoles,
}

impl Capability {
    pub const ALL: [Capability; 22] = [
        Capability::EventView,
        Capability::EventCreate,
        Capability::EventUpdate,
        Capability::EventDelete,
        Capability::EventViewAll,
        Capability::TicketView,
        Capability::TicketScan,
        Capability::TicketVerify,
        Capability::TicketTypeView,
        Capability::TicketTypeCreate,
        Capability::TicketTypeUpdate,
        Capability::TicketTypeDelete,
        Capability::TransactionCreate,
        Capability::TransactionView,
        Capability::TransactionViewAll,
        Capability::TransactionApprove,
        Capability::TransactionReject,
        Capability::UserView,
        Capability::UserCreate,
        Capability::UserUpdate,
        Capability::UserDelete,
        Capability::UserManageRoles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::EventView => "event.view",
            Capability::EventCreate => "event.create",
            Capability::EventUpdate => "event.update",
            Capability::EventDelete => "event.delete",
            Capability::EventViewAll => "event.view-all",
            Capability::TicketView => "tiket.view",
            Capability::TicketScan => "tiket.scan",
            Capability::TicketVerify => "tiket.verify",
            Capability::TicketTypeView => "jenis-tiket.view",
            Capability::TicketTypeCreate => "jenis-tiket.create",
            Capability::TicketTypeUpdate => "jenis-tiket.update",
            Capability::TicketTypeDelete => "jenis-tiket.delete",
            Capability::TransactionCreate => "transaksi.create",
            Capability::TransactionView => "transaksi.view",
            Capability::TransactionViewAll => "transaksi.view-all",
            Capability::TransactionApprove => "transaksi.approve",
            Capability::TransactionReject => "transaksi.reject",
            Capability::UserView => "user.view",
            Capability::UserCreate => "user.create",
            Capability::UserUpdate => "user.update",
            Capability::UserDelete => "user.delete",
            Capability::UserManageRoles => "user.manage-roles",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {s}"))
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Resolved roles and capabilities of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    roles: HashSet<Role>,
    capabilities: HashSet<Capability>,
}

impl Grants {
    /// Capabilities are the union of every role's table plus `direct`.
    pub fn resolve(roles: &[Role], direct: &[Capability]) -> Self {
        let mut capabilities: HashSet<Capability> = direct.iter().copied().collect();
        for role in roles {
            capabilities.extend(role.capabilities().iter().copied());
        }
        Self {
            roles: roles.iter().copied().collect(),
            capabilities,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.iter().copied().collect();
        roles.sort();
        roles
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.capabilities.iter().copied().collect();
        caps.sort();
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>(), Ok(cap));
        }
        assert_eq!("EO".parse::<Role>(), Ok(Role::Eo));
        assert!("Superuser".parse::<Role>().is_err());
    }

    #[test]
    fn panitia_scans_but_cannot_create_events() {
        let grants = Grants::resolve(&[Role::Panitia], &[]);
        assert!(grants.can(Capability::TicketScan));
        assert!(!grants.can(Capability::EventCreate));
        assert!(!grants.has_role(Role::Admin));
    }

    #[test]
    fn direct_capabilities_extend_roles() {
        let grants = Grants::resolve(&[Role::User], &[Capability::TicketScan]);
        assert!(grants.can(Capability::TicketScan));
        assert!(grants.can(Capability::TransactionCreate));
        assert!(grants.has_any_role(&[Role::Eo, Role::User]));
    }

    #[test]
    fn admin_holds_everything() {
        let grants = Grants::resolve(&[Role::Admin], &[]);
        assert!(Capability::ALL.iter().all(|c| grants.can(*c)));
    }
}
