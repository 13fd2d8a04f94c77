use std::fmt;
use std::str::FromStr;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRole;
use crate::schema::user_roles;

/// Global role held by a user. A user may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Attorney,
    Client,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Attorney, Role::Client];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Attorney => "Attorney",
            Role::Client => "Client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role `{}`", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "attorney" => Ok(Role::Attorney),
            "client" => Ok(Role::Client),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Small bit set of [`Role`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        Self(0)
    }

    fn bit(role: Role) -> u8 {
        match role {
            Role::Admin => 0b001,
            Role::Attorney => 0b010,
            Role::Client => 0b100,
        }
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= Self::bit(role);
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_admin(&self) -> bool {
        self.contains(Role::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.contains(Role::Admin) || self.contains(Role::Attorney)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|role| self.contains(*role))
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|role| role.as_str().to_string()).collect()
    }

    /// Parses role names, ignoring ones that are not recognised.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| name.as_ref().parse().ok())
            .collect()
    }

    /// Strict variant of [`RoleSet::from_names`] used for request payloads.
    pub fn parse_all<I, S>(names: I) -> Result<Self, UnknownRole>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = RoleSet::empty();
        for name in names {
            set.insert(name.as_ref().parse()?);
        }
        Ok(set)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

/// Loads the role set stored for a user.
pub fn load_for_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<RoleSet> {
    let names: Vec<String> = user_roles::table
        .filter(user_roles::user_id.eq(user_id))
        .select(user_roles::role)
        .load(conn)?;
    Ok(RoleSet::from_names(names))
}

/// Replaces every stored role of a user with `roles`.
pub fn replace_for_user(conn: &mut PgConnection, user_id: Uuid, roles: RoleSet) -> QueryResult<()> {
    diesel::delete(user_roles::table.filter(user_roles::user_id.eq(user_id))).execute(conn)?;
    let rows: Vec<UserRole> = roles
        .iter()
        .map(|role| UserRole {
            user_id,
            role: role.as_str().to_string(),
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(user_roles::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

/// Ids of every user holding `role`.
pub fn users_with_role(conn: &mut PgConnection, role: Role) -> QueryResult<Vec<Uuid>> {
    user_roles::table
        .filter(user_roles::role.eq(role.as_str()))
        .select(user_roles::user_id)
        .load(conn)
}
