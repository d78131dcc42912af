// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Caller capabilities.
//!
//! Authentication happens outside the ledger. The authenticated [`Role`] is
//! exchanged for a capability token, and entry points that are reserved for
//! merchant staff take that token as an argument. The ledger never inspects
//! roles itself; holding the token is the permission.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role of an authenticated dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Issuer,
}

impl Role {
    /// Staff capability, held by owners and issuers.
    pub fn staff(self) -> Option<Staff> {
        match self {
            Role::Owner | Role::Issuer => Some(Staff { role: self }),
            Role::Admin => None,
        }
    }

    /// Owner capability, required to set up campaigns.
    pub fn owner(self) -> Option<Owner> {
        match self {
            Role::Owner => Some(Owner { _private: () }),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Owner => f.write_str("owner"),
            Role::Issuer => f.write_str("issuer"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "issuer" => Ok(Role::Issuer),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// Permission to mint vouchers, add rewards and hand out claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staff {
    role: Role,
}

impl Staff {
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Permission to create campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    _private: (),
}

impl Owner {
    /// Owners can do everything staff can.
    pub fn as_staff(&self) -> Staff {
        Staff { role: Role::Owner }
    }
}
