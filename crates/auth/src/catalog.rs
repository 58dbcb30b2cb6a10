use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitmask::PermissionId;

/// Hard cap on named permissions.
///
/// The codec itself handles any `u32`; the catalog keeps IDs within a single
/// byte so that a full permission set stays at 32 groups or fewer.
pub const MAX_PERMISSIONS: usize = 255;

/// Permission name (e.g. "view-user").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("too many permissions: {0} (maximum is 255)")]
    TooMany(usize),

    #[error("duplicate permission '{0}'")]
    Duplicate(String),

    #[error("empty permission name")]
    EmptyName,

    #[error("unknown permission '{0}'")]
    Unknown(String),
}

/// Name → ID registry.
///
/// IDs are assigned in declaration order starting at 1, so appending a
/// permission never renumbers existing ones.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    names: Vec<Permission>,
    ids: HashMap<String, PermissionId>,
}

impl PermissionCatalog {
    pub fn new<I, P>(names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Cow<'static, str>>,
    {
        let names: Vec<Permission> = names.into_iter().map(Permission::new).collect();
        if names.len() > MAX_PERMISSIONS {
            return Err(CatalogError::TooMany(names.len()));
        }

        let mut ids = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if name.as_str().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            // idx < MAX_PERMISSIONS, so the cast cannot truncate.
            let id = idx as PermissionId + 1;
            if ids.insert(name.to_string(), id).is_some() {
                return Err(CatalogError::Duplicate(name.to_string()));
            }
        }

        Ok(Self { names, ids })
    }

    /// Catalog of the user/role/permission management permissions.
    pub fn default_catalog() -> Result<Self, CatalogError> {
        Self::new(defaults::ALL.iter().map(|name| Cow::Borrowed(*name)))
    }

    pub fn id_of(&self, name: &str) -> Option<PermissionId> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: PermissionId) -> Option<&Permission> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.names.get(idx)
    }

    /// Resolve names to IDs, failing on the first unknown name.
    pub fn resolve<'a, I>(&self, names: I) -> Result<BTreeSet<PermissionId>, CatalogError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|name| {
                self.id_of(name)
                    .ok_or_else(|| CatalogError::Unknown(name.to_string()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PermissionId, &Permission)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| (idx as PermissionId + 1, name))
    }
}

/// Built-in permission names.
pub mod defaults {
    pub const CREATE_USER: &str = "create-user";
    pub const VIEW_USER: &str = "view-user";
    pub const UPDATE_USER: &str = "update-user";
    pub const DELETE_USER: &str = "delete-user";

    pub const CREATE_ROLE: &str = "create-role";
    pub const VIEW_ROLE: &str = "view-role";
    pub const UPDATE_ROLE: &str = "update-role";
    pub const DELETE_ROLE: &str = "delete-role";

    pub const CREATE_USER_HAS_ROLE: &str = "create-user-has-role";
    pub const VIEW_USER_HAS_ROLE: &str = "view-user-has-role";
    pub const UPDATE_USER_HAS_ROLE: &str = "update-user-has-role";
    pub const DELETE_USER_HAS_ROLE: &str = "delete-user-has-role";

    pub const CREATE_PERMISSION: &str = "create-permission";
    pub const VIEW_PERMISSION: &str = "view-permission";
    pub const UPDATE_PERMISSION: &str = "update-permission";
    pub const DELETE_PERMISSION: &str = "delete-permission";

    pub const CREATE_ROLE_HAS_PERMISSIONS: &str = "create-role-has-permissions";
    pub const VIEW_ROLE_HAS_PERMISSIONS: &str = "view-role-has-permissions";
    pub const UPDATE_ROLE_HAS_PERMISSIONS: &str = "update-role-has-permissions";
    pub const DELETE_ROLE_HAS_PERMISSIONS: &str = "delete-role-has-permissions";

    /// Declaration order defines the IDs; append only.
    pub const ALL: &[&str] = &[
        CREATE_USER,
        VIEW_USER,
        UPDATE_USER,
        DELETE_USER,
        CREATE_ROLE,
        VIEW_ROLE,
        UPDATE_ROLE,
        DELETE_ROLE,
        CREATE_USER_HAS_ROLE,
        VIEW_USER_HAS_ROLE,
        UPDATE_USER_HAS_ROLE,
        DELETE_USER_HAS_ROLE,
        CREATE_PERMISSION,
        VIEW_PERMISSION,
        UPDATE_PERMISSION,
        DELETE_PERMISSION,
        CREATE_ROLE_HAS_PERMISSIONS,
        VIEW_ROLE_HAS_PERMISSIONS,
        UPDATE_ROLE_HAS_PERMISSIONS,
        DELETE_ROLE_HAS_PERMISSIONS,
    ];
}
