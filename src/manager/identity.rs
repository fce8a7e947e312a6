//! User and group lookup
//!
//! Names are resolved when the object table is loaded; the full identity
//! (home, shell, supplementary groups) is resolved in the parent right
//! before a spawn, so the child never touches the passwd database.

use std::ffi::CString;
use std::path::PathBuf;

use nix::unistd::{getgrouplist, Gid, Group, Uid, User};

/// Everything the child needs to assume a user
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
    pub name: String,
    pub home: PathBuf,
    pub shell: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("No passwd entry for uid {0}")]
    UnknownUid(u32),

    #[error("User name contains a NUL byte: {0}")]
    BadName(String),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] nix::Error),
}

/// Resolve a user name or numeric uid
pub fn resolve_user(user: &str) -> Option<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Some(uid);
    }
    User::from_name(user).ok().flatten().map(|u| u.uid.as_raw())
}

/// Resolve a group name or numeric gid
pub fn resolve_group(group: &str) -> Option<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Some(gid);
    }
    Group::from_name(group).ok().flatten().map(|g| g.gid.as_raw())
}

/// Look up the identity for `uid`. A non-zero `gid` overrides the user's
/// primary group.
pub fn lookup_identity(uid: u32, gid: u32) -> Result<Identity, IdentityError> {
    let user = User::from_uid(Uid::from_raw(uid))?.ok_or(IdentityError::UnknownUid(uid))?;

    let primary = if gid != 0 { gid } else { user.gid.as_raw() };

    let cname =
        CString::new(user.name.as_str()).map_err(|_| IdentityError::BadName(user.name.clone()))?;
    let groups = match getgrouplist(&cname, Gid::from_raw(primary)) {
        Ok(groups) => groups.into_iter().map(|g| g.as_raw()).collect(),
        Err(e) => {
            log::warn!("getgrouplist for {} failed: {}", user.name, e);
            vec![primary]
        }
    };

    Ok(Identity {
        uid,
        gid: primary,
        groups,
        name: user.name,
        home: user.dir,
        shell: user.shell,
    })
}
