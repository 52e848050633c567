//! User and group database lookups.
//!
//! Lookups go through the [`Nameservice`] trait so the reconciler never talks
//! to NSS directly. [`SystemNameservice`] is the real implementation; tests
//! provide an in-memory one.

use crate::error::{Error, Result};
use log::debug;
use nix::unistd::{Group, Uid, User};
use std::io;

/// A user account as seen by the local user database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
}

impl UserEntry {
    pub fn new(name: &str, uid: u32) -> Self {
        Self {
            name: name.to_string(),
            uid,
        }
    }
}

/// A group record as seen by the local group database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    pub fn new(name: &str, gid: u32) -> Self {
        Self {
            name: name.to_string(),
            gid,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_members(mut self, members: &[&str]) -> Self {
        self.members = members.iter().map(std::string::ToString::to_string).collect();
        self
    }

    /// Render as an /etc/group line.
    pub fn group_line(&self) -> String {
        format!("{}:x:{}:{}", self.name, self.gid, self.members.join(","))
    }
}

/// Read access to the user and group databases.
///
/// `Ok(None)` means "not found". Errors are reserved for lookups that could
/// not be answered at all.
pub trait Nameservice {
    fn user_by_uid(&self, uid: u32) -> io::Result<Option<UserEntry>>;

    fn user_by_name(&self, name: &str) -> io::Result<Option<UserEntry>>;

    fn group_by_name(&self, name: &str) -> io::Result<Option<GroupEntry>>;
}

/// NSS-backed lookups (`getpwuid_r`, `getpwnam_r`, `getgrnam_r`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNameservice;

impl Nameservice for SystemNameservice {
    fn user_by_uid(&self, uid: u32) -> io::Result<Option<UserEntry>> {
        let user = User::from_uid(Uid::from_raw(uid))?;
        Ok(user.map(|u| UserEntry::new(&u.name, u.uid.as_raw())))
    }

    fn user_by_name(&self, name: &str) -> io::Result<Option<UserEntry>> {
        let user = User::from_name(name)?;
        Ok(user.map(|u| UserEntry::new(&u.name, u.uid.as_raw())))
    }

    fn group_by_name(&self, name: &str) -> io::Result<Option<GroupEntry>> {
        let group = Group::from_name(name)?;
        Ok(group.map(|g| GroupEntry {
            name: g.name,
            gid: g.gid.as_raw(),
            members: g.mem,
        }))
    }
}

/// A member identifier that the user database could find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The identifier exactly as configured.
    pub identifier: String,
    pub name: String,
    pub uid: u32,
}

/// Parse `identifier` as a UID when it is the canonical decimal form of one.
///
/// `"1001"` is a UID; `"007"`, `"+5"` and `"-1"` are treated as names.
pub fn numeric_uid(identifier: &str) -> Option<u32> {
    identifier
        .parse::<u32>()
        .ok()
        .filter(|uid| uid.to_string() == identifier)
}

/// Look up a member identifier: numeric identifiers by UID, everything else
/// by user name. Failures of any kind mean "unresolvable".
pub fn resolve<N: Nameservice + ?Sized>(ns: &N, identifier: &str) -> Option<Resolved> {
    let lookup = match numeric_uid(identifier) {
        Some(uid) => ns.user_by_uid(uid),
        None => ns.user_by_name(identifier),
    };

    match lookup {
        Ok(Some(user)) => Some(Resolved {
            identifier: identifier.to_string(),
            name: user.name,
            uid: user.uid,
        }),
        Ok(None) => {
            debug!("Ignoring unknown user: '{identifier}'");
            None
        }
        Err(e) => {
            debug!("Ignoring unknown user: '{identifier}' ({e})");
            None
        }
    }
}

/// Keep only the identifiers that resolve, preserving order.
pub fn retain_resolvable<N: Nameservice + ?Sized>(ns: &N, identifiers: &[String]) -> Vec<String> {
    identifiers
        .iter()
        .filter_map(|id| resolve(ns, id))
        .map(|user| {
            if user.identifier != user.name {
                debug!("Member '{}' is user {} (uid {})", user.identifier, user.name, user.uid);
            }
            user.identifier
        })
        .collect()
}

/// Current members of `group`. A group that does not exist has no members.
pub fn current_members<N: Nameservice + ?Sized>(ns: &N, group: &str) -> Result<Vec<String>> {
    let entry = ns.group_by_name(group).map_err(|source| Error::Lookup {
        kind: "group",
        name: group.to_string(),
        source,
    })?;
    Ok(entry.map(|g| g.members).unwrap_or_default())
}
