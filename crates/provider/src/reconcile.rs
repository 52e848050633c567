//! Membership reconciliation.
//!
//! Decides whether a group's membership already matches what was asked for,
//! and if not, which `gpasswd` commands converge it:
//!
//! - authoritative: one `gpasswd -M a,b,c group` replaces the whole list
//! - additive: one `gpasswd -a user group` per member of desired ∪ current
//!
//! Desired identifiers that the user database cannot resolve are dropped
//! before comparing or building anything.

use crate::command::{Command, CommandPaths};
use crate::error::Result;
use crate::nameservice::{current_members, retain_resolvable, Nameservice};
use log::debug;

/// One group's membership for a single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_name: String,
    /// As configured, in configured order.
    pub desired_members: Vec<String>,
    /// As read from the group database at evaluation time.
    pub current_members: Vec<String>,
    /// Replace membership wholesale instead of only adding.
    pub authoritative: bool,
}

impl GroupMembership {
    pub fn new(
        group_name: &str,
        desired_members: Vec<String>,
        current_members: Vec<String>,
        authoritative: bool,
    ) -> Self {
        Self {
            group_name: group_name.to_string(),
            desired_members,
            current_members,
            authoritative,
        }
    }

    /// Build a membership whose current members are read from `ns` now.
    pub fn query<N: Nameservice + ?Sized>(
        ns: &N,
        group_name: &str,
        desired_members: Vec<String>,
        authoritative: bool,
    ) -> Result<Self> {
        let current = current_members(ns, group_name)?;
        Ok(Self::new(group_name, desired_members, current, authoritative))
    }
}

pub struct Reconciler<'a, N: ?Sized> {
    ns: &'a N,
    paths: &'a CommandPaths,
}

impl<'a, N: Nameservice + ?Sized> Reconciler<'a, N> {
    pub fn new(ns: &'a N, paths: &'a CommandPaths) -> Self {
        Self { ns, paths }
    }

    /// Membership as reported to the caller.
    ///
    /// In additive mode a group that already holds every desired member is
    /// reported as holding exactly the desired members; extra members are
    /// tolerated.
    pub fn current_view(&self, membership: &GroupMembership) -> Vec<String> {
        let desired = sorted_unique(retain_resolvable(self.ns, &membership.desired_members));
        substitute_if_covered(&membership.current_members, desired, membership.authoritative)
    }

    /// True when `current` needs no change to satisfy `desired`.
    pub fn compute_sync_status(&self, current: &[String], desired: &[String], authoritative: bool) -> bool {
        let filtered = retain_resolvable(self.ns, desired);
        // Nothing resolvable was asked for, so there is nothing to enforce.
        if authoritative && filtered.is_empty() && !desired.is_empty() {
            return true;
        }
        let desired = sorted_unique(filtered);
        let current = substitute_if_covered(current, desired.clone(), authoritative);
        current == desired
    }

    pub fn is_in_sync(&self, membership: &GroupMembership) -> bool {
        self.compute_sync_status(
            &membership.current_members,
            &membership.desired_members,
            membership.authoritative,
        )
    }

    /// Commands converging `current` to `desired`, regardless of sync status.
    pub fn build_command_sequence(
        &self,
        group_name: &str,
        current: &[String],
        desired: &[String],
        authoritative: bool,
    ) -> Vec<Command> {
        let resolvable = retain_resolvable(self.ns, desired);

        if authoritative {
            // An empty list only wipes the group when that was asked for.
            if resolvable.is_empty() && !desired.is_empty() {
                debug!("No resolvable members for {group_name}, leaving membership alone");
                return Vec::new();
            }
            let members = union_in_order(&resolvable, &[]);
            return vec![self.paths.set_members(&members, group_name)];
        }

        union_in_order(&resolvable, current)
            .iter()
            .map(|user| self.paths.add_member(user, group_name))
            .collect()
    }

    pub fn commands(&self, membership: &GroupMembership) -> Vec<Command> {
        self.build_command_sequence(
            &membership.group_name,
            &membership.current_members,
            &membership.desired_members,
            membership.authoritative,
        )
    }

    /// Commands for this pass: nothing when already in sync.
    pub fn plan(&self, membership: &GroupMembership) -> Vec<Command> {
        if self.is_in_sync(membership) {
            debug!("{} membership in sync", membership.group_name);
            return Vec::new();
        }
        self.commands(membership)
    }
}

fn sorted_unique(mut members: Vec<String>) -> Vec<String> {
    members.sort();
    members.dedup();
    members
}

/// `desired` when additive mode already covers it, else sorted `current`.
fn substitute_if_covered(current: &[String], desired: Vec<String>, authoritative: bool) -> Vec<String> {
    if !authoritative && desired.iter().all(|m| current.contains(m)) {
        return desired;
    }
    sorted_unique(current.to_vec())
}

/// `first` followed by entries of `second` not already present, without
/// duplicates.
fn union_in_order(first: &[String], second: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for member in first.iter().chain(second) {
        if !out.contains(member) {
            out.push(member.clone());
        }
    }
    out
}
