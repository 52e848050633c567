//! The gpasswd group provider.
//!
//! Group creation, deletion and gid changes go through the shadow-utils tools
//! (`groupadd`, `groupdel`, `groupmod`, or their libuser `lgroup*` variants
//! with `forcelocal`). Membership never does: it is only ever changed with
//! `gpasswd -a` and `gpasswd -M`.

use crate::command::{Command, CommandPaths};
use crate::error::{Error, Result};
use crate::executor::{Executor, Runner, SystemRunner};
use crate::nameservice::{retain_resolvable, GroupEntry, Nameservice, SystemNameservice};
use crate::reconcile::{GroupMembership, Reconciler};
use log::info;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Desired state of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResource {
    pub name: String,
    pub ensure: Ensure,
    /// `None` leaves membership unmanaged.
    pub members: Option<Vec<String>>,
    /// Replace the member list instead of only adding to it.
    pub auth_membership: bool,
    /// Permit a gid already used by another group.
    pub allowdupe: bool,
    /// Create as a system group.
    pub system: bool,
    pub gid: Option<u32>,
    /// Use the libuser tools, which only touch local files.
    pub forcelocal: bool,
}

impl GroupResource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ensure: Ensure::Present,
            members: None,
            auth_membership: false,
            allowdupe: false,
            system: false,
            gid: None,
            forcelocal: false,
        }
    }

    #[must_use]
    pub fn ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = ensure;
        self
    }

    #[must_use]
    pub fn members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = Some(members.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn auth_membership(mut self, auth: bool) -> Self {
        self.auth_membership = auth;
        self
    }

    #[must_use]
    pub fn allowdupe(mut self, allowdupe: bool) -> Self {
        self.allowdupe = allowdupe;
        self
    }

    #[must_use]
    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    #[must_use]
    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    #[must_use]
    pub fn forcelocal(mut self, forcelocal: bool) -> Self {
        self.forcelocal = forcelocal;
        self
    }

    /// Reject names the group tools would misread or refuse.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidResource("group name is empty".into()));
        }
        if self.name.starts_with('-') {
            return Err(Error::InvalidResource(format!(
                "group name '{}' starts with '-'",
                self.name
            )));
        }
        if self.name.contains([':', ',']) || self.name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidResource(format!(
                "group name '{}' contains ':', ',' or whitespace",
                self.name
            )));
        }
        if let Some(members) = &self.members {
            if let Some(bad) = members.iter().find(|m| m.is_empty() || m.contains(',')) {
                return Err(Error::InvalidResource(format!(
                    "member '{bad}' of group '{}' is empty or contains ','",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Platform capabilities relevant to group management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub manages_members: bool,
    /// `groupadd -r` is understood.
    pub system_groups: bool,
    /// The libuser `lgroup*` tools are installed.
    pub libuser: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            manages_members: true,
            system_groups: true,
            libuser: false,
        }
    }
}

impl Features {
    pub fn detect(paths: &CommandPaths) -> Self {
        let shadow_utils = !matches!(std::env::consts::OS, "solaris" | "illumos");
        Self {
            manages_members: shadow_utils,
            system_groups: shadow_utils,
            libuser: paths.lgroupadd.is_file(),
        }
    }
}

/// An attribute change requested through the generic modify path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyAttribute {
    Gid(u32),
    /// Generic member modification. Always answered with a no-op: membership
    /// only changes through `gpasswd`.
    Members(Vec<String>),
}

/// Something `apply` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created,
    Deleted,
    GidChanged { from: u32, to: u32 },
    /// Rendered membership commands that were run.
    MembersChanged { commands: Vec<String> },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Deleted => write!(f, "deleted"),
            Self::GidChanged { from, to } => write!(f, "gid changed from {from} to {to}"),
            Self::MembersChanged { commands } => {
                write!(f, "membership changed ({} commands)", commands.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub group: String,
    pub changes: Vec<Change>,
}

impl ApplyReport {
    fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            changes: Vec::new(),
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

pub struct Provider<N = SystemNameservice, R = SystemRunner> {
    ns: N,
    paths: CommandPaths,
    features: Features,
    executor: Executor<R>,
}

impl Provider {
    /// A provider backed by NSS and real child processes.
    pub fn system(paths: CommandPaths) -> Self {
        let features = Features::detect(&paths);
        Self::new(SystemNameservice, paths, Executor::system()).with_features(features)
    }
}

impl<N: Nameservice, R: Runner> Provider<N, R> {
    pub fn new(ns: N, paths: CommandPaths, executor: Executor<R>) -> Self {
        Self {
            ns,
            paths,
            features: Features::default(),
            executor,
        }
    }

    #[must_use]
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn paths(&self) -> &CommandPaths {
        &self.paths
    }

    pub fn executor(&self) -> &Executor<R> {
        &self.executor
    }

    pub fn nameservice(&self) -> &N {
        &self.ns
    }

    pub fn reconciler(&self) -> Reconciler<'_, N> {
        Reconciler::new(&self.ns, &self.paths)
    }

    pub fn lookup(&self, name: &str) -> Result<Option<GroupEntry>> {
        self.ns.group_by_name(name).map_err(|source| Error::Lookup {
            kind: "group",
            name: name.to_string(),
            source,
        })
    }

    pub fn exists(&self, resource: &GroupResource) -> Result<bool> {
        Ok(self.lookup(&resource.name)?.is_some())
    }

    /// The bare `groupadd`/`lgroupadd` invocation, without members.
    pub fn addcmd(&self, resource: &GroupResource) -> Command {
        let mut cmd = if resource.forcelocal {
            Command::new(&self.paths.lgroupadd)
        } else {
            Command::new(&self.paths.groupadd)
        };
        if let Some(gid) = resource.gid {
            cmd = cmd.args(["-g".to_string(), gid.to_string()]);
        }
        // libuser has no notion of duplicate gids
        if resource.allowdupe && !resource.forcelocal {
            cmd = cmd.arg("-o");
        }
        if resource.system && self.features.system_groups {
            cmd = cmd.arg("-r");
        }
        cmd = cmd.arg(resource.name.as_str());

        if resource.forcelocal {
            self.paths.libuser(cmd)
        } else {
            cmd
        }
    }

    /// Everything creation runs: the group itself, then one `gpasswd -a`
    /// per resolvable initial member.
    pub fn create_sequence(&self, resource: &GroupResource) -> Vec<Command> {
        let mut cmds = vec![self.addcmd(resource)];
        if let Some(members) = &resource.members {
            cmds.extend(
                retain_resolvable(&self.ns, members)
                    .iter()
                    .map(|m| self.paths.add_member(m, &resource.name)),
            );
        }
        cmds
    }

    /// Runs the creation sequence non-fatally and hands back the placeholder
    /// no-op for callers that always execute the returned command.
    pub fn build_create_command(&self, resource: &GroupResource) -> Command {
        self.executor
            .execute_sequence(&resource.name, &self.create_sequence(resource));
        self.paths.noop()
    }

    /// forcelocal is only honored where the libuser tools exist.
    fn check_forcelocal(&self, resource: &GroupResource) -> Result<()> {
        if resource.forcelocal && !self.features.libuser {
            return Err(Error::InvalidResource(format!(
                "group '{}' uses forcelocal, but the libuser tools are not installed",
                resource.name
            )));
        }
        Ok(())
    }

    pub fn create(&self, resource: &GroupResource) -> Result<()> {
        resource.validate()?;
        self.check_forcelocal(resource)?;
        let placeholder = self.build_create_command(resource);
        self.executor.run_checked(&placeholder)?;
        info!("Created group {}", resource.name);
        Ok(())
    }

    pub fn build_modify_command(&self, resource: &GroupResource, attribute: &ModifyAttribute) -> Command {
        match attribute {
            ModifyAttribute::Gid(gid) => {
                if resource.forcelocal {
                    let cmd = Command::new(&self.paths.lgroupmod).args([
                        "-g".to_string(),
                        gid.to_string(),
                        resource.name.clone(),
                    ]);
                    return self.paths.libuser(cmd);
                }
                let mut cmd =
                    Command::new(&self.paths.groupmod).args(["-g".to_string(), gid.to_string()]);
                if resource.allowdupe {
                    cmd = cmd.arg("-o");
                }
                cmd.arg(resource.name.as_str())
            }
            ModifyAttribute::Members(_) => self.paths.noop(),
        }
    }

    pub fn set_gid(&self, resource: &GroupResource, gid: u32) -> Result<()> {
        self.check_forcelocal(resource)?;
        let cmd = self.build_modify_command(resource, &ModifyAttribute::Gid(gid));
        self.executor.run_checked(&cmd)?;
        Ok(())
    }

    pub fn build_delete_command(&self, resource: &GroupResource) -> Command {
        if resource.forcelocal {
            self.paths
                .libuser(Command::new(&self.paths.lgroupdel).arg(resource.name.as_str()))
        } else {
            Command::new(&self.paths.groupdel).arg(resource.name.as_str())
        }
    }

    pub fn delete(&self, resource: &GroupResource) -> Result<()> {
        resource.validate()?;
        self.check_forcelocal(resource)?;
        self.executor.run_checked(&self.build_delete_command(resource))?;
        info!("Deleted group {}", resource.name);
        Ok(())
    }

    /// This pass's membership, with current members read now. `None` when
    /// the resource does not manage members.
    pub fn membership(&self, resource: &GroupResource) -> Result<Option<GroupMembership>> {
        let Some(desired) = &resource.members else {
            return Ok(None);
        };
        GroupMembership::query(
            &self.ns,
            &resource.name,
            desired.clone(),
            resource.auth_membership,
        )
        .map(Some)
    }

    /// Membership as the provider reports it.
    pub fn members(&self, resource: &GroupResource) -> Result<Option<Vec<String>>> {
        Ok(self
            .membership(resource)?
            .map(|m| self.reconciler().current_view(&m)))
    }

    pub fn members_insync(&self, resource: &GroupResource) -> Result<bool> {
        Ok(self
            .membership(resource)?
            .map_or(true, |m| self.reconciler().is_in_sync(&m)))
    }

    /// Commands the next membership sync would run.
    pub fn plan_members(&self, resource: &GroupResource) -> Result<Vec<Command>> {
        Ok(self
            .membership(resource)?
            .map(|m| self.reconciler().plan(&m))
            .unwrap_or_default())
    }

    /// Converge membership. Command failures are warnings, never errors.
    pub fn sync_members(&self, resource: &GroupResource) -> Result<Vec<Command>> {
        let plan = self.plan_members(resource)?;
        if !plan.is_empty() {
            self.executor.execute_sequence(&resource.name, &plan);
        }
        Ok(plan)
    }

    /// One full pass for `resource`.
    pub fn apply(&self, resource: &GroupResource) -> Result<ApplyReport> {
        resource.validate()?;
        if resource.members.is_some() && !self.features.manages_members {
            return Err(Error::InvalidResource(format!(
                "group '{}' manages members, which this platform does not support",
                resource.name
            )));
        }
        self.check_forcelocal(resource)?;

        let mut report = ApplyReport::new(&resource.name);
        match (resource.ensure, self.lookup(&resource.name)?) {
            (Ensure::Absent, Some(_)) => {
                self.delete(resource)?;
                report.changes.push(Change::Deleted);
            }
            (Ensure::Absent, None) => {}
            (Ensure::Present, None) => {
                self.create(resource)?;
                report.changes.push(Change::Created);
            }
            (Ensure::Present, Some(entry)) => {
                if let Some(gid) = resource.gid.filter(|gid| *gid != entry.gid) {
                    self.set_gid(resource, gid)?;
                    info!("Changed gid of {} from {} to {gid}", resource.name, entry.gid);
                    report.changes.push(Change::GidChanged {
                        from: entry.gid,
                        to: gid,
                    });
                }

                let ran = self.sync_members(resource)?;
                if !ran.is_empty() {
                    info!("Synchronized members of {}", resource.name);
                    report.changes.push(Change::MembersChanged {
                        commands: ran.iter().map(ToString::to_string).collect(),
                    });
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(GroupResource::new("").validate().is_err());
        assert!(GroupResource::new("-o").validate().is_err());
        assert!(GroupResource::new("a:b").validate().is_err());
        assert!(GroupResource::new("a b").validate().is_err());
        assert!(GroupResource::new("wheel").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_members() {
        let resource = GroupResource::new("wheel").members(["alice", "bob,carol"]);
        assert!(matches!(resource.validate(), Err(Error::InvalidResource(_))));
        let resource = GroupResource::new("wheel").members([""]);
        assert!(resource.validate().is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let resource = GroupResource::new("wheel");
        assert_eq!(resource.ensure, Ensure::Present);
        assert!(resource.members.is_none());
        assert!(!resource.auth_membership);
        assert!(!resource.allowdupe);
        assert!(!resource.system);
        assert!(!resource.forcelocal);
        assert!(resource.gid.is_none());
    }

    #[test]
    fn test_change_display() {
        assert_eq!(Change::GidChanged { from: 10, to: 20 }.to_string(), "gid changed from 10 to 20");
        let change = Change::MembersChanged {
            commands: vec!["a".into(), "b".into()],
        };
        assert_eq!(change.to_string(), "membership changed (2 commands)");
    }

    #[test]
    fn test_features_detect_libuser_from_path() {
        let paths = CommandPaths {
            lgroupadd: "/nonexistent/lgroupadd".into(),
            ..CommandPaths::default()
        };
        assert!(!Features::detect(&paths).libuser);
    }
}
