//! Group manifest parser.
//!
//! A manifest is a TOML file listing the groups to manage and, optionally,
//! where the group tools live:
//!
//! ```toml
//! [paths]
//! gpasswd = "/usr/bin/gpasswd"
//!
//! [[group]]
//! name = "wheel"
//! members = ["alice", 1001]   # or "alice,1001"
//! auth_membership = true
//! gid = 10                    # or "10"
//! ```

use crate::command::PathOverrides;
use crate::error::{Error, Result};
use crate::provider::{Ensure, GroupResource};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub paths: PathOverrides,
    pub groups: Vec<GroupResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    paths: PathOverrides,
    #[serde(default, rename = "group")]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGroup {
    name: String,
    #[serde(default)]
    ensure: Ensure,
    members: Option<MemberList>,
    #[serde(default)]
    auth_membership: bool,
    #[serde(default)]
    allowdupe: bool,
    #[serde(default)]
    system: bool,
    gid: Option<Identifier>,
    #[serde(default)]
    forcelocal: bool,
}

/// A name or a number; TOML lets either appear where an id is expected.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Identifier {
    Number(u32),
    Text(String),
}

impl Identifier {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemberList {
    Joined(String),
    List(Vec<Identifier>),
}

impl MemberList {
    fn into_members(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(ToString::to_string)
                .collect(),
            Self::List(list) => list.into_iter().map(Identifier::into_string).collect(),
        }
    }
}

impl RawGroup {
    fn into_resource(self) -> Result<GroupResource> {
        let gid = match self.gid {
            None => None,
            Some(Identifier::Number(gid)) => Some(gid),
            Some(Identifier::Text(text)) => Some(text.trim().parse::<u32>().map_err(|_| {
                Error::InvalidResource(format!(
                    "gid '{text}' of group '{}' is not a number",
                    self.name
                ))
            })?),
        };

        let resource = GroupResource {
            name: self.name,
            ensure: self.ensure,
            members: self.members.map(MemberList::into_members),
            auth_membership: self.auth_membership,
            allowdupe: self.allowdupe,
            system: self.system,
            gid,
            forcelocal: self.forcelocal,
        };
        resource.validate()?;
        Ok(resource)
    }
}

impl Manifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadManifest {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest text; `origin` only labels errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let raw: RawManifest = toml::from_str(content).map_err(|source| Error::ParseManifest {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(raw.groups.len());
        for group in raw.groups {
            let resource = group.into_resource()?;
            if !seen.insert(resource.name.clone()) {
                return Err(Error::InvalidResource(format!(
                    "group '{}' is declared more than once",
                    resource.name
                )));
            }
            groups.push(resource);
        }

        Ok(Self {
            paths: raw.paths,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn parse(text: &str) -> Result<Manifest> {
        Manifest::parse(text, Path::new("test.toml"))
    }

    #[test]
    fn test_full_group() {
        let manifest = parse(
            r#"
            [[group]]
            name = "wheel"
            members = ["alice", 1001]
            auth_membership = true
            allowdupe = true
            system = true
            gid = 10
            forcelocal = true
            "#,
        )
        .unwrap();

        let wheel = &manifest.groups[0];
        assert_eq!(wheel.name, "wheel");
        assert_eq!(wheel.members, Some(vec!["alice".to_string(), "1001".to_string()]));
        assert!(wheel.auth_membership);
        assert!(wheel.allowdupe);
        assert!(wheel.system);
        assert!(wheel.forcelocal);
        assert_eq!(wheel.gid, Some(10));
        assert_eq!(wheel.ensure, Ensure::Present);
    }

    #[test]
    fn test_defaults_leave_members_unmanaged() {
        let manifest = parse("[[group]]\nname = \"audio\"\n").unwrap();
        let audio = &manifest.groups[0];
        assert!(audio.members.is_none());
        assert!(!audio.auth_membership);
        assert!(audio.gid.is_none());
    }

    #[test]
    fn test_joined_members_and_string_gid() {
        let manifest = parse(
            r#"
            [[group]]
            name = "video"
            members = "alice, bob,,carol"
            gid = "555"
            "#,
        )
        .unwrap();
        let video = &manifest.groups[0];
        assert_eq!(
            video.members,
            Some(vec!["alice".to_string(), "bob".to_string(), "carol".to_string()])
        );
        assert_eq!(video.gid, Some(555));
    }

    #[test]
    fn test_empty_member_list_is_managed() {
        let manifest = parse("[[group]]\nname = \"empty\"\nmembers = []\n").unwrap();
        assert_eq!(manifest.groups[0].members, Some(Vec::new()));
    }

    #[test]
    fn test_absent_group() {
        let manifest = parse("[[group]]\nname = \"old\"\nensure = \"absent\"\n").unwrap();
        assert_eq!(manifest.groups[0].ensure, Ensure::Absent);
    }

    #[test]
    fn test_non_numeric_gid_rejected() {
        let err = parse("[[group]]\nname = \"g\"\ngid = \"staff\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidResource(_)));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let err = parse("[[group]]\nname = \"g\"\n[[group]]\nname = \"g\"\n").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("[[group]]\nname = \"g\"\nmembrs = []\n").unwrap_err();
        assert!(matches!(err, Error::ParseManifest { .. }));
    }

    #[test]
    fn test_path_overrides() {
        let manifest = parse(
            r#"
            [paths]
            gpasswd = "/opt/bin/gpasswd"
            libuser_conf = "/etc/libuser.conf"
            "#,
        )
        .unwrap();
        assert!(manifest.groups.is_empty());
        assert_eq!(manifest.paths.gpasswd, Some(PathBuf::from("/opt/bin/gpasswd")));
        assert_eq!(manifest.paths.libuser_conf, Some(PathBuf::from("/etc/libuser.conf")));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("groups.toml");
        std::fs::write(&path, "[[group]]\nname = \"wheel\"\nmembers = [\"root\"]\n").unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.groups.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = Manifest::load(&tmp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, Error::ReadManifest { .. }));
    }
}
