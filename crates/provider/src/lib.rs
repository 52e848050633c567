//! # gpasswd provider
//!
//! Group membership management through `gpasswd` instead of rewriting
//! `/etc/group` directly.
//!
//! The stock group tools validate every member against the local user
//! database and fail when a member only exists in a remote directory
//! (LDAP, NIS). This crate adds members one at a time with `gpasswd -a`, or
//! replaces the whole list with `gpasswd -M`, and drops identifiers the local
//! system cannot resolve before any command is built.
//!
//! ## Layout
//!
//! - [`nameservice`]: user and group lookups (`getpwnam`, `getpwuid`, `getgrnam`)
//! - [`reconcile`]: membership comparison and command planning
//! - [`command`]: external command values and their binary paths
//! - [`executor`]: running commands, non-fatally or checked
//! - [`provider`]: create/modify/delete and a full apply pass for one group
//! - [`manifest`]: TOML description of desired groups
//!
//! ## Usage
//!
//! ```ignore
//! use gpasswd_provider::{CommandPaths, GroupResource, Provider};
//!
//! let provider = Provider::system(CommandPaths::discover());
//! let wheel = GroupResource::new("wheel").members(["alice", "bob"]);
//! let report = provider.apply(&wheel)?;
//! ```

pub mod command;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod nameservice;
pub mod provider;
pub mod reconcile;

pub use command::{Command, CommandPaths};
pub use error::{Error, Result};
pub use executor::{CommandOutput, Executor, Runner, SystemRunner};
pub use manifest::Manifest;
pub use nameservice::{resolve, GroupEntry, Nameservice, Resolved, SystemNameservice, UserEntry};
pub use provider::{ApplyReport, Change, Ensure, Features, GroupResource, ModifyAttribute, Provider};
pub use reconcile::{GroupMembership, Reconciler};
