use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gpasswd-sync")]
#[command(about = "Converge local group membership through gpasswd")]
pub struct Cli {
    /// Group manifest (TOML) describing the groups to manage
    #[arg(long, short, global = true)]
    pub manifest: Option<PathBuf>,

    /// Log commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Compare current and desired membership
    Status(GroupArgs),

    /// Print the commands the next apply would run
    Plan(GroupArgs),

    /// Create, modify or delete groups until they match
    Apply(GroupArgs),

    /// Create a group with its initial members
    Create(GroupArgs),

    /// Delete a group
    Delete {
        name: String,

        /// Use lgroupdel instead of groupdel
        #[arg(long)]
        forcelocal: bool,
    },

    /// Change a group's gid
    SetGid {
        name: String,

        gid: u32,

        /// Allow a gid already used by another group
        #[arg(long)]
        allowdupe: bool,

        /// Use lgroupmod instead of groupmod
        #[arg(long)]
        forcelocal: bool,
    },

    /// Check that the group tools are installed and report platform features
    Doctor,
}

/// One group described on the command line, or a filter on the manifest.
#[derive(Args, Debug, Clone, Default)]
pub struct GroupArgs {
    /// Group name (with --manifest: only this group)
    pub name: Option<String>,

    /// Desired members, comma separated; user names or uids
    #[arg(long, value_delimiter = ',')]
    pub members: Option<Vec<String>>,

    /// Replace the member list instead of only adding to it
    #[arg(long)]
    pub auth_membership: bool,

    /// Desired gid
    #[arg(long)]
    pub gid: Option<u32>,

    /// Allow a gid already used by another group
    #[arg(long)]
    pub allowdupe: bool,

    /// Create as a system group
    #[arg(long)]
    pub system: bool,

    /// Use the libuser lgroup* tools
    #[arg(long)]
    pub forcelocal: bool,
}
