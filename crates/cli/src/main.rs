//! # gpasswd-sync
//!
//! Converge local group membership through `gpasswd`, for groups whose
//! members may only exist in a remote directory.
//!
//! ## Usage
//!
//! ```bash
//! gpasswd-sync status wheel --members alice,bob     # in sync?
//! gpasswd-sync plan wheel --members alice,bob --auth-membership
//! gpasswd-sync apply --manifest groups.toml         # converge every group
//! gpasswd-sync doctor                               # tool paths and features
//! ```

mod cli;
mod doctor;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Cmd, GroupArgs};
use gpasswd_provider::{
    CommandPaths, Ensure, Executor, Features, GroupResource, Manifest, ModifyAttribute, Provider,
    SystemNameservice,
};
use log::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manifest = cli
        .manifest
        .as_deref()
        .map(Manifest::load)
        .transpose()
        .context("Failed to load manifest")?;
    if let (Some(path), Some(manifest)) = (&cli.manifest, &manifest) {
        debug!("Loaded {} groups from {}", manifest.groups.len(), path.display());
    }

    let provider = build_provider(CommandPaths::discover(), manifest.as_ref(), cli.dry_run);

    match cli.cmd {
        Cmd::Status(args) => status(&provider, &select(manifest.as_ref(), &args)?),
        Cmd::Plan(args) => plan(&provider, &select(manifest.as_ref(), &args)?),
        Cmd::Apply(args) => apply(&provider, &select(manifest.as_ref(), &args)?),
        Cmd::Create(args) => {
            for resource in select(manifest.as_ref(), &args)? {
                if provider.exists(&resource)? {
                    bail!("Group {} already exists", resource.name);
                }
                provider.create(&resource)?;
                println!("✓ {}: created", resource.name);
            }
            Ok(())
        }
        Cmd::Delete { name, forcelocal } => {
            let resource = GroupResource::new(&name).forcelocal(forcelocal);
            if !provider.exists(&resource)? {
                bail!("Group {name} does not exist");
            }
            provider.delete(&resource)?;
            println!("✓ {name}: deleted");
            Ok(())
        }
        Cmd::SetGid {
            name,
            gid,
            allowdupe,
            forcelocal,
        } => {
            let resource = GroupResource::new(&name)
                .allowdupe(allowdupe)
                .forcelocal(forcelocal);
            resource.validate()?;
            provider.set_gid(&resource, gid)?;
            println!("✓ {name}: gid set to {gid}");
            Ok(())
        }
        Cmd::Doctor => doctor::run(&provider),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn build_provider(discovered: CommandPaths, manifest: Option<&Manifest>, dry_run: bool) -> Provider {
    let paths = match manifest {
        Some(manifest) => discovered.with_overrides(&manifest.paths),
        None => discovered,
    };
    debug!("Command paths: {paths:?}");
    let features = Features::detect(&paths);
    debug!("Features: {features:?}");
    if dry_run {
        info!("Dry run: commands are logged, not executed");
    }

    Provider::new(SystemNameservice, paths, Executor::system().dry_run(dry_run))
        .with_features(features)
}

/// Groups to act on: the manifest's (optionally narrowed to one name), or the
/// single group described by the flags.
fn select(manifest: Option<&Manifest>, args: &GroupArgs) -> Result<Vec<GroupResource>> {
    if let Some(manifest) = manifest {
        if args.members.is_some()
            || args.gid.is_some()
            || args.auth_membership
            || args.allowdupe
            || args.system
            || args.forcelocal
        {
            bail!("Group flags cannot be combined with --manifest; only a group name may narrow it");
        }
        let groups: Vec<_> = manifest
            .groups
            .iter()
            .filter(|g| args.name.as_ref().map_or(true, |name| &g.name == name))
            .cloned()
            .collect();
        if groups.is_empty() {
            match &args.name {
                Some(name) => bail!("Group {name} is not in the manifest"),
                None => bail!("Manifest declares no groups"),
            }
        }
        return Ok(groups);
    }

    let Some(name) = &args.name else {
        bail!("A group name is required without --manifest");
    };
    let mut resource = GroupResource::new(name)
        .auth_membership(args.auth_membership)
        .allowdupe(args.allowdupe)
        .system(args.system)
        .forcelocal(args.forcelocal);
    if let Some(members) = &args.members {
        resource = resource.members(members.iter().filter(|m| !m.is_empty()).cloned());
    }
    if let Some(gid) = args.gid {
        resource = resource.gid(gid);
    }
    resource.validate()?;
    Ok(vec![resource])
}

fn status(provider: &Provider, resources: &[GroupResource]) -> Result<()> {
    let mut out_of_sync = 0;

    for resource in resources {
        let Some(entry) = provider.lookup(&resource.name)? else {
            println!("✗ {}: missing", resource.name);
            out_of_sync += 1;
            continue;
        };
        println!("{}", entry.group_line());

        let gid_ok = resource.gid.map_or(true, |gid| gid == entry.gid);
        if !gid_ok {
            println!("  gid: {} (want {})", entry.gid, resource.gid.unwrap_or_default());
        }

        let members_ok = provider.members_insync(resource)?;
        if let (Some(desired), Some(view)) = (&resource.members, provider.members(resource)?) {
            let mode = if resource.auth_membership { "authoritative" } else { "additive" };
            println!("  desired: {} ({mode})", desired.join(","));
            println!("  current: {}", view.join(","));
        }

        if gid_ok && members_ok {
            println!("  ✓ in sync");
        } else {
            println!("  ✗ out of sync");
            out_of_sync += 1;
        }
    }

    if out_of_sync > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn plan(provider: &Provider, resources: &[GroupResource]) -> Result<()> {
    for resource in resources {
        println!("━━━ {} ━━━", resource.name);
        let entry = provider.lookup(&resource.name)?;

        let mut cmds = Vec::new();
        match (resource.ensure, entry) {
            (Ensure::Absent, Some(_)) => {
                cmds.push(provider.build_delete_command(resource));
            }
            (Ensure::Absent, None) => {}
            (Ensure::Present, None) => {
                cmds.extend(provider.create_sequence(resource));
            }
            (Ensure::Present, Some(entry)) => {
                if let Some(gid) = resource.gid.filter(|gid| *gid != entry.gid) {
                    cmds.push(provider.build_modify_command(resource, &ModifyAttribute::Gid(gid)));
                }
                cmds.extend(provider.plan_members(resource)?);
            }
        }

        if cmds.is_empty() {
            println!("  (nothing to do)");
        }
        for cmd in cmds {
            println!("  {cmd}");
        }
    }
    Ok(())
}

fn apply(provider: &Provider, resources: &[GroupResource]) -> Result<()> {
    let mut failed = Vec::new();

    for resource in resources {
        match provider.apply(resource) {
            Ok(report) if report.is_changed() => {
                for change in &report.changes {
                    println!("✓ {}: {change}", report.group);
                }
            }
            Ok(report) => println!("  {}: unchanged", report.group),
            Err(e) => {
                println!("✗ {}: {e:#}", resource.name);
                failed.push(resource.name.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{}/{} groups failed: {}", failed.len(), resources.len(), failed.join(", "));
    }
    Ok(())
}
