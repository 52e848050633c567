//! In-memory system for provider tests.
//!
//! `FakeSystem` holds a user table and a group table. Its nameservice answers
//! lookups from those tables and its runner applies `groupadd`, `groupmod`,
//! `groupdel` and `gpasswd` invocations to the group table, so a test can run
//! a pass and then look at the resulting state.

#![allow(dead_code)]

use gpasswd_provider::{
    Command, CommandOutput, CommandPaths, Executor, GroupEntry, Nameservice, Provider, Runner,
    UserEntry,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::rc::Rc;

#[derive(Default)]
struct State {
    users: Vec<UserEntry>,
    groups: BTreeMap<String, GroupEntry>,
    /// Users whose `gpasswd -a` exits nonzero even though they resolve.
    rejected: HashSet<String>,
    log: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeSystem {
    state: Rc<RefCell<State>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users named `name`, with uids counting up from 1000.
    pub fn with_users(self, names: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for name in names {
                let uid = 1000 + u32::try_from(state.users.len()).unwrap_or(0);
                state.users.push(UserEntry::new(name, uid));
            }
        }
        self
    }

    pub fn with_group(self, name: &str, gid: u32, members: &[&str]) -> Self {
        self.state
            .borrow_mut()
            .groups
            .insert(name.to_string(), GroupEntry::new(name, gid).with_members(members));
        self
    }

    /// Make `gpasswd -a <user>` fail for this user.
    pub fn rejecting(self, user: &str) -> Self {
        self.state.borrow_mut().rejected.insert(user.to_string());
        self
    }

    pub fn group(&self, name: &str) -> Option<GroupEntry> {
        self.state.borrow().groups.get(name).cloned()
    }

    pub fn members(&self, name: &str) -> Vec<String> {
        self.group(name).map(|g| g.members).unwrap_or_default()
    }

    /// Every command the runner has seen, rendered.
    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    pub fn provider(&self) -> Provider<FakeSystem, FakeSystem> {
        Provider::new(self.clone(), CommandPaths::default(), Executor::new(self.clone()))
    }

    pub fn dry_run_provider(&self) -> Provider<FakeSystem, FakeSystem> {
        Provider::new(
            self.clone(),
            CommandPaths::default(),
            Executor::new(self.clone()).dry_run(true),
        )
    }

    fn knows_user(&self, name: &str) -> bool {
        self.state.borrow().users.iter().any(|u| u.name == name)
    }

    fn apply(&self, program: &str, args: &[String]) -> (i32, String) {
        let mut state = self.state.borrow_mut();
        match program {
            "true" => (0, String::new()),
            "groupadd" | "lgroupadd" => {
                let name = args.last().cloned().unwrap_or_default();
                if state.groups.contains_key(&name) {
                    return (9, format!("groupadd: group '{name}' already exists"));
                }
                let gid = flag_value(args, "-g").unwrap_or(2000);
                state.groups.insert(name.clone(), GroupEntry::new(&name, gid));
                (0, String::new())
            }
            "groupmod" | "lgroupmod" => {
                let name = args.last().cloned().unwrap_or_default();
                let gid = flag_value(args, "-g");
                match (state.groups.get_mut(&name), gid) {
                    (Some(group), Some(gid)) => {
                        group.gid = gid;
                        (0, String::new())
                    }
                    _ => (6, format!("groupmod: group '{name}' does not exist")),
                }
            }
            "groupdel" | "lgroupdel" => {
                let name = args.last().cloned().unwrap_or_default();
                if state.groups.remove(&name).is_some() {
                    (0, String::new())
                } else {
                    (6, format!("groupdel: group '{name}' does not exist"))
                }
            }
            "gpasswd" => gpasswd(&mut state, args),
            other => (127, format!("{other}: command not found")),
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<u32> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn gpasswd(state: &mut State, args: &[String]) -> (i32, String) {
    let [mode, operand, group] = args else {
        return (2, "Usage: gpasswd [option] GROUP".into());
    };
    let known: Vec<String> = state.users.iter().map(|u| u.name.clone()).collect();
    let rejected = state.rejected.contains(operand);
    let Some(entry) = state.groups.get_mut(group) else {
        return (3, format!("gpasswd: group '{group}' does not exist"));
    };

    match mode.as_str() {
        "-a" => {
            if rejected || !known.contains(operand) {
                return (3, format!("gpasswd: user '{operand}' does not exist"));
            }
            if !entry.members.contains(operand) {
                entry.members.push(operand.clone());
            }
            (0, format!("Adding user {operand} to group {group}"))
        }
        "-M" => {
            entry.members = operand
                .split(',')
                .filter(|m| !m.is_empty())
                .map(ToString::to_string)
                .collect();
            (0, String::new())
        }
        _ => (2, format!("gpasswd: invalid option -- '{mode}'")),
    }
}

impl Nameservice for FakeSystem {
    fn user_by_uid(&self, uid: u32) -> io::Result<Option<UserEntry>> {
        Ok(self.state.borrow().users.iter().find(|u| u.uid == uid).cloned())
    }

    fn user_by_name(&self, name: &str) -> io::Result<Option<UserEntry>> {
        Ok(self.state.borrow().users.iter().find(|u| u.name == name).cloned())
    }

    fn group_by_name(&self, name: &str) -> io::Result<Option<GroupEntry>> {
        Ok(self.group(name))
    }
}

impl Runner for FakeSystem {
    fn run(&self, command: &Command) -> io::Result<CommandOutput> {
        self.state.borrow_mut().log.push(command.to_string());

        let program = command
            .program()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (status, output) = self.apply(&program, command.get_args());
        Ok(CommandOutput {
            status: Some(status),
            output,
        })
    }
}

/// `["a", "b"]` as owned strings.
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Does the fake know this user? Exposed for assertions about filtering.
pub fn resolvable(system: &FakeSystem, name: &str) -> bool {
    system.knows_user(name)
}
