//! External commands and the binaries they invoke.
//!
//! A [`Command`] is a plain value: program, argument vector and extra
//! environment. Arguments are handed to the program directly, never through a
//! shell, so member names cannot inject anything. [`Command`]'s `Display`
//! renders a shell-quoted line for logs only.

use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable pointing libuser tools at their configuration.
pub const LIBUSER_CONF_ENV: &str = "LIBUSER_CONF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Build the `std::process::Command` that runs this command.
    pub fn to_process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, shell_quote(value))?;
        }
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./,:=@%+".contains(c));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// Location of every external binary the provider runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPaths {
    pub groupadd: PathBuf,
    pub groupdel: PathBuf,
    pub groupmod: PathBuf,
    pub gpasswd: PathBuf,
    pub lgroupadd: PathBuf,
    pub lgroupdel: PathBuf,
    pub lgroupmod: PathBuf,
    /// Placeholder returned where a caller insists on running something.
    pub noop: PathBuf,
    /// Exported as `LIBUSER_CONF` to the `lgroup*` tools when set.
    pub libuser_conf: Option<PathBuf>,
}

impl Default for CommandPaths {
    fn default() -> Self {
        Self {
            groupadd: PathBuf::from("/usr/sbin/groupadd"),
            groupdel: PathBuf::from("/usr/sbin/groupdel"),
            groupmod: PathBuf::from("/usr/sbin/groupmod"),
            gpasswd: PathBuf::from("/usr/bin/gpasswd"),
            lgroupadd: PathBuf::from("/usr/sbin/lgroupadd"),
            lgroupdel: PathBuf::from("/usr/sbin/lgroupdel"),
            lgroupmod: PathBuf::from("/usr/sbin/lgroupmod"),
            noop: PathBuf::from("/bin/true"),
            libuser_conf: None,
        }
    }
}

/// Optional per-binary overrides, as read from a manifest's `[paths]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathOverrides {
    pub groupadd: Option<PathBuf>,
    pub groupdel: Option<PathBuf>,
    pub groupmod: Option<PathBuf>,
    pub gpasswd: Option<PathBuf>,
    pub lgroupadd: Option<PathBuf>,
    pub lgroupdel: Option<PathBuf>,
    pub lgroupmod: Option<PathBuf>,
    pub noop: Option<PathBuf>,
    pub libuser_conf: Option<PathBuf>,
}

impl CommandPaths {
    /// Locate each binary on `PATH`, falling back to its conventional location.
    pub fn discover() -> Self {
        let fallback = Self::default();
        let find = |name: &str, default: PathBuf| which::which(name).unwrap_or(default);
        Self {
            groupadd: find("groupadd", fallback.groupadd),
            groupdel: find("groupdel", fallback.groupdel),
            groupmod: find("groupmod", fallback.groupmod),
            gpasswd: find("gpasswd", fallback.gpasswd),
            lgroupadd: find("lgroupadd", fallback.lgroupadd),
            lgroupdel: find("lgroupdel", fallback.lgroupdel),
            lgroupmod: find("lgroupmod", fallback.lgroupmod),
            noop: find("true", fallback.noop),
            libuser_conf: None,
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: &PathOverrides) -> Self {
        let apply = |slot: &mut PathBuf, value: &Option<PathBuf>| {
            if let Some(path) = value {
                slot.clone_from(path);
            }
        };
        apply(&mut self.groupadd, &overrides.groupadd);
        apply(&mut self.groupdel, &overrides.groupdel);
        apply(&mut self.groupmod, &overrides.groupmod);
        apply(&mut self.gpasswd, &overrides.gpasswd);
        apply(&mut self.lgroupadd, &overrides.lgroupadd);
        apply(&mut self.lgroupdel, &overrides.lgroupdel);
        apply(&mut self.lgroupmod, &overrides.lgroupmod);
        apply(&mut self.noop, &overrides.noop);
        if overrides.libuser_conf.is_some() {
            self.libuser_conf.clone_from(&overrides.libuser_conf);
        }
        self
    }

    /// Every configured binary, by tool name.
    pub fn entries(&self) -> [(&'static str, &Path); 8] {
        [
            ("groupadd", &self.groupadd),
            ("groupdel", &self.groupdel),
            ("groupmod", &self.groupmod),
            ("gpasswd", &self.gpasswd),
            ("lgroupadd", &self.lgroupadd),
            ("lgroupdel", &self.lgroupdel),
            ("lgroupmod", &self.lgroupmod),
            ("true", &self.noop),
        ]
    }

    /// `gpasswd -a <user> <group>`
    pub fn add_member(&self, user: &str, group: &str) -> Command {
        Command::new(&self.gpasswd).args(["-a", user, group])
    }

    /// `gpasswd -M <a,b,c> <group>`
    pub fn set_members(&self, members: &[String], group: &str) -> Command {
        Command::new(&self.gpasswd).args(["-M", members.join(",").as_str(), group])
    }

    pub fn noop(&self) -> Command {
        Command::new(&self.noop)
    }

    /// Attach `LIBUSER_CONF` when one is configured.
    pub(crate) fn libuser(&self, cmd: Command) -> Command {
        match &self.libuser_conf {
            Some(conf) => cmd.env(LIBUSER_CONF_ENV, conf.to_string_lossy()),
            None => cmd,
        }
    }
}
