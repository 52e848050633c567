use anyhow::{bail, Result};
use gpasswd_provider::Provider;

/// Tools every pass may need; the libuser ones only matter with forcelocal.
const REQUIRED: [&str; 5] = ["groupadd", "groupdel", "groupmod", "gpasswd", "true"];

pub fn run(provider: &Provider) -> Result<()> {
    let mut ok = true;

    for (tool, path) in provider.paths().entries() {
        let required = REQUIRED.contains(&tool);
        if path.is_file() {
            eprintln!("[OK] {tool}: {}", path.display());
        } else if required {
            eprintln!("[FAIL] missing `{tool}` (looked for {})", path.display());
            ok = false;
        } else {
            eprintln!("[--] optional `{tool}` not found ({})", path.display());
        }
    }

    if let Some(conf) = &provider.paths().libuser_conf {
        if conf.is_file() {
            eprintln!("[OK] LIBUSER_CONF={}", conf.display());
        } else {
            eprintln!("[FAIL] libuser config not found: {}", conf.display());
            ok = false;
        }
    }

    let features = provider.features();
    eprintln!();
    eprintln!("manages_members: {}", features.manages_members);
    eprintln!("system_groups:   {}", features.system_groups);
    eprintln!("libuser:         {}", features.libuser);

    if !ok {
        bail!("doctor checks failed");
    }
    Ok(())
}
