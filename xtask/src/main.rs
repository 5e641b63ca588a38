//! Development tasks for uniforge
//!
//! Usage:
//!   cargo xtask install     Install release binary and uinput udev rule (requires sudo)
//!   cargo xtask uninstall   Remove binary and udev rule (requires sudo)
//!   cargo xtask dist        Build release binary and man pages for distribution

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const BINARY_TARGET: &str = "/usr/local/bin/uniforge";
const UDEV_RULE_TARGET: &str = "/etc/udev/rules.d/70-uniforge-uinput.rules";

/// Lets members of the input group create the replay keyboard
const UDEV_RULE: &str = "KERNEL==\"uinput\", GROUP=\"input\", MODE=\"0660\", OPTIONS+=\"static_node=uinput\"\n";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    let skip_udev = args.iter().any(|a| a == "--no-udev");

    let result = match command.as_str() {
        "install" => install(skip_udev),
        "uninstall" => uninstall(),
        "dist" => dist(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
uniforge development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary, install to /usr/local/bin and add the uinput udev rule
  uninstall  Remove the binary and the udev rule
  dist       Build release binary and man pages for distribution

Options:
  --no-udev  (install) Skip the udev rule for /dev/uinput

Examples:
  cargo xtask install            # Build, install and allow the input group to replay keys
  cargo xtask install --no-udev  # Build and install the binary only
  cargo xtask dist               # Build binary and man pages
"#
    );
}

/// Get the project root directory
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };

    // xtask is in a subdirectory, go up one level
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

fn cargo_release(root: &Path, env_vars: &[(&str, &str)]) -> anyhow::Result<PathBuf> {
    let status = Command::new("cargo")
        .args(["build", "--release", "--bin", "uniforge"])
        .envs(env_vars.iter().copied())
        .current_dir(root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = root.join("target/release/uniforge");
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

fn sudo(args: &[&str], what: &str) -> anyhow::Result<()> {
    let status = Command::new("sudo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{} failed (sudo required)", what);
    }
    Ok(())
}

/// Build release binary, install it and the udev rule
fn install(skip_udev: bool) -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building release binary...");
    let binary = cargo_release(&root, &[])?;

    println!("==> Installing to {}...", BINARY_TARGET);
    sudo(
        &["install", "-Dm755", &binary.to_string_lossy(), BINARY_TARGET],
        "Install",
    )?;

    if !skip_udev {
        println!("==> Installing udev rule {}...", UDEV_RULE_TARGET);
        let rule = env::temp_dir().join("70-uniforge-uinput.rules");
        std::fs::write(&rule, UDEV_RULE)?;
        sudo(
            &["install", "-Dm644", &rule.to_string_lossy(), UDEV_RULE_TARGET],
            "udev rule install",
        )?;
        let _ = std::fs::remove_file(&rule);
        sudo(&["udevadm", "control", "--reload-rules"], "udev reload")?;
        sudo(&["udevadm", "trigger", "/dev/uinput"], "udev trigger")?;
    }

    println!("==> Installed successfully!");
    println!();
    println!("Installed: {}", BINARY_TARGET);
    println!("Make sure you are in the input group: sudo usermod -aG input $USER");

    // Show version
    let _ = Command::new(BINARY_TARGET).arg("--version").status();

    Ok(())
}

/// Remove the binary and udev rule
fn uninstall() -> anyhow::Result<()> {
    println!("==> Removing {} and {}...", BINARY_TARGET, UDEV_RULE_TARGET);
    sudo(&["rm", "-f", BINARY_TARGET, UDEV_RULE_TARGET], "Uninstall")?;
    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Build optimized release binary and man pages
fn dist() -> anyhow::Result<()> {
    let root = project_root()?;

    println!("==> Building distribution binary...");
    let binary = cargo_release(&root, &[("UNIFORGE_GEN_MANPAGES", "1")])?;
    println!("==> Built: {:?}", binary);

    // Show binary info
    let _ = Command::new("ls").arg("-lh").arg(&binary).status();
    let _ = Command::new(&binary).arg("--version").status();

    Ok(())
}
