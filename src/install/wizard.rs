//! Operator-facing output and confirmation prompts

use std::io::Write;

use anyhow::Result;
use inquire::Confirm;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::detection::InstallationState;
use super::orchestration::InstallReport;
use super::privilege::{OpSource, PrivilegedPlan};

fn rule(stdout: &mut StandardStream) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(
        stdout,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    );
    let _ = stdout.reset();
}

/// Print a colored status line
pub fn status(color: Color, message: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)));
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.reset();
}

/// Summarize what an install run produced, followed by the caveats
pub fn show_completion(report: &InstallReport, caveats: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    rule(&mut stdout);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    if report.dry_run {
        let _ = writeln!(stdout, "\n  DRY RUN (nothing was built or written)\n");
    } else {
        let _ = writeln!(stdout, "\n  ✓ BUILD STAGED\n");
    }
    let _ = stdout.reset();

    let _ = writeln!(stdout, "pg_config:   {}", report.pg_config.path().display());
    let _ = writeln!(stdout, "pkglibdir:   {}", report.pkglibdir.display());
    let _ = writeln!(stdout, "sharedir:    {}", report.sharedir.display());
    let _ = writeln!(stdout, "library:     {}", report.manifest.library.install_name);
    let _ = writeln!(stdout, "SQL scripts: {}", report.manifest.sql.len());
    if !report.dry_run {
        let _ = writeln!(stdout, "installed:   {} files", report.installed.len());
        let _ = writeln!(stdout, "script:      {}", report.script_path.display());
    }
    let _ = writeln!(stdout);
    rule(&mut stdout);
    let _ = writeln!(stdout, "\n{caveats}");
}

/// List the privileged operations before running them
pub fn show_plan(plan: &PrivilegedPlan) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "\n🔐 Privileged steps for {}:", plan.extension);
    let _ = stdout.reset();
    for op in &plan.ops {
        let source = match &op.source {
            OpSource::File(p) => p.display().to_string(),
            OpSource::DirContents(p) => format!("{}/*", p.display()),
        };
        let _ = writeln!(
            stdout,
            "  • {source} → {} (mode {:o})",
            op.dest_dir.display(),
            op.mode
        );
    }
    let _ = writeln!(stdout);
}

pub fn show_state(extension: &str, state: InstallationState) {
    let (color, text) = match state {
        InstallationState::FullyInstalled => (Color::Green, format!("✓ {extension} is installed")),
        InstallationState::PartiallyInstalled => (
            Color::Yellow,
            format!("⚠ {extension} is partially installed (run the finishing step again)"),
        ),
        InstallationState::NotInstalled => (Color::Yellow, format!("✗ {extension} is not installed")),
    };
    status(color, &text);
}

/// Ask before touching the live PostgreSQL directories
pub fn confirm_privileged(elevated: bool) -> Result<bool> {
    let prompt = if elevated {
        "Copy files into PostgreSQL now? (runs sudo, you may be asked for your password)"
    } else {
        "Copy files into PostgreSQL now?"
    };
    Confirm::new(prompt)
        .with_default(true)
        .with_help_message("Nothing outside the install prefix has been changed yet")
        .prompt()
        .map_err(|e| anyhow::anyhow!("Prompt cancelled: {}", e))
}
