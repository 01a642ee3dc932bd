//! Command-line interface definition and terminal prompts.
//!
//! The parsing types live in the library so they can be tested; `main.rs`
//! only wires them to the orchestrator.

use crate::models::{AppConfig, CharacterRef, ScanResult};
use crate::services::{ConflictResolution, TokenPrompt};
use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use inquire::{Password, PasswordDisplayMode, Select};

/// Sync World of Warcraft settings and addons through a git repository.
#[derive(Parser, Debug)]
#[command(name = "wowsync")]
#[command(about = "Sync World of Warcraft settings and addons through git")]
#[command(version)]
pub struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write log records to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Application directory (defaults to ~/.wow_sync).
    #[arg(long, global = true, value_name = "DIR")]
    pub app_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show or change the configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List versions, accounts and characters found in the installation.
    Scan,

    /// Choose which characters are synced.
    Select(SelectArgs),

    /// Clone or create the local repository.
    Init,

    /// Pull from the remote and apply it to the installation.
    Pull(PullArgs),

    /// Collect the installation into the repository and push it.
    Push(PushArgs),

    /// Resolve a conflict left by an earlier pull.
    Resolve(ResolveArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current configuration as JSON.
    Show,

    /// Change one or more settings.
    Set(ConfigSetArgs),
}

#[derive(Args, Debug, Default)]
pub struct ConfigSetArgs {
    /// World of Warcraft installation directory.
    #[arg(long, value_name = "PATH")]
    pub wow_path: Option<String>,

    /// Git remote URL.
    #[arg(long, value_name = "URL")]
    pub repo_url: Option<String>,

    #[arg(long, value_name = "BOOL")]
    pub retail: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub classic: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub classic_era: Option<bool>,

    /// Also sync Config.wtf.
    #[arg(long, value_name = "BOOL")]
    pub sync_config_wtf: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub auto_sync: Option<bool>,
}

impl ConfigSetArgs {
    /// Apply the given options; returns false when nothing was given.
    pub fn apply(&self, config: &mut AppConfig) -> bool {
        use crate::models::GameVersion;

        let mut changed = false;
        if let Some(path) = &self.wow_path {
            config.wow_path = path.trim().to_string();
            changed = true;
        }
        if let Some(url) = &self.repo_url {
            config.git_repo_url = url.trim().to_string();
            changed = true;
        }
        for (version, value) in [
            (GameVersion::Retail, self.retail),
            (GameVersion::Classic, self.classic),
            (GameVersion::ClassicEra, self.classic_era),
        ] {
            if let Some(enabled) = value {
                config.set_version_enabled(version, enabled);
                changed = true;
            }
        }
        if let Some(value) = self.sync_config_wtf {
            config.sync_config_wtf = value;
            changed = true;
        }
        if let Some(value) = self.auto_sync {
            config.auto_sync = value;
            changed = true;
        }
        changed
    }
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Select every character found by a scan.
    #[arg(long, conflicts_with_all = ["none", "keys"])]
    pub all: bool,

    /// Select nothing; no character data is synced.
    #[arg(long, conflicts_with = "keys")]
    pub none: bool,

    /// Character keys as printed by `scan` (version:account:realm:character).
    #[arg(value_name = "KEY", required_unless_present_any = ["all", "none"])]
    pub keys: Vec<String>,
}

impl SelectArgs {
    /// The complete new selection.
    pub fn characters(&self, scan: &ScanResult) -> Result<Vec<CharacterRef>> {
        if self.all {
            return Ok(scan.characters.values().cloned().collect());
        }
        if self.none {
            return Ok(Vec::new());
        }

        let mut characters = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let Some(character) = CharacterRef::parse_key(key) else {
                bail!("Invalid character key '{key}', expected version:account:realm:character");
            };
            if !scan.characters.contains_key(key) {
                tracing::warn!("Character {} was not found by the last scan", key);
            }
            characters.push(character);
        }
        Ok(characters)
    }
}

#[derive(Args, Debug, Default)]
pub struct PullArgs {
    /// Resolve a merge conflict without asking.
    #[arg(long, value_enum, value_name = "SIDE")]
    pub on_conflict: Option<ConflictSide>,
}

#[derive(Args, Debug, Default)]
pub struct PushArgs {
    /// Overwrite the remote branch (after keeping the local side of a conflict).
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[arg(value_enum)]
    pub side: ConflictSide,
}

/// Which side wins a conflict.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ConflictSide {
    /// Take everything from the remote.
    Remote,
    /// Keep everything local.
    Local,
}

impl From<ConflictSide> for ConflictResolution {
    fn from(side: ConflictSide) -> Self {
        match side {
            ConflictSide::Remote => ConflictResolution::UseRemote,
            ConflictSide::Local => ConflictResolution::KeepLocal,
        }
    }
}

/// Asks for a personal access token on the terminal.
#[derive(Debug, Default)]
pub struct TerminalTokenPrompt;

impl TokenPrompt for TerminalTokenPrompt {
    fn prompt_token(&self, remote_url: &str) -> Option<String> {
        eprintln!("Authentication required for {remote_url}");
        eprintln!("Create a token at https://github.com/settings/personal-access-tokens/new");
        Password::new("Personal access token:")
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Masked)
            .prompt()
            .ok()
    }
}

const KEEP_LOCAL: &str = "Keep my local changes";
const USE_REMOTE: &str = "Use the remote version";
const DECIDE_LATER: &str = "Decide later";

/// Ask which side wins a conflict; `None` leaves it pending.
pub fn prompt_conflict_resolution() -> Option<ConflictResolution> {
    let choice = Select::new(
        "Local and remote changes conflict. Which version should be kept?",
        vec![USE_REMOTE, KEEP_LOCAL, DECIDE_LATER],
    )
    .prompt()
    .ok()?;

    match choice {
        USE_REMOTE => Some(ConflictResolution::UseRemote),
        KEEP_LOCAL => Some(ConflictResolution::KeepLocal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameVersion;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("wowsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_config_set() {
        let cli = parse(&[
            "config",
            "set",
            "--wow-path",
            "/games/wow",
            "--classic",
            "false",
        ]);
        let Command::Config {
            action: ConfigAction::Set(args),
        } = cli.command
        else {
            panic!("expected config set");
        };

        let mut config = AppConfig::default();
        assert!(args.apply(&mut config));
        assert_eq!(config.wow_path, "/games/wow");
        assert!(!config.is_version_enabled(GameVersion::Classic));
        assert!(config.is_version_enabled(GameVersion::Retail));
    }

    #[test]
    fn test_empty_config_set_changes_nothing() {
        let mut config = AppConfig::default();
        assert!(!ConfigSetArgs::default().apply(&mut config));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_pull_and_resolve() {
        let cli = parse(&["pull", "--on-conflict", "remote"]);
        assert!(matches!(
            cli.command,
            Command::Pull(PullArgs {
                on_conflict: Some(ConflictSide::Remote)
            })
        ));

        let cli = parse(&["--debug", "resolve", "local"]);
        assert!(cli.debug);
        let Command::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(
            ConflictResolution::from(args.side),
            ConflictResolution::KeepLocal
        );

        let cli = parse(&["push", "--force"]);
        assert!(matches!(cli.command, Command::Push(PushArgs { force: true })));
    }

    #[test]
    fn test_select_requires_a_choice() {
        assert!(Cli::try_parse_from(["wowsync", "select"]).is_err());
        assert!(Cli::try_parse_from(["wowsync", "select", "--all", "--none"]).is_err());
    }

    #[test]
    fn test_select_characters() {
        let mut scan = ScanResult::default();
        let hero = CharacterRef::new(GameVersion::Retail, "ACC", "Realm", "Hero");
        scan.characters.insert(hero.key(), hero.clone());

        let args = SelectArgs {
            all: true,
            none: false,
            keys: vec![],
        };
        assert_eq!(args.characters(&scan).unwrap(), vec![hero.clone()]);

        let args = SelectArgs {
            all: false,
            none: true,
            keys: vec![],
        };
        assert!(args.characters(&scan).unwrap().is_empty());

        let args = SelectArgs {
            all: false,
            none: false,
            keys: vec!["_classic_:ACC:Realm:Alt".into()],
        };
        let chosen = args.characters(&scan).unwrap();
        assert_eq!(chosen[0].version, GameVersion::Classic);

        let args = SelectArgs {
            all: false,
            none: false,
            keys: vec!["bad-key".into()],
        };
        assert!(args.characters(&scan).is_err());
    }
}
