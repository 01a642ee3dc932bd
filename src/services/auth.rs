//! Credential resolution for the git remote.
//!
//! Credentials are only looked up when libgit2 asks for them. SSH keys from
//! `~/.ssh` are offered first; for HTTPS a personal access token is taken from
//! the in-memory cache, the GitHub CLI, the token file, or finally the user.

use camino::{Utf8Path, Utf8PathBuf};
use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Credential callbacks allowed per remote operation before giving up.
pub const MAX_AUTH_ATTEMPTS: usize = 4;

/// Password sent alongside a token used as the username.
const TOKEN_PASSWORD: &str = "x-oauth-basic";

const SSH_KEY_NAMES: [&str; 2] = ["id_ed25519", "id_rsa"];

/// How long `gh auth token` may take before it is killed.
const GITHUB_CLI_TIMEOUT: Duration = Duration::from_secs(2);

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Asks the user for an access token.
#[cfg_attr(test, mockall::automock)]
pub trait TokenPrompt: Send + Sync {
    /// `None` when the user declines.
    fn prompt_token(&self, remote_url: &str) -> Option<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TokenSource {
    Cache,
    GithubCli,
    File,
    Prompt,
}

impl TokenSource {
    const ORDER: [TokenSource; 4] = [
        TokenSource::Cache,
        TokenSource::GithubCli,
        TokenSource::File,
        TokenSource::Prompt,
    ];
}

/// Resolves SSH keys and access tokens for remote operations.
pub struct CredentialResolver {
    token_path: Utf8PathBuf,
    ssh_dir: Option<Utf8PathBuf>,
    use_github_cli: bool,
    prompt: Option<Arc<dyn TokenPrompt>>,
    cached_token: Mutex<Option<String>>,
}

impl CredentialResolver {
    pub fn new(token_path: impl Into<Utf8PathBuf>) -> Self {
        let ssh_dir = dirs::home_dir()
            .and_then(|home| Utf8PathBuf::try_from(home).ok())
            .map(|home| home.join(".ssh"));
        Self {
            token_path: token_path.into(),
            ssh_dir,
            use_github_cli: true,
            prompt: None,
            cached_token: Mutex::new(None),
        }
    }

    /// Ask the user through `prompt` when no stored token works.
    pub fn with_prompt(mut self, prompt: Arc<dyn TokenPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Look for keys in `dir` instead of `~/.ssh`; `None` disables SSH keys.
    pub fn with_ssh_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.ssh_dir = dir;
        self
    }

    pub fn with_github_cli(mut self, enabled: bool) -> Self {
        self.use_github_cli = enabled;
        self
    }

    /// Callbacks for a single fetch, clone or push.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut session = AuthSession::default();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed| {
            self.credential(&mut session, url, username_from_url, allowed)
        });
        callbacks
    }

    fn credential(
        &self,
        session: &mut AuthSession,
        url: &str,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        session.attempts += 1;
        if session.attempts > MAX_AUTH_ATTEMPTS {
            return Err(auth_error(format!(
                "authentication failed after {} attempts",
                MAX_AUTH_ATTEMPTS
            )));
        }

        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username_from_url.unwrap_or("git"));
        }

        if allowed.contains(CredentialType::SSH_KEY) && !session.ssh_tried {
            session.ssh_tried = true;
            if let Some((private, public)) = self.find_ssh_key() {
                tracing::debug!("Using SSH key {}", private);
                return Cred::ssh_key(
                    username_from_url.unwrap_or("git"),
                    Some(public.as_std_path()),
                    private.as_std_path(),
                    None,
                );
            }
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            // A token handed out earlier in this session was rejected
            if let Some(source) = session.last_source {
                if source == TokenSource::Cache || source == TokenSource::File {
                    self.set_cached(None);
                }
            }

            while let Some(source) = session.next_source() {
                if let Some(token) = self.token_from(source, url) {
                    session.last_source = Some(source);
                    self.set_cached(Some(token.clone()));
                    return Cred::userpass_plaintext(&token, TOKEN_PASSWORD);
                }
            }
        }

        Err(auth_error(format!("no usable credentials for {}", url)))
    }

    fn token_from(&self, source: TokenSource, url: &str) -> Option<String> {
        match source {
            TokenSource::Cache => self
                .cached_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            TokenSource::GithubCli if self.use_github_cli && is_github_url(url) => {
                let token = github_cli_token();
                if token.is_some() {
                    tracing::info!("Using GitHub CLI authentication");
                }
                token
            }
            TokenSource::GithubCli => None,
            TokenSource::File => {
                let token = load_token(&self.token_path);
                if token.is_some() {
                    tracing::info!("Using stored access token");
                }
                token
            }
            TokenSource::Prompt => {
                let token = self
                    .prompt
                    .as_ref()?
                    .prompt_token(url)
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())?;
                if let Err(e) = save_token(&self.token_path, &token) {
                    tracing::warn!("Failed to store access token: {}", e);
                }
                Some(token)
            }
        }
    }

    fn set_cached(&self, token: Option<String>) {
        *self
            .cached_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// First key pair with both halves present.
    fn find_ssh_key(&self) -> Option<(Utf8PathBuf, Utf8PathBuf)> {
        let dir = self.ssh_dir.as_ref()?;
        SSH_KEY_NAMES.iter().find_map(|name| {
            let private = dir.join(name);
            let public = dir.join(format!("{name}.pub"));
            (private.is_file() && public.is_file()).then_some((private, public))
        })
    }
}

#[derive(Debug, Default)]
struct AuthSession {
    attempts: usize,
    ssh_tried: bool,
    next_token_source: usize,
    last_source: Option<TokenSource>,
}

impl AuthSession {
    fn next_source(&mut self) -> Option<TokenSource> {
        let source = TokenSource::ORDER.get(self.next_token_source).copied();
        self.next_token_source += 1;
        source
    }
}

fn auth_error(message: String) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Callback, message)
}

pub fn is_github_url(url: &str) -> bool {
    url.to_ascii_lowercase().contains("github.com")
}

fn github_cli_token() -> Option<String> {
    let mut command = Command::new("gh");
    command.args(["auth", "token"]);
    let token = stdout_within(&mut command, GITHUB_CLI_TIMEOUT)?;
    let token = token.trim().to_string();
    (!token.is_empty()).then_some(token)
}

/// Stdout of a successful run, or `None` if it fails or outlives `limit`.
///
/// Output is read after exit, so this is only for commands that print little.
fn stdout_within(command: &mut Command, limit: Duration) -> Option<String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() < limit => thread::sleep(CHILD_POLL_INTERVAL),
            Ok(None) => {
                tracing::warn!("{:?} timed out after {:?}", command.get_program(), limit);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(_) => return None,
        }
    };
    if !status.success() {
        return None;
    }

    let mut stdout = String::new();
    child.stdout.take()?.read_to_string(&mut stdout).ok()?;
    Some(stdout)
}

/// Read `{"access_token": "..."}`; unreadable files count as absent.
pub fn load_token(path: &Utf8Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<TokenFile>(&contents) {
        Ok(file) if !file.access_token.is_empty() => Some(file.access_token),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable token file {}: {}", path, e);
            None
        }
    }
}

/// Persist a token, readable only by the owner on Unix.
pub fn save_token(path: &Utf8Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(&TokenFile {
        access_token: token.to_string(),
    })?;
    fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
