// plugsync-core/src/server.rs
//! Stopping and starting the game server around file swaps.

use std::path::PathBuf;
use std::time::Duration;

use plugsync_aio::process::{run_command_async, run_command_checked};
use plugsync_common::config::{Config, ServerConfig};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const SAVE_SETTLE: Duration = Duration::from_secs(5);

/// Control surface over the running server. Every call reports success as a
/// plain bool; failures are logged by the implementation.
#[allow(async_fn_in_trait)]
pub trait ServerControl {
    async fn is_running(&self) -> bool;
    /// Stops the server, waiting up to `grace` for it to exit.
    async fn stop(&self, grace: Duration) -> bool;
    async fn start(&self) -> bool;
    async fn announce(&self, message: &str) -> bool;
}

/// Used when server management is disabled in the config.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmanaged;

impl ServerControl for Unmanaged {
    async fn is_running(&self) -> bool {
        false
    }

    async fn stop(&self, _grace: Duration) -> bool {
        true
    }

    async fn start(&self) -> bool {
        true
    }

    async fn announce(&self, _message: &str) -> bool {
        true
    }
}

/// A server running inside a detached GNU screen session.
#[derive(Debug, Clone)]
pub struct ScreenServer {
    session: String,
    server_dir: PathBuf,
    java: String,
    jvm_args: Vec<String>,
    jar: String,
    start_wait: Duration,
}

impl ScreenServer {
    pub fn new(config: &Config) -> Self {
        let ServerConfig {
            screen_name,
            java,
            jvm_args,
            jar,
            start_wait,
            ..
        } = &config.server;
        Self {
            session: screen_name.clone(),
            server_dir: config.server_dir().to_path_buf(),
            java: java.clone(),
            jvm_args: jvm_args.clone(),
            jar: jar.clone(),
            start_wait: *start_wait,
        }
    }

    async fn console(&self, command: &str) -> bool {
        let args = vec![
            "-S".to_string(),
            self.session.clone(),
            "-p".to_string(),
            "0".to_string(),
            "-X".to_string(),
            "stuff".to_string(),
            format!("{command}\r"),
        ];
        match run_command_checked("screen", &args, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not send '{}' to the server console: {}", command, e);
                false
            }
        }
    }

    fn start_args(&self) -> Vec<String> {
        let mut args = vec![
            "-dmS".to_string(),
            self.session.clone(),
            self.java.clone(),
        ];
        args.extend(self.jvm_args.iter().cloned());
        args.extend(["-jar".to_string(), self.jar.clone(), "nogui".to_string()]);
        args
    }
}

/// Whether `screen -ls` output lists a session named `session`.
pub fn screen_lists_session(listing: &str, session: &str) -> bool {
    let suffix = format!(".{session}");
    listing.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|id| id.ends_with(&suffix))
    })
}

impl ServerControl for ScreenServer {
    async fn is_running(&self) -> bool {
        // screen -ls exits non-zero whenever no session is attached; only
        // the listing matters.
        match run_command_async("screen", &["-ls".to_string()], None).await {
            Ok(out) => screen_lists_session(&String::from_utf8_lossy(&out.stdout), &self.session),
            Err(e) => {
                warn!("Could not query screen sessions: {}", e);
                false
            }
        }
    }

    async fn stop(&self, grace: Duration) -> bool {
        if !self.is_running().await {
            return true;
        }
        self.console("save-all").await;
        sleep(SAVE_SETTLE).await;
        info!("Stopping server (screen session '{}')", self.session);
        if !self.console("stop").await {
            return false;
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            sleep(POLL_INTERVAL).await;
            if !self.is_running().await {
                info!("Server stopped");
                return true;
            }
        }
        let stopped = !self.is_running().await;
        if !stopped {
            error!(
                "Server still running {}s after 'stop'",
                grace.as_secs()
            );
        }
        stopped
    }

    async fn start(&self) -> bool {
        if self.is_running().await {
            return true;
        }
        info!("Starting server from {}", self.server_dir.display());
        if let Err(e) =
            run_command_checked("screen", &self.start_args(), Some(self.server_dir.clone())).await
        {
            error!("Could not launch the server: {}", e);
            return false;
        }
        sleep(self.start_wait).await;
        let running = self.is_running().await;
        if !running {
            error!("Server exited right after start; check its own logs");
        }
        running
    }

    async fn announce(&self, message: &str) -> bool {
        self.console(&format!("say {message}")).await
    }
}

/// Broadcasts before a restart, as `(seconds before restart, message)`,
/// earliest first.
pub fn countdown_schedule(minutes: u64) -> Vec<(u64, String)> {
    if minutes == 0 {
        return Vec::new();
    }
    let noun = |m: u64| if m == 1 { "minute" } else { "minutes" };
    let mut marks = vec![(
        minutes * 60,
        format!("Server restart in {minutes} {} for updates!", noun(minutes)),
    )];
    for m in (1..minutes.min(5)).rev() {
        marks.push((m * 60, format!("Server restart in {m} {}!", noun(m))));
    }
    for s in [30, 10] {
        marks.push((s, format!("Server restart in {s} seconds!")));
    }
    marks.push((0, "Restarting now!".to_string()));
    marks
}

/// Plays the countdown on the server console, sleeping between marks.
pub async fn announce_restart<C: ServerControl>(server: &C, minutes: u64) {
    let schedule = countdown_schedule(minutes);
    let Some(&(total, _)) = schedule.first() else {
        return;
    };
    info!("Announcing restart in {} minutes", minutes);
    let started = Instant::now();
    for (before, message) in schedule {
        let due = started + Duration::from_secs(total - before);
        let now = Instant::now();
        if due > now {
            sleep(due - now).await;
        }
        if !server.announce(&message).await {
            debug!("Announcement not delivered: {}", message);
        }
    }
}
