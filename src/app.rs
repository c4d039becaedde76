use crate::{
    config::SyncConfig,
    fetch::{self, FetchOutcome, FetchProgress, FetchTarget, GitCli, Vcs},
    inventory,
    notice::{Notice, NoticeLevel},
    remote::{self, GithubContents, ListingSource, RemoteInventory},
    selection::Selection,
};
use anyhow::Result;
use arboard::Clipboard;
use std::{
    collections::{BTreeSet, VecDeque},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};
use time::{macros::format_description, OffsetDateTime};

const LOG_CAPACITY: usize = 200;
const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    ListingFailed,
    InstallResult,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub title: String,
    pub message: String,
    pub ok_label: String,
    pub level: NoticeLevel,
    pub kind: DialogKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStatus {
    Loading,
    Ready { truncated: bool },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Idle,
    Running { step: String },
    Finished,
}

enum ListingMessage {
    Completed(RemoteInventory),
}

enum FetchMessage {
    Progress(FetchProgress),
    Completed(FetchOutcome),
}

pub type BoxedListing = Box<dyn ListingSource + Send>;
pub type BoxedVcs = Box<dyn Vcs + Send>;

pub struct App {
    pub config: SyncConfig,
    pub local: BTreeSet<String>,
    pub remote: BTreeSet<String>,
    pub missing: Vec<String>,
    pub selection: Selection,
    pub cursor: usize,
    pub install_enabled: bool,
    seen_revision: u64,
    pub listing_status: ListingStatus,
    pub install_status: InstallStatus,
    pub dialog: Option<Dialog>,
    pub toast: Option<Toast>,
    pub status: String,
    pub logs: VecDeque<LogEntry>,
    pub log_scroll: usize,
    pub should_quit: bool,
    log_path: Option<PathBuf>,
    clipboard: Option<Clipboard>,
    listing_source: Option<BoxedListing>,
    listing_rx: Option<Receiver<ListingMessage>>,
    vcs: Option<BoxedVcs>,
    fetch_rx: Option<Receiver<FetchMessage>>,
}

impl App {
    pub fn initialize(config: SyncConfig) -> Result<Self> {
        let listing = Box::new(GithubContents::new(config.contents_url()));
        let vcs = Box::new(GitCli::default());
        Self::with_backends(config, listing, vcs)
    }

    /// Lists the local directory right away; a missing or unreadable mods
    /// directory is fatal.
    pub fn with_backends(config: SyncConfig, listing: BoxedListing, vcs: BoxedVcs) -> Result<Self> {
        let mods_dir = config.mods_dir();
        let local = inventory::local_mods(&mods_dir, &config.extension)?;
        let log_path = config.log_file.clone();

        let mut app = Self {
            config,
            local,
            remote: BTreeSet::new(),
            missing: Vec::new(),
            selection: Selection::default(),
            cursor: 0,
            install_enabled: false,
            seen_revision: 0,
            listing_status: ListingStatus::Loading,
            install_status: InstallStatus::Idle,
            dialog: None,
            toast: None,
            status: "Fetching remote listing...".to_string(),
            logs: VecDeque::with_capacity(LOG_CAPACITY),
            log_scroll: 0,
            should_quit: false,
            log_path,
            clipboard: None,
            listing_source: Some(listing),
            listing_rx: None,
            vcs: Some(vcs),
            fetch_rx: None,
        };

        app.log_info(format!(
            "Local mods: {} in {}",
            app.local.len(),
            mods_dir.display()
        ));
        app.start_listing();
        Ok(app)
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.config.mods_dir()
    }

    pub fn is_loading(&self) -> bool {
        self.listing_status == ListingStatus::Loading
    }

    pub fn is_installing(&self) -> bool {
        matches!(self.install_status, InstallStatus::Running { .. })
    }

    /// Flags freeze once an install has started.
    pub fn selection_locked(&self) -> bool {
        self.install_status != InstallStatus::Idle
    }

    fn start_listing(&mut self) {
        let Some(source) = self.listing_source.take() else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        self.listing_rx = Some(rx);
        let extension = self.config.extension.clone();
        self.log_info(format!("Listing {}", self.config.contents_url()));
        thread::spawn(move || {
            let inventory = remote::remote_inventory(source.as_ref(), &extension);
            let _ = tx.send(ListingMessage::Completed(inventory));
        });
    }

    pub fn tick(&mut self) {
        if let Some(toast) = &self.toast {
            if toast.expires_at <= Instant::now() {
                self.toast = None;
            }
        }
        self.poll_listing();
        self.poll_fetch();
        self.sync_install_enabled();
    }

    pub fn poll_listing(&mut self) {
        let Some(rx) = &self.listing_rx else {
            return;
        };
        let message = match rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                self.listing_rx = None;
                if self.is_loading() {
                    self.listing_status = ListingStatus::Failed;
                    self.log_error("Remote listing worker exited unexpectedly".to_string());
                }
                return;
            }
        };
        self.listing_rx = None;

        let ListingMessage::Completed(inventory) = message;
        self.apply_remote_inventory(inventory);
    }

    fn apply_remote_inventory(&mut self, inventory: RemoteInventory) {
        if let Some(notice) = inventory.notice() {
            self.listing_status = ListingStatus::Failed;
            self.status = "Remote listing failed".to_string();
            self.log_error(notice.message.replace('\n', " "));
            self.open_notice(notice, DialogKind::ListingFailed);
        } else {
            self.listing_status = ListingStatus::Ready {
                truncated: inventory.truncated,
            };
            self.log_info(format!(
                "Remote listing: {} entries, {} mod(s)",
                inventory.entry_count,
                inventory.mods.len()
            ));
            if inventory.truncated {
                self.log_warn(format!(
                    "Remote listing hit the {} entry limit; some mods may be missing from this list",
                    remote::LISTING_CAP
                ));
            }
        }

        self.remote = inventory.mods;
        self.missing = inventory::missing_mods(&self.local, &self.remote);
        self.selection = Selection::new(&self.missing);
        self.seen_revision = self.selection.revision();
        self.cursor = 0;
        self.install_enabled = self.selection.any_selected();

        if self.listing_status != ListingStatus::Failed {
            if self.missing.is_empty() {
                self.status = "Your mods directory is up to date!".to_string();
            } else {
                self.status = format!("{} mod(s) missing", self.missing.len());
            }
            self.log_info(self.status.clone());
        }
    }

    fn sync_install_enabled(&mut self) {
        if self.selection.revision() == self.seen_revision {
            return;
        }
        self.seen_revision = self.selection.revision();
        self.install_enabled = self.selection.any_selected();
        self.status = format!(
            "{} of {} selected",
            self.selection.selected_count(),
            self.selection.len()
        );
    }

    pub fn cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_down(&mut self) {
        self.cursor = self.cursor.saturating_add(1);
        self.clamp_cursor();
    }

    pub fn page_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(PAGE_SIZE);
    }

    pub fn page_down(&mut self) {
        self.cursor = self.cursor.saturating_add(PAGE_SIZE);
        self.clamp_cursor();
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.selection.len().saturating_sub(1);
    }

    pub fn clamp_cursor(&mut self) {
        let len = self.selection.len();
        if len == 0 {
            self.cursor = 0;
        } else if self.cursor >= len {
            self.cursor = len - 1;
        }
    }

    pub fn toggle_current(&mut self) {
        if self.selection_locked() {
            return;
        }
        self.selection.toggle(self.cursor);
        self.sync_install_enabled();
    }

    pub fn select_all(&mut self, include: bool) {
        if self.selection_locked() {
            return;
        }
        self.selection.set_all(include);
        self.sync_install_enabled();
    }

    /// Starts the one allowed fetch. Ignored while disabled or once a fetch
    /// has been started.
    pub fn install(&mut self) {
        if !self.install_enabled {
            self.set_toast("Nothing selected", ToastLevel::Warn, Duration::from_secs(2));
            return;
        }
        let Some(vcs) = self.vcs.take() else {
            self.set_toast("Install already started", ToastLevel::Warn, Duration::from_secs(2));
            return;
        };

        let files = self.selection.selected();
        let target = FetchTarget::from_config(&self.config);
        self.install_enabled = false;
        self.install_status = InstallStatus::Running {
            step: "Preparing".to_string(),
        };
        self.status = format!("Installing {} mod(s)...", files.len());
        self.log_info(format!(
            "Installing {} mod(s) from {}",
            files.len(),
            target.reference
        ));

        let (tx, rx) = mpsc::channel();
        self.fetch_rx = Some(rx);
        thread::spawn(move || {
            let progress_tx = tx.clone();
            let outcome = fetch::selective_fetch(vcs.as_ref(), &target, &files, |step| {
                let _ = progress_tx.send(FetchMessage::Progress(step));
            });
            let _ = tx.send(FetchMessage::Completed(outcome));
        });
    }

    /// Drains worker messages. A worker that exits without reporting an
    /// outcome ends the install as a failure so the window can close.
    pub fn poll_fetch(&mut self) {
        while let Some(rx) = &self.fetch_rx {
            match rx.try_recv() {
                Ok(FetchMessage::Progress(step)) => self.apply_fetch_progress(step),
                Ok(FetchMessage::Completed(outcome)) => {
                    self.fetch_rx = None;
                    self.apply_fetch_outcome(outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fetch_rx = None;
                    self.abort_install();
                }
            }
        }
    }

    fn abort_install(&mut self) {
        if !self.is_installing() {
            return;
        }
        self.install_status = InstallStatus::Finished;
        self.status = "Install failed".to_string();
        self.log_error("Install worker exited unexpectedly".to_string());
        self.open_notice(
            Notice::error(
                "Git Error",
                "Error installing mods:\ninstall worker exited unexpectedly",
            ),
            DialogKind::InstallResult,
        );
    }

    fn apply_fetch_progress(&mut self, step: FetchProgress) {
        let label = match step {
            FetchProgress::Fetching => {
                self.log_info("git fetch".to_string());
                "Fetching remote".to_string()
            }
            FetchProgress::CheckingOut { index, total, name } => {
                format!("Checking out {name} ({}/{total})", index + 1)
            }
            FetchProgress::Installed { name } => {
                self.log_info(format!("Installed {name}"));
                return;
            }
        };
        self.status = label.clone();
        self.install_status = InstallStatus::Running { step: label };
    }

    fn apply_fetch_outcome(&mut self, outcome: FetchOutcome) {
        self.install_status = InstallStatus::Finished;
        match &outcome {
            FetchOutcome::Skipped => {
                self.should_quit = true;
                return;
            }
            FetchOutcome::Installed { files } => {
                self.status = format!("Installed {} mod(s)", files.len());
                self.log_info(self.status.clone());
            }
            FetchOutcome::Failed { installed, error } => {
                self.status = "Install failed".to_string();
                self.log_error(format!("Install failed: {error}"));
                if !installed.is_empty() {
                    self.log_warn(format!("Kept before failure: {}", installed.join(", ")));
                }
            }
        }
        if let Some(notice) = outcome.notice() {
            self.open_notice(notice, DialogKind::InstallResult);
        }
    }

    /// Cancel leaves everything untouched, but a running install finishes first.
    pub fn cancel(&mut self) {
        if self.is_installing() {
            self.set_toast("Install in progress", ToastLevel::Warn, Duration::from_secs(2));
            return;
        }
        self.log_info("Cancelled".to_string());
        self.should_quit = true;
    }

    fn open_notice(&mut self, notice: Notice, kind: DialogKind) {
        self.dialog = Some(Dialog {
            title: notice.title,
            message: notice.message,
            ok_label: "OK".to_string(),
            level: notice.level,
            kind,
        });
    }

    pub fn dialog_confirm(&mut self) {
        let Some(dialog) = self.dialog.take() else {
            return;
        };
        match dialog.kind {
            DialogKind::ListingFailed => {}
            DialogKind::InstallResult => self.should_quit = true,
        }
    }

    pub fn set_toast(&mut self, message: &str, level: ToastLevel, duration: Duration) {
        self.toast = Some(Toast {
            message: message.to_string(),
            level,
            expires_at: Instant::now() + duration,
        });
    }

    pub fn copy_log(&mut self) {
        let text = self.log_text();
        if text.is_empty() {
            self.set_toast("Log is empty", ToastLevel::Info, Duration::from_secs(2));
            return;
        }
        match self.write_clipboard(text) {
            Ok(()) => self.set_toast("Log copied", ToastLevel::Info, Duration::from_secs(2)),
            Err(err) => {
                self.log_warn(format!("Clipboard copy failed: {err}"));
                self.set_toast("Clipboard copy failed", ToastLevel::Error, Duration::from_secs(3));
            }
        }
    }

    /// The clipboard handle is opened on first use and kept for the session.
    fn write_clipboard(&mut self, text: String) -> Result<(), arboard::Error> {
        let clipboard = match &mut self.clipboard {
            Some(clipboard) => clipboard,
            empty => empty.insert(Clipboard::new()?),
        };
        clipboard.set_text(text)
    }

    pub fn hint(&self) -> &'static str {
        if self.dialog.is_some() {
            "Enter/Esc dismiss"
        } else if self.is_installing() {
            "Installing..."
        } else if self.install_enabled {
            "Space toggle | a all | n none | Enter install | Esc cancel"
        } else {
            "Space toggle | a all | Esc close"
        }
    }

    pub fn scroll_log_up(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_add(lines);
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    fn log_text(&self) -> String {
        let lines: Vec<String> = self
            .logs
            .iter()
            .map(|entry| format!("[{}] {}", log_level_label(entry.level), entry.message))
            .collect();
        lines.join("\n")
    }

    /// Keeps a scrolled-back view anchored on the same entries while new
    /// ones arrive. The file copy is best effort.
    fn push_log(&mut self, level: LogLevel, message: String) {
        if let Some(path) = &self.log_path {
            let _ = append_log_file(path, level, &message);
        }
        if self.logs.len() == LOG_CAPACITY {
            self.logs.pop_front();
        } else if self.log_scroll > 0 {
            self.log_scroll += 1;
        }
        self.logs.push_back(LogEntry { level, message });
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let stamp = log_timestamp();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {stamp} {message}")
}

fn log_timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}
