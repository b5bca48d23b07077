//! File system watcher keeping the target tree in sync with the source.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     watch thread                              │
//! │                                                               │
//! │  ┌──────────┐   ┌───────────┐   ┌──────────────────────────┐  │
//! │  │ notify   │──▶│ Debouncer │──▶│ reaction(WatchEvent)     │  │
//! │  │ events   │   │ (300ms)   │   │                          │  │
//! │  └──────────┘   └───────────┘   │  layout   → full rebuild │  │
//! │       │                         │  delete   → remove target│  │
//! │       └─ new dir → watch it     │  otherwise→ process file │  │
//! │                                 └──────────────────────────┘  │
//! │  Message::Stop ─────────────────────────────▶ exit loop       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every directory is registered non-recursively, so directories created
//! later are registered as their create events arrive.

use crate::{
    build::{self, build_site, is_summary_source},
    config::{SiteConfig, paths},
    log,
    site::Site,
};
use anyhow::{Context, Result, anyhow};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use walkdir::WalkDir;

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Events
// =============================================================================

/// Kind of a debounced source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Create,
    Modify,
    Delete,
    /// Notification backlog was dropped; the source root must be rescanned
    Overflow,
}

/// A debounced change under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchKind,
    pub path: PathBuf,
}

enum Message {
    Event(notify::Result<Event>),
    Stop,
}

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events; the latest meaningful kind per path wins.
struct Debouncer {
    changes: FxHashMap<PathBuf, WatchKind>,
    overflow: bool,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            overflow: false,
            last_event: None,
        }
    }

    fn add(&mut self, path: PathBuf, kind: WatchKind) {
        if is_temp_file(&path) {
            return;
        }

        let kind = match (self.changes.get(&path), kind) {
            (Some(WatchKind::Create), WatchKind::Delete) => {
                self.changes.remove(&path);
                self.last_event = Some(Instant::now());
                return;
            }
            (Some(WatchKind::Delete), WatchKind::Create) => WatchKind::Modify,
            (Some(WatchKind::Create), WatchKind::Modify) => WatchKind::Create,
            _ => kind,
        };

        self.changes.insert(path, kind);
        self.last_event = Some(Instant::now());
    }

    fn lost_sync(&mut self) {
        self.overflow = true;
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        (self.overflow || !self.changes.is_empty())
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    /// Pending events in path order; an overflow replaces them all.
    fn take(&mut self, root: &Path) -> Vec<WatchEvent> {
        self.last_event = None;
        let changes = std::mem::take(&mut self.changes);

        if std::mem::take(&mut self.overflow) {
            return vec![WatchEvent {
                kind: WatchKind::Overflow,
                path: root.to_path_buf(),
            }];
        }

        let mut events: Vec<_> = changes
            .into_iter()
            .map(|(path, kind)| WatchEvent { kind, path })
            .collect();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    fn timeout(&self) -> Duration {
        if self.last_event.is_none() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Stops a running watcher from any thread.
#[derive(Clone)]
pub struct Stopper(Option<Sender<Message>>);

impl Stopper {
    pub fn stop(&self) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(Message::Stop);
        }
    }
}

/// Owner of the watch thread.
pub struct WatchHandle {
    sender: Option<Sender<Message>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl WatchHandle {
    /// Handle for a watcher that could not be created.
    const fn inert() -> Self {
        Self {
            sender: None,
            thread: None,
        }
    }

    /// Whether a watch thread is running.
    pub const fn is_active(&self) -> bool {
        self.thread.is_some()
    }

    pub fn stopper(&self) -> Stopper {
        Stopper(self.sender.clone())
    }

    /// Signal the watch thread and wait for it to exit.
    pub fn stop(mut self) -> Result<()> {
        Stopper(self.sender.take()).stop();
        self.join_thread()
    }

    /// Block until the watch thread exits, returning the error that ended it.
    pub fn join(mut self) -> Result<()> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(anyhow!("watch thread panicked"))),
            None => Ok(()),
        }
    }
}

/// Start watching every directory under `source`.
///
/// `reaction` runs on the watch thread, one debounced event at a time.
/// `on_error` runs there once if watching fails after startup, such as a
/// new directory that cannot be registered; the error itself is returned
/// by [`WatchHandle::join`] and [`WatchHandle::stop`].
///
/// A platform without watch support yields an inert handle; failing to
/// register an existing directory is an error.
pub fn watch<F, E>(source: &Path, mut reaction: F, on_error: E) -> Result<WatchHandle>
where
    F: FnMut(WatchEvent) + Send + 'static,
    E: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let events = tx.clone();
    let watcher = notify::recommended_watcher(move |res| {
        let _ = events.send(Message::Event(res));
    });

    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(err) => {
            log!("watch"; "file watching unavailable: {err}");
            return Ok(WatchHandle::inert());
        }
    };

    let count = register_tree(&mut watcher, source, |_| {})?;
    log!("watch"; "watching {} directories under {}", count, source.display());

    let root = source.to_path_buf();
    let thread = thread::spawn(move || {
        let result = run(watcher, &rx, &root, &mut reaction);
        match &result {
            Ok(()) => log!("watch"; "stopped"),
            Err(err) => {
                log!("error"; "watching stopped: {err:#}");
                on_error();
            }
        }
        result
    });

    Ok(WatchHandle {
        sender: Some(tx),
        thread: Some(thread),
    })
}

/// Event loop of the watch thread; returns on stop or on the first
/// registration failure.
fn run<W: Watcher>(
    mut watcher: W,
    rx: &Receiver<Message>,
    root: &Path,
    reaction: &mut impl FnMut(WatchEvent),
) -> Result<()> {
    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Ok(Message::Event(Ok(event))) => route(&mut watcher, &mut debouncer, event)?,
            Ok(Message::Event(Err(err))) => log!("watch"; "error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
        }

        if debouncer.ready() {
            for event in debouncer.take(root) {
                reaction(event);
            }
        }
    }
}

/// Register `dir` and all its non-hidden subdirectories; report files found.
fn register_tree(
    watcher: &mut impl Watcher,
    dir: &Path,
    mut on_file: impl FnMut(PathBuf),
) -> Result<usize> {
    let mut count = 0;
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_dir() {
            watcher
                .watch(entry.path(), RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", entry.path().display()))?;
            count += 1;
        } else if entry.file_type().is_file() {
            on_file(entry.into_path());
        }
    }

    Ok(count)
}

/// Translate one notify event into debouncer input.
fn route(watcher: &mut impl Watcher, debouncer: &mut Debouncer, event: Event) -> Result<()> {
    if event.need_rescan() {
        log!("warn"; "synchronization lost, rebuilding everything");
        debouncer.lost_sync();
        return Ok(());
    }

    let paths = event.paths;
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in paths {
                arrive(watcher, debouncer, path, WatchKind::Create)?;
            }
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in paths {
                debouncer.add(path, WatchKind::Delete);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            if let Some(from) = paths.next() {
                debouncer.add(from, WatchKind::Delete);
            }
            for to in paths {
                arrive(watcher, debouncer, to, WatchKind::Create)?;
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in paths {
                if path.exists() {
                    arrive(watcher, debouncer, path, WatchKind::Create)?;
                } else {
                    debouncer.add(path, WatchKind::Delete);
                }
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            for path in paths.into_iter().filter(|p| p.is_file()) {
                debouncer.add(path, WatchKind::Modify);
            }
        }
        _ => {}
    }

    Ok(())
}

/// A path appeared: watch it if it is a directory, queue it if it is a file.
///
/// Files already inside a new directory are queued too, since they may have
/// been created before the directory was registered.
fn arrive(
    watcher: &mut impl Watcher,
    debouncer: &mut Debouncer,
    path: PathBuf,
    kind: WatchKind,
) -> Result<()> {
    if path.is_dir() {
        if path.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.')) {
            return Ok(());
        }
        register_tree(watcher, &path, |file| debouncer.add(file, WatchKind::Create))?;
    } else if path.is_file() {
        debouncer.add(path, kind);
    }
    Ok(())
}

// =============================================================================
// Reaction
// =============================================================================

/// Keeps the target tree in sync with debounced source changes.
pub struct Rebuilder {
    site: Site,
    reload: Option<Sender<String>>,
}

impl Rebuilder {
    /// `reload` receives the browser paths of every updated target.
    pub const fn new(site: Site, reload: Option<Sender<String>>) -> Self {
        Self { site, reload }
    }

    pub fn react(&mut self, event: WatchEvent) {
        if let Err(err) = self.try_react(&event) {
            log!("error"; "{}: {err:#}", event.path.display());
        }
    }

    fn try_react(&mut self, event: &WatchEvent) -> Result<()> {
        let config = self.site.config();
        let path = event.path.as_path();

        if event.kind == WatchKind::Overflow || self.site.is_layout(path) {
            log!("watch"; "rebuilding everything");
            self.site = build_site(config)?;
            self.notify("*".to_owned());
            return Ok(());
        }

        if event.kind == WatchKind::Delete {
            if let Some(target) = self.site.remove(path)? {
                self.notify_target(config, &target);
            }
            return Ok(());
        }

        let report = self.site.process([path])?;
        for file in &report.files {
            log!("watch"; "{} {}", file.pipe.name(), paths::slashed(&file.path));
            let target = config.paths().target().join(&file.path);
            self.notify_target(config, &target);
        }

        if is_summary_source(config, path) {
            build::write_root_summary(config)?;
        }

        Ok(())
    }

    fn notify_target(&self, config: &SiteConfig, target: &Path) {
        let Some(relative) = config.paths().target_relative(target) else {
            return;
        };
        for path in browser_paths(relative) {
            self.notify(path);
        }
    }

    fn notify(&self, path: String) {
        if let Some(reload) = &self.reload {
            let _ = reload.send(path);
        }
    }
}

/// Browser-facing forms of a target-relative path.
///
/// `a/b.html` → `/a/b.html`, `/a/b`; `a/index.html` → `/a/index.html`, `/a/`
pub fn browser_paths(relative: &Path) -> Vec<String> {
    let path = format!("/{}", paths::slashed(relative));

    let pretty = if relative.file_name().is_some_and(|n| n == "index.html") {
        path.strip_suffix("index.html").map(str::to_owned)
    } else {
        path.strip_suffix(".html").map(str::to_owned)
    };

    std::iter::once(path).chain(pretty).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;
    use std::fs;
    use tempfile::TempDir;

    fn wait_for(rx: &mpsc::Receiver<WatchEvent>, matches: impl Fn(&WatchEvent) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) if matches(&event) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_new_subdirectory_is_watched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().canonicalize().unwrap();
        let (tx, rx) = mpsc::channel();

        let handle = watch(
            &source,
            move |event| {
                let _ = tx.send(event);
            },
            || {},
        )
        .unwrap();
        if !handle.is_active() {
            return;
        }

        fs::create_dir(source.join("sub")).unwrap();
        thread::sleep(Duration::from_millis(500));
        fs::write(source.join("sub/page.md"), "# Page").unwrap();

        assert!(wait_for(&rx, |event| {
            event.path == source.join("sub/page.md") && event.kind != WatchKind::Delete
        }));

        fs::remove_file(source.join("sub/page.md")).unwrap();
        assert!(wait_for(&rx, |event| {
            event.path == source.join("sub/page.md") && event.kind == WatchKind::Delete
        }));

        handle.stop().unwrap();
    }

    #[test]
    fn test_stop_ends_thread() {
        let dir = TempDir::new().unwrap();
        let handle = watch(dir.path(), |_| {}, || {}).unwrap();
        let stopper = handle.stopper();

        stopper.stop();
        handle.join().unwrap();
    }

    /// Refuses every directory registration.
    struct RefusingWatcher;

    impl Watcher for RefusingWatcher {
        fn new<F: notify::EventHandler>(_: F, _: notify::Config) -> notify::Result<Self> {
            Ok(Self)
        }

        fn watch(&mut self, _: &Path, _: RecursiveMode) -> notify::Result<()> {
            Err(notify::Error::generic("registration refused"))
        }

        fn unwatch(&mut self, _: &Path) -> notify::Result<()> {
            Ok(())
        }

        fn kind() -> notify::WatcherKind {
            notify::WatcherKind::NullWatcher
        }
    }

    #[test]
    fn test_unregistrable_directory_ends_loop_with_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let (tx, rx) = mpsc::channel();
        let event = Event::new(EventKind::Create(CreateKind::Folder)).add_path(dir.path().join("sub"));
        tx.send(Message::Event(Ok(event))).unwrap();
        drop(tx);

        let mut reactions = 0;
        let result = run(RefusingWatcher, &rx, dir.path(), &mut |_| reactions += 1);

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("registration refused"));
        assert_eq!(reactions, 0);
    }

    fn rebuilder_in(dir: &Path) -> (Rebuilder, mpsc::Receiver<String>, &'static SiteConfig) {
        let docs = dir.join("docs");
        fs::create_dir_all(docs.join("_layouts")).unwrap();
        fs::write(docs.join("_layouts/page.hbs"), "{{{content}}}").unwrap();
        fs::write(docs.join("a.md"), "# A").unwrap();
        fs::write(docs.join("b.md"), "# B").unwrap();

        let mut config = SiteConfig::from_str("[site]\nlayout = \"_layouts/page.hbs\"").unwrap();
        config.update_path_with_root(dir);
        let config: &'static SiteConfig = Box::leak(Box::new(config));

        let (tx, rx) = mpsc::channel();
        (Rebuilder::new(build_site(config).unwrap(), Some(tx)), rx, config)
    }

    fn event(kind: WatchKind, path: PathBuf) -> WatchEvent {
        WatchEvent { kind, path }
    }

    #[test]
    fn test_layout_change_rebuilds_untouched_pages() {
        let dir = TempDir::new().unwrap();
        let (mut rebuilder, rx, config) = rebuilder_in(dir.path());
        let target = config.paths().target();

        fs::write(config.layout_path(), "NEW{{{content}}}").unwrap();
        rebuilder.react(event(WatchKind::Modify, config.layout_path()));

        assert!(fs::read_to_string(target.join("a.html")).unwrap().starts_with("NEW"));
        assert!(fs::read_to_string(target.join("b.html")).unwrap().starts_with("NEW"));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["*"]);
    }

    #[test]
    fn test_overflow_rebuilds_everything() {
        let dir = TempDir::new().unwrap();
        let (mut rebuilder, rx, config) = rebuilder_in(dir.path());
        let source = config.paths().source().to_path_buf();

        fs::write(config.layout_path(), "OVER{{{content}}}").unwrap();
        fs::write(source.join("c.md"), "# C").unwrap();
        rebuilder.react(event(WatchKind::Overflow, source));

        let target = config.paths().target();
        assert!(fs::read_to_string(target.join("a.html")).unwrap().starts_with("OVER"));
        assert!(target.join("c.html").is_file());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["*"]);
    }

    #[test]
    fn test_delete_removes_target() {
        let dir = TempDir::new().unwrap();
        let (mut rebuilder, rx, config) = rebuilder_in(dir.path());
        let deleted = config.paths().source().join("b.md");
        let target = config.paths().target();
        assert!(target.join("b.html").is_file());

        fs::remove_file(&deleted).unwrap();
        rebuilder.react(event(WatchKind::Delete, deleted));

        assert!(!target.join("b.html").exists());
        assert!(target.join("a.html").is_file());
        assert!(rx.try_iter().any(|path| path == "/b.html"));
    }

    #[test]
    fn test_modify_renders_only_changed_page() {
        let dir = TempDir::new().unwrap();
        let (mut rebuilder, rx, config) = rebuilder_in(dir.path());
        let target = config.paths().target();
        let before = fs::read_to_string(target.join("b.html")).unwrap();

        let changed = config.paths().source().join("a.md");
        fs::write(&changed, "# A2").unwrap();
        rebuilder.react(event(WatchKind::Modify, changed));

        assert!(fs::read_to_string(target.join("a.html")).unwrap().contains("A2"));
        assert_eq!(fs::read_to_string(target.join("b.html")).unwrap(), before);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["/a.html", "/a"]);
    }

    #[test]
    fn test_debouncer_merges_kinds() {
        let root = Path::new("/src");
        let mut debouncer = Debouncer::new();

        debouncer.add(PathBuf::from("/src/a.md"), WatchKind::Create);
        debouncer.add(PathBuf::from("/src/a.md"), WatchKind::Modify);
        debouncer.add(PathBuf::from("/src/b.md"), WatchKind::Create);
        debouncer.add(PathBuf::from("/src/b.md"), WatchKind::Delete);
        debouncer.add(PathBuf::from("/src/c.md"), WatchKind::Delete);
        debouncer.add(PathBuf::from("/src/c.md"), WatchKind::Create);
        debouncer.add(PathBuf::from("/src/.c.md.swp"), WatchKind::Modify);

        assert_eq!(
            debouncer.take(root),
            vec![
                WatchEvent {
                    kind: WatchKind::Create,
                    path: PathBuf::from("/src/a.md")
                },
                WatchEvent {
                    kind: WatchKind::Modify,
                    path: PathBuf::from("/src/c.md")
                },
            ]
        );
    }

    #[test]
    fn test_debouncer_overflow_replaces_pending() {
        let mut debouncer = Debouncer::new();
        debouncer.add(PathBuf::from("/src/a.md"), WatchKind::Modify);
        debouncer.lost_sync();

        assert_eq!(
            debouncer.take(Path::new("/src")),
            vec![WatchEvent {
                kind: WatchKind::Overflow,
                path: PathBuf::from("/src")
            }]
        );
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_browser_paths() {
        assert_eq!(browser_paths(Path::new("a/b.html")), ["/a/b.html", "/a/b"]);
        assert_eq!(browser_paths(Path::new("a/index.html")), ["/a/index.html", "/a/"]);
        assert_eq!(browser_paths(Path::new("index.html")), ["/index.html", "/"]);
        assert_eq!(browser_paths(Path::new("s/site.css")), ["/s/site.css"]);
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/src/a.md~")));
        assert!(is_temp_file(Path::new("/src/.a.md.swp")));
        assert!(!is_temp_file(Path::new("/src/a.md")));
    }
}
