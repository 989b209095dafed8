//! Line commands and their execution against the engine.
//!
//! [`Command::parse`] turns one input line into a [`Command`];
//! [`Session::execute`] runs it and returns a [`Reply`] for the main loop
//! to print. Paths typed by the user are resolved against the currently
//! opened directory.

use std::path::{Component, Path, PathBuf};

use mirra_core::{CoreError, Engine, Event, Opened, ScanDiff, View};

/// A command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List a directory (the current one by default).
    List(Option<String>),
    /// Make a directory the current one.
    Open(String),
    /// Print the whole mirrored tree.
    Tree,
    /// List every known media file.
    All,
    /// Reconcile a directory with the disk.
    Refresh(Option<String>),
    /// Delete to the staging area.
    Remove(String),
    /// Move an entry into a directory.
    Move(String, String),
    /// Rename an entry in place.
    Rename(String, String),
    Undo,
    History,
    /// Print the content address of a file.
    Hash(String),
    /// Purge the staging area.
    EmptyTrash,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let arg = |i: usize| -> Result<String, String> {
            args.get(i)
                .map(|s| (*s).to_string())
                .ok_or_else(|| format!("{verb}: missing argument (try `help`)"))
        };
        let optional = || args.first().map(|s| (*s).to_string());

        let command = match verb {
            "ls" => Self::List(optional()),
            "open" | "cd" => Self::Open(arg(0)?),
            "tree" => Self::Tree,
            "all" => Self::All,
            "refresh" => Self::Refresh(optional()),
            "rm" => Self::Remove(arg(0)?),
            "mv" => Self::Move(arg(0)?, arg(1)?),
            "rename" => Self::Rename(arg(0)?, arg(1)?),
            "undo" => Self::Undo,
            "history" => Self::History,
            "hash" => Self::Hash(arg(0)?),
            "empty-trash" => Self::EmptyTrash,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command `{other}` (try `help`)")),
        };
        Ok(Some(command))
    }
}

/// What the main loop should do after a command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Lines to print.
    pub lines: Vec<String>,
    /// Storage location to watch from now on, when the current directory changed.
    pub watch: Option<PathBuf>,
    pub quit: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Self::default()
        }
    }

    fn line(line: impl Into<String>) -> Self {
        Self::lines(vec![line.into()])
    }
}

const HELP: &[&str] = &[
    "ls [dir]              list a directory",
    "open <dir>            change the current directory",
    "tree                  show the mirrored tree",
    "all                   list every media file",
    "refresh [dir]         re-read a directory from disk",
    "rm <path>             move to the staging area",
    "mv <path> <dir>       move into a directory",
    "rename <path> <name>  rename in place",
    "undo                  revert the last operation",
    "history               show undoable operations",
    "hash <file>           print a file's content address",
    "empty-trash           purge the staging area",
    "status                show tree and background state",
    "quit                  exit",
];

/// Per-prompt state: which directory is current.
#[derive(Debug, Clone)]
pub struct Session {
    current: PathBuf,
}

impl Session {
    pub fn new(root: &Path) -> Self {
        Self {
            current: root.to_path_buf(),
        }
    }

    /// Path key of the current directory.
    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Resolves a typed path to a path key.
    ///
    /// A leading `/` starts at the root; `.` and `..` are honoured but never
    /// climb above the root.
    pub fn resolve(&self, root: &Path, arg: &str) -> PathBuf {
        let (mut resolved, rest) = match arg.strip_prefix('/') {
            Some(rest) => (root.to_path_buf(), rest),
            None => (self.current.clone(), arg),
        };
        for component in Path::new(rest).components() {
            match component {
                Component::ParentDir => {
                    if resolved != root {
                        resolved.pop();
                    }
                }
                Component::Normal(name) => resolved.push(name),
                _ => {}
            }
        }
        resolved
    }

    /// Runs one command.
    pub fn execute(&mut self, engine: &mut Engine, command: Command) -> anyhow::Result<Reply> {
        let root = engine.root().to_path_buf();
        let previous = self.current.clone();
        let mut reply = match command {
            Command::List(dir) => {
                let path = dir.map_or_else(|| self.current.clone(), |d| self.resolve(&root, &d));
                let mut lines = Vec::new();
                let shown = match engine.open_dir(&path)? {
                    Opened::Ready => path,
                    Opened::Recovered { ancestor } => {
                        lines.push(format!("{} is gone; showing {}", path.display(), ancestor.display()));
                        ancestor
                    }
                };
                lines.extend(list_dir(engine, &shown)?);
                Reply::lines(lines)
            }
            Command::Open(dir) => {
                let path = self.resolve(&root, &dir);
                let mut lines = Vec::new();
                self.current = match engine.open_dir(&path)? {
                    Opened::Ready => path,
                    Opened::Recovered { ancestor } => {
                        lines.push(format!("{} is gone; opened {}", path.display(), ancestor.display()));
                        ancestor
                    }
                };
                lines.push(format!("now in {}", self.current.display()));
                Reply {
                    lines,
                    watch: Some(location_of(engine, &self.current)?),
                    quit: false,
                }
            }
            Command::Tree => Reply::lines(tree_lines(engine)),
            Command::All => {
                let files = engine.view_files(&View::AllMedia)?;
                let mut lines: Vec<String> = files
                    .iter()
                    .map(|f| f.path().display().to_string())
                    .collect();
                lines.push(format!("{} ({} files)", View::AllMedia.label(), files.len()));
                Reply::lines(lines)
            }
            Command::Refresh(dir) => {
                let path = dir.map_or_else(|| self.current.clone(), |d| self.resolve(&root, &d));
                let diff = engine.refresh(&path)?;
                Reply::line(diff_summary(&diff))
            }
            Command::Remove(target) => {
                let path = self.resolve(&root, &target);
                engine.delete(&path)?;
                Reply::line(format!("deleted {} (undo to restore)", path.display()))
            }
            Command::Move(target, dest) => {
                let path = self.resolve(&root, &target);
                let dest = self.resolve(&root, &dest);
                let moved = engine.move_entry(&path, &dest)?;
                Reply::line(format!("moved to {}", moved.display()))
            }
            Command::Rename(target, name) => {
                let path = self.resolve(&root, &target);
                let renamed = engine.rename(&path, &name)?;
                if self.current.starts_with(&path) {
                    let rest = self.current.strip_prefix(&path).unwrap_or(Path::new(""));
                    self.current = renamed.join(rest);
                }
                Reply::line(format!("renamed to {}", renamed.display()))
            }
            Command::Undo => match engine.undo() {
                Ok(description) => Reply::line(format!("undid {description}")),
                Err(CoreError::NothingToUndo) => Reply::line("nothing to undo"),
                Err(err) => return Err(err.into()),
            },
            Command::History => {
                let descriptions = engine.history().descriptions();
                if descriptions.is_empty() {
                    Reply::line("history is empty")
                } else {
                    Reply::lines(
                        descriptions
                            .iter()
                            .rev()
                            .enumerate()
                            .map(|(i, d)| format!("{:>3}  {d}", i + 1))
                            .collect(),
                    )
                }
            }
            Command::Hash(target) => {
                let path = self.resolve(&root, &target);
                let address = engine.content_address(&path)?;
                Reply::line(format!("{address}  {}", path.display()))
            }
            Command::EmptyTrash => {
                let dropped = engine.empty_staging()?;
                Reply::line(format!("staging emptied, {dropped} deletes can no longer be undone"))
            }
            Command::Status => {
                let store = engine.store();
                Reply::lines(vec![
                    format!("root      {}", root.display()),
                    format!("current   {}", self.current.display()),
                    format!("dirs      {}", store.dir_count()),
                    format!("files     {}", store.file_count()),
                    format!("pending   {}", engine.scheduler().pending()),
                    format!("history   {}/{}", engine.history().len(), engine.history().capacity()),
                ])
            }
            Command::Help => Reply::lines(HELP.iter().map(|l| (*l).to_string()).collect()),
            Command::Quit => Reply {
                quit: true,
                ..Reply::default()
            },
        };

        if !engine.store().contains_dir(&self.current) {
            self.current = nearest_known(engine, &self.current);
        }
        if self.current != previous && reply.watch.is_none() {
            reply.watch = Some(location_of(engine, &self.current)?);
        }
        Ok(reply)
    }
}

/// Formats an engine event for the prompt.
pub fn describe_event(event: &Event) -> String {
    match event {
        Event::Attached { parent, child } => {
            format!("+ {} (in {} at {})", child.name, parent.display(), child.index)
        }
        Event::Detached { path } => format!("- {}", path.display()),
        Event::FilesChanged { path } => format!("~ {}", path.display()),
        Event::Recovered { requested, ancestor } => {
            format!("! {} went stale, re-read {}", requested.display(), ancestor.display())
        }
    }
}

fn diff_summary(diff: &ScanDiff) -> String {
    if diff.is_empty() {
        return format!("{} is up to date", diff.path.display());
    }
    format!(
        "{}: +{} -{} ~{} ={}",
        diff.path.display(),
        diff.added.len(),
        diff.removed.len(),
        diff.changed,
        diff.unchanged
    )
}

fn list_dir(engine: &Engine, path: &Path) -> anyhow::Result<Vec<String>> {
    let node = engine.store().require_dir(path)?;
    let mut lines: Vec<String> = node.children().iter().map(|c| format!("{c}/")).collect();
    lines.extend(
        node.files()
            .iter()
            .map(|f| format!("{:<40} {:>12}", f.name(), f.size())),
    );
    if lines.is_empty() {
        lines.push("(empty)".to_string());
    }
    Ok(lines)
}

fn tree_lines(engine: &Engine) -> Vec<String> {
    let store = engine.store();
    let root = engine.root();
    store
        .subtree(root)
        .iter()
        .filter_map(|path| store.dir(path))
        .map(|dir| {
            let depth = dir.path().strip_prefix(root).map_or(0, |p| p.components().count());
            let marker = if dir.scanned() { "" } else { " …" };
            format!(
                "{}{}/ ({}){marker}",
                "  ".repeat(depth),
                dir.name(),
                dir.files().len()
            )
        })
        .collect()
}

fn location_of(engine: &Engine, path: &Path) -> anyhow::Result<PathBuf> {
    Ok(engine.store().require_dir(path)?.handle().location().to_path_buf())
}

fn nearest_known(engine: &Engine, path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| engine.store().contains_dir(p))
        .map_or_else(|| engine.root().to_path_buf(), Path::to_path_buf)
}
