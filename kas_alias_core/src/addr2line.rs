//! addr2line bridge
//!
//! A long-lived child process wrapping `addr2line -fe <image>`. Requests and
//! responses are strictly ordered: each query must consume its own two
//! response lines before the next is issued, or later queries desynchronize
//! and get attributed to the wrong address. There is exactly one of these
//! per run, owned by the [`crate::engine::AliasEngine`] for the pass.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context};
use tracing::{debug, warn};

/// A persistent `addr2line -fe <image>` co-process.
pub struct Addr2LineSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Absolute directory of the image, used by callers to rebase paths
    /// this session returns (see [`Self::root`] and [`remove_prefix`]).
    root: String,
    /// Sticky: once the pipe is known broken, every subsequent query fails
    /// without attempting I/O again.
    dead: bool,
}

impl Addr2LineSession {
    /// Verifies `tool_path` and `image_path` exist, then spawns
    /// `<tool_path> -fe <image_path>` with piped stdin/stdout.
    pub fn initialize(tool_path: &Path, image_path: &Path) -> anyhow::Result<Self> {
        if !tool_path.exists() {
            bail!("addr2line tool not found at {}", tool_path.display());
        }
        if !image_path.exists() {
            bail!("image file not found at {}", image_path.display());
        }

        let root = image_path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());

        let mut child = Command::new(tool_path)
            .arg("-fe")
            .arg(image_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", tool_path.display()))?;

        let stdin = child
            .stdin
            .take()
            .context("addr2line child has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("addr2line child has no stdout pipe")?;

        debug!(tool = %tool_path.display(), image = %image_path.display(), "addr2line bridge initialized");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            root,
            dead: false,
        })
    }

    /// Queries the source location for `address`. Returns the normalized
    /// absolute source path with the line number still attached as
    /// `<path>:<line>` on success, or `None` if the location is unknown or
    /// the query failed for any reason (pipe closed, short read, ...). The
    /// line number rides along so it survives into the alias suffix (spec.md
    /// §8 scenario 1: `device_show@drivers_foo_c_10`).
    ///
    /// A pipe failure is sticky: once observed, every later call returns
    /// `None` immediately without touching the child again.
    pub fn query(&mut self, address: u64) -> Option<String> {
        if self.dead {
            return None;
        }

        if writeln!(self.stdin, "{address:x}").is_err() || self.stdin.flush().is_err() {
            warn!(address, "addr2line pipe write failed, marking bridge dead");
            self.dead = true;
            return None;
        }

        // First line is the function name; we only need the location line.
        let mut function_line = String::new();
        if self.stdout.read_line(&mut function_line).unwrap_or(0) == 0 {
            warn!(address, "addr2line pipe closed while reading function name");
            self.dead = true;
            return None;
        }

        let mut location_line = String::new();
        if self.stdout.read_line(&mut location_line).unwrap_or(0) == 0 {
            warn!(address, "addr2line pipe closed while reading location");
            self.dead = true;
            return None;
        }

        let location = location_line.trim_end_matches(['\r', '\n']);
        if location == "??:0" || location.starts_with("??:") {
            return None;
        }

        let (path, line) = location.rsplit_once(':')?;
        Some(format!("{}:{line}", normalize_path(path)))
    }

    /// The absolute directory of the image this session was opened against.
    /// Used to rebase the paths this session's queries return.
    pub fn root(&self) -> &str {
        &self.root
    }
}

/// Sends `SIGKILL`-equivalent termination and reaps the child on every exit
/// path, including a panicking unwind — spec.md §5's "scoped acquisition"
/// requirement, satisfied by RAII instead of relying on callers to remember
/// an explicit teardown call.
impl Drop for Addr2LineSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Anything that can answer "what source location is this address at?",
/// with a root path to rebase against. Implemented by [`Addr2LineSession`];
/// abstracted so the alias engine can be driven by a test double instead of
/// a real child process.
pub trait AddressResolver {
    /// Looks up the source location for `address`. Same contract as
    /// [`Addr2LineSession::query`].
    fn resolve(&mut self, address: u64) -> Option<String>;

    /// The root path queries should be rebased against.
    fn root(&self) -> &str;
}

impl AddressResolver for Addr2LineSession {
    fn resolve(&mut self, address: u64) -> Option<String> {
        self.query(address)
    }

    fn root(&self) -> &str {
        Addr2LineSession::root(self)
    }
}

/// Lexically resolves `.`/`..` components in an absolute path, without
/// touching the filesystem. Splits on `/`; `.` is dropped, `..` pops the last
/// retained component (if any), anything else is appended.
pub fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for token in path.split('/') {
        match token {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            t => out.push(t),
        }
    }
    format!("/{}", out.join("/"))
}

/// Returns the suffix of `path` following `root`, iff `path` starts with
/// `root` byte-for-byte. `None` otherwise.
pub fn remove_prefix<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(root)
}
