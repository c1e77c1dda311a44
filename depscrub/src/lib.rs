#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

use std::collections::HashSet;

use biometrics::{Collector, Counter};
use utf8path::Path;

///////////////////////////////////////////// constants ////////////////////////////////////////////

/// The default deletion set: entries a Metal-only macOS build of ANGLE never needs.  Keys kept on
/// purpose are noted inline.  Android-specific entries are handled by the wildcard in
/// [`DeletionPolicy::is_android`] and do not need to be listed.
pub const DEFAULT_REMOVALS: &[&str] = &[
    "third_party/catapult",
    "third_party/dawn",
    "third_party/llvm/src",
    // keep third_party/SwiftShader: the Vulkan backend pulls vulkan.gni from it
    "third_party/VK-GL-CTS/src",
    "third_party/OpenCL-cts",
    "third_party/OpenCL-libs",
    "third_party/fuchsia-sdk",
    "third_party/libdrm",
    "third_party/wayland",
    "third_party/meson",
    "third_party/bazel",
    "third_party/siso",
    "third_party/gles1_conform",
    "third_party/glmark2",
    "third_party/perfetto",
    "third_party/ijar",
    // keep glslang and the vulkan loader/tools/utility trees: Vulkan backend
    "third_party/spirv-cross",
    "third_party/cherry",
    "third_party/proguard",
    "third_party/jdk",
    "third_party/kotlin",
    "third_party/r8",
    "third_party/turbine",
    "third_party/rust-toolchain",
    "third_party/rust",
    "third_party/vulkan-validation-layers/src",
    "third_party/llvm-build",
    // keep third_party/libc++/src and third_party/depot_tools: build tools and gclient hooks
    "third_party/abseil-cpp",
    "third_party/OpenCL-CTS/src",
    "third_party/OpenCL-Docs/src",
    "third_party/OpenCL-ICD-Loader/src",
    "third_party/clspv/src",
    "third_party/mesa/src",
    // python test and benchmark infrastructure
    "third_party/colorama/src",
    "third_party/jinja2",
    "third_party/markupsafe",
    "third_party/Python-Markdown",
    "third_party/six",
    "third_party/requests/src",
    // keep third_party/libc++abi/src for the build tools; libunwind goes
    "third_party/libunwind/src",
    // disabled with angle_has_frame_capture=false
    "third_party/flatbuffers/src",
    "third_party/protobuf",
    // x86 assembly only
    "third_party/nasm",
    // image libraries the Metal backend never decodes
    "third_party/libpng/src",
    "third_party/libjpeg_turbo",
    // only abseil and googletest want re2
    "third_party/re2/src",
];

const ANDROID_SUBSTRING: &str = "android_";
const ANDROID_PREFIX: &str = "third_party/android";

///////////////////////////////////////////// counters /////////////////////////////////////////////

static DEPS_MAP_NOT_FOUND: Counter = Counter::new("depscrub.deps_map_not_found");
static ENTRIES_REMOVED: Counter = Counter::new("depscrub.entries_removed");
static ANDROID_REMOVED: Counter = Counter::new("depscrub.android_removed");

/// Register all depscrub counters with the provided collector.
pub fn register_counters(collector: &Collector) {
    collector.register_counter(&DEPS_MAP_NOT_FOUND);
    collector.register_counter(&ENTRIES_REMOVED);
    collector.register_counter(&ANDROID_REMOVED);
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The Error type.
#[derive(Debug)]
pub enum Error {
    /// The manifest specified by `path` does not exist.
    FileNotFound {
        /// The path that does not exist.
        path: Path<'static>,
    },
    /// The manifest specified by `path` has no top-level `deps = {` line.
    DepsMapNotFound {
        /// The path of the manifest missing its deps map.
        path: Path<'static>,
    },
    /// An error from the standard library.
    IoError(std::io::Error),
}

impl Error {
    /// Construct a new "FileNotFound" variant.
    pub fn file_not_found(file: &Path) -> Self {
        Self::FileNotFound {
            path: file.clone().into_owned(),
        }
    }

    /// Construct a new "DepsMapNotFound" variant.
    pub fn deps_map_not_found(file: &Path) -> Self {
        Self::DepsMapNotFound {
            path: file.clone().into_owned(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::FileNotFound { path } => write!(f, "Manifest not found: {}", path.as_str()),
            Error::DepsMapNotFound { path } => {
                write!(f, "Could not find 'deps = {{' in {}", path.as_str())
            }
            Error::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////// DeletionPolicy //////////////////////////////////////////

/// A DeletionPolicy names the top-level deps entries to strip from a manifest.  Every policy also
/// removes android-wildcard keys, whether or not they are listed.
#[derive(Clone, Debug, Default)]
pub struct DeletionPolicy {
    keys: HashSet<String>,
}

impl DeletionPolicy {
    /// Create a new DeletionPolicy that removes the provided keys.
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The deletion set for a Metal-only macOS build of ANGLE.
    pub fn default_removals() -> Self {
        Self::new(DEFAULT_REMOVALS.iter().copied())
    }

    /// True iff the policy calls for `key` to be removed.
    pub fn is_removable(&self, key: &str) -> bool {
        self.keys.contains(key) || Self::is_android(key)
    }

    /// True iff `key` names an android-specific dependency: `android_` appears anywhere in the
    /// key, or the key starts with `third_party/android`.
    pub fn is_android(key: &str) -> bool {
        key.contains(ANDROID_SUBSTRING) || key.starts_with(ANDROID_PREFIX)
    }
}

/////////////////////////////////////////// RewriteStats ///////////////////////////////////////////

/// Counts of what a rewrite removed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RewriteStats {
    /// Top-level entries removed.
    pub removed: usize,
    /// Of the removed entries, how many matched the android wildcard.
    pub android_removed: usize,
}

///////////////////////////////////////////// scanning /////////////////////////////////////////////

/// Parse a top-level entry header, returning the key.  A header is a single-quoted key, a colon,
/// and optionally the opening brace of its value.  Nothing else may trail it, so a single-line
/// entry that carries its value on the header line never counts.
fn entry_key(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('\'')?;
    let (key, rest) = rest.split_once('\'')?;
    if key.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(':')?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('{').unwrap_or(rest);
    if rest.is_empty() {
        Some(key)
    } else {
        None
    }
}

/// True for a line that closes a dict and nothing else: `}` or `},` with leading whitespace, and
/// trailing whitespace only after the comma.
fn closes_dict(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('}') else {
        return false;
    };
    match rest.strip_prefix(',') {
        Some(rest) => rest.trim_start().is_empty(),
        None => rest.is_empty(),
    }
}

/// True for a line opening the named top-level map: `name = {` starting at column zero.
fn opens_map(line: &str, name: &str) -> bool {
    let Some(rest) = line.strip_prefix(name) else {
        return false;
    };
    let Some(rest) = rest.trim_start().strip_prefix('=') else {
        return false;
    };
    rest.trim_start().starts_with('{')
}

/// The running brace-depth contribution of one line.
fn brace_delta(line: &str) -> isize {
    let opens = line.chars().filter(|c| *c == '{').count();
    let closes = line.chars().filter(|c| *c == '}').count();
    opens as isize - closes as isize
}

////////////////////////////////////////////// rewrite /////////////////////////////////////////////

/// Rewrite the manifest `contents`, dropping every top-level deps entry the policy names.  `path`
/// is for error reporting only; no file is touched.
///
/// Returns the new text and removal stats.  Lines outside removed entries survive byte for byte,
/// including everything from the `hooks` section or the deps map's closing brace onward.
pub fn rewrite(
    path: &Path,
    contents: &str,
    policy: &DeletionPolicy,
) -> Result<(String, RewriteStats), Error> {
    #[derive(Clone, Copy)]
    enum State {
        Scanning,
        Skipping,
        Copying,
    }
    let lines = contents.split('\n').collect::<Vec<_>>();
    let Some(deps_start) = lines.iter().position(|line| opens_map(line, "deps")) else {
        DEPS_MAP_NOT_FOUND.click();
        return Err(Error::deps_map_not_found(path));
    };
    let mut new_lines = Vec::with_capacity(lines.len());
    new_lines.extend_from_slice(&lines[..deps_start + 1]);
    // Depth is seeded from the opener line, so an entry sits at initial_depth and its value's
    // braces return there when the entry closes.
    let initial_depth = brace_delta(lines[deps_start]);
    let mut depth = initial_depth;
    let mut stats = RewriteStats::default();
    let mut state = State::Scanning;
    for line in lines[deps_start + 1..].iter().copied() {
        match state {
            State::Scanning => {
                depth += brace_delta(line);
                if opens_map(line, "hooks") {
                    new_lines.push(line);
                    state = State::Copying;
                } else if depth == initial_depth - 1 {
                    // The deps map's own closing brace.  Everything after it is trailing
                    // sections, never filtered.
                    new_lines.push(line);
                    state = State::Copying;
                } else if let Some(key) = entry_key(line) {
                    if policy.is_removable(key) {
                        stats.removed += 1;
                        ENTRIES_REMOVED.click();
                        if DeletionPolicy::is_android(key) {
                            stats.android_removed += 1;
                            ANDROID_REMOVED.click();
                        }
                        state = State::Skipping;
                    } else {
                        new_lines.push(line);
                    }
                } else {
                    new_lines.push(line);
                }
            }
            State::Skipping => {
                depth += brace_delta(line);
                if depth < initial_depth {
                    // The map's own closing brace surfaced mid-entry: the header carried no
                    // brace and the entry never closed on a line of its own.  Keep the close;
                    // trailing sections are never filtered.
                    new_lines.push(line);
                    state = State::Copying;
                } else if depth == initial_depth && closes_dict(line) {
                    state = State::Scanning;
                }
            }
            State::Copying => {
                new_lines.push(line);
            }
        }
    }
    Ok((new_lines.join("\n"), stats))
}

/// Count entry-header-shaped lines anywhere in the manifest.  Informational: nested keys that
/// happen to be formatted like a top-level header count too.
pub fn count_entries(contents: &str) -> usize {
    contents.lines().filter(|line| entry_key(line).is_some()).count()
}

//////////////////////////////////////////// ScrubReport ///////////////////////////////////////////

/// What [`scrub_file`] did to the manifest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScrubReport {
    /// Entries counted before the rewrite.
    pub original: usize,
    /// Top-level entries removed.
    pub removed: usize,
    /// Of the removed entries, how many matched the android wildcard.
    pub android_removed: usize,
    /// Entries counted after the rewrite.
    pub remaining: usize,
}

///////////////////////////////////////////// scrub_file ///////////////////////////////////////////

/// Rewrite the manifest at `path` in place.  The file is read in full, rewritten in memory, and
/// written back only once the complete new contents exist, so a failed rewrite leaves the file
/// untouched.
pub fn scrub_file(path: &Path, policy: &DeletionPolicy) -> Result<ScrubReport, Error> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }
    let contents = std::fs::read_to_string(path.into_std())?;
    let original = count_entries(&contents);
    let (new_contents, stats) = rewrite(path, &contents, policy)?;
    let remaining = count_entries(&new_contents);
    std::fs::write(path.into_std(), new_contents)?;
    Ok(ScrubReport {
        original,
        removed: stats.removed,
        android_removed: stats.android_removed,
        remaining,
    })
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
