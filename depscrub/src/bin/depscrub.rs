//! Prune unnecessary entries from a gclient-style DEPS manifest, in place.
//!
//! ```text
//! USAGE: depscrub [--deps DEPS]
//! ```

use arrrg::CommandLine;

use utf8path::Path;

use depscrub::DeletionPolicy;

#[derive(Clone, Debug, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Options {
    #[arrrg(optional, "Path to the DEPS manifest to rewrite in place.")]
    deps: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            deps: "DEPS".to_string(),
        }
    }
}

fn main() {
    let (options, free) = Options::from_command_line("USAGE: depscrub [OPTIONS]");
    if !free.is_empty() {
        eprintln!("depscrub takes no positional arguments; use --deps to name the manifest");
        std::process::exit(129);
    }
    let path = Path::new(&options.deps);
    let policy = DeletionPolicy::default_removals();
    match depscrub::scrub_file(&path, &policy) {
        Ok(report) => {
            println!("Original deps count: {}", report.original);
            println!(
                "Removed {} dependencies ({} android)",
                report.removed, report.android_removed
            );
            println!("Remaining deps count: {}", report.remaining);
            println!("Updated {}", path.as_str());
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
