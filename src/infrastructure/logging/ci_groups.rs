//! GitHub Actions log folding.
//!
//! `::group::<title>` and `::endgroup::` go to stdout, which is where the
//! Actions runner looks for workflow commands.

/// Open log group; the group closes when the guard drops
#[derive(Debug)]
#[must_use = "the group closes as soon as the guard is dropped"]
pub struct CiGroup {
    open: bool,
}

impl CiGroup {
    /// Print the group header when `enabled`; otherwise a no-op guard
    pub fn open(enabled: bool, title: &str) -> Self {
        if enabled {
            println!("{}", group_start(title));
        }
        Self { open: enabled }
    }
}

impl Drop for CiGroup {
    fn drop(&mut self) {
        if self.open {
            println!("{GROUP_END}");
        }
    }
}

const GROUP_END: &str = "::endgroup::";

fn group_start(title: &str) -> String {
    // A newline would end the workflow command early
    format!("::group::{}", title.replace(['\r', '\n'], " "))
}
