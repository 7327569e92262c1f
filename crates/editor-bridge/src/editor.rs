use std::collections::BTreeSet;
use std::path::PathBuf;

/// The text-editor collaborator the engine reads scripts from.
pub trait Editor {
    fn current_source_text(&self) -> String;

    /// Where the script is saved, if it has been.
    fn current_source_path(&self) -> Option<PathBuf>;

    /// 1-based line numbers.
    fn breakpoint_lines(&self) -> BTreeSet<u32>;
}
