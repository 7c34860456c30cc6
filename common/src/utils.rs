/// Searches all ancestor directories of the current working directory
/// (including itself) for a file or directory with the given name.
/// If found, returns the path to the file or directory.
pub fn search_current_ancestor_dirs_for(name: &str) -> Option<std::path::PathBuf> {
    [
        std::env::current_dir().as_ref(),
        std::env::current_exe().as_ref(),
    ]
    .iter()
    .filter_map(|p| p.ok())
    .flat_map(|p| p.ancestors())
    .find(|p| {
        p.read_dir().is_ok_and(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_str().is_some_and(|n| n.starts_with(name)))
        })
    })
    .map(|p| p.join(name))
}
