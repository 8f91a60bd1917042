use std::path::Path;

/// Install the global logger.
///
/// Admin actions are audit-relevant, so logs go to a stable file when possible. If the file
/// cannot be created (permissions, readonly FS, etc.), fall back to stderr.
pub fn init(file: Option<&Path>, verbose: bool) {
    use env_logger::Target;
    use std::fs;
    use std::io;

    let target = file
        .and_then(|path| {
            (|| -> io::Result<Target> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Target::Pipe(Box::new(file)))
            })()
            .ok()
        })
        .unwrap_or(Target::Stderr);

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // RUST_LOG still wins over the default level.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(target)
        .try_init();
}
