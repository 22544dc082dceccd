/// Release version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build commit, overridden by the build system through `TWTXT_COMMIT`
pub const COMMIT: &str = match option_env!("TWTXT_COMMIT") {
    Some(commit) => commit,
    None => "HEAD",
};

/// Full version and build, e.g. `0.1.0@HEAD`
pub fn full_version() -> String {
    format!("{}@{}", VERSION, COMMIT)
}

/// User-Agent sent with every feed request
pub fn user_agent() -> String {
    format!("twtxt/{}", full_version())
}
