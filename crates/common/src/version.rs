use std::fmt;

/// Build metadata captured by `build.rs` at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub version: &'static str,
    pub repo_version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dagtar {} ({}, {} build, built {})",
            self.version, self.repo_version, self.build_profile, self.build_timestamp
        )
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("DAGTAR_BUILD_PROFILE"),
        build_timestamp: env!("DAGTAR_BUILD_TIMESTAMP"),
        version: env!("CARGO_PKG_VERSION"),
        repo_version: env!("DAGTAR_REPO_VERSION"),
    }
}

#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::build_info()
    };
}
