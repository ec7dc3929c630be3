//! Fixed names and default locations

/// Default object store root, relative to the working directory
pub const DEFAULT_STORE: &str = ".osforge";

/// Default directory holding worker executables
pub const DEFAULT_LIBDIR: &str = "/usr/lib/osforge";

/// Subdirectory of the libdir with one executable per stage type
pub const STAGES_SUBDIR: &str = "stages";

/// Subdirectory of the libdir with one executable per source origin
pub const SOURCES_SUBDIR: &str = "sources";

/// Name of the directory under the user config dir
pub const CONFIG_DIR_NAME: &str = "osforge";

pub const CONFIG_FILE_NAME: &str = "config.toml";
