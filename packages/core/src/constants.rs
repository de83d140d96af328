use std::env;
use std::path::PathBuf;

/// Get the path to the Vantage directory (~/.vantage)
pub fn vantage_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(".vantage")
    } else {
        // Fall back to dirs crate for normal usage
        dirs::home_dir()
            .expect("Unable to get home directory")
            .join(".vantage")
    }
}

/// Get the path to the SQLite database file (~/.vantage/vantage.db)
pub fn database_file() -> PathBuf {
    vantage_dir().join("vantage.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vantage_dir_uses_home() {
        let dir = vantage_dir();
        assert!(dir.ends_with(".vantage"));
    }

    #[test]
    fn test_database_file_under_vantage_dir() {
        let db = database_file();
        assert!(db.starts_with(vantage_dir()));
        assert!(db.ends_with("vantage.db"));
    }
}
