use std::path::Path;

use crate::error::AppError;

/// Creates all directories in the given path, including parent directories if they don't exist.
#[inline]
pub async fn create_dirs(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(AppError::Io)?;
    Ok(())
}

/// Checks that `name` can be used both as a file stem and as a directory name
/// inside the save path.
pub fn validate_output_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::InvalidInput(format!(
            "invalid output name '{name}'"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(AppError::InvalidInput(format!(
            "output name '{name}' must not contain path separators"
        )));
    }
    Ok(name)
}
