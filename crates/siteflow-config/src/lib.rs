pub mod error;
pub mod model;
pub mod validate;

pub use error::*;
pub use model::{
    CloudFrontConfig, CustomDomainConfig, DEFAULT_ENVIRONMENT, S3Config, SiteConfig,
};

use std::path::{Path, PathBuf};

pub const CONFIG_PATH_VAR: &str = "SITEFLOW_CONFIG_PATH";
const CANDIDATES: [&str; 4] = [
    "siteflow.local.yaml",
    ".siteflow.local.yaml",
    "siteflow.yaml",
    ".siteflow.yaml",
];
const PROJECT_DIR: &str = ".siteflow";

/// Global SiteFlow config directory (`~/.config/siteflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("siteflow"))
}

/// Locate the project's siteflow.yaml
///
/// Search order:
/// 1. `SITEFLOW_CONFIG_PATH` (direct path)
/// 2. current directory: siteflow.local.yaml, .siteflow.local.yaml, siteflow.yaml, .siteflow.yaml
/// 3. the same names inside `./.siteflow/`
/// 4. ~/.config/siteflow/siteflow.yaml (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::debug!("{} points at a missing file: {}", CONFIG_PATH_VAR, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("siteflow.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Directory that relative `source` paths and the state directory hang off.
///
/// A file inside `.siteflow/` belongs to the directory above it; the global
/// file belongs to the current directory.
pub fn project_dir(config_path: &Path) -> Result<PathBuf> {
    let is_global = get_config_dir()
        .map(|dir| config_path.starts_with(dir))
        .unwrap_or(false);
    if is_global {
        return Ok(std::env::current_dir()?);
    }

    let parent = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if parent.file_name().is_some_and(|name| name == PROJECT_DIR)
        && let Some(above) = parent.parent()
    {
        return Ok(above.to_path_buf());
    }
    Ok(parent)
}

/// Parse a config file without resolving environments
pub fn load_config(path: &Path) -> Result<SiteConfig> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Config resolved for one environment, plus where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub project_dir: PathBuf,
    pub environment: String,
    pub config: SiteConfig,
}

impl LoadedConfig {
    /// Absolute source directory
    pub fn source_dir(&self) -> PathBuf {
        self.project_dir.join(&self.config.source)
    }
}

/// Find, parse, resolve and validate the config for `environment`
pub fn load_for_environment(environment: Option<&str>) -> Result<LoadedConfig> {
    let path = find_config_file()?;
    load_from(&path, environment)
}

pub fn load_from(path: &Path, environment: Option<&str>) -> Result<LoadedConfig> {
    let base = load_config(path)?;
    let environment = base.resolve_environment(environment)?;
    let config = base.for_environment(&environment)?;
    config.validate(&environment)?;
    tracing::debug!("Loaded {} for environment {}", path.display(), environment);

    Ok(LoadedConfig {
        path: path.to_path_buf(),
        project_dir: project_dir(path)?,
        environment,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("siteflow.yaml"), "app: blog\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_VAR, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("siteflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("siteflow.yaml"), "app: blog\n").unwrap();
        fs::write(temp_dir.path().join(".siteflow.local.yaml"), "app: blog\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_VAR, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".siteflow.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let project = temp_dir.path().join(".siteflow");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("siteflow.yaml"), "app: blog\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_VAR, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        let found = result.unwrap();
        assert!(found.ends_with(".siteflow/siteflow.yaml"));
        assert_eq!(
            project_dir(&found).unwrap().canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "app: blog\n").unwrap();

        let result = temp_env::with_var(
            CONFIG_PATH_VAR,
            Some(config_path.to_str().unwrap()),
            find_config_file,
        );
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_config_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_vars(
            [
                (CONFIG_PATH_VAR, None::<&str>),
                ("XDG_CONFIG_HOME", Some(temp_dir.path().to_str().unwrap())),
                ("HOME", Some(temp_dir.path().to_str().unwrap())),
            ],
            find_config_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound)));
    }

    #[test]
    fn test_load_from_resolves_and_validates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(
            &path,
            "app: blog\nsource: public\nenvironments:\n  staging:\n    region: eu-west-1\n",
        )
        .unwrap();

        let loaded = load_from(&path, None).unwrap();
        assert_eq!(loaded.environment, "staging");
        assert_eq!(loaded.config.region, "eu-west-1");
        assert_eq!(loaded.source_dir(), temp_dir.path().join("public"));
        assert_eq!(loaded.config.bucket_name(&loaded.environment), "blog-staging");
    }

    #[test]
    fn test_load_from_reports_parse_errors_with_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(&path, "app: [unclosed\n").unwrap();

        let error = load_from(&path, None).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("siteflow.yaml"));
    }

    #[test]
    fn test_load_from_rejects_invalid_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(&path, "app: blog\ns3:\n  bucketName: Not_Valid\n").unwrap();

        assert!(matches!(
            load_from(&path, Some("prod")),
            Err(ConfigError::Invalid(_))
        ));
    }
}
