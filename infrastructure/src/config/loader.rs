//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Application directory under the platform config dir.
const APP_DIR: &str = "ralph-loop";

/// Project-level config file names, checked in order.
const PROJECT_FILES: [&str; 2] = ["ralph.toml", ".ralph.toml"];

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "RALPH_";

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. Environment: `RALPH_SUPERVISOR__MAX_ITERATIONS=5` style variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./ralph.toml` or `./.ralph.toml`
    /// 4. XDG config: `$XDG_CONFIG_HOME/ralph-loop/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(&path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/ralph-loop/config.toml if set,
    /// otherwise falls back to ~/.config/ralph-loop/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(config_path: Option<&Path>) {
        println!("Configuration sources (in priority order):");

        println!("  [     ] Env:     {}* variables", ENV_PREFIX);

        if let Some(path) = config_path {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{:<5}] Explicit: {}", mark, path.display());
        }

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./ralph.toml or ./.ralph.toml");
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use ralph_domain::OutputFormat;

    fn load_in(jail: &mut Jail, config_path: Option<&Path>) -> figment::Result<FileConfig> {
        let xdg = jail.directory().join("xdg");
        jail.set_env("XDG_CONFIG_HOME", xdg.display());
        ConfigLoader::load(config_path).map_err(|e| *e)
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.supervisor.max_iterations, 10);
        assert!(config.supervisor.auto_persist);
        assert!(config.logging.audit_file.is_none());
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("ralph-loop"));
    }

    #[test]
    fn test_load_without_files_gives_defaults() {
        Jail::expect_with(|jail| {
            let config = load_in(jail, None)?;
            assert_eq!(config, FileConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_project_file_overrides_global() {
        Jail::expect_with(|jail| {
            jail.create_dir("xdg/ralph-loop")?;
            jail.create_file(
                "xdg/ralph-loop/config.toml",
                r#"
[supervisor]
max_iterations = 3
auto_recover = true
"#,
            )?;
            jail.create_file(
                ".ralph.toml",
                r#"
[supervisor]
max_iterations = 6
"#,
            )?;

            let config = load_in(jail, None)?;
            assert_eq!(config.supervisor.max_iterations, 6);
            assert!(config.supervisor.auto_recover);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_then_env_take_priority() {
        Jail::expect_with(|jail| {
            jail.create_file("ralph.toml", "[output]\nformat = \"text\"\n")?;
            jail.create_file(
                "custom.toml",
                r#"
[output]
format = "json"

[decision]
max_retries = 1
"#,
            )?;
            jail.set_env("RALPH_DECISION__MAX_RETRIES", 5);
            jail.set_env("RALPH_SUPERVISOR__TIMEOUTS__EXECUTE", 90);

            let custom = jail.directory().join("custom.toml");
            let config = load_in(jail, Some(&custom))?;
            assert_eq!(config.output.format, Some(OutputFormat::Json));
            assert_eq!(config.decision.max_retries, 5);
            assert_eq!(config.supervisor.timeouts.execute, Some(90));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("ralph.toml", "[supervisor]\nmax_iterations = \"many\"\n")?;
            assert!(load_in(jail, None).is_err());
            Ok(())
        });
    }
}
