use super::{dispatch::DispatchConfig, matmul::MatmulConfig};
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static GEMMKIT_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Represents the global configuration for gemmkit, combining matmul and dispatch settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for matmul planning and selection.
    #[serde(default)]
    pub matmul: MatmulConfig,

    /// Configuration for the cube grid executor.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `gemmkit.toml` or `GemmKit.toml` in
    /// the current directory or its parents. If no file is found, a default configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function takes a global lock. Read what you need once, during planning,
    /// rather than from inside kernels.
    pub fn get() -> Arc<Self> {
        let mut state = GEMMKIT_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<()> {
        use std::io::Write;

        let config = Self::get();
        let content =
            toml::to_string_pretty(config.as_ref()).expect("Default config should be serializable");
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`.
    pub fn set(config: Self) {
        let mut state = GEMMKIT_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    ///
    /// - `GEMMKIT_DEBUG_LOG`: `stdout`, `stderr`, `1`/`true` (temp file), `0`/`false`, or a file path.
    /// - `GEMMKIT_CUBE_ORDER`: `forward`, `reverse`, `shuffled` or `shuffled:<seed>`.
    pub fn override_from_env(mut self) -> Self {
        use super::{dispatch::DispatchLogLevel, matmul::MatmulLogLevel};

        if let Ok(val) = std::env::var("GEMMKIT_DEBUG_LOG") {
            self.matmul.logger.level = MatmulLogLevel::Full;
            self.dispatch.logger.level = DispatchLogLevel::Full;

            match val.as_str() {
                "stdout" => {
                    self.matmul.logger.stdout = true;
                    self.dispatch.logger.stdout = true;
                }
                "stderr" => {
                    self.matmul.logger.stderr = true;
                    self.dispatch.logger.stderr = true;
                }
                "1" | "true" => {
                    let file_path = std::env::temp_dir().join("gemmkit.log");
                    self.matmul.logger.file = Some(file_path.clone());
                    self.dispatch.logger.file = Some(file_path);
                }
                "0" | "false" => {
                    self.matmul.logger.level = MatmulLogLevel::Disabled;
                    self.dispatch.logger.level = DispatchLogLevel::Disabled;
                }
                file_path => {
                    self.matmul.logger.file = Some(file_path.into());
                    self.dispatch.logger.file = Some(file_path.into());
                }
            }
        };

        if let Ok(val) = std::env::var("GEMMKIT_CUBE_ORDER") {
            match val.parse() {
                Ok(order) => self.dispatch.order = order,
                Err(err) => log::warn!("Ignoring GEMMKIT_CUBE_ORDER: {err}"),
            }
        }

        self
    }

    // Loads configuration from `gemmkit.toml` or `GemmKit.toml` in the current directory or its parents.
    //
    // Traverses up the directory tree until a valid configuration file is found or the root is reached.
    // Returns a default configuration if no file is found.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            if let Ok(content) = Self::from_file_path(dir.join("gemmkit.toml")) {
                return content;
            }

            if let Ok(content) = Self::from_file_path(dir.join("GemmKit.toml")) {
                return content;
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    // Loads configuration from a specified file path.
    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match toml::from_str(&content) {
            Ok(val) => val,
            Err(err) => panic!("The file provided doesn't have the right format => {err:?}"),
        };

        Ok(config)
    }
}

#[derive(Clone, Copy, Debug)]
/// How to format kernel type names.
pub enum TypeNameFormatLevel {
    /// No formatting apply, full information is included.
    Full,
    /// Most information is removed for a small formatted name.
    Short,
    /// Balanced info is kept.
    Balanced,
}

/// Format a type name with different options.
pub fn type_name_format(name: &str, level: TypeNameFormatLevel) -> String {
    match level {
        TypeNameFormatLevel::Full => name.to_string(),
        TypeNameFormatLevel::Short => match name.split('<').next() {
            Some(val) => val.split("::").last().unwrap_or(name).to_string(),
            None => name.to_string(),
        },
        TypeNameFormatLevel::Balanced => {
            let Some((before_generic, inside_generic)) = name.split_once('<') else {
                return short_segment(name);
            };

            let mut formatted = short_segment(before_generic);
            for generic in split_top_level(inside_generic.trim_end_matches('>')) {
                formatted += " | ";
                formatted += &type_name_format(generic, level);
            }
            formatted
        }
    }
}

fn short_segment(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_prefix('&').unwrap_or(name);
    name.split("::").last().unwrap_or(name).to_string()
}

// Splits on the commas that are not nested inside another generic list.
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());

    parts
}
