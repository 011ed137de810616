use super::GlobalConfig;
use super::{dispatch::DispatchLogLevel, matmul::MatmulLogLevel};
use core::fmt::Display;
use hashbrown::HashMap;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Where one log category goes, and how much of it.
///
/// Sinks add up: a category can write to a file, to both standard streams and to the `log`
/// crate at once.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// File sink.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Appends to `file` instead of truncating it. When two categories share a file, the
    /// first one registered decides.
    #[serde(default = "append_default")]
    pub append: bool,

    #[serde(default)]
    pub stdout: bool,

    #[serde(default)]
    pub stderr: bool,

    /// Forwards messages to the `log` crate at this level.
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// Verbosity of the category.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Level of the `log` crate records a category is forwarded as.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    #[default]
    #[serde(rename = "info")]
    Info,

    #[serde(rename = "debug")]
    Debug,

    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Verbosity of a log category.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
    /// Whether nothing should be logged at this level.
    fn is_disabled(&self) -> bool;
}

/// The sinks of every log category.
///
/// A sink shared by several categories is opened once, each category keeping the indices of
/// its sinks.
#[derive(Debug)]
pub struct Logger {
    sinks: Vec<Sink>,
    matmul_index: Vec<usize>,
    dispatch_index: Vec<usize>,
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Hash, PartialEq, Eq)]
enum SinkId {
    File(PathBuf),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

impl Logger {
    /// Opens the sinks of the global configuration.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Opens the sinks of `config`.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut sinks = SinkRegistry::default();
        let matmul_index = sinks.register(&config.matmul.logger);
        let dispatch_index = sinks.register(&config.dispatch.logger);

        Self {
            sinks: sinks.sinks,
            matmul_index,
            dispatch_index,
            config,
        }
    }

    /// Logs a strategy selection or a launch of a matmul or convolution kernel.
    pub fn log_matmul<S: Display>(&mut self, msg: &S) {
        let indices = self.matmul_index.clone();
        self.log_all(msg, &indices);
    }

    /// Logs the execution of a cube grid.
    pub fn log_dispatch<S: Display>(&mut self, msg: &S) {
        let indices = self.dispatch_index.clone();
        self.log_all(msg, &indices);
    }

    pub fn log_level_matmul(&self) -> MatmulLogLevel {
        self.config.matmul.logger.level
    }

    pub fn log_level_dispatch(&self) -> DispatchLogLevel {
        self.config.dispatch.logger.level
    }

    fn log_all<S: Display>(&mut self, msg: &S, indices: &[usize]) {
        match indices {
            [] => {}
            [index] => self.sinks[*index].log(msg),
            _ => {
                let msg = msg.to_string();
                for index in indices {
                    self.sinks[*index].log(&msg);
                }
            }
        }
    }
}

#[derive(Default)]
struct SinkRegistry {
    sinks: Vec<Sink>,
    ids: HashMap<SinkId, usize>,
}

impl SinkRegistry {
    // Indices of the sinks of one category, opening those not seen yet.
    fn register<L: LogLevel>(&mut self, config: &LoggerConfig<L>) -> Vec<usize> {
        let mut indices = Vec::new();
        if config.level.is_disabled() {
            return indices;
        }

        if let Some(path) = &config.file {
            let append = config.append;
            self.push(SinkId::File(path.clone()), &mut indices, || {
                FileSink::open(path, append).map(Sink::File)
            });
        }
        if config.stdout {
            self.push(SinkId::Stdout, &mut indices, || Some(Sink::Stdout));
        }
        if config.stderr {
            self.push(SinkId::Stderr, &mut indices, || Some(Sink::Stderr));
        }
        if let Some(level) = config.log {
            self.push(SinkId::LogCrate(level), &mut indices, || Some(Sink::Log(level)));
        }

        indices
    }

    fn push(
        &mut self,
        id: SinkId,
        indices: &mut Vec<usize>,
        open: impl FnOnce() -> Option<Sink>,
    ) {
        if let Some(index) = self.ids.get(&id) {
            indices.push(*index);
            return;
        }

        if let Some(sink) = open() {
            let index = self.sinks.len();
            self.ids.insert(id, index);
            self.sinks.push(sink);
            indices.push(index);
        }
    }
}

#[derive(Debug)]
enum Sink {
    File(FileSink),
    Stdout,
    Stderr,
    Log(LogCrateLevel),
}

impl Sink {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            Sink::File(file) => file.log(msg),
            Sink::Stdout => println!("{msg}"),
            Sink::Stderr => eprintln!("{msg}"),
            Sink::Log(LogCrateLevel::Info) => log::info!("{msg}"),
            Sink::Log(LogCrateLevel::Debug) => log::debug!("{msg}"),
            Sink::Log(LogCrateLevel::Trace) => log::trace!("{msg}"),
        }
    }
}

#[derive(Debug)]
struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    // Opens the log file, or reports through the `log` crate and disables the sink.
    fn open(path: &PathBuf, append: bool) -> Option<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path);

        match file {
            Ok(file) => Some(Self {
                writer: BufWriter::new(file),
            }),
            Err(err) => {
                log::warn!("Unable to open log file {}: {err}", path.display());
                None
            }
        }
    }

    // Flushed per message, so the file is complete if a kernel panics.
    fn log<S: Display>(&mut self, msg: &S) {
        if let Err(err) = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush()) {
            log::warn!("Unable to write to log file: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{dispatch::DispatchLogLevel, matmul::MatmulLogLevel};
    use pretty_assertions::assert_eq;

    #[test]
    fn shared_sinks_are_deduplicated() {
        let mut config = GlobalConfig::default();
        config.matmul.logger.level = MatmulLogLevel::Basic;
        config.matmul.logger.log = Some(LogCrateLevel::Debug);
        config.dispatch.logger.level = DispatchLogLevel::Basic;
        config.dispatch.logger.log = Some(LogCrateLevel::Debug);
        config.dispatch.logger.stderr = true;

        let logger = Logger::from_config(Arc::new(config));

        assert_eq!(logger.sinks.len(), 2);
        assert_eq!(logger.matmul_index, vec![0]);
        assert_eq!(logger.dispatch_index, vec![1, 0]);
    }

    #[test]
    fn disabled_categories_register_nothing() {
        let mut config = GlobalConfig::default();
        config.matmul.logger.level = MatmulLogLevel::Disabled;
        config.matmul.logger.stdout = true;

        let logger = Logger::from_config(Arc::new(config));

        assert!(logger.matmul_index.is_empty());
    }
}
