//! Application bootstrap
//!
//! Loads configuration, builds the HTTP service client and starts a debug
//! session for one program. Front ends (the CLI, an editor integration)
//! hold the returned [`Application`] and drive the session through its
//! handle.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::Config;
use crate::error::Line;
use crate::service::HttpExecutionService;
use crate::session::{self, SessionHandle};
use crate::types::FlagConfiguration;

/// A configured session talking to the simulator service
pub struct Application {
    pub config: Config,
    session: SessionHandle,
}

impl Application {
    pub fn new(config: Config, session: SessionHandle) -> Self {
        Self { config, session }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Stop the session task, halting any run in progress
    pub async fn shutdown(&self) {
        self.session.shutdown();
        self.session.closed().await;
    }
}

/// Options for starting a session
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Service URL (overrides config file and env vars)
    pub service_url: Option<String>,

    /// Config file path (overrides default search)
    pub config_path: Option<PathBuf>,

    /// Already loaded configuration; skips loading entirely
    pub config: Option<Config>,

    /// Program text loaded into the session
    pub source: String,

    pub flags: FlagConfiguration,

    /// Breakpoints set before the first action
    pub breakpoints: Vec<Line>,

    /// Run speed, 1 to 10 (overrides config)
    pub speed: Option<u8>,
}

/// Builder for constructing InitOptions
#[derive(Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.options.service_url = Some(url.into());
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Use a configuration loaded by the caller
    pub fn config(mut self, config: Config) -> Self {
        self.options.config = Some(config);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.options.source = source.into();
        self
    }

    /// Read the program from a file
    pub fn source_file(self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read source file {}", path.display()))?;
        Ok(self.source(text))
    }

    pub fn flag(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.options.flags.insert(name.into(), enabled);
        self
    }

    pub fn flags(mut self, flags: FlagConfiguration) -> Self {
        self.options.flags = flags;
        self
    }

    pub fn breakpoints(mut self, lines: impl IntoIterator<Item = Line>) -> Self {
        self.options.breakpoints.extend(lines);
        self
    }

    pub fn speed(mut self, speed: Option<u8>) -> Self {
        self.options.speed = speed;
        self
    }

    pub async fn init(self) -> Result<Application> {
        initialize(self.options).await
    }
}

/// Load configuration and start a session
///
/// Nothing is sent to the service yet; the first request goes out with the
/// first action.
pub async fn initialize(options: InitOptions) -> Result<Application> {
    let mut config = match options.config {
        Some(config) => config,
        None => Config::builder()
            .service_url(options.service_url)
            .config_path(options.config_path)
            .build()
            .context("Failed to load configuration")?,
    };

    if let Some(speed) = options.speed {
        config.run.speed = speed;
        config.validate()?;
    }

    let service = HttpExecutionService::new(&config.service)
        .context("Failed to create service client")?;

    let (controller, events) = session::build_controller(service, &config);
    let mut controller = controller
        .with_source(options.source)
        .with_flags(options.flags);

    for line in options.breakpoints {
        if controller.registry().is_breakpoint(line) {
            bail!("Breakpoint L{} given more than once", line);
        }
        controller.toggle_breakpoint(line);
    }

    let (handle, _task) = session::spawn(controller, events, &config.session);
    info!(service = %config.service.url, speed = config.run.speed, "session ready");

    Ok(Application::new(config, handle))
}
