//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`LabConfig`] values without
//! repeating boilerplate across crate boundaries.

use funclab_config::LabConfig;

/// Fluent builder for [`LabConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .console_capacity(4)
///     .timeout_secs(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: LabConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LabConfig::default(),
        }
    }

    pub fn memory_limit_bytes(mut self, bytes: usize) -> Self {
        self.config.sandbox.memory_limit_bytes = bytes;
        self
    }

    pub fn max_stack_bytes(mut self, bytes: usize) -> Self {
        self.config.sandbox.max_stack_bytes = bytes;
        self
    }

    pub fn function_preview_chars(mut self, chars: usize) -> Self {
        self.config.output.function_preview_chars = chars;
        self
    }

    pub fn console_capacity(mut self, lines: usize) -> Self {
        self.config.output.console_capacity = lines;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.host.timeout_secs = secs;
        self
    }

    pub fn build(self) -> LabConfig {
        self.config
    }

    /// Render the built configuration as TOML, e.g. for a config file fixture.
    pub fn to_toml(self) -> String {
        toml_text(&self.config)
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_text(config: &LabConfig) -> String {
    format!(
        "[sandbox]\nmemory_limit_bytes = {}\nmax_stack_bytes = {}\n\n\
         [output]\nfunction_preview_chars = {}\nconsole_capacity = {}\n\n\
         [logging]\nlevel = {:?}\n\n\
         [host]\ntimeout_secs = {}\n",
        config.sandbox.memory_limit_bytes,
        config.sandbox.max_stack_bytes,
        config.output.function_preview_chars,
        config.output.console_capacity,
        config.logging.level,
        config.host.timeout_secs,
    )
}
