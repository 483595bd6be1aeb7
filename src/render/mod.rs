// SPDX-License-Identifier: GPL-3.0-or-later

//! Source generation. Every artifact is produced by handing the saved
//! configuration document and a template to a [`TemplateEngine`].

mod process;

pub use process::{Completion, ScopedChild};

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::gpio::GPIO_SECTION;
use crate::config::DeviceConfig;
use crate::util::parent_dir;

pub const TEMPLATE_DIR: &str = "Templates";
pub const TEMPLATE_EXT: &str = "tt";
pub const OUTPUT_DIR: &str = "srcs/default";
pub const GPIO_OUTPUT_DIR: &str = "srcs/default/gpio";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {template}, searched: [{}]", join_paths(.searched))]
    TemplateNotFound { template: String, searched: Vec<PathBuf> },
    #[error("rendering {} timed out after {timeout:?}", .template.display())]
    Timeout { template: PathBuf, timeout: Duration },
    #[error("template engine failed on {} (exit status {status}): {stderr}", .template.display())]
    Process { template: PathBuf, status: String, stdout: String, stderr: String },
    #[error("failed to run template engine {program}")]
    Spawn { program: String, #[source] source: std::io::Error },
    #[error("failed to prepare {}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// One render: the configuration document drives `template` into `output`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub config: PathBuf,
    pub template: PathBuf,
    pub output: PathBuf,
}

pub trait TemplateEngine {
    fn render(&self, request: &RenderRequest) -> Result<(), RenderError>;
}

/// Runs an external template processor. `{config}`, `{template}` and
/// `{output}` in the arguments are replaced with the request paths.
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for ExternalEngine {
    fn default() -> Self {
        Self {
            program: "t4".to_string(),
            args: ["-o", "{output}", "-p:ConfigPath={config}", "{template}"]
                .iter().map(|a| a.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExternalEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }

    fn command(&self, request: &RenderRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            cmd.arg(arg
                .replace("{config}", &request.config.display().to_string())
                .replace("{template}", &request.template.display().to_string())
                .replace("{output}", &request.output.display().to_string()));
        }
        cmd
    }
}

impl TemplateEngine for ExternalEngine {
    fn render(&self, request: &RenderRequest) -> Result<(), RenderError> {
        let cmd = self.command(request);
        debug!("Running {:?}", cmd);

        let mut child = ScopedChild::spawn(cmd)
            .map_err(|source| RenderError::Spawn { program: self.program.clone(), source })?;

        let completion = child.wait_timeout(self.timeout)
            .map_err(|source| RenderError::Spawn { program: self.program.clone(), source })?;

        match completion {
            Completion::Exited { status, .. } if status.success() => Ok(()),
            Completion::Exited { status, stdout, stderr } => Err(RenderError::Process {
                template: request.template.clone(),
                status: status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
                stdout,
                stderr,
            }),
            Completion::TimedOut { .. } => Err(RenderError::Timeout {
                template: request.template.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

/// Ordered list of directories templates are looked up in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSearch {
    dirs: Vec<PathBuf>,
}

impl TemplateSearch {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Next to the executable, then the project holding the configuration
    /// document, then the working directory.
    pub fn standard(config_path: &Path) -> Self {
        let mut dirs = vec![];
        if let Some(exe_dir) = std::env::current_exe().ok().and_then(|e| e.parent().map(Path::to_path_buf)) {
            dirs.push(exe_dir.join(TEMPLATE_DIR));
        }
        dirs.push(parent_dir(config_path).join(TEMPLATE_DIR));
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd.join(TEMPLATE_DIR));
        }
        Self { dirs }
    }

    /// Puts `dir` in front of the other candidates
    pub fn prefer(mut self, dir: PathBuf) -> Self {
        self.dirs.insert(0, dir);
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn find(&self, template: &str) -> Result<PathBuf, RenderError> {
        let searched: Vec<PathBuf> = self.dirs.iter().map(|d| d.join(template)).collect();
        match searched.iter().find(|p| p.is_file()) {
            Some(found) => {
                trace!("Using template {}", found.display());
                Ok(found.clone())
            }
            None => Err(RenderError::TemplateNotFound { template: template.to_string(), searched }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Generated file name, the template is this name plus `.tt`
    pub name: &'static str,
    /// Output directory relative to the configuration document
    pub dir: &'static str,
}

impl Artifact {
    pub fn template_name(&self) -> String {
        format!("{}.{}", self.name, TEMPLATE_EXT)
    }

    pub fn output_path(&self, config_path: &Path) -> PathBuf {
        parent_dir(config_path).join(self.dir).join(self.name)
    }
}

pub const CONFIG_ARTIFACTS: [Artifact; 2] = [
    Artifact { name: "config_bits.c", dir: OUTPUT_DIR },
    Artifact { name: "config_bits.h", dir: OUTPUT_DIR },
];

pub const GPIO_ARTIFACTS: [Artifact; 2] = [
    Artifact { name: "gpio.c", dir: GPIO_OUTPUT_DIR },
    Artifact { name: "gpio.h", dir: GPIO_OUTPUT_DIR },
];

/// Artifacts a configuration produces. Pin function sources only exist when
/// some pin has a function.
pub fn plan(config: &DeviceConfig) -> Vec<Artifact> {
    let mut artifacts = CONFIG_ARTIFACTS.to_vec();
    if config.section(GPIO_SECTION).map_or(false, |s| !s.is_empty()) {
        artifacts.extend(GPIO_ARTIFACTS.iter().cloned());
    }
    artifacts
}

#[derive(Debug)]
pub struct ArtifactResult {
    pub artifact: Artifact,
    pub output: PathBuf,
    pub result: Result<(), RenderError>,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    pub results: Vec<ArtifactResult>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactResult> {
        self.results.iter().filter(|r| r.result.is_err())
    }
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            match &r.result {
                Ok(()) => writeln!(f, "ok     {}", r.output.display())?,
                Err(e) => writeln!(f, "FAILED {}: {}", r.output.display(), e)?,
            }
        }
        Ok(())
    }
}

fn render_artifact(
    artifact: &Artifact,
    config_path: &Path,
    output: &Path,
    engine: &dyn TemplateEngine,
    search: &TemplateSearch,
) -> Result<(), RenderError> {
    let template = search.find(&artifact.template_name())?;

    let out_dir = parent_dir(output);
    std::fs::create_dir_all(&out_dir)
        .map_err(|source| RenderError::Io { path: out_dir.clone(), source })?;

    engine.render(&RenderRequest {
        config: config_path.to_path_buf(),
        template,
        output: output.to_path_buf(),
    })
}

/// Renders every artifact of the saved configuration at `config_path`. Each
/// artifact succeeds or fails on its own; all of them are attempted.
pub fn generate(config_path: &Path, engine: &dyn TemplateEngine, search: &TemplateSearch) -> GenerationReport {
    let config = match DeviceConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, generating configuration sources only", e);
            DeviceConfig::default()
        }
    };

    let mut report = GenerationReport::default();

    for artifact in plan(&config) {
        let output = artifact.output_path(config_path);
        let result = render_artifact(&artifact, config_path, &output, engine, search);

        match &result {
            Ok(()) => info!("Generated {}", output.display()),
            Err(e) => error!("{}", e),
        }
        report.results.push(ArtifactResult { artifact, output, result });
    }

    report
}
