//! Project lifecycle management
//!
//! Owns the current project (temporary or persisted), its descriptor file
//! and files directory, and the transitions between projects. Observers
//! receive ordered notifications: the closing of the old state always
//! completes before the opened notification of the new one.

use crate::model::{ProjectFile, ResourcesType, Topology};
use crate::tasks::{
    mirror_directory_tree, spawn_transfer, CancelToken, TaskEvent, TransferKind, TransferReport,
};
use crate::{Error, Result};
use chrono::Local;
use log::{info, warn};
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use uuid::Uuid;

/// Extension of current project descriptor files
pub const PROJECT_FILE_EXTENSION: &str = "gns3";

/// Extension of legacy ini-style project files
pub const LEGACY_PROJECT_FILE_EXTENSION: &str = "net";

/// Suffix of the directory holding project-owned files
pub const PROJECT_FILES_DIR_SUFFIX: &str = "-files";

/// Derive the files directory for a descriptor path: strip the known
/// extension and append the `-files` suffix.
pub fn project_files_dir(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let current = format!(".{}", PROJECT_FILE_EXTENSION);
    let legacy = format!(".{}", LEGACY_PROJECT_FILE_EXTENSION);
    let base = raw
        .strip_suffix(current.as_str())
        .or_else(|| raw.strip_suffix(legacy.as_str()))
        .unwrap_or(raw.as_ref());
    PathBuf::from(format!("{}{}", base, PROJECT_FILES_DIR_SUFFIX))
}

fn unique_temp_name() -> String {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let tail = Uuid::new_v4().simple().to_string();
    format!("netlab-{}-{}", stamp, &tail[..8])
}

/// The current project: descriptor location, files directory and flags
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub name: String,
    /// Path of the descriptor file; absent only before initialization
    pub path: Option<PathBuf>,
    /// Directory holding project-owned files, derived from `path`
    pub files_dir: Option<PathBuf>,
    pub kind: ResourcesType,
    /// True until the project has been saved to a user-chosen location
    pub temporary: bool,
    /// Dirty flag, set by mutating accessors and cleared on save/load
    pub modified: bool,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            name: "unsaved".to_string(),
            path: None,
            files_dir: None,
            kind: ResourcesType::Local,
            temporary: true,
            modified: false,
        }
    }
}

/// Caller-supplied destination for a new or saved-as project
#[derive(Debug, Clone)]
pub struct NewProjectSettings {
    pub name: String,
    pub path: PathBuf,
    pub files_dir: PathBuf,
}

impl NewProjectSettings {
    /// Conventional layout: `<dir>/<name>/<name>.gns3` with a sibling
    /// `<name>-files` directory.
    pub fn in_directory(dir: &Path, name: &str) -> Self {
        let project_dir = dir.join(name);
        Self {
            name: name.to_string(),
            path: project_dir.join(format!("{}.{}", name, PROJECT_FILE_EXTENSION)),
            files_dir: project_dir.join(format!("{}{}", name, PROJECT_FILES_DIR_SUFFIX)),
        }
    }
}

/// Ordered lifecycle notifications
pub trait ProjectObserver {
    /// Delivered before the superseded project's backing files are torn down
    fn project_closing(&self, _project: &ProjectState) {}
    /// Delivered once the new project is fully installed
    fn project_opened(&self, _project: &ProjectState) {}
}

/// Converts a legacy ini-style project, returning the converted descriptor
/// path. Implementations live outside this crate.
pub trait LegacyConverter {
    fn convert(&self, path: &Path, projects_dir: &Path) -> std::result::Result<PathBuf, String>;
}

/// Coordinator for the current project and its transitions
pub struct ProjectManager {
    state: ProjectState,
    topology: Topology,
    observers: Vec<Box<dyn ProjectObserver>>,
    converter: Option<Box<dyn LegacyConverter>>,
    /// Directory converted legacy projects are placed under
    projects_dir: PathBuf,
}

impl ProjectManager {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: ProjectState::default(),
            topology: Topology::new(),
            observers: Vec::new(),
            converter: None,
            projects_dir: projects_dir.into(),
        }
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn is_temporary(&self) -> bool {
        self.state.temporary
    }

    pub fn is_modified(&self) -> bool {
        self.state.modified
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable access to the topology; marks the project modified
    pub fn topology_mut(&mut self) -> &mut Topology {
        self.state.modified = true;
        &mut self.topology
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProjectObserver>) {
        self.observers.push(observer);
    }

    pub fn set_converter(&mut self, converter: Box<dyn LegacyConverter>) {
        self.converter = Some(converter);
    }

    fn notify_closing(&self) {
        for observer in &self.observers {
            observer.project_closing(&self.state);
        }
    }

    fn notify_opened(&self) {
        for observer in &self.observers {
            observer.project_opened(&self.state);
        }
    }

    /// Close the current project: notify observers, then tear down the
    /// backing files when the project is temporary. Persisted projects keep
    /// their files.
    pub fn close(&mut self) {
        if self.state.path.is_some() {
            self.notify_closing();
            self.delete_temporary_files();
        }
    }

    fn delete_temporary_files(&self) {
        if !self.state.temporary {
            return;
        }
        if let (Some(path), Some(files_dir)) = (&self.state.path, &self.state.files_dir) {
            info!(
                "deleting temporary project files directory: {}",
                files_dir.display()
            );
            let _ = fs::remove_dir_all(files_dir);
            info!("deleting temporary project file: {}", path.display());
            if let Err(e) = fs::remove_file(path) {
                warn!(
                    "could not delete temporary project file {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    /// Create a fresh temporary project under the process temp area.
    ///
    /// The previous project is closed first. On filesystem failure the
    /// partially initialized state stays installed and the error is
    /// returned; callers may log and continue.
    pub fn create_temporary(&mut self) -> Result<()> {
        self.close();
        self.topology.clear();

        let file_path = std::env::temp_dir().join(unique_temp_name());
        let files_dir = project_files_dir(&file_path);
        info!("creating temporary project file: {}", file_path.display());

        self.state = ProjectState {
            path: Some(file_path.clone()),
            files_dir: Some(files_dir.clone()),
            ..ProjectState::default()
        };

        let created = (|| -> Result<()> {
            fs::write(&file_path, "")?;
            if !files_dir.is_dir() {
                info!(
                    "creating temporary project files directory: {}",
                    files_dir.display()
                );
                fs::create_dir(&files_dir)?;
            }
            Ok(())
        })();
        if let Err(e) = &created {
            warn!("could not create temporary project: {}", e);
        }

        self.notify_opened();
        created
    }

    /// Create a new project at a caller-supplied location.
    ///
    /// The files directory is created first (tolerating pre-existence); on
    /// failure the previous state is untouched.
    pub fn create_new(&mut self, settings: &NewProjectSettings) -> Result<()> {
        fs::create_dir_all(&settings.files_dir)?;

        self.close();
        self.topology.clear();
        self.state = ProjectState {
            name: settings.name.clone(),
            path: Some(settings.path.clone()),
            files_dir: Some(settings.files_dir.clone()),
            kind: ResourcesType::Local,
            temporary: false,
            modified: false,
        };
        self.save(&settings.path)?;
        self.notify_opened();
        Ok(())
    }

    /// Save the current topology to `path`, overwriting in place
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let descriptor = ProjectFile::new(
            self.state.name.clone(),
            self.state.kind,
            self.topology.clone(),
        );
        info!("saving project: {}", path.display());
        let json = serde_json::to_string_pretty(&descriptor)
            .map_err(|e| Error::invalid_format(e.to_string()))?;
        fs::write(path, json)?;

        self.state.path = Some(path.to_path_buf());
        self.state.temporary = false;
        self.state.modified = false;
        Ok(())
    }

    /// Load a project from `path`, replacing the current one wholesale.
    ///
    /// All-or-nothing: on any error the previous state (path, files_dir,
    /// topology) is left untouched. A legacy `.net` file is routed through
    /// the converter first.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if extension == LEGACY_PROJECT_FILE_EXTENSION {
            return self.convert_legacy_project(path);
        }

        info!("loading project: {}", path.display());
        let content = fs::read_to_string(path)?;
        let descriptor: ProjectFile =
            serde_json::from_str(&content).map_err(|e| Error::invalid_format(e.to_string()))?;

        let files_dir = project_files_dir(path);
        if !files_dir.is_dir() {
            fs::create_dir_all(&files_dir)?;
        }

        match descriptor.resources_type {
            ResourcesType::Cloud => info!(
                "cloud project with {} instances",
                descriptor.topology.instances.len()
            ),
            ResourcesType::Local => {}
        }

        // the new state is complete; now supersede the old project
        self.close();
        self.topology = descriptor.topology;
        self.state = ProjectState {
            name: descriptor.name,
            path: Some(path.to_path_buf()),
            files_dir: Some(files_dir),
            kind: descriptor.resources_type,
            temporary: false,
            modified: false,
        };
        self.notify_opened();
        Ok(())
    }

    fn convert_legacy_project(&mut self, path: &Path) -> Result<()> {
        let converted = {
            let converter = self
                .converter
                .as_ref()
                .ok_or(Error::ConverterUnavailable)?;
            match std::panic::catch_unwind(AssertUnwindSafe(|| {
                converter.convert(path, &self.projects_dir)
            })) {
                Ok(Ok(new_path)) => Ok(new_path),
                Ok(Err(message)) => Err(Error::ConvertFailed {
                    path: path.to_path_buf(),
                    message,
                }),
                Err(_) => Err(Error::ConvertFailed {
                    path: path.to_path_buf(),
                    message: "unexpected error during conversion".to_string(),
                }),
            }
        };
        let new_path = converted?;
        info!(
            "project converted to new format: {}",
            new_path.display()
        );
        self.load(&new_path)
    }

    /// Save the project to a new location, transferring its files.
    ///
    /// Refuses while running stoppable nodes exist. The transfer runs on a
    /// worker thread, moves files when the source project is temporary and
    /// copies them otherwise, collects per-file errors without aborting, and
    /// honors cancellation (already-transferred files stay in place, state
    /// unchanged). On success the old temporary project is deleted and the
    /// descriptor is written to the new location.
    pub fn save_as(
        &mut self,
        settings: &NewProjectSettings,
        token: &CancelToken,
        events: Option<Sender<TaskEvent>>,
    ) -> Result<TransferReport> {
        let running = self.topology.running_stoppable_nodes();
        if !running.is_empty() {
            return Err(Error::NodesRunning(running));
        }

        let old_files_dir = self
            .state
            .files_dir
            .clone()
            .ok_or_else(|| Error::validation("No active project to save"))?;

        fs::create_dir_all(&settings.files_dir)?;

        // create the sub-directories up front so collaborators can rebind
        // to the new files directory before contents arrive
        mirror_directory_tree(&old_files_dir, &settings.files_dir)?;

        let kind = if self.state.temporary {
            info!(
                "moving project files from {} to {}",
                old_files_dir.display(),
                settings.files_dir.display()
            );
            TransferKind::Move
        } else {
            info!(
                "copying project files from {} to {}",
                old_files_dir.display(),
                settings.files_dir.display()
            );
            TransferKind::Copy
        };

        let handle = spawn_transfer(
            old_files_dir,
            settings.files_dir.clone(),
            kind,
            token.clone(),
            events,
        );
        let report = handle
            .join()
            .map_err(|_| Error::validation("File transfer worker panicked"))?;

        if report.cancelled {
            return Err(Error::Cancelled);
        }
        if !report.errors.is_empty() {
            warn!(
                "{} file(s) could not be transferred while saving the project",
                report.errors.len()
            );
        }

        self.delete_temporary_files();
        self.state.files_dir = Some(settings.files_dir.clone());
        self.state.name = settings.name.clone();
        self.save(&settings.path)?;
        Ok(report)
    }
}
