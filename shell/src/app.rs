//! Shell application state and startup/shutdown sequencing

use log::{error, info, warn};
use netlab_core::{
    BootstrapOutcome, CancelToken, CloudInstances, Error, LocalServer, LocalServerBootstrap,
    ProjectManager, ProjectObserver, ProjectState, Settings,
};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Flushes the cloud instance registry whenever a non-temporary project
/// closes, so provider bookkeeping survives project switches.
struct CloudBookkeeping {
    instances: Rc<RefCell<CloudInstances>>,
}

impl ProjectObserver for CloudBookkeeping {
    fn project_closing(&self, project: &ProjectState) {
        if project.temporary {
            return;
        }
        if let Err(e) = self.instances.borrow().save() {
            warn!("could not save cloud instances: {}", e);
        }
    }
}

/// The running shell session: settings, project manager and the local
/// server connection.
pub struct ShellApp {
    settings: Settings,
    server: LocalServer,
    manager: ProjectManager,
}

impl ShellApp {
    pub fn new(settings: Settings) -> Self {
        let cloud_instances = Rc::new(RefCell::new(
            CloudInstances::load_or_default().unwrap_or_default(),
        ));

        let mut manager = ProjectManager::new(settings.general.projects_path.clone());
        manager.add_observer(Box::new(CloudBookkeeping {
            instances: cloud_instances,
        }));

        let server = LocalServer::new(&settings.server);

        Self {
            settings,
            server,
            manager,
        }
    }

    /// Run the once-per-session startup sequence: make the local server
    /// reachable if possible, then materialize a temporary project.
    ///
    /// Bootstrap failures degrade the session instead of aborting it; the
    /// shell keeps running without a compute backend.
    pub fn startup(&mut self, token: &CancelToken) {
        let mut bootstrap = LocalServerBootstrap::new(self.settings.server.clone());
        match bootstrap.run(&mut self.server, token, None) {
            Ok(BootstrapOutcome::AlreadyConnected) => {}
            Ok(BootstrapOutcome::AlreadyRunning) => {
                info!(
                    "connected to a local server on {}:{}",
                    self.server.host(),
                    self.server.port()
                );
            }
            Ok(BootstrapOutcome::Started) => {
                info!(
                    "local server started and reachable on {}:{}",
                    self.server.host(),
                    self.server.port()
                );
            }
            Ok(BootstrapOutcome::Skipped) => {
                info!("running without a local server");
            }
            Err(e @ Error::HandshakeFailed { .. }) => {
                warn!("continuing without a working local server: {}", e);
            }
            Err(e) => {
                error!("local server bootstrap failed: {}", e);
            }
        }

        if let Err(e) = self.manager.create_temporary() {
            warn!("could not fully create the temporary project: {}", e);
        }
    }

    /// Open a project file, recording it in the recent files list
    pub fn open_project(&mut self, path: &Path) -> netlab_core::Result<()> {
        self.manager.load(path)?;
        if let Some(opened) = self.manager.state().path.clone() {
            self.settings.add_recent_file(opened);
            self.settings.save()?;
        }
        Ok(())
    }

    /// Close the session: tear down the project, stop a server we spawned
    /// and flush settings.
    pub fn shutdown(&mut self) {
        self.manager.close();
        self.server.stop(true);
        if let Err(e) = self.settings.save() {
            warn!("could not save settings: {}", e);
        }
    }

    /// One-line session summary for the console
    pub fn status_line(&self) -> String {
        let state = self.manager.state();
        let project = if state.temporary {
            "unsaved project".to_string()
        } else {
            state.name.clone()
        };
        let server = if self.server.connected() {
            format!("server {}:{}", self.server.host(), self.server.port())
        } else {
            "no server".to_string()
        };
        format!(
            "{} ({} nodes, {}) - {}",
            project,
            self.manager.topology().nodes.len(),
            state.kind.display_name(),
            server
        )
    }
}
