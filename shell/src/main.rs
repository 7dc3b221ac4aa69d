//! Netlab Shell - headless front-end session
//!
//! Runs the startup sequence (local server bootstrap, temporary project),
//! optionally opens a project passed on the command line, prints a status
//! summary and shuts the session down cleanly.

mod app;

use app::ShellApp;
use netlab_core::{CancelToken, Settings};
use std::path::Path;

fn main() {
    // Set up logging
    env_logger::init();

    let settings = match Settings::load_or_default() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Could not load settings, using defaults: {}", e);
            Settings::default()
        }
    };
    if let Err(e) = settings.validate() {
        eprintln!("Invalid settings: {}", e);
        std::process::exit(1);
    }

    let mut app = ShellApp::new(settings);
    app.startup(&CancelToken::new());

    if let Some(argument) = std::env::args().nth(1) {
        let path = Path::new(&argument);
        if let Err(e) = app.open_project(path) {
            eprintln!("Could not open {}: {}", path.display(), e);
        }
    }

    println!("{}", app.status_line());

    app.shutdown();
}
