// Library surface for the binary and headless integration tests.
pub mod app_dirs;
pub mod camera;
pub mod capture;
pub mod clock;
pub mod config;
pub mod detection;
pub mod export;
pub mod frame;
pub mod logging;
pub mod runtime;
pub mod shell;
pub mod stats;
pub mod ui;
pub mod util;
pub mod worker;
