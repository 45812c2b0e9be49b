use sentinel_connector::application::Application;

use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .expect("Unable to initialize the logger.");

    let mut application = Application::new();
    application.read_argv();
    if let Err(e) = application.run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
