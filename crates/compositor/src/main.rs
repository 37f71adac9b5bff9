//! compositor - the display server binary
//!
//! Thread layout: the main thread runs the packet dispatcher; the renderer
//! composes frames on its own thread; the mouse and keyboard sources each
//! block on their device and feed packets back through the channel. The
//! first client (the greeter, or the command from the command line) is
//! started with `DISPLAY` pointing at this server.

use std::process::Command;

use compositor::config::{Config, Options, USAGE};
use compositor::input::InputState;
use compositor::input_sources;
use compositor::setup;

fn main() {
    compositor::setup_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match Options::parse(&args) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("{error}");
            eprint!("{USAGE}");
            std::process::exit(1);
        }
    };
    if options.help {
        print!("{USAGE}");
        return;
    }

    let config = Config::load();
    let boot = match setup::bootstrap(&options, &config) {
        Ok(boot) => boot,
        Err(error) => {
            tracing::error!(%error, "setup failed");
            std::process::exit(1);
        }
    };

    // Renderer
    {
        let server = boot.server.clone();
        let mut backend = boot.backend;
        let cursor = boot.cursor;
        std::thread::Builder::new()
            .name("renderer".into())
            .spawn(move || {
                server.render_loop(&mut backend, cursor.as_ref());
            })
            .expect("failed to spawn renderer");
    }

    // Device workers
    input_sources::spawn(&boot.server.chan.connector(), &config);

    spawn_first_client(&options, &config);

    // The dispatcher owns the interaction state and runs until the process
    // is killed or the session ends.
    let mut input = InputState::new();
    boot.server.run(&mut input)
}

/// Start the greeter (or the command from the command line) as the first
/// client. `DISPLAY` is already set; a spawn failure leaves the server
/// running without a client.
fn spawn_first_client(options: &Options, config: &Config) {
    let argv: Vec<String> = if options.exec.is_empty() {
        vec![config.greeter.clone()]
    } else {
        options.exec.clone()
    };

    tracing::info!(command = ?argv, "starting first client");
    match Command::new(&argv[0]).args(&argv[1..]).spawn() {
        Ok(child) => tracing::info!(pid = child.id(), "first client started"),
        Err(error) => tracing::warn!(%error, command = ?argv, "failed to start first client"),
    }
}
