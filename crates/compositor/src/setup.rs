//! Server bring-up
//!
//! Everything that can fail fatally happens here, before any thread starts:
//! the virtual framebuffer, font preloading, and (fullscreen only) the
//! cursor sprite. A failure exits with status 1; afterwards the server
//! never surfaces setup-class errors again.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::SoftwareBackend;
use crate::channel::ServerChannel;
use crate::config::{Config, Options};
use crate::cursor::CursorSprite;
use crate::fonts;
use crate::server::Server;
use crate::shm::ProcessShm;

/// Framebuffer size when `-g` is not given.
pub const DEFAULT_GEOMETRY: (u32, u32) = (1280, 800);

/// The identity clients find in `DISPLAY`.
pub fn server_ident(nested: bool) -> String {
    if nested {
        format!("compositor-nest-{}", std::process::id())
    } else {
        "compositor".to_string()
    }
}

/// Everything `main` needs to start the threads.
pub struct Bootstrap {
    pub server: Arc<Server>,
    pub backend: SoftwareBackend,
    /// None in nested mode: the host draws the pointer
    pub cursor: Option<CursorSprite>,
}

/// Bring the server up or fail fatally.
pub fn bootstrap(options: &Options, config: &Config) -> Result<Bootstrap> {
    let ident = server_ident(options.nested);
    let (width, height) = options.geometry.unwrap_or(DEFAULT_GEOMETRY);

    let backend = SoftwareBackend::new(width, height);
    let chan = ServerChannel::bind();
    let shm = Arc::new(ProcessShm::new());

    fonts::preload(&shm, &ident, &config.font_dir).context("failed to preload fonts")?;

    let cursor = if options.nested {
        None
    } else {
        Some(CursorSprite::load(&config.cursor_sprite).context("failed to load cursor sprite")?)
    };

    std::env::set_var("DISPLAY", &ident);
    tracing::info!(ident, width, height, nested = options.nested, "server ready");

    let server = Arc::new(Server::new(ident, width, height, chan, shm));
    Ok(Bootstrap { server, backend, cursor })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_depends_on_nesting() {
        assert_eq!(server_ident(false), "compositor");
        let nested = server_ident(true);
        assert!(nested.starts_with("compositor-nest-"));
        assert_ne!(nested, "compositor-nest-");
    }

    #[test]
    fn bootstrap_fails_without_fonts() {
        let dir = std::env::temp_dir().join("bootstrap-no-fonts");
        std::fs::create_dir_all(&dir).unwrap();

        let options = Options { nested: true, ..Options::default() };
        let config = Config { font_dir: dir, ..Config::default() };

        assert!(bootstrap(&options, &config).is_err());
    }
}
